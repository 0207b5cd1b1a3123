//! Capture-analysis worker
//!
//! Hosts the WASM dissection engine and exposes a message-based query
//! interface: load a capture, list summary columns, fetch a frame, fetch a
//! filtered frame window, validate a filter expression. Bootstrap fetches the
//! engine's two compressed assets, the router serializes all engine calls
//! through a single task, and results are broadcast as tagged events or sent
//! on per-request reply channels.

pub mod bootstrap;
pub mod config;
pub mod router;

pub use config::WorkerConfig;
pub use router::{Inbound, Worker, WorkerClient, WorkerHandle};
