//! WASM-hosted packet dissection engine for Capscope
//!
//! The actual dissection logic lives in a precompiled WASM module treated as
//! an opaque collaborator. This crate owns the wasmtime plumbing around it:
//! the [`Dissector`] trait seam the worker talks to, the [`WasmEngine`]
//! implementation with its linear-memory call convention, and the host
//! imports the module needs (auxiliary data package, status relay).

pub mod dissector;
pub mod host;
pub mod mock;
mod wasm;

pub use dissector::{Dissector, FilterCheck};
pub use host::StatusUpdate;
pub use mock::MockDissector;
pub use wasm::WasmEngine;
