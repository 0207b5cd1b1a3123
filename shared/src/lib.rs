//! Shared types and utilities for Capscope
//!
//! This crate contains the message envelopes exchanged between the worker and
//! its host, the result-sanitizing adapter applied before payloads cross that
//! boundary, and the error types shared across components.

pub mod error;
pub mod protocol;
pub mod sanitize;

// Re-export commonly used types
pub use error::EngineError;
pub use protocol::{Event, Reply, Request};
pub use sanitize::sanitize;
