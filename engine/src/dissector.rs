//! The seam between the worker and the dissection engine.

use capscope_shared::EngineError;
use serde_json::Value;

/// Outcome of validating a display-filter expression.
///
/// An invalid filter is an answer from the engine, not an engine failure;
/// only transport-level problems surface as [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCheck {
    /// The expression parses.
    Ok,
    /// The expression was rejected, with the engine's reason.
    Invalid { reason: String },
}

/// Query interface of the opaque dissection engine.
///
/// All calls take `&mut self`: the engine holds mutable session state (the
/// loaded captures) and callers are expected to serialize access, which the
/// worker does by owning the engine inside a single task.
pub trait Dissector: Send {
    /// Load a capture from raw bytes under the given display name.
    /// Returns the engine's load summary.
    fn load(&mut self, name: &str, data: &[u8]) -> Result<Value, EngineError>;

    /// Summary column headers for frame listings.
    fn columns(&mut self) -> Result<Value, EngineError>;

    /// Full dissection of a single frame by frame number.
    fn frame(&mut self, number: u32) -> Result<Value, EngineError>;

    /// A window of frame summaries matching `filter`, skipping `skip` frames
    /// and returning at most `limit`.
    fn frames(&mut self, filter: &str, skip: u32, limit: u32) -> Result<Value, EngineError>;

    /// Validate a display-filter expression.
    fn check_filter(&mut self, filter: &str) -> Result<FilterCheck, EngineError>;
}
