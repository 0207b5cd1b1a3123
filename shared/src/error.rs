//! Error types shared across Capscope components.

use thiserror::Error;

/// Failures surfaced by the dissection engine or its WASM host.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The module bytes could not be compiled or instantiated.
    #[error("failed to load engine module: {0}")]
    Load(String),

    /// The module is missing a required export (`memory`, `alloc`, a query
    /// function, ...).
    #[error("engine module missing export `{0}`")]
    MissingExport(&'static str),

    /// The engine's `init` export reported failure.
    #[error("engine initialization failed with code {0}")]
    Init(i32),

    /// A read or write of the engine's linear memory went out of bounds.
    #[error("engine memory access failed: {0}")]
    Memory(String),

    /// A call trapped or the engine reported `ok: false`.
    #[error("engine call `{call}` failed: {reason}")]
    Call { call: &'static str, reason: String },

    /// The engine returned bytes that are not the expected response envelope.
    #[error("malformed engine response for `{call}`: {reason}")]
    MalformedResponse { call: &'static str, reason: String },
}

impl EngineError {
    /// Shorthand for an engine-reported call failure.
    pub fn call(call: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Call {
            call,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_call_name() {
        let err = EngineError::call("frames", "no capture loaded");
        assert_eq!(
            err.to_string(),
            "engine call `frames` failed: no capture loaded"
        );
    }
}
