//! Message envelopes exchanged between the worker and its host.
//!
//! Every envelope is a JSON object tagged by a `type` field. The wire tags
//! match what UI hosts already speak (`select-frames`, `process:buffer`, ...),
//! so the serde rename attributes here are part of the external contract, not
//! cosmetics. Inbound envelopes with an unrecognized tag are dropped by the
//! router rather than rejected; [`Request::from_value`] models that by
//! returning `None` for them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inbound request envelope, tagged by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// List the summary column headers of the loaded capture.
    #[serde(rename = "columns")]
    Columns,

    /// Fetch a single dissected frame by its frame number.
    #[serde(rename = "select")]
    Select { number: u32 },

    /// Fetch a filtered, paginated window of frame summaries.
    /// Expects a reply channel; the response never goes to the broadcast bus.
    #[serde(rename = "select-frames")]
    SelectFrames {
        skip: u32,
        limit: u32,
        #[serde(default)]
        filter: String,
    },

    /// Validate a display-filter expression.
    /// Expects a reply channel; the response never goes to the broadcast bus.
    #[serde(rename = "check-filter")]
    CheckFilter { filter: String },

    /// Load a capture from raw bytes already held by the host.
    #[serde(rename = "process:buffer")]
    ProcessBuffer { name: String, data: Vec<u8> },

    /// Load a capture from a file on disk; the read happens asynchronously.
    #[serde(rename = "process:file")]
    ProcessFile { file: PathBuf },
}

impl Request {
    /// Decode a raw inbound JSON envelope.
    ///
    /// Returns `None` when the envelope carries no known `type` tag — the
    /// router ignores such messages instead of treating them as errors.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }
}

/// Outbound event broadcast to the host, tagged by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Event {
    /// Engine status update relayed during bootstrap.
    #[serde(rename = "status")]
    Status { code: u32, status: String },

    /// Bootstrap finished; the engine is ready for queries.
    #[serde(rename = "init")]
    Init,

    /// Bootstrap failed; the worker is unusable until restarted.
    #[serde(rename = "error")]
    Error { error: String },

    /// Response to `columns`.
    #[serde(rename = "columns")]
    Columns { data: serde_json::Value },

    /// Response to `select`, sanitized for transport.
    #[serde(rename = "selected")]
    Selected { data: serde_json::Value },

    /// A capture finished loading (`process:buffer` or `process:file`).
    #[serde(rename = "processed")]
    Processed { name: String, data: serde_json::Value },
}

/// Payload delivered on a dedicated reply channel, never on the broadcast bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Reply {
    /// Frame window for `select-frames`, sanitized for transport.
    Frames { data: serde_json::Value },

    /// `check-filter`: the expression is valid.
    FilterOk { result: bool },

    /// `check-filter`: the expression is invalid, with the engine's reason.
    FilterError { error: String },
}

impl Reply {
    /// The successful `check-filter` reply, `{"result": true}` on the wire.
    pub fn filter_ok() -> Self {
        Reply::FilterOk { result: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_tags_roundtrip() {
        let cases = vec![
            (json!({"type": "columns"}), Request::Columns),
            (
                json!({"type": "select", "number": 7}),
                Request::Select { number: 7 },
            ),
            (
                json!({"type": "select-frames", "skip": 0, "limit": 100, "filter": "tcp"}),
                Request::SelectFrames {
                    skip: 0,
                    limit: 100,
                    filter: "tcp".to_string(),
                },
            ),
            (
                json!({"type": "check-filter", "filter": "http"}),
                Request::CheckFilter {
                    filter: "http".to_string(),
                },
            ),
        ];

        for (wire, expected) in cases {
            let decoded = Request::from_value(wire.clone()).unwrap();
            assert_eq!(decoded, expected);
            assert_eq!(serde_json::to_value(&decoded).unwrap(), wire);
        }
    }

    #[test]
    fn test_select_frames_filter_defaults_empty() {
        let decoded =
            Request::from_value(json!({"type": "select-frames", "skip": 10, "limit": 50}))
                .unwrap();
        assert_eq!(
            decoded,
            Request::SelectFrames {
                skip: 10,
                limit: 50,
                filter: String::new(),
            }
        );
    }

    #[test]
    fn test_unknown_tag_is_none() {
        assert_eq!(Request::from_value(json!({"type": "reboot"})), None);
        assert_eq!(Request::from_value(json!({"no_tag": true})), None);
        assert_eq!(Request::from_value(json!(42)), None);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = Event::Processed {
            name: "trace.pcapng".to_string(),
            data: json!({"frames": 1234}),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "processed", "name": "trace.pcapng", "data": {"frames": 1234}})
        );

        let status = Event::Status {
            code: 2,
            status: "loading dissectors".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"type": "status", "code": 2, "status": "loading dissectors"})
        );
    }

    #[test]
    fn test_reply_wire_shape() {
        assert_eq!(
            serde_json::to_value(Reply::filter_ok()).unwrap(),
            json!({"result": true})
        );
        assert_eq!(
            serde_json::to_value(Reply::FilterError {
                error: "unknown field".to_string()
            })
            .unwrap(),
            json!({"error": "unknown field"})
        );
        assert_eq!(
            serde_json::to_value(Reply::Frames {
                data: json!([{"number": 1}])
            })
            .unwrap(),
            json!({"data": [{"number": 1}]})
        );
    }
}
