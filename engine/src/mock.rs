//! A scripted engine for tests. Returns canned responses and records calls.

use crate::dissector::{Dissector, FilterCheck};
use capscope_shared::EngineError;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory [`Dissector`] with canned responses, for exercising the worker
/// without a compiled engine module.
pub struct MockDissector {
    columns: Value,
    frame: Value,
    frames: Value,
    load: Value,
    bad_filters: HashMap<String, String>,
    fail_on: Option<&'static str>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockDissector {
    fn default() -> Self {
        Self {
            columns: json!(["No.", "Time", "Source", "Destination", "Protocol", "Info"]),
            frame: json!({"number": 1, "tree": []}),
            frames: json!([]),
            load: json!({"frames": 0}),
            bad_filters: HashMap::new(),
            fail_on: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockDissector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(mut self, columns: Value) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_frame(mut self, frame: Value) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_frames(mut self, frames: Value) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_load(mut self, load: Value) -> Self {
        self.load = load;
        self
    }

    /// Mark `filter` as invalid with the given reason.
    pub fn with_bad_filter(mut self, filter: &str, reason: &str) -> Self {
        self.bad_filters
            .insert(filter.to_string(), reason.to_string());
        self
    }

    /// Make the named call return an [`EngineError`].
    pub fn failing_on(mut self, call: &'static str) -> Self {
        self.fail_on = Some(call);
        self
    }

    /// Handle to the recorded call log; stays valid after the mock is boxed
    /// and moved into a worker.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: &'static str) -> Result<(), EngineError> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.fail_on == Some(call) {
            return Err(EngineError::call(call, "scripted failure"));
        }
        Ok(())
    }
}

impl Dissector for MockDissector {
    fn load(&mut self, name: &str, data: &[u8]) -> Result<Value, EngineError> {
        self.record("load")?;
        let mut summary = self.load.clone();
        if let Value::Object(map) = &mut summary {
            map.insert("name".to_string(), json!(name));
            map.insert("bytes".to_string(), json!(data.len()));
        }
        Ok(summary)
    }

    fn columns(&mut self) -> Result<Value, EngineError> {
        self.record("columns")?;
        Ok(self.columns.clone())
    }

    fn frame(&mut self, _number: u32) -> Result<Value, EngineError> {
        self.record("frame")?;
        Ok(self.frame.clone())
    }

    fn frames(&mut self, _filter: &str, _skip: u32, _limit: u32) -> Result<Value, EngineError> {
        self.record("frames")?;
        Ok(self.frames.clone())
    }

    fn check_filter(&mut self, filter: &str) -> Result<FilterCheck, EngineError> {
        self.record("check_filter")?;
        match self.bad_filters.get(filter) {
            Some(reason) => Ok(FilterCheck::Invalid {
                reason: reason.clone(),
            }),
            None => Ok(FilterCheck::Ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_responses_and_log() {
        let mut mock = MockDissector::new().with_bad_filter("bogus", "unknown field");
        let log = mock.call_log();

        assert_eq!(mock.check_filter("tcp").unwrap(), FilterCheck::Ok);
        assert_eq!(
            mock.check_filter("bogus").unwrap(),
            FilterCheck::Invalid {
                reason: "unknown field".to_string()
            }
        );
        let summary = mock.load("trace.pcap", &[0u8; 16]).unwrap();
        assert_eq!(summary["name"], json!("trace.pcap"));
        assert_eq!(summary["bytes"], json!(16));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["check_filter", "check_filter", "load"]
        );
    }

    #[test]
    fn test_scripted_failure() {
        let mut mock = MockDissector::new().failing_on("columns");
        assert!(mock.columns().is_err());
        assert!(mock.frame(1).is_ok());
    }
}
