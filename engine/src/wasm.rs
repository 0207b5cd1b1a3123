//! wasmtime-backed implementation of [`Dissector`].
//!
//! Call convention with the engine module:
//!
//! - the module exports `memory`, `alloc(len) -> ptr` and `dealloc(ptr, len)`;
//! - each query export takes `(ptr, len)` of a JSON request written into
//!   linear memory and returns a pointer to a response buffer laid out as a
//!   4-byte little-endian length followed by JSON bytes;
//! - `load` takes the capture name and the raw capture bytes as two separate
//!   `(ptr, len)` pairs so captures never pass through JSON;
//! - every response is an envelope `{"ok": bool, "data": ..., "error": ...}`.
//!
//! `init()` runs once at construction; during it the module pulls its
//! auxiliary data package and reports progress through the host imports
//! registered in [`crate::host`].

use crate::dissector::{Dissector, FilterCheck};
use crate::host::{self, HostState, StatusUpdate};
use capscope_shared::EngineError;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use wasmtime::*;

/// Response envelope every engine call returns.
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// The dissection engine, instantiated from precompiled module bytes.
pub struct WasmEngine {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    alloc: TypedFunc<u32, u32>,
    dealloc: TypedFunc<(u32, u32), ()>,
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine").finish_non_exhaustive()
    }
}

impl WasmEngine {
    /// Compile and instantiate the engine module, then run its `init` export.
    ///
    /// `package` is the auxiliary data package the module pulls on demand;
    /// `status_tx` receives the status updates it emits while initializing.
    pub fn new(
        module_bytes: &[u8],
        package: Vec<u8>,
        status_tx: UnboundedSender<StatusUpdate>,
    ) -> Result<Self, EngineError> {
        let mut config = Config::new();
        config.wasm_backtrace_details(WasmBacktraceDetails::Enable);

        let engine =
            Engine::new(&config).map_err(|e| EngineError::Load(e.to_string()))?;
        let module =
            Module::new(&engine, module_bytes).map_err(|e| EngineError::Load(e.to_string()))?;

        let mut store = Store::new(&engine, HostState { package, status_tx });

        let mut linker = Linker::new(&engine);
        host::register_host_functions(&mut linker)
            .map_err(|e| EngineError::Load(e.to_string()))?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| EngineError::Load(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(EngineError::MissingExport("memory"))?;
        let alloc = instance
            .get_typed_func::<u32, u32>(&mut store, "alloc")
            .map_err(|_| EngineError::MissingExport("alloc"))?;
        let dealloc = instance
            .get_typed_func::<(u32, u32), ()>(&mut store, "dealloc")
            .map_err(|_| EngineError::MissingExport("dealloc"))?;

        let mut this = Self {
            store,
            instance,
            memory,
            alloc,
            dealloc,
        };
        this.init()?;
        Ok(this)
    }

    fn init(&mut self) -> Result<(), EngineError> {
        let init = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, "init")
            .map_err(|_| EngineError::MissingExport("init"))?;
        let code = init
            .call(&mut self.store, ())
            .map_err(|e| EngineError::call("init", e.to_string()))?;
        if code != 0 {
            return Err(EngineError::Init(code));
        }
        Ok(())
    }

    /// Copy `bytes` into engine memory, returning its `(ptr, len)`.
    fn write_bytes(&mut self, call: &'static str, bytes: &[u8]) -> Result<(u32, u32), EngineError> {
        let len = bytes.len() as u32;
        let ptr = self
            .alloc
            .call(&mut self.store, len)
            .map_err(|e| EngineError::call(call, e.to_string()))?;
        self.memory
            .write(&mut self.store, ptr as usize, bytes)
            .map_err(|e| EngineError::Memory(e.to_string()))?;
        Ok((ptr, len))
    }

    /// Read a length-prefixed response buffer at `ptr` and hand it back to the
    /// engine's allocator.
    fn read_response(&mut self, call: &'static str, ptr: u32) -> Result<Vec<u8>, EngineError> {
        let mut len_bytes = [0u8; 4];
        self.memory
            .read(&self.store, ptr as usize, &mut len_bytes)
            .map_err(|e| EngineError::Memory(e.to_string()))?;
        let len = u32::from_le_bytes(len_bytes);

        // The length is engine-reported; bound it by what linear memory can
        // actually hold past the prefix before allocating for it
        let available = self
            .memory
            .data_size(&self.store)
            .saturating_sub(ptr as usize + 4);
        if len as usize > available {
            return Err(EngineError::MalformedResponse {
                call,
                reason: format!(
                    "response length {} exceeds the {} bytes of engine memory past the prefix",
                    len, available
                ),
            });
        }

        let mut payload = vec![0u8; len as usize];
        self.memory
            .read(&self.store, ptr as usize + 4, &mut payload)
            .map_err(|e| EngineError::Memory(e.to_string()))?;

        self.dealloc
            .call(&mut self.store, (ptr, len + 4))
            .map_err(|e| EngineError::call(call, e.to_string()))?;
        Ok(payload)
    }

    fn parse_envelope(
        &self,
        call: &'static str,
        payload: &[u8],
    ) -> Result<ResponseEnvelope, EngineError> {
        serde_json::from_slice(payload).map_err(|e| EngineError::MalformedResponse {
            call,
            reason: e.to_string(),
        })
    }

    /// Invoke a `(ptr, len) -> ptr` query export with a JSON request.
    fn call_envelope(
        &mut self,
        call: &'static str,
        request: &Value,
    ) -> Result<ResponseEnvelope, EngineError> {
        let request_bytes = serde_json::to_vec(request).map_err(|e| {
            EngineError::call(call, format!("failed to encode request: {e}"))
        })?;
        let (ptr, len) = self.write_bytes(call, &request_bytes)?;

        let func = self
            .instance
            .get_typed_func::<(u32, u32), u32>(&mut self.store, call)
            .map_err(|_| EngineError::MissingExport(call))?;
        let out_ptr = func
            .call(&mut self.store, (ptr, len))
            .map_err(|e| EngineError::call(call, e.to_string()))?;

        self.dealloc
            .call(&mut self.store, (ptr, len))
            .map_err(|e| EngineError::call(call, e.to_string()))?;

        let payload = self.read_response(call, out_ptr)?;
        self.parse_envelope(call, &payload)
    }

    /// Like [`Self::call_envelope`] but mapping `ok: false` to an error,
    /// which is what every call except `check_filter` wants.
    fn call_data(&mut self, call: &'static str, request: &Value) -> Result<Value, EngineError> {
        let envelope = self.call_envelope(call, request)?;
        if envelope.ok {
            Ok(envelope.data)
        } else {
            Err(EngineError::call(
                call,
                envelope.error.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }
}

impl Dissector for WasmEngine {
    fn load(&mut self, name: &str, data: &[u8]) -> Result<Value, EngineError> {
        let (name_ptr, name_len) = self.write_bytes("load", name.as_bytes())?;
        let (data_ptr, data_len) = self.write_bytes("load", data)?;

        let func = self
            .instance
            .get_typed_func::<(u32, u32, u32, u32), u32>(&mut self.store, "load")
            .map_err(|_| EngineError::MissingExport("load"))?;
        let out_ptr = func
            .call(&mut self.store, (name_ptr, name_len, data_ptr, data_len))
            .map_err(|e| EngineError::call("load", e.to_string()))?;

        for (ptr, len) in [(name_ptr, name_len), (data_ptr, data_len)] {
            self.dealloc
                .call(&mut self.store, (ptr, len))
                .map_err(|e| EngineError::call("load", e.to_string()))?;
        }

        let payload = self.read_response("load", out_ptr)?;
        let envelope = self.parse_envelope("load", &payload)?;
        if envelope.ok {
            Ok(envelope.data)
        } else {
            Err(EngineError::call(
                "load",
                envelope.error.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }

    fn columns(&mut self) -> Result<Value, EngineError> {
        self.call_data("columns", &json!({}))
    }

    fn frame(&mut self, number: u32) -> Result<Value, EngineError> {
        self.call_data("frame", &json!({ "number": number }))
    }

    fn frames(&mut self, filter: &str, skip: u32, limit: u32) -> Result<Value, EngineError> {
        self.call_data(
            "frames",
            &json!({ "filter": filter, "skip": skip, "limit": limit }),
        )
    }

    fn check_filter(&mut self, filter: &str) -> Result<FilterCheck, EngineError> {
        let envelope = self.call_envelope("check_filter", &json!({ "filter": filter }))?;
        if envelope.ok {
            Ok(FilterCheck::Ok)
        } else {
            Ok(FilterCheck::Invalid {
                reason: envelope
                    .error
                    .unwrap_or_else(|| "invalid filter".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_garbage_module_bytes_fail_to_load() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = WasmEngine::new(b"not a wasm module", vec![], tx).unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
    }

    #[test]
    fn test_module_without_exports_is_rejected() {
        // Minimal empty module: magic + version only
        let empty_module = [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = WasmEngine::new(&empty_module, vec![], tx).unwrap_err();
        assert!(matches!(err, EngineError::MissingExport("memory")));
    }

    /// A module whose response buffer claims u32::MAX payload bytes. The
    /// length prefix is engine-reported data and must be rejected against the
    /// actual memory size instead of allocated blindly.
    #[test]
    fn test_corrupt_response_length_is_rejected() {
        let wat = r#"
            (module
              (memory (export "memory") 1)
              (func (export "alloc") (param i32) (result i32) (i32.const 2048))
              (func (export "dealloc") (param i32) (param i32))
              (func (export "init") (result i32) (i32.const 0))
              (func (export "columns") (param i32) (param i32) (result i32)
                (i32.const 0))
              (data (i32.const 0) "\ff\ff\ff\ff"))
        "#;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = WasmEngine::new(wat.as_bytes(), vec![], tx).unwrap();

        let err = engine.columns().unwrap_err();
        assert!(matches!(
            err,
            EngineError::MalformedResponse { call: "columns", .. }
        ));
    }
}
