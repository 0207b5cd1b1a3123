//! Host functions available to the dissection engine module.
//!
//! The engine imports three functions under `"env"`: two to pull its
//! auxiliary data package (dissector tables, preferences) into linear memory
//! on demand, and one to relay human-readable status updates during
//! initialization.

use tokio::sync::mpsc::UnboundedSender;
use wasmtime::*;

/// A status update reported by the engine during initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub code: u32,
    pub status: String,
}

/// Per-store host state the imports operate on.
pub struct HostState {
    /// Auxiliary data package served to the engine via `read_package`.
    pub package: Vec<u8>,
    /// Sink for `status` callbacks; send failures mean nobody is listening
    /// anymore and are ignored.
    pub status_tx: UnboundedSender<StatusUpdate>,
}

/// Register host functions with the WASM linker.
pub fn register_host_functions(linker: &mut Linker<HostState>) -> Result<(), Error> {
    // Size of the auxiliary package, so the engine can allocate for it
    linker.func_wrap("env", "package_size", |caller: Caller<'_, HostState>| {
        caller.data().package.len() as u32
    })?;

    // Copy the auxiliary package into engine memory at `dst`.
    // Returns the number of bytes written, 0 if the destination is too small.
    linker.func_wrap(
        "env",
        "read_package",
        |mut caller: Caller<'_, HostState>, dst: u32| -> u32 {
            let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
                return 0;
            };
            let package = std::mem::take(&mut caller.data_mut().package);
            let written = match memory.write(&mut caller, dst as usize, &package) {
                Ok(()) => package.len() as u32,
                Err(_) => 0,
            };
            caller.data_mut().package = package;
            written
        },
    )?;

    // Status relay used during engine initialization
    linker.func_wrap(
        "env",
        "status",
        |mut caller: Caller<'_, HostState>, code: u32, ptr: u32, len: u32| {
            let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
                return;
            };
            let mut buf = vec![0u8; len as usize];
            if memory.read(&caller, ptr as usize, &mut buf).is_err() {
                return;
            }
            let Ok(status) = String::from_utf8(buf) else {
                return;
            };
            tracing::debug!("[engine status {}] {}", code, status);
            let _ = caller.data().status_tx.send(StatusUpdate { code, status });
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_register_on_fresh_linker() {
        let engine = Engine::default();
        let mut linker: Linker<HostState> = Linker::new(&engine);
        register_host_functions(&mut linker).unwrap();
    }

    #[test]
    fn test_status_send_without_receiver_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        // Mirrors what the import does when the listener went away
        assert!(tx
            .send(StatusUpdate {
                code: 1,
                status: "late".to_string()
            })
            .is_err());
    }
}
