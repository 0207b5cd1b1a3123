//! One-shot engine bootstrap.
//!
//! Fetches the engine module binary and its auxiliary data package
//! concurrently, decompresses each independently (falling back to the raw
//! bytes when a payload is not actually compressed), and constructs the
//! [`WasmEngine`]. There are no retries: a fetch or initialization failure is
//! terminal for the worker.

use crate::config::WorkerConfig;
use anyhow::{Context, Result};
use capscope_engine::{StatusUpdate, WasmEngine};
use capscope_shared::EngineError;
use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// The two decompressed startup assets.
pub struct Assets {
    /// Engine module binary.
    pub module: Vec<u8>,
    /// Auxiliary data package (dissector tables, preferences).
    pub package: Vec<u8>,
}

/// Decompress `bytes` if they look compressed, otherwise return them as-is.
///
/// Detection is by magic bytes (gzip `1f 8b`, zlib `78 ..`); a payload that
/// matches a magic but fails to inflate also falls back to the raw bytes, so
/// a corrupt or mislabeled asset degrades to "already uncompressed" rather
/// than aborting bootstrap.
pub fn inflate_or_raw(bytes: Vec<u8>) -> Vec<u8> {
    let inflated = match bytes.as_slice() {
        [0x1f, 0x8b, ..] => {
            let mut out = Vec::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map(|_| out)
        }
        [0x78, ..] => {
            let mut out = Vec::new();
            ZlibDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map(|_| out)
        }
        _ => return bytes,
    };

    match inflated {
        Ok(out) => out,
        Err(e) => {
            debug!("inflate failed ({}), using raw bytes", e);
            bytes
        }
    }
}

/// Fetch one asset and return its (possibly decompressed) bytes.
pub async fn fetch_asset(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch {}", url))?
        .error_for_status()
        .with_context(|| format!("bad status fetching {}", url))?;
    let body = response
        .bytes()
        .await
        .with_context(|| format!("failed to read body of {}", url))?;
    Ok(inflate_or_raw(body.to_vec()))
}

/// Fetch both startup assets concurrently, joined before returning.
pub async fn fetch_assets(config: &WorkerConfig) -> Result<Assets> {
    let client = reqwest::Client::new();
    let (module, package) = tokio::try_join!(
        fetch_asset(&client, &config.wasm_url),
        fetch_asset(&client, &config.data_url),
    )?;
    info!(
        "fetched engine assets: module {} bytes, package {} bytes",
        module.len(),
        package.len()
    );
    Ok(Assets { module, package })
}

/// Construct and initialize the engine from fetched assets.
pub fn init_engine(
    assets: Assets,
    status_tx: UnboundedSender<StatusUpdate>,
) -> Result<WasmEngine, EngineError> {
    WasmEngine::new(&assets.module, assets.package, status_tx)
}
