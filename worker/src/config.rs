//! Worker configuration

/// Where to fetch the engine's two startup assets from.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// URL of the compressed engine module binary.
    pub wasm_url: String,

    /// URL of the compressed auxiliary data package.
    pub data_url: String,
}

impl WorkerConfig {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, url) in [("wasm_url", &self.wasm_url), ("data_url", &self.data_url)] {
            if url.is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} must be an http(s) URL, got: {}", name, url);
            }
        }
        Ok(())
    }
}
