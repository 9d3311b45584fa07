mod env;
mod types;


pub use types::*;

use std::path::Path;

use anyhow::Context;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Check cross-section constraints before any service is built.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid section.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.chunking
            .validate()
            .context("invalid [chunking] section")?;
        self.retrieval
            .validate()
            .context("invalid [retrieval] section")?;
        if self.embedding.dimensions == 0 {
            anyhow::bail!("invalid [embedding] section: dimensions must be positive");
        }
        if self.vector_store.index_prefix.is_empty() {
            anyhow::bail!("invalid [vector_store] section: index_prefix must not be empty");
        }
        Ok(())
    }
}
