//! Facility Configuration Module
//!
//! Provides configuration loading for facilities. Supports loading from
//! TOML files with environment variable overrides (`ACTORS_` prefix, `__`
//! as the nesting separator, e.g. `ACTORS_THREAD_COUNT=8`).

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Configuration of one facility
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FacilityConfig {
    /// Number of worker threads running mailboxes
    pub thread_count: usize,

    /// Initial capacity of each per-destination send buffer
    pub initial_buffer_size: usize,

    /// Initial capacity of an inbox's local queue
    pub initial_local_queue_size: usize,

    /// Prefix for worker thread names
    pub thread_name_prefix: String,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            thread_count: defaults::thread_count(),
            initial_buffer_size: defaults::INITIAL_BUFFER_SIZE,
            initial_local_queue_size: defaults::INITIAL_LOCAL_QUEUE_SIZE,
            thread_name_prefix: defaults::THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl FacilityConfig {
    /// Set the worker thread count
    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Set the initial send buffer capacity
    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    /// Set the initial local queue capacity
    pub fn with_initial_local_queue_size(mut self, size: usize) -> Self {
        self.initial_local_queue_size = size;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Load configuration from a TOML file with `ACTORS_` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, defaults::ENV_PREFIX)
    }

    /// Load configuration from a TOML file with overrides under `prefix`
    ///
    /// A missing file is only an error when `path` was given explicitly.
    pub fn load_with_env_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let explicit = path.is_some();
        let file = path.unwrap_or(Path::new(defaults::CONFIG_PATH));

        debug!(path = ?file, prefix, "Loading facility configuration");

        let builder = Config::builder()
            .add_source(File::from(file).required(explicit))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: FacilityConfig = builder
            .build()
            .context("Failed to build facility configuration")?
            .try_deserialize()
            .context("Failed to deserialize facility configuration")?;

        config.validate()?;
        info!(
            thread_count = config.thread_count,
            initial_buffer_size = config.initial_buffer_size,
            "Loaded facility configuration"
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: FacilityConfig =
            toml::from_str(content).context("Failed to parse facility configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize facility configuration")
    }

    /// Check that the configuration can back a running facility
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            bail!("thread_count must be at least 1");
        }
        if self.thread_name_prefix.is_empty() {
            bail!("thread_name_prefix must not be empty");
        }
        Ok(())
    }
}
