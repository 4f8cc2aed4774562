//! Configuration management for the cluster harness.
//!
//! Provides hierarchical configuration loading with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod client;
mod peer;
mod poll;
pub use client::*;
pub use peer::*;
pub use poll::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Env var pointing at an optional TOML file layered over the defaults
pub const CONFIG_PATH_ENV: &str = "HARNESS_CONFIG_PATH";

/// Prefix of environment overrides, e.g. `HARNESS__POLL__TIMEOUT_MS=60000`
pub const ENV_PREFIX: &str = "HARNESS";

/// Main configuration container for the harness
///
/// Sources are merged with later ones taking precedence:
/// 1. Default values from code
/// 2. Configuration file named by `HARNESS_CONFIG_PATH`
/// 3. Environment variables with the `HARNESS__` prefix
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct HarnessConfig {
    /// How peers are launched
    #[serde(default)]
    pub peer: PeerConfig,
    /// Convergence wait budget
    #[serde(default)]
    pub poll: PollConfig,
    /// HTTP client used to query peers
    #[serde(default)]
    pub client: ClientConfig,
}

impl Debug for HarnessConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("executable", &self.peer.executable)
            .field("poll", &self.poll)
            .finish()
    }
}

impl HarnessConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// # Example
    /// ```ignore
    /// std::env::set_var("HARNESS__PEER__EXECUTABLE", "target/release/qdrant");
    /// let cfg = HarnessConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        let config: Self = builder.add_source(env_source()).build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from a file, environment still wins.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.peer.validate()?;
        self.poll.validate()?;
        self.client.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

pub(super) fn invalid(msg: String) -> Error {
    Error::Config(ConfigError::Message(msg))
}
