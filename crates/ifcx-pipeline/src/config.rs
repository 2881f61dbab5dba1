//! Conversion settings: defaults, then a JSON file, then environment
//! variables, then whatever the caller (usually the CLI) overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::PhaseWeights;

pub const ENV_ENVIRONMENT: &str = "IFCX_ENV";
pub const ENV_DECODE_IN_WORKER: &str = "IFCX_DECODE_IN_WORKER";

/// Execution environment this build runs in.
pub fn default_environment() -> &'static str {
    if cfg!(target_arch = "wasm32") {
        "wasm"
    } else {
        "native"
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Environment tag used for plugin lookup.
    pub environment: String,
    /// Also register background-worker decoders, preferred over inline ones.
    pub decode_in_worker: bool,
    pub decoder_weight: f64,
    pub encoder_weight: f64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            environment: default_environment().to_string(),
            decode_in_worker: false,
            decoder_weight: 0.5,
            encoder_weight: 0.5,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ConvertConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `IFCX_ENV` / `IFCX_DECODE_IN_WORKER` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(env) = lookup(ENV_ENVIRONMENT).filter(|v| !v.trim().is_empty()) {
            self.environment = env.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_DECODE_IN_WORKER) {
            match parse_flag(&raw) {
                Some(flag) => self.decode_in_worker = flag,
                None => tracing::warn!(
                    variable = ENV_DECODE_IN_WORKER,
                    value = %raw,
                    "ignoring unrecognized boolean"
                ),
            }
        }
    }

    pub fn weights(&self) -> PhaseWeights {
        PhaseWeights::new(self.decoder_weight, self.encoder_weight)
    }
}
