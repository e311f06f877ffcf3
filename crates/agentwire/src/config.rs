// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine configuration.
//!
//! Supports programmatic construction, TOML files and environment overrides.
//!
//! ```toml
//! http_workers = 4
//! user_agent = "agentwire/0.1.0"
//! http_timeout_ms = 30000
//! http_connect_timeout_ms = 10000
//! ```
//!
//! Environment overrides (applied by [`EngineConfig::apply_env`]):
//! `AGENTWIRE_HTTP_WORKERS`, `AGENTWIRE_USER_AGENT`, `AGENTWIRE_HTTP_TIMEOUT_MS`,
//! `AGENTWIRE_HTTP_CONNECT_TIMEOUT_MS`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Largest datagram the receive loop accepts (typical Ethernet MTU).
///
/// Fixed; larger inbound packets are truncated by the OS read.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Default HTTP worker pool size.
pub const DEFAULT_HTTP_WORKERS: usize = 4;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// HTTP worker pool size used when the host does not pass its own.
    #[serde(default = "default_http_workers")]
    pub http_workers: usize,

    /// User-Agent header sent with every HTTP request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request HTTP timeout (milliseconds).
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// HTTP connect timeout (milliseconds).
    #[serde(default = "default_http_connect_timeout_ms")]
    pub http_connect_timeout_ms: u64,
}

fn default_http_workers() -> usize {
    DEFAULT_HTTP_WORKERS
}

fn default_user_agent() -> String {
    format!("agentwire/{}", crate::VERSION)
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

fn default_http_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_workers: default_http_workers(),
            user_agent: default_user_agent(),
            http_timeout_ms: default_http_timeout_ms(),
            http_connect_timeout_ms: default_http_connect_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, then validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text, then validate it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `AGENTWIRE_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("AGENTWIRE_HTTP_WORKERS") {
            match v.parse::<usize>() {
                Ok(n) => self.http_workers = n,
                Err(_) => log::warn!("[CONFIG] Ignoring invalid AGENTWIRE_HTTP_WORKERS='{}'", v),
            }
        }
        if let Some(v) = lookup("AGENTWIRE_USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = lookup("AGENTWIRE_HTTP_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.http_timeout_ms = ms,
                Err(_) => {
                    log::warn!("[CONFIG] Ignoring invalid AGENTWIRE_HTTP_TIMEOUT_MS='{}'", v);
                }
            }
        }
        if let Some(v) = lookup("AGENTWIRE_HTTP_CONNECT_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.http_connect_timeout_ms = ms,
                Err(_) => {
                    log::warn!(
                        "[CONFIG] Ignoring invalid AGENTWIRE_HTTP_CONNECT_TIMEOUT_MS='{}'",
                        v
                    );
                }
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_workers == 0 {
            return Err(ConfigError::Invalid("http_workers must be > 0".into()));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".into()));
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid("http_timeout_ms must be > 0".into()));
        }
        if self.http_connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "http_connect_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn http_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.http_connect_timeout_ms)
    }
}
