// Server configuration

use crate::{Error, ParseLimits};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of the environment variables read by [`ServerOptions::from_env`].
pub const ENV_PREFIX: &str = "AOU_";

/// Options fixed at server construction.
///
/// Every field has a default, so partial TOML documents are accepted:
///
/// ```
/// use aou_core::ServerOptions;
///
/// let options = ServerOptions::from_toml_str("implicit_json = true").unwrap();
/// assert!(options.implicit_json);
/// assert!(options.keep_alive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Treat structured handler return values without response fields as a JSON body.
    #[serde(alias = "json", alias = "implicitJson")]
    pub implicit_json: bool,
    /// Honor persistent connections.
    pub keep_alive: bool,
    /// Maximum wait for a complete request on an open connection.
    pub read_timeout_ms: u64,
    pub max_head_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
    /// Time given to in-flight connections when shutting down.
    pub shutdown_grace_ms: u64,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let limits = ParseLimits::default();
        Self {
            implicit_json: false,
            keep_alive: true,
            read_timeout_ms: 30_000,
            max_head_bytes: limits.max_head_bytes,
            max_headers: limits.max_headers,
            max_body_bytes: limits.max_body_bytes,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn implicit_json(mut self, enabled: bool) -> Self {
        self.implicit_json = enabled;
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    pub fn read_timeout_ms(mut self, millis: u64) -> Self {
        self.read_timeout_ms = millis;
        self
    }

    pub fn max_head_bytes(mut self, bytes: usize) -> Self {
        self.max_head_bytes = bytes;
        self
    }

    pub fn max_headers(mut self, count: usize) -> Self {
        self.max_headers = count;
        self
    }

    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    pub fn shutdown_grace_ms(mut self, millis: u64) -> Self {
        self.shutdown_grace_ms = millis;
        self
    }

    /// Parse options from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let options: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("TOML parse error: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by `AOU_IMPLICIT_JSON`, `AOU_KEEP_ALIVE`,
    /// `AOU_READ_TIMEOUT_MS` and `AOU_MAX_BODY_BYTES`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ServerOptions::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("IMPLICIT_JSON") {
            options.implicit_json = parse_bool("IMPLICIT_JSON", &value)?;
        }
        if let Some(value) = var("KEEP_ALIVE") {
            options.keep_alive = parse_bool("KEEP_ALIVE", &value)?;
        }
        if let Some(value) = var("READ_TIMEOUT_MS") {
            options.read_timeout_ms = parse_number("READ_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("MAX_BODY_BYTES") {
            options.max_body_bytes = parse_number("MAX_BODY_BYTES", &value)?;
        }

        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.max_headers == 0 {
            return Err(Error::Config("max_headers must be at least 1".into()));
        }
        if self.max_head_bytes == 0 {
            return Err(Error::Config("max_head_bytes must be at least 1".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(Error::Config("read_timeout_ms must be at least 1".into()));
        }
        Ok(())
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_head_bytes: self.max_head_bytes,
            max_headers: self.max_headers,
            max_body_bytes: self.max_body_bytes,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, Error> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got `{other}`"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, Error> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!(
            "{ENV_PREFIX}{name}: expected a number, got `{value}`"
        ))
    })
}
