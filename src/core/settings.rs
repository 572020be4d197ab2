//! Configuration variable resolution.
//!
//! Each variable is taken from its command-line flag when non-empty, otherwise
//! from the upper-cased environment variable, otherwise from a default.

use crate::constants;
use crate::error::ClientError;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_PATH: &str = "config_path";
pub const REDIS_URL: &str = "redis_url";
pub const HOST_ADDR: &str = "host_addr";
pub const SERVER_ADDR: &str = "server_addr";
pub const SERVER_PORT: &str = "server_port";
pub const HOST_KEY_PATH: &str = "host_key_path";
pub const TEMPLATE_PATH: &str = "template_path";
pub const STORE_TIMEOUT_SECS: &str = "store_timeout_secs";
pub const AUDIT_LOG: &str = "audit_log";
pub const LOG_LEVEL: &str = "log_level";

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Inputs needed to render a client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioning {
    pub server_addr: String,
    pub server_port: u16,
    pub host_key_path: PathBuf,
    pub template_path: PathBuf,
}

pub struct Settings {
    flags: HashMap<String, String>,
    lookup: EnvLookup,
}

impl Settings {
    /// Resolve against the process environment.
    pub fn from_env() -> Self {
        Self::with_lookup(|name| env::var(name).ok())
    }

    /// Resolve against an arbitrary environment.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            flags: HashMap::new(),
            lookup: Box::new(lookup),
        }
    }

    /// Record a flag value; `None` and empty strings count as not given.
    pub fn flag(mut self, name: &str, value: Option<String>) -> Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.flags.insert(name.to_lowercase(), value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.flags.get(&name.to_lowercase()) {
            return Some(value.clone());
        }
        (self.lookup)(&name.to_uppercase())
    }

    pub fn require(&self, name: &str) -> Result<String, ClientError> {
        self.get(name)
            .ok_or_else(|| ClientError::MissingConfiguration(name.to_uppercase()))
    }

    pub fn get_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(self.get_or(CONFIG_PATH, constants::DEFAULT_CONFIG_PATH))
    }

    pub fn store_timeout(&self) -> Result<Duration, ClientError> {
        match self.get(STORE_TIMEOUT_SECS) {
            None => Ok(Duration::from_secs(constants::DEFAULT_STORE_TIMEOUT_SECS)),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) | Err(_) => Err(ClientError::InvalidConfiguration {
                    name: STORE_TIMEOUT_SECS.to_uppercase(),
                    reason: format!("'{}' is not a positive number of seconds", raw),
                }),
                Ok(secs) => Ok(Duration::from_secs(secs)),
            },
        }
    }

    pub fn audit_log(&self) -> Option<PathBuf> {
        self.get(AUDIT_LOG).map(PathBuf::from)
    }

    /// The four variables client generation needs, all required.
    pub fn provisioning(&self) -> Result<Provisioning, ClientError> {
        let server_addr = self.require(SERVER_ADDR)?;
        let raw_port = self.require(SERVER_PORT)?;
        let server_port = raw_port
            .trim()
            .parse::<u16>()
            .map_err(|_| ClientError::InvalidConfiguration {
                name: SERVER_PORT.to_uppercase(),
                reason: format!("'{}' is not a port number", raw_port),
            })?;
        let host_key_path = PathBuf::from(self.require(HOST_KEY_PATH)?);
        let template_path = PathBuf::from(self.require(TEMPLATE_PATH)?);
        Ok(Provisioning {
            server_addr,
            server_port,
            host_key_path,
            template_path,
        })
    }
}
