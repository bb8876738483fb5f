//! Configuration management for the transport library and its CLI.
//!
//! A YAML file supplies defaults that CLI flags may override; a missing
//! file is not an error, since every field has a sensible default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RpcError};

/// Top-level configuration for either a `serve` or `client` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Address the server binds to, or the address a client connects to.
    #[serde(default)]
    pub bind_addr: Option<SocketAddr>,

    #[serde(default)]
    pub connect_addr: Option<SocketAddr>,

    /// Default per-call timeout, in seconds. `None` means calls block
    /// until a response or connection teardown.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl RpcConfig {
    /// Loads configuration from a YAML file. A missing file yields
    /// [`RpcConfig::default`] rather than an error, matching the
    /// expectation that a fresh checkout runs with no config file at all.
    pub fn load(path: &str) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                serde_yaml::from_str(&contents).map_err(|err| RpcError::Config(err.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path, "config file not found; using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(RpcError::Config(err.to_string())),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// TLS material. A server needs `cert_path` and `key_path`; a client
/// needs `ca_path`. Neither role reads the fields it doesn't use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    #[serde(default)]
    pub key_path: Option<PathBuf>,

    #[serde(default)]
    pub ca_path: Option<PathBuf>,
}
