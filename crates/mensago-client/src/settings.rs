//! Client settings
//!
//! Settings are layered with the `config` crate: built-in defaults, then the
//! local server config file (if present), then `MENSAGO_*` environment
//! variables using `__` as the section separator, e.g.
//! `MENSAGO_NETWORK__PORT=2002`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use mensago_common::{DEFAULT_PORT, Domain};

use crate::error::{ClientError, Result};

pub const SERVER_CONFIG_ENV: &str = "MENSAGO_SERVER_CONFIG";

const NETWORK_PORT: &str = "network.port";
const NETWORK_LISTEN_IP: &str = "network.listen_ip";
const CONNECT_TIMEOUT: &str = "client.connect_timeout_secs";
const READ_TIMEOUT: &str = "client.read_timeout_secs";
const KEYCARD_CACHE_SIZE: &str = "client.keycard_cache_size";
const HOST_OVERRIDES: &str = "client.host_overrides";

/// Domains under this suffix are served by the local server
const LOCAL_DOMAIN_SUFFIX: &str = "example.com";

/// Default location of the local server's config file
pub fn default_server_config_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ProgramData\mensagod\serverconfig.toml")
    } else {
        PathBuf::from("/etc/mensagod/serverconfig.toml")
    }
}

#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub config: Config,
    host_overrides: HashMap<String, String>,
}

impl ClientSettings {
    /// Loads settings, reading the server config from `MENSAGO_SERVER_CONFIG`
    /// or the platform default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(SERVER_CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_server_config_path());
        Self::load_from(Some(path))
    }

    /// Loads settings from an optional server config file. A missing file is
    /// not an error.
    pub fn load_from(server_config: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default(NETWORK_PORT, i64::from(DEFAULT_PORT))?
            .set_default(NETWORK_LISTEN_IP, "127.0.0.1")?
            .set_default(CONNECT_TIMEOUT, 10)?
            .set_default(READ_TIMEOUT, 1800)?
            .set_default(KEYCARD_CACHE_SIZE, 5000)?;

        if let Some(path) = server_config {
            debug!(path = %path.display(), "reading server config");
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let config = builder
            .add_source(
                Environment::with_prefix("MENSAGO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let host_overrides = config
            .get::<HashMap<String, String>>(HOST_OVERRIDES)
            .unwrap_or_default();

        Ok(ClientSettings {
            config,
            host_overrides,
        })
    }

    /// Settings built from defaults only
    pub fn defaults() -> Result<Self> {
        Self::load_from(None)
    }

    // ========================================================================
    // Network
    // ========================================================================

    pub fn port(&self) -> u16 {
        self.config
            .get_int(NETWORK_PORT)
            .ok()
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn listen_ip(&self) -> String {
        self.config
            .get_string(NETWORK_LISTEN_IP)
            .unwrap_or("127.0.0.1".to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64(CONNECT_TIMEOUT, 10))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64(READ_TIMEOUT, 1800))
    }

    pub fn keycard_cache_size(&self) -> u64 {
        self.get_u64(KEYCARD_CACHE_SIZE, 5000)
    }

    /// Reads a non-negative integer, falling back to `default` when the
    /// value is missing or negative
    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }

    // ========================================================================
    // Server lookup
    // ========================================================================

    pub fn host_overrides(&self) -> &HashMap<String, String> {
        &self.host_overrides
    }

    /// Routes a domain to a fixed `host:port`
    pub fn add_host_override(&mut self, domain: &str, target: &str) {
        self.host_overrides
            .insert(domain.to_ascii_lowercase(), target.to_string());
    }

    /// Returns the host and port of the server for a domain
    pub fn server_for(&self, domain: &Domain) -> Result<(String, u16)> {
        if let Some(target) = self.host_overrides.get(domain.as_str()) {
            return parse_target(target, self.port());
        }

        if domain.as_str().ends_with(LOCAL_DOMAIN_SUFFIX) {
            return Ok(("localhost".to_string(), self.port()));
        }

        Err(ClientError::Unsupported(format!(
            "server lookup for {} is not implemented",
            domain
        )))
    }
}

fn parse_target(target: &str, default_port: u16) -> Result<(String, u16)> {
    match target.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| ClientError::bad_value(format!("bad port in {}", target)))?;
            Ok((host.to_string(), port))
        }
        None => Ok((target.to_string(), default_port)),
    }
}
