use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ServerError;
use crate::http::session::SessionLimits;
use crate::router::MethodPolicy;
use crate::server::listener::ListenEndpoint;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "BEACON_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub routing: RoutingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            workers: num_cpus::get(),
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_request_bytes: usize,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = SessionLimits::default();
        Self {
            max_request_bytes: limits.max_request_bytes,
            read_timeout_ms: limits.read_timeout.as_millis() as u64,
            write_timeout_ms: limits.write_timeout.as_millis() as u64,
        }
    }
}

impl LimitsConfig {
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_request_bytes: self.max_request_bytes,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    pub method_policy: MethodPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Result<tracing::Level, ServerError> {
        self.level
            .parse()
            .map_err(|_| ServerError::Config(format!("unknown log level `{}`", self.level)))
    }
}

impl Config {
    /// Loads from the process environment.
    pub fn load() -> Result<Self, ServerError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Loads using `lookup` in place of the environment.
    ///
    /// Order: defaults, then the YAML file named by `BEACON_CONFIG`, then the
    /// `LISTEN` (`host:port`) and `WORKERS` overrides.
    pub fn load_from<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(listen) = lookup("LISTEN") {
            let addr: SocketAddr = listen
                .parse()
                .map_err(|e| ServerError::Config(format!("LISTEN=`{listen}`: {e}")))?;
            cfg.server.host = addr.ip().to_string();
            cfg.server.port = addr.port();
        }

        if let Some(workers) = lookup("WORKERS") {
            cfg.server.workers = workers
                .parse()
                .map_err(|e| ServerError::Config(format!("WORKERS=`{workers}`: {e}")))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ServerError> {
        serde_yaml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.server.workers == 0 {
            return Err(ServerError::InvalidWorkerCount);
        }
        if self.limits.max_request_bytes == 0 {
            return Err(ServerError::Config("limits.max_request_bytes must be > 0".into()));
        }
        if self.limits.read_timeout_ms == 0 || self.limits.write_timeout_ms == 0 {
            return Err(ServerError::Config("limits timeouts must be > 0".into()));
        }
        self.endpoint()?;
        self.logging.max_level()?;
        Ok(())
    }

    pub fn endpoint(&self) -> Result<ListenEndpoint, ServerError> {
        let address: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid host `{}`", self.server.host)))?;
        Ok(ListenEndpoint::new(address, self.server.port))
    }
}
