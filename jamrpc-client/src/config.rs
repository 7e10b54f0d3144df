//! Client configuration.
//!
//! Defaults first, then environment overrides:
//!
//! | Variable                     | Default                |
//! |------------------------------|------------------------|
//! | `JAM_RPC`                    | `ws://localhost:19800` |
//! | `JAM_RPC_TIMEOUT_MS`         | `30000`                |
//! | `JAM_RPC_CONNECT_TIMEOUT_MS` | `10000`                |
//! | `JAM_BACKEND`                | `rpc`                  |
//! | `JAMT_PATH`                  | `jamt`                 |
//! | `JAM_SERVICE_ID`             | unset                  |
//! | `JAM_TLS_CA_CERT`            | unset                  |
//! | `JAM_TLS_INSECURE`           | `false`                |

use crate::connection::{ConnectionConfig, TlsClientConfig};
use jamrpc_protocol::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RPC_URL};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_JAMT_PATH: &str = "jamt";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Which backend serves calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// JSON-RPC over WebSocket.
    #[default]
    Rpc,
    /// One `jamt` subprocess per call.
    Jamt,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" | "ws" | "websocket" => Ok(Backend::Rpc),
            "jamt" | "cli" => Ok(Backend::Jamt),
            other => Err(format!("unknown backend '{}', expected rpc or jamt", other)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Rpc => write!(f, "rpc"),
            Backend::Jamt => write!(f, "jamt"),
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Node endpoint.
    pub url: String,
    /// Default per-call timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    pub backend: Backend,
    /// Path to the `jamt` binary.
    pub jamt_path: PathBuf,
    /// Service id used by tooling commands.
    pub service_id: Option<String>,
    /// CA certificate for `wss://` endpoints.
    pub tls_ca_cert: Option<PathBuf>,
    /// Skip server certificate verification.
    pub tls_insecure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            backend: Backend::Rpc,
            jamt_path: PathBuf::from(DEFAULT_JAMT_PATH),
            service_id: None,
            tls_ca_cert: None,
            tls_insecure: false,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the environment, ignoring values that do
    /// not parse.
    pub fn from_env() -> Self {
        Self::from_vars_lenient(env_var)
    }

    /// Builds a configuration from a variable lookup, logging and skipping
    /// values that do not parse. The result is not validated.
    pub fn from_vars_lenient<F>(vars: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        // Lenient mode never returns an error.
        let _ = config.apply_overrides(vars, false);
        config
    }

    /// Loads configuration from the environment and validates it.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_vars(env_var)
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(vars: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(vars, true)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, vars: F, strict: bool) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let check = |result: Result<(), ConfigError>| match result {
            Err(e) if strict => Err(e),
            Err(e) => {
                tracing::warn!("Ignoring override: {}", e);
                Ok(())
            }
            Ok(()) => Ok(()),
        };

        if let Some(url) = vars("JAM_RPC") {
            check(parse_url("JAM_RPC", &url).map(|_| self.url = url.clone()))?;
        }
        check(parse_var(&vars, "JAM_RPC_TIMEOUT_MS").map(|v| {
            if let Some(ms) = v {
                self.request_timeout_ms = ms;
            }
        }))?;
        check(parse_var(&vars, "JAM_RPC_CONNECT_TIMEOUT_MS").map(|v| {
            if let Some(ms) = v {
                self.connect_timeout_ms = ms;
            }
        }))?;
        check(parse_var(&vars, "JAM_BACKEND").map(|v| {
            if let Some(backend) = v {
                self.backend = backend;
            }
        }))?;
        if let Some(path) = vars("JAMT_PATH").filter(|p| !p.is_empty()) {
            self.jamt_path = PathBuf::from(path);
        }
        if let Some(id) = vars("JAM_SERVICE_ID").filter(|id| !id.is_empty()) {
            self.service_id = Some(id);
        }
        if let Some(path) = vars("JAM_TLS_CA_CERT").filter(|p| !p.is_empty()) {
            self.tls_ca_cert = Some(PathBuf::from(path));
        }
        check(parse_flag(&vars, "JAM_TLS_INSECURE").map(|v| {
            if let Some(flag) = v {
                self.tls_insecure = flag;
            }
        }))?;

        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_url("JAM_RPC", &self.url)?;
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Connection settings for the WebSocket backend.
    pub fn to_connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.url.clone())
            .with_connect_timeout(self.connect_timeout())
            .with_request_timeout(self.request_timeout());

        if self.tls_ca_cert.is_some() || self.tls_insecure {
            let mut tls = TlsClientConfig::new();
            if let Some(ref ca) = self.tls_ca_cert {
                tls = tls.with_ca_cert(ca.clone());
            }
            if self.tls_insecure {
                tls = tls.with_insecure();
            }
            config = config.with_tls(tls);
        }
        config
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_var<F, T>(vars: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => Err(ConfigError::InvalidValue {
                var,
                reason: e.to_string(),
                value,
            }),
        },
    }
}

fn parse_flag<F>(vars: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = vars(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            var,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(invalid(format!(
            "unsupported scheme '{}', expected ws or wss",
            url.scheme()
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.url, "ws://localhost:19800");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.backend, Backend::Rpc);
        assert_eq!(config.jamt_path, PathBuf::from("jamt"));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_vars(vars(&[
            ("JAM_RPC", "wss://node.example.com:443"),
            ("JAM_RPC_TIMEOUT_MS", "1500"),
            ("JAM_RPC_CONNECT_TIMEOUT_MS", "250"),
            ("JAM_BACKEND", "jamt"),
            ("JAMT_PATH", "/opt/jam/bin/jamt"),
            ("JAM_SERVICE_ID", "0x2a"),
            ("JAM_TLS_INSECURE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.url, "wss://node.example.com:443");
        assert_eq!(config.request_timeout_ms, 1500);
        assert_eq!(config.connect_timeout_ms, 250);
        assert_eq!(config.backend, Backend::Jamt);
        assert_eq!(config.jamt_path, PathBuf::from("/opt/jam/bin/jamt"));
        assert_eq!(config.service_id.as_deref(), Some("0x2a"));
        assert!(config.tls_insecure);
    }

    #[test]
    fn test_strict_rejects_bad_values() {
        let err = ClientConfig::from_vars(vars(&[("JAM_RPC", "http://localhost:19800")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "JAM_RPC", .. }));

        let err = ClientConfig::from_vars(vars(&[("JAM_RPC_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(err.to_string().contains("JAM_RPC_TIMEOUT_MS"));

        let err = ClientConfig::from_vars(vars(&[("JAM_BACKEND", "grpc")])).unwrap_err();
        assert!(err.to_string().contains("unknown backend"));

        let err = ClientConfig::from_vars(vars(&[("JAM_TLS_INSECURE", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var: "JAM_TLS_INSECURE", .. }));

        let err = ClientConfig::from_vars(vars(&[("JAM_RPC_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_lenient_ignores_bad_values() {
        let config = ClientConfig::from_vars_lenient(vars(&[
            ("JAM_RPC", "not a url"),
            ("JAM_RPC_TIMEOUT_MS", "soon"),
            ("JAM_RPC_CONNECT_TIMEOUT_MS", "500"),
            ("JAM_BACKEND", "grpc"),
            ("JAM_SERVICE_ID", "0c7bb62b"),
        ]));

        assert_eq!(config.url, DEFAULT_RPC_URL);
        assert_eq!(config.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.connect_timeout_ms, 500);
        assert_eq!(config.backend, Backend::Rpc);
        assert_eq!(config.service_id.as_deref(), Some("0c7bb62b"));
    }

    #[test]
    fn test_lenient_skips_validation() {
        let config = ClientConfig::from_vars_lenient(vars(&[("JAM_RPC_TIMEOUT_MS", "0")]));
        assert_eq!(config.request_timeout_ms, 0);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("RPC".parse::<Backend>().unwrap(), Backend::Rpc);
        assert_eq!(" jamt ".parse::<Backend>().unwrap(), Backend::Jamt);
        assert!("grpc".parse::<Backend>().is_err());
        assert_eq!(Backend::Jamt.to_string(), "jamt");
    }

    #[test]
    fn test_connection_config() {
        let config = ClientConfig {
            url: "wss://node.example.com".to_string(),
            request_timeout_ms: 2000,
            tls_ca_cert: Some(PathBuf::from("/etc/jam/ca.pem")),
            ..ClientConfig::default()
        };
        let conn = config.to_connection_config();
        assert_eq!(conn.url, "wss://node.example.com");
        assert_eq!(conn.request_timeout, Duration::from_secs(2));
        let tls = conn.tls.unwrap();
        assert_eq!(tls.ca_cert_path, Some(PathBuf::from("/etc/jam/ca.pem")));
        assert!(!tls.insecure);

        let plain = ClientConfig::default().to_connection_config();
        assert!(plain.tls.is_none());
    }
}
