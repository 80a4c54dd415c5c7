// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for flowpod-runtime.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Which engine adapter the binary drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Out-of-process engine reached through its admin HTTP API.
    Http,
    /// In-memory engine, for local development.
    Mock,
}

/// Pod configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pod identity reported on `/health`
    pub pod_name: String,
    /// Shared secret the Pool Manager presents on load/unload
    pub pod_secret: String,
    /// Listen address for management and editor traffic
    pub http_addr: SocketAddr,
    /// Engine adapter selection
    pub engine: EngineKind,
    /// Base URL of the engine admin API (HTTP adapter)
    pub engine_admin_url: String,
    /// Upstream for editor traffic, if the engine serves one
    pub engine_editor_url: Option<String>,
    /// Bound on DNS resolution inside the egress guard
    pub egress_dns_timeout: Duration,
    /// Exact addresses exempt from the egress private-range check
    pub egress_allowed_addresses: Vec<IpAddr>,
    /// Bound on a single outbound request made for a flow node
    pub egress_request_timeout: Duration,
    /// Bound on calls to the Gateway
    pub bridge_timeout: Duration,
    /// How often engine readiness is polled during boot
    pub ready_poll_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pod_secret = std::env::var("FLOWPOD_POD_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEnvVar("FLOWPOD_POD_SECRET"))?;

        let pod_name = std::env::var("FLOWPOD_POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "flowpod-local".to_string());

        let port: u16 = std::env::var("FLOWPOD_HTTP_PORT")
            .unwrap_or_else(|_| "1880".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let engine = match std::env::var("FLOWPOD_ENGINE").as_deref() {
            Ok("mock") => EngineKind::Mock,
            Ok("http") | Err(_) => EngineKind::Http,
            Ok(other) => return Err(ConfigError::InvalidValue("FLOWPOD_ENGINE", other.to_string())),
        };

        let engine_admin_url = std::env::var("FLOWPOD_ENGINE_ADMIN_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:1881".to_string());

        let engine_editor_url = std::env::var("FLOWPOD_ENGINE_EDITOR_URL")
            .ok()
            .filter(|s| !s.is_empty());

        let egress_allowed_addresses = match std::env::var("FLOWPOD_EGRESS_ALLOWED_ADDRESSES") {
            Ok(raw) => parse_addresses(&raw)
                .map_err(|_| ConfigError::InvalidValue("FLOWPOD_EGRESS_ALLOWED_ADDRESSES", raw))?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            pod_name,
            pod_secret,
            http_addr,
            engine,
            engine_admin_url,
            engine_editor_url,
            egress_dns_timeout: duration_ms("FLOWPOD_EGRESS_DNS_TIMEOUT_MS", 5_000)?,
            egress_allowed_addresses,
            egress_request_timeout: duration_ms("FLOWPOD_EGRESS_REQUEST_TIMEOUT_MS", 30_000)?,
            bridge_timeout: duration_ms("FLOWPOD_BRIDGE_TIMEOUT_MS", 15_000)?,
            ready_poll_interval: duration_ms("FLOWPOD_READY_POLL_INTERVAL_MS", 500)?,
        })
    }
}

fn duration_ms(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue(var, raw)),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}

fn parse_addresses(raw: &str) -> Result<Vec<IpAddr>, std::net::AddrParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A variable has a value that cannot be used.
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "FLOWPOD_POD_SECRET",
        "FLOWPOD_POD_NAME",
        "FLOWPOD_HTTP_PORT",
        "FLOWPOD_ENGINE",
        "FLOWPOD_ENGINE_ADMIN_URL",
        "FLOWPOD_ENGINE_EDITOR_URL",
        "FLOWPOD_EGRESS_DNS_TIMEOUT_MS",
        "FLOWPOD_EGRESS_ALLOWED_ADDRESSES",
        "FLOWPOD_EGRESS_REQUEST_TIMEOUT_MS",
        "FLOWPOD_BRIDGE_TIMEOUT_MS",
        "FLOWPOD_READY_POLL_INTERVAL_MS",
        "HOSTNAME",
    ];

    /// Sets env vars for one test and restores them on drop.
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        /// Start from a clean slate for every variable the config reads.
        fn clean() -> Self {
            let mut guard = Self { vars: Vec::new() };
            for key in VARS {
                guard.remove(key);
            }
            guard
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();
        guard.set("FLOWPOD_POD_SECRET", "s3cret");

        let config = Config::from_env().unwrap();

        assert_eq!(config.pod_secret, "s3cret");
        assert_eq!(config.pod_name, "flowpod-local");
        assert_eq!(config.http_addr.port(), 1880);
        assert_eq!(config.engine, EngineKind::Http);
        assert_eq!(config.engine_admin_url, "http://127.0.0.1:1881");
        assert!(config.engine_editor_url.is_none());
        assert_eq!(config.egress_dns_timeout, Duration::from_secs(5));
        assert!(config.egress_allowed_addresses.is_empty());
        assert_eq!(config.egress_request_timeout, Duration::from_secs(30));
        assert_eq!(config.bridge_timeout, Duration::from_secs(15));
        assert_eq!(config.ready_poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_config_from_env_with_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();
        guard.set("FLOWPOD_POD_SECRET", "s3cret");
        guard.set("HOSTNAME", "pod-7f9c");
        guard.set("FLOWPOD_HTTP_PORT", "9000");
        guard.set("FLOWPOD_ENGINE", "mock");
        guard.set("FLOWPOD_ENGINE_EDITOR_URL", "http://127.0.0.1:1881/red");
        guard.set("FLOWPOD_EGRESS_DNS_TIMEOUT_MS", "250");
        guard.set("FLOWPOD_EGRESS_ALLOWED_ADDRESSES", "10.0.0.7, fd00::1");

        let config = Config::from_env().unwrap();

        assert_eq!(config.pod_name, "pod-7f9c");
        assert_eq!(config.http_addr.port(), 9000);
        assert_eq!(config.engine, EngineKind::Mock);
        assert_eq!(
            config.engine_editor_url.as_deref(),
            Some("http://127.0.0.1:1881/red")
        );
        assert_eq!(config.egress_dns_timeout, Duration::from_millis(250));
        assert_eq!(
            config.egress_allowed_addresses,
            vec![
                "10.0.0.7".parse::<IpAddr>().unwrap(),
                "fd00::1".parse::<IpAddr>().unwrap()
            ]
        );

        guard.set("FLOWPOD_POD_NAME", "explicit");
        assert_eq!(Config::from_env().unwrap().pod_name, "explicit");
    }

    #[test]
    fn test_config_requires_secret() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("FLOWPOD_POD_SECRET")));

        guard.set("FLOWPOD_POD_SECRET", "");
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::clean();
        guard.set("FLOWPOD_POD_SECRET", "s3cret");

        guard.set("FLOWPOD_HTTP_PORT", "not-a-port");
        assert!(matches!(Config::from_env(), Err(ConfigError::InvalidPort)));
        guard.remove("FLOWPOD_HTTP_PORT");

        guard.set("FLOWPOD_ENGINE", "docker");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("FLOWPOD_ENGINE"));
        guard.remove("FLOWPOD_ENGINE");

        guard.set("FLOWPOD_BRIDGE_TIMEOUT_MS", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue("FLOWPOD_BRIDGE_TIMEOUT_MS", _))
        ));
        guard.remove("FLOWPOD_BRIDGE_TIMEOUT_MS");

        guard.set("FLOWPOD_EGRESS_ALLOWED_ADDRESSES", "10.0.0.7,gateway");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue("FLOWPOD_EGRESS_ALLOWED_ADDRESSES", _))
        ));
    }
}
