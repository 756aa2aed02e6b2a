//! # Configuration Management
//!
//! This module handles loading and managing application configuration from
//! multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_BRIDGE_POLL_INTERVAL_MS, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, bridge, performance)
/// makes it easier to understand and maintain as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub bridge: BridgeConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio relay tuning.
///
/// ## Fields:
/// - `poll_interval_ms`: how long the transmitter waits on an empty output
///   queue before re-checking the stop signal. This bounds worst-case
///   shutdown latency of the transmit loop.
/// - `join_timeout_secs`: how long `stop()` waits for the transmitter task to
///   finish before giving up (best-effort join).
/// - `max_queue_chunks`: output queue growth policy. `0` means unbounded —
///   the engine is trusted to produce at no more than real-time rate. A
///   positive value bounds the queue and drops the oldest chunk on overflow.
/// - `heartbeat_interval_secs` / `heartbeat_timeout_secs`: WebSocket ping
///   cadence and idle cutoff for the media-stream connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub poll_interval_ms: u64,
    pub join_timeout_secs: u64,
    pub max_queue_chunks: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_calls`: maximum number of simultaneous call legs this
///   instance will accept. Each call leg owns one bridge and one transmitter
///   task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_calls: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            bridge: BridgeConfig {
                poll_interval_ms: 200, // one stop-signal check per empty poll
                join_timeout_secs: 5,
                max_queue_chunks: 0, // unbounded, matching engine ≤ real-time output
                heartbeat_interval_secs: 30,
                heartbeat_timeout_secs: 60,
            },
            performance: PerformanceConfig {
                max_concurrent_calls: 50,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_BRIDGE_POLL_INTERVAL_MS=100`: Override transmitter poll interval
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject bare HOST/PORT without the
        // APP_ prefix convention.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Poll interval is non-zero (a zero interval would spin the
    ///   transmitter loop)
    /// - Join timeout is non-zero (stop() must wait at least briefly)
    /// - Heartbeat timeout exceeds the heartbeat interval
    /// - At least one concurrent call is allowed
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.bridge.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("Bridge poll interval must be greater than 0"));
        }

        if self.bridge.join_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Bridge join timeout must be greater than 0"));
        }

        if self.bridge.heartbeat_timeout_secs <= self.bridge.heartbeat_interval_secs {
            return Err(anyhow::anyhow!(
                "Heartbeat timeout must exceed the heartbeat interval"
            ));
        }

        if self.performance.max_concurrent_calls == 0 {
            return Err(anyhow::anyhow!("Max concurrent calls must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON are changed. For example,
    /// `{"bridge": {"poll_interval_ms": 100}}` adjusts only the poll
    /// interval. The updated configuration is re-validated before it is
    /// accepted.
    ///
    /// Note that bridge settings are read at call setup, so changes here
    /// apply to new call legs, not ones already in flight.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(bridge) = partial_config.get("bridge") {
            if let Some(poll) = bridge.get("poll_interval_ms").and_then(|v| v.as_u64()) {
                self.bridge.poll_interval_ms = poll;
            }
            if let Some(join) = bridge.get("join_timeout_secs").and_then(|v| v.as_u64()) {
                self.bridge.join_timeout_secs = join;
            }
            if let Some(cap) = bridge.get("max_queue_chunks").and_then(|v| v.as_u64()) {
                self.bridge.max_queue_chunks = cap as usize;
            }
            if let Some(interval) = bridge
                .get("heartbeat_interval_secs")
                .and_then(|v| v.as_u64())
            {
                self.bridge.heartbeat_interval_secs = interval;
            }
            if let Some(timeout) = bridge
                .get("heartbeat_timeout_secs")
                .and_then(|v| v.as_u64())
            {
                self.bridge.heartbeat_timeout_secs = timeout;
            }
        }

        if let Some(performance) = partial_config.get("performance") {
            if let Some(calls) = performance
                .get("max_concurrent_calls")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_calls = calls as usize;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.bridge.poll_interval_ms, 200);
        assert_eq!(config.bridge.max_queue_chunks, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bridge.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bridge.heartbeat_timeout_secs = config.bridge.heartbeat_interval_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"bridge": {"poll_interval_ms": 100, "max_queue_chunks": 256}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.bridge.poll_interval_ms, 100);
        assert_eq!(config.bridge.max_queue_chunks, 256);
        // Untouched fields keep their values
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"bridge": {"poll_interval_ms": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    #[test]
    fn test_duration_helpers() {
        let config = AppConfig::default();
        assert_eq!(config.bridge.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.bridge.join_timeout(), Duration::from_secs(5));
    }
}
