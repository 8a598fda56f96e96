//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RIPPLE_HOST, RIPPLE_PORT)
//! - TOML configuration file

use anyhow::{Context, Result};
use ripple_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Session lifecycle.
    #[serde(default)]
    pub session: SessionConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path prefix for the WebSocket endpoint. The session key follows it.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of sessions waiting for their WebSocket.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Capacity of each session's direct queue.
    #[serde(default = "default_direct_queue")]
    pub direct_queue: usize,

    /// Minimum capacity of each session's broadcast subscription.
    #[serde(default = "default_broadcast_queue")]
    pub broadcast_queue: usize,

    /// Outbound and handler queue capacity with no elements.
    #[serde(default = "default_min_queue")]
    pub min_queue: usize,

    /// Extra queue capacity per registered element.
    #[serde(default = "default_queue_per_element")]
    pub queue_per_element: usize,

    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a rendered page may wait before its WebSocket connects.
    #[serde(default = "default_max_pending_age")]
    pub max_pending_age_ms: u64,

    /// How often unclaimed sessions are pruned.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_ms: u64,

    /// Allow synchronous handler hooks.
    #[serde(default)]
    pub enable_hooks: bool,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Ping interval in milliseconds. Zero disables the heartbeat.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("RIPPLE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("RIPPLE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ripple".to_string()
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_direct_queue() -> usize {
    64
}

fn default_broadcast_queue() -> usize {
    64
}

fn default_min_queue() -> usize {
    8
}

fn default_queue_per_element() -> usize {
    4
}

fn default_max_frame_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_pending_age() -> u64 {
    10_000 // 10 seconds
}

fn default_prune_interval() -> u64 {
    1_000
}

fn default_heartbeat_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            session: SessionConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            direct_queue: default_direct_queue(),
            broadcast_queue: default_broadcast_queue(),
            min_queue: default_min_queue(),
            queue_per_element: default_queue_per_element(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_pending_age_ms: default_max_pending_age(),
            prune_interval_ms: default_prune_interval(),
            enable_hooks: false,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "ripple.toml",
            "/etc/ripple/ripple.toml",
            "~/.config/ripple/ripple.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_sessions: self.limits.max_sessions,
            direct_queue: self.limits.direct_queue,
            broadcast_queue: self.limits.broadcast_queue,
            min_queue: self.limits.min_queue,
            queue_per_element: self.limits.queue_per_element,
            enable_hooks: self.session.enable_hooks,
            ..EngineConfig::default()
        }
    }

    /// Maximum time a session may stay unclaimed.
    #[must_use]
    pub fn max_pending_age(&self) -> Duration {
        Duration::from_millis(self.session.max_pending_age_ms)
    }
}
