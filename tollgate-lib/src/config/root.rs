use serde::Deserialize;
use std::net::SocketAddr;

use super::admission::AdmissionConfig;
use super::monitor::{AnalyticsConfig, HealthConfig, MemoryConfig};
use super::security::{IdentityConfig, IpFilterConfig, RateLimitConfig};
use super::telemetry::{LoggingConfig, TelemetryConfig};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:8080"
    pub listen: SocketAddr,
    /// Application server admitted requests are forwarded to (host:port)
    /// Default: None (admitted requests that are not gateway endpoints get 502)
    #[serde(default)]
    pub upstream: Option<String>,
    /// Seconds to wait for in-flight connections on shutdown
    /// Default: 30
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_secs: u64,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Memory monitor configuration
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Analytics store configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    /// Admission queue configuration
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Identity verification configuration
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Static IP filter consulted before rate limiting
    #[serde(default)]
    pub ip_filter: IpFilterConfig,
    /// Health reporting configuration
    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    /// Configuration with every section at its default
    pub fn with_listen(listen: SocketAddr) -> Self {
        Self {
            listen,
            upstream: None,
            shutdown_secs: default_shutdown_secs(),
            logging: LoggingConfig::default(),
            telemetry: TelemetryConfig::default(),
            memory: MemoryConfig::default(),
            analytics: AnalyticsConfig::default(),
            admission: AdmissionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            identity: IdentityConfig::default(),
            ip_filter: IpFilterConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

fn default_shutdown_secs() -> u64 {
    30
}
