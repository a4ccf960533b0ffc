use serde::Deserialize;

/// Memory monitor configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MemoryConfig {
    /// Sampling interval in seconds
    /// Default: 30
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,
    /// Fraction of the memory limit above which the process is under pressure
    /// Must be in (0, 1]
    /// Default: 0.85
    #[serde(default = "default_pressure_threshold")]
    pub pressure_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval(),
            pressure_threshold: default_pressure_threshold(),
        }
    }
}

fn default_sample_interval() -> u64 {
    30
}

fn default_pressure_threshold() -> f64 {
    0.85
}

/// Analytics store configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AnalyticsConfig {
    /// How long raw request records are kept, in seconds
    /// Default: 3600
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// Interval of the hourly-bucket rollup job, in seconds
    /// Every bucket covers the trailing hour, so intervals below 3600 give overlapping buckets
    /// Default: 60
    #[serde(default = "default_rollup_interval")]
    pub rollup_interval_secs: u64,
    /// Interval of the stale-data cleanup job, in seconds
    /// Default: 3600
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Number of hours of hourly buckets kept
    /// Default: 24
    #[serde(default = "default_hourly_window")]
    pub hourly_window_hours: u32,
    /// Hard cap on raw records held in memory; oldest records are evicted first
    /// Default: 100000
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            rollup_interval_secs: default_rollup_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
            hourly_window_hours: default_hourly_window(),
            max_records: default_max_records(),
        }
    }
}

fn default_retention() -> u64 {
    3600
}

fn default_rollup_interval() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_hourly_window() -> u32 {
    24
}

fn default_max_records() -> usize {
    100_000
}

/// Health reporting configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HealthConfig {
    /// Persistence layer address probed for liveness (host:port)
    /// Default: None (database status reported as "unconfigured")
    #[serde(default)]
    pub probe_addr: Option<String>,
    /// Probe timeout in milliseconds
    /// Default: 3000
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// Probe latency at or above which the database is reported as slow
    /// Default: 1000
    #[serde(default = "default_slow_threshold")]
    pub slow_threshold_ms: u64,
    /// Queue length above which the gateway reports "degraded"
    /// Default: 10
    #[serde(default = "default_degraded_queue")]
    pub degraded_queue_length: usize,
    /// Queue length above which the gateway reports "critical"
    /// Default: 20
    #[serde(default = "default_critical_queue")]
    pub critical_queue_length: usize,
    /// Memory usage percentage above which the gateway reports "critical"
    /// Default: 90
    #[serde(default = "default_critical_memory")]
    pub critical_memory_percent: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_addr: None,
            probe_timeout_ms: default_probe_timeout(),
            slow_threshold_ms: default_slow_threshold(),
            degraded_queue_length: default_degraded_queue(),
            critical_queue_length: default_critical_queue(),
            critical_memory_percent: default_critical_memory(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    3000
}

fn default_slow_threshold() -> u64 {
    1000
}

fn default_degraded_queue() -> usize {
    10
}

fn default_critical_queue() -> usize {
    20
}

fn default_critical_memory() -> f64 {
    90.0
}
