use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::warn;

use super::store::AnalyticsStore;
use super::types::{block_rate, HourlyBucket};
use crate::config::HealthConfig;
use crate::monitor::{MemoryMonitor, MemoryStatus};

/// Largest page size accepted by [`AnalyticsQueryService::blocked_ips`]
pub const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("timed out after {0}ms")]
    Timeout(u64),
}

/// Liveness check against the persistence layer
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self) -> Result<(), ProbeError>;
}

/// Opens a TCP connection to the database address and drops it
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), timeout }
    }
}

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Connect(e)),
            Err(_) => Err(ProbeError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Dashboard time range over the hourly series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl Timeframe {
    pub fn duration(self) -> ChronoDuration {
        match self {
            Timeframe::Hour => ChronoDuration::hours(1),
            Timeframe::SixHours => ChronoDuration::hours(6),
            Timeframe::Day => ChronoDuration::hours(24),
            Timeframe::Week => ChronoDuration::days(7),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Hour => "1h",
            Timeframe::SixHours => "6h",
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown timeframe '{0}', expected one of 1h, 6h, 24h, 7d")]
pub struct UnknownTimeframe(pub String);

impl FromStr for Timeframe {
    type Err = UnknownTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Timeframe::Hour),
            "6h" => Ok(Timeframe::SixHours),
            "24h" => Ok(Timeframe::Day),
            "7d" => Ok(Timeframe::Week),
            other => Err(UnknownTimeframe(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficReport {
    pub timeframe: Timeframe,
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub block_rate: f64,
    pub average_per_hour: f64,
    pub peak: Option<HourlyBucket>,
    pub buckets: Vec<HourlyBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedIp {
    pub ip: String,
    pub violations: u64,
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub block_rate: f64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedIpPage {
    pub ips: Vec<BlockedIp>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Slow,
    Error,
    /// No probe address configured
    Unconfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseHealth {
    pub status: ProbeStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub memory: MemoryStatus,
    pub uptime: String,
    pub uptime_secs: u64,
    pub database: DatabaseHealth,
    pub timestamp: DateTime<Utc>,
}

/// Read-only projections over the analytics store and the memory monitor
pub struct AnalyticsQueryService {
    store: Arc<AnalyticsStore>,
    monitor: Arc<MemoryMonitor>,
    probe: Option<Arc<dyn LivenessProbe>>,
    slow_threshold: Duration,
    started_at: Instant,
}

impl AnalyticsQueryService {
    pub fn new(
        store: Arc<AnalyticsStore>,
        monitor: Arc<MemoryMonitor>,
        probe: Option<Arc<dyn LivenessProbe>>,
        config: &HealthConfig,
        started_at: Instant,
    ) -> Self {
        Self {
            store,
            monitor,
            probe,
            slow_threshold: Duration::from_millis(config.slow_threshold_ms),
            started_at,
        }
    }

    pub fn store(&self) -> &Arc<AnalyticsStore> {
        &self.store
    }

    pub fn traffic_summary(&self, timeframe: Timeframe) -> TrafficReport {
        self.traffic_summary_at(timeframe, Utc::now())
    }

    /// Sum the hourly buckets that fall inside `timeframe` ending at `now`.
    ///
    /// Each bucket covers the hour before its rollup. With rollups more frequent than
    /// hourly the buckets overlap, so `total_requests` counts a request once per bucket
    /// that saw it and `average_per_hour` is the mean over buckets.
    pub fn traffic_summary_at(&self, timeframe: Timeframe, now: DateTime<Utc>) -> TrafficReport {
        let since = now - timeframe.duration();
        let buckets: Vec<HourlyBucket> = self
            .store
            .hourly_series()
            .into_iter()
            .filter(|b| b.timestamp >= since && b.timestamp <= now)
            .collect();

        let total: u64 = buckets.iter().map(|b| b.requests).sum();
        let blocked: u64 = buckets.iter().map(|b| b.blocked).sum();
        let average_per_hour = if buckets.is_empty() {
            0.0
        } else {
            ((total as f64 / buckets.len() as f64) * 100.0).round() / 100.0
        };

        // first bucket wins ties
        let peak = buckets.iter().fold(None::<&HourlyBucket>, |best, b| match best {
            Some(current) if current.requests >= b.requests => Some(current),
            _ => Some(b),
        });

        TrafficReport {
            timeframe,
            total_requests: total,
            blocked_requests: blocked,
            block_rate: block_rate(blocked, total),
            average_per_hour,
            peak: peak.cloned(),
            buckets,
        }
    }

    /// Violators sorted by violation count, one page at a time.
    ///
    /// `page` starts at 1; `limit` is clamped to `1..=100`.
    pub fn blocked_ips(&self, page: usize, limit: usize) -> BlockedIpPage {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);

        let mut violations = self.store.violations();
        violations.sort_by(|a, b| b.violations.cmp(&a.violations).then_with(|| a.ip.cmp(&b.ip)));

        let total = violations.len();
        let total_pages = total.div_ceil(limit);
        let offset = (page - 1).saturating_mul(limit);

        let ips = violations
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|entry| {
                let detail = self.store.ip_analytics(&entry.ip);
                BlockedIp {
                    block_rate: block_rate(detail.blocked_requests, detail.total_requests),
                    total_requests: detail.total_requests,
                    blocked_requests: detail.blocked_requests,
                    last_activity: detail.last_activity,
                    violations: entry.violations,
                    ip: entry.ip,
                }
            })
            .collect();

        BlockedIpPage { ips, page, limit, total, total_pages }
    }

    /// Memory, uptime and database liveness
    pub async fn system_health(&self) -> SystemHealth {
        let uptime_secs = self.started_at.elapsed().as_secs();
        SystemHealth {
            memory: self.monitor.status(),
            uptime: format_uptime(uptime_secs),
            uptime_secs,
            database: self.database_health().await,
            timestamp: Utc::now(),
        }
    }

    async fn database_health(&self) -> DatabaseHealth {
        let Some(probe) = &self.probe else {
            return DatabaseHealth {
                status: ProbeStatus::Unconfigured,
                latency_ms: None,
                error: None,
            };
        };

        let started = tokio::time::Instant::now();
        let result = probe.probe().await;
        let latency = started.elapsed();
        let latency_ms = Some(latency.as_millis() as u64);

        match result {
            Ok(()) if latency < self.slow_threshold => {
                DatabaseHealth { status: ProbeStatus::Healthy, latency_ms, error: None }
            }
            Ok(()) => DatabaseHealth { status: ProbeStatus::Slow, latency_ms, error: None },
            Err(e) => {
                warn!(error = %e, "Database liveness probe failed");
                let error = Some(e.to_string());
                DatabaseHealth { status: ProbeStatus::Error, latency_ms, error }
            }
        }
    }
}

/// `{d}d {h}h {m}m`, leading zero units omitted
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
