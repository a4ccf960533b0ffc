use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::telemetry::Metrics;

/// Errors raised while sampling memory. Never leave the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("field {field} not found in {path}")]
    MissingField { path: String, field: &'static str },
    #[error("invalid value for {field}: {value}")]
    Parse { field: &'static str, value: String },
    #[error("memory limit reported as zero")]
    ZeroLimit,
}

/// A single reading of process memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Where memory figures come from
pub trait MemorySource: Send + Sync {
    fn sample(&self) -> Result<MemorySample, MonitorError>;

    /// Best-effort hint to give memory back. No-op unless the source knows how.
    fn reclaim(&self) {}
}

/// Snapshot exposed to the health endpoints
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStatus {
    pub heap_used: u64,
    pub heap_total: u64,
    pub percentage: f64,
    pub under_pressure: bool,
    /// False when the last sample failed and the figures are unknown
    pub available: bool,
    pub sampled_at: Option<DateTime<Utc>>,
}

impl MemoryStatus {
    fn unknown() -> Self {
        Self {
            heap_used: 0,
            heap_total: 0,
            percentage: 0.0,
            under_pressure: false,
            available: false,
            sampled_at: None,
        }
    }
}

/// Samples memory on demand and exposes the "under pressure" signal.
///
/// Sampling failures fail open: the monitor reports "not under pressure" and an
/// unavailable status, and serving continues.
pub struct MemoryMonitor {
    source: Box<dyn MemorySource>,
    threshold: f64,
    under_pressure: AtomicBool,
    status: ArcSwap<MemoryStatus>,
    metrics: Option<Arc<Metrics>>,
}

impl MemoryMonitor {
    pub fn new(source: Box<dyn MemorySource>, config: &MemoryConfig) -> Self {
        Self {
            source,
            threshold: config.pressure_threshold,
            under_pressure: AtomicBool::new(false),
            status: ArcSwap::from_pointee(MemoryStatus::unknown()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Take one sample and update the pressure signal. Returns the new signal.
    pub fn sample(&self) -> bool {
        let status = match self.source.sample() {
            Ok(sample) if sample.total_bytes > 0 => {
                let ratio = sample.used_bytes as f64 / sample.total_bytes as f64;
                MemoryStatus {
                    heap_used: sample.used_bytes,
                    heap_total: sample.total_bytes,
                    percentage: round2(ratio * 100.0),
                    under_pressure: ratio > self.threshold,
                    available: true,
                    sampled_at: Some(Utc::now()),
                }
            }
            Ok(_) => {
                debug!(error = %MonitorError::ZeroLimit, "Memory sample ignored");
                MemoryStatus::unknown()
            }
            Err(e) => {
                debug!(error = %e, "Memory sample failed, assuming no pressure");
                MemoryStatus::unknown()
            }
        };

        let pressure = status.under_pressure;
        let was = self.under_pressure.swap(pressure, Ordering::SeqCst);

        match PressureChange::between(was, pressure) {
            PressureChange::Entered => warn!(
                used = status.heap_used,
                total = status.heap_total,
                percentage = status.percentage,
                "Memory pressure detected, shrinking quotas"
            ),
            PressureChange::Persisting => {
                debug!(percentage = status.percentage, "Memory still under pressure")
            }
            PressureChange::Cleared => {
                info!(percentage = status.percentage, "Memory pressure cleared")
            }
            PressureChange::Steady => {}
        }
        if pressure {
            self.source.reclaim();
        }

        if let Some(m) = &self.metrics {
            m.record_memory(status.percentage, pressure);
        }

        self.status.store(Arc::new(status));
        pressure
    }

    pub fn is_under_pressure(&self) -> bool {
        self.under_pressure.load(Ordering::SeqCst)
    }

    /// Latest heap figures and pressure flag
    pub fn status(&self) -> MemoryStatus {
        self.status.load().as_ref().clone()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How the pressure signal moved between two samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PressureChange {
    Entered,
    Persisting,
    Cleared,
    Steady,
}

impl PressureChange {
    fn between(was: bool, now: bool) -> Self {
        match (was, now) {
            (false, true) => PressureChange::Entered,
            (true, true) => PressureChange::Persisting,
            (true, false) => PressureChange::Cleared,
            (false, false) => PressureChange::Steady,
        }
    }
}
