use chrono::{DateTime, Utc};
use hyper::Response;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::json;

use crate::admission::QueueStats;
use crate::analytics::format_uptime;
use crate::config::HealthConfig;
use crate::context::TrafficContext;
use crate::error::Result;
use crate::monitor::MemoryStatus;
use crate::pipeline::response::{json_response, RespBody};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

/// Body of the public health endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime: String,
    pub uptime_secs: u64,
    pub memory: MemoryStatus,
    pub queue: QueueStats,
}

/// Classify queue length and memory usage against the configured thresholds
pub fn classify(config: &HealthConfig, memory: &MemoryStatus, queue: &QueueStats) -> HealthStatus {
    if queue.queued > config.critical_queue_length
        || memory.percentage > config.critical_memory_percent
    {
        HealthStatus::Critical
    } else if queue.queued > config.degraded_queue_length {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

pub fn health_report(ctx: &TrafficContext) -> HealthReport {
    let memory = ctx.monitor().status();
    let queue = ctx.queue().stats();
    let uptime_secs = ctx.uptime().as_secs();
    HealthReport {
        status: classify(&ctx.config().health, &memory, &queue),
        timestamp: Utc::now(),
        uptime: format_uptime(uptime_secs),
        uptime_secs,
        memory,
        queue,
    }
}

/// 200 while healthy or degraded, 503 when critical
pub fn health_response(ctx: &TrafficContext) -> Result<Response<RespBody>> {
    let report = health_report(ctx);
    let status = match report.status {
        HealthStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
    };
    json_response(status, &report)
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "alive"}))
}
