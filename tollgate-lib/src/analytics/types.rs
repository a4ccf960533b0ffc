use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Other,
}

impl From<&http::Method> for Method {
    fn from(method: &http::Method) -> Self {
        match *method {
            http::Method::GET => Method::Get,
            http::Method::POST => Method::Post,
            http::Method::PUT => Method::Put,
            http::Method::PATCH => Method::Patch,
            http::Method::DELETE => Method::Delete,
            http::Method::HEAD => Method::Head,
            http::Method::OPTIONS => Method::Options,
            _ => Method::Other,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// One inbound request as seen by the gateway. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub ip: String,
    pub endpoint: String,
    pub method: Method,
    pub blocked: bool,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

/// Lifetime counters for one endpoint path
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub total: u64,
    pub blocked: u64,
    pub last_access: DateTime<Utc>,
}

/// Traffic observed over the hour preceding `timestamp`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub timestamp: DateTime<Utc>,
    pub requests: u64,
    pub blocked: u64,
    pub active_ips: usize,
}

/// Aggregates over the trailing hour
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSummary {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub block_rate: f64,
    pub active_ips: usize,
    /// Lifetime blocked-request count across all IPs
    pub total_violations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpViolations {
    pub ip: String,
    pub violations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTraffic {
    pub endpoint: String,
    pub total: u64,
    pub blocked: u64,
    pub block_rate: f64,
    pub last_access: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub key: String,
    pub count: u64,
}

/// Counters since the last cleanup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStats {
    pub current_requests: u64,
    pub blocked_requests: u64,
    pub top_ips: Vec<CountEntry>,
    pub top_endpoints: Vec<CountEntry>,
}

/// Dashboard snapshot returned by [`AnalyticsStore::analytics`](super::AnalyticsStore::analytics)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub summary: TrafficSummary,
    pub recent_requests: Vec<RequestRecord>,
    pub top_violators: Vec<IpViolations>,
    pub top_endpoints: Vec<EndpointTraffic>,
    pub hourly: Vec<HourlyBucket>,
    pub realtime: RealtimeStats,
}

/// Drill-down for a single client IP
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAnalytics {
    pub ip: String,
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub violations: u64,
    pub endpoints: Vec<String>,
    pub recent_activity: Vec<RequestRecord>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Percentage with two decimals, zero when there is no traffic
pub fn block_rate(blocked: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((blocked as f64 / total as f64) * 10_000.0).round() / 100.0
}
