//! In-process request log, its rollups and the dashboard queries built on top.

pub mod query;
pub mod store;
pub mod types;

pub use query::{
    format_uptime, AnalyticsQueryService, BlockedIp, BlockedIpPage, DatabaseHealth, LivenessProbe,
    ProbeError, ProbeStatus, SystemHealth, TcpProbe, Timeframe, TrafficReport, UnknownTimeframe,
};
pub use store::AnalyticsStore;
pub use types::{
    block_rate, AnalyticsSnapshot, CountEntry, EndpointStats, EndpointTraffic, HourlyBucket,
    IpAnalytics, IpViolations, Method, RealtimeStats, RequestRecord, TrafficSummary,
};
