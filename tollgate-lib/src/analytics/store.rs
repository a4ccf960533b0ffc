use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use super::types::{
    block_rate, AnalyticsSnapshot, CountEntry, EndpointStats, EndpointTraffic, HourlyBucket,
    IpAnalytics, IpViolations, Method, RealtimeStats, RequestRecord, TrafficSummary,
};
use crate::config::AnalyticsConfig;

const RECENT_REQUESTS: usize = 20;
const TOP_VIOLATORS: usize = 10;
const TOP_ENDPOINTS: usize = 10;
const REALTIME_TOP: usize = 5;
const IP_RECENT_ACTIVITY: usize = 50;
/// Distinct keys kept per realtime frequency table between cleanups
const REALTIME_TABLE_CAP: usize = 10_000;

#[derive(Default)]
struct Realtime {
    requests: u64,
    blocked: u64,
    ips: AHashMap<String, u64>,
    endpoints: AHashMap<String, u64>,
}

impl Realtime {
    fn bump(table: &mut AHashMap<String, u64>, key: &str) {
        if let Some(count) = table.get_mut(key) {
            *count = count.saturating_add(1);
        } else if table.len() < REALTIME_TABLE_CAP {
            table.insert(key.to_string(), 1);
        }
    }
}

#[derive(Default)]
struct StoreState {
    /// Raw log in arrival order
    records: VecDeque<RequestRecord>,
    violations: AHashMap<String, u64>,
    endpoints: AHashMap<String, EndpointStats>,
    hourly: VecDeque<HourlyBucket>,
    realtime: Realtime,
    total_logged: u64,
}

/// Process-wide request log and its derived aggregates.
///
/// Raw records are evicted after the retention window; endpoint statistics and
/// violation counters live for the whole process.
pub struct AnalyticsStore {
    state: Mutex<StoreState>,
    retention: ChronoDuration,
    hourly_window: ChronoDuration,
    max_records: usize,
}

impl AnalyticsStore {
    pub fn new(config: &AnalyticsConfig) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            retention: ChronoDuration::seconds(config.retention_secs as i64),
            hourly_window: ChronoDuration::hours(i64::from(config.hourly_window_hours)),
            max_records: config.max_records,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // a panicked writer leaves counters that are still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one request decision
    pub fn log_request(
        &self,
        ip: &str,
        endpoint: &str,
        method: Method,
        blocked: bool,
        user_agent: &str,
    ) {
        self.log_request_at(ip, endpoint, method, blocked, user_agent, Utc::now());
    }

    pub fn log_request_at(
        &self,
        ip: &str,
        endpoint: &str,
        method: Method,
        blocked: bool,
        user_agent: &str,
        now: DateTime<Utc>,
    ) {
        let mut state = self.lock();

        state.records.push_back(RequestRecord {
            ip: ip.to_string(),
            endpoint: endpoint.to_string(),
            method,
            blocked,
            user_agent: user_agent.to_string(),
            timestamp: now,
        });
        while state.records.len() > self.max_records {
            state.records.pop_front();
        }
        state.total_logged = state.total_logged.saturating_add(1);

        let stats = state
            .endpoints
            .entry(endpoint.to_string())
            .or_insert(EndpointStats { total: 0, blocked: 0, last_access: now });
        stats.total = stats.total.saturating_add(1);
        if blocked {
            stats.blocked = stats.blocked.saturating_add(1);
        }
        stats.last_access = now;

        if blocked {
            let count = state.violations.entry(ip.to_string()).or_insert(0);
            *count = count.saturating_add(1);
        }

        let realtime = &mut state.realtime;
        realtime.requests = realtime.requests.saturating_add(1);
        if blocked {
            realtime.blocked = realtime.blocked.saturating_add(1);
        }
        Realtime::bump(&mut realtime.ips, ip);
        Realtime::bump(&mut realtime.endpoints, endpoint);
    }

    /// Append one bucket covering the trailing hour and drop buckets outside the window
    pub fn update_hourly_stats(&self) {
        self.update_hourly_stats_at(Utc::now());
    }

    pub fn update_hourly_stats_at(&self, now: DateTime<Utc>) {
        let mut state = self.lock();
        let since = now - ChronoDuration::hours(1);

        let mut requests = 0u64;
        let mut blocked = 0u64;
        let mut ips = AHashSet::new();
        for record in state.records.iter().filter(|r| r.timestamp >= since) {
            requests += 1;
            if record.blocked {
                blocked += 1;
            }
            ips.insert(record.ip.as_str());
        }
        let bucket = HourlyBucket { timestamp: now, requests, blocked, active_ips: ips.len() };

        state.hourly.push_back(bucket);
        let oldest = now - self.hourly_window;
        while state.hourly.front().is_some_and(|b| b.timestamp < oldest) {
            state.hourly.pop_front();
        }

        debug!(requests, blocked, buckets = state.hourly.len(), "Hourly analytics rolled up");
    }

    /// Purge raw records past retention and reset the realtime counters.
    /// Returns the number of purged records.
    pub fn cleanup_old_data(&self) -> usize {
        self.cleanup_old_data_at(Utc::now())
    }

    pub fn cleanup_old_data_at(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock();
        let cutoff = now - self.retention;

        let before = state.records.len();
        while state.records.front().is_some_and(|r| r.timestamp < cutoff) {
            state.records.pop_front();
        }
        let purged = before - state.records.len();

        state.realtime = Realtime::default();

        info!(purged, remaining = state.records.len(), "Analytics cleanup completed");
        purged
    }

    /// Dashboard snapshot
    pub fn analytics(&self) -> AnalyticsSnapshot {
        self.analytics_at(Utc::now())
    }

    pub fn analytics_at(&self, now: DateTime<Utc>) -> AnalyticsSnapshot {
        let state = self.lock();
        let since = now - ChronoDuration::hours(1);

        let mut total = 0u64;
        let mut blocked = 0u64;
        let mut ips = AHashSet::new();
        for record in state.records.iter().filter(|r| r.timestamp >= since) {
            total += 1;
            if record.blocked {
                blocked += 1;
            }
            ips.insert(record.ip.as_str());
        }

        let summary = TrafficSummary {
            total_requests: total,
            blocked_requests: blocked,
            block_rate: block_rate(blocked, total),
            active_ips: ips.len(),
            total_violations: state.violations.values().sum(),
        };

        let recent_requests = state.records.iter().rev().take(RECENT_REQUESTS).cloned().collect();

        let top_violators = top_n(&state.violations, TOP_VIOLATORS)
            .into_iter()
            .map(|e| IpViolations { ip: e.key, violations: e.count })
            .collect();

        let mut top_endpoints: Vec<EndpointTraffic> = state
            .endpoints
            .iter()
            .map(|(endpoint, stats)| EndpointTraffic {
                endpoint: endpoint.clone(),
                total: stats.total,
                blocked: stats.blocked,
                block_rate: block_rate(stats.blocked, stats.total),
                last_access: stats.last_access,
            })
            .collect();
        top_endpoints
            .sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.endpoint.cmp(&b.endpoint)));
        top_endpoints.truncate(TOP_ENDPOINTS);

        let realtime = RealtimeStats {
            current_requests: state.realtime.requests,
            blocked_requests: state.realtime.blocked,
            top_ips: top_n(&state.realtime.ips, REALTIME_TOP),
            top_endpoints: top_n(&state.realtime.endpoints, REALTIME_TOP),
        };

        AnalyticsSnapshot {
            summary,
            recent_requests,
            top_violators,
            top_endpoints,
            hourly: state.hourly.iter().cloned().collect(),
            realtime,
        }
    }

    /// Per-IP drill-down. Unknown IPs yield zeroed aggregates.
    pub fn ip_analytics(&self, ip: &str) -> IpAnalytics {
        let state = self.lock();

        let mut total = 0u64;
        let mut blocked = 0u64;
        let mut seen = AHashSet::<&str>::new();
        let mut endpoints = Vec::<String>::new();
        for record in state.records.iter().filter(|r| r.ip == ip) {
            total += 1;
            if record.blocked {
                blocked += 1;
            }
            if seen.insert(record.endpoint.as_str()) {
                endpoints.push(record.endpoint.clone());
            }
        }

        let recent_activity: Vec<RequestRecord> = state
            .records
            .iter()
            .rev()
            .filter(|r| r.ip == ip)
            .take(IP_RECENT_ACTIVITY)
            .cloned()
            .collect();

        IpAnalytics {
            ip: ip.to_string(),
            total_requests: total,
            blocked_requests: blocked,
            violations: state.violations.get(ip).copied().unwrap_or(0),
            endpoints,
            last_activity: recent_activity.first().map(|r| r.timestamp),
            recent_activity,
        }
    }

    /// Lifetime violation counters, unordered
    pub fn violations(&self) -> Vec<IpViolations> {
        self.lock()
            .violations
            .iter()
            .map(|(ip, count)| IpViolations { ip: ip.clone(), violations: *count })
            .collect()
    }

    pub fn hourly_series(&self) -> Vec<HourlyBucket> {
        self.lock().hourly.iter().cloned().collect()
    }

    pub fn endpoint_stats(&self, endpoint: &str) -> Option<EndpointStats> {
        self.lock().endpoints.get(endpoint).cloned()
    }

    /// Number of requests ever logged, eviction included
    pub fn total_logged(&self) -> u64 {
        self.lock().total_logged
    }

    /// Raw records currently retained
    pub fn retained_records(&self) -> usize {
        self.lock().records.len()
    }
}

fn top_n(table: &AHashMap<String, u64>, n: usize) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> =
        table.iter().map(|(key, count)| CountEntry { key: key.clone(), count: *count }).collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(n);
    entries
}
