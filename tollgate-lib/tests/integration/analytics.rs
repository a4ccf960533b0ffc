use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tollgate_lib::analytics::{AnalyticsStore, Method, Timeframe};
use tollgate_lib::config::AnalyticsConfig;

use crate::common::{context, test_config};

fn at(y: i32, mo: u32, d: u32, h: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).single().unwrap_or_else(|| panic!("invalid date"))
}

#[test]
fn test_snapshot_aggregates_are_consistent() {
    let store = AnalyticsStore::new(&AnalyticsConfig::default());
    let now = at(2026, 3, 1, 12);

    let traffic = [
        ("10.0.0.1", "/api/tasks", false),
        ("10.0.0.1", "/api/tasks", true),
        ("10.0.0.2", "/api/projects", false),
        ("10.0.0.3", "/api/auth/login", true),
        ("10.0.0.3", "/api/auth/login", true),
        ("10.0.0.4", "/", false),
    ];
    for (i, (ip, endpoint, blocked)) in traffic.iter().enumerate() {
        let at = now - ChronoDuration::seconds(60 - i as i64);
        store.log_request_at(ip, endpoint, Method::Get, *blocked, "it/1.0", at);
    }

    let snapshot = store.analytics_at(now);
    let summary = &snapshot.summary;
    assert_eq!(summary.total_requests, 6);
    assert_eq!(summary.blocked_requests, 3);
    assert!(summary.blocked_requests <= summary.total_requests);
    assert_eq!(summary.block_rate, 50.0);
    assert_eq!(summary.active_ips, 4);
    assert_eq!(summary.total_violations, 3);

    let endpoint_total: u64 = snapshot.top_endpoints.iter().map(|e| e.total).sum();
    assert_eq!(endpoint_total, summary.total_requests);

    assert_eq!(snapshot.top_violators[0].ip, "10.0.0.3");
    assert_eq!(snapshot.top_violators[0].violations, 2);
    assert_eq!(snapshot.recent_requests[0].ip, "10.0.0.4");
    assert_eq!(snapshot.realtime.current_requests, 6);
    assert_eq!(snapshot.realtime.blocked_requests, 3);
}

#[test]
fn test_logged_request_is_first_in_ip_activity() {
    let store = AnalyticsStore::new(&AnalyticsConfig::default());

    store.log_request("172.16.0.9", "/api/tasks", Method::Get, false, "curl/8");
    store.log_request("172.16.0.9", "/api/tasks/42", Method::Delete, true, "curl/8");

    let detail = store.ip_analytics("172.16.0.9");
    let latest = &detail.recent_activity[0];
    assert_eq!(latest.endpoint, "/api/tasks/42");
    assert_eq!(latest.method, Method::Delete);
    assert!(latest.blocked);
    assert_eq!(detail.total_requests, 2);
    assert_eq!(detail.violations, 1);
    assert_eq!(detail.endpoints.len(), 2);
}

#[test]
fn test_unknown_ip_has_zeroed_aggregates() {
    let store = AnalyticsStore::new(&AnalyticsConfig::default());
    let detail = store.ip_analytics("203.0.113.200");
    assert_eq!(detail.total_requests, 0);
    assert_eq!(detail.blocked_requests, 0);
    assert_eq!(detail.violations, 0);
    assert!(detail.recent_activity.is_empty());
    assert!(detail.last_activity.is_none());
}

#[test]
fn test_cleanup_purges_stale_records_and_resets_realtime() {
    let store = AnalyticsStore::new(&AnalyticsConfig::default());
    let now = at(2026, 3, 1, 12);

    let stale = now - ChronoDuration::hours(2);
    store.log_request_at("10.0.0.1", "/api/old", Method::Get, true, "ua", stale);
    store.log_request_at("10.0.0.1", "/api/new", Method::Get, false, "ua", now);

    let purged = store.cleanup_old_data_at(now);
    assert_eq!(purged, 1);
    assert_eq!(store.retained_records(), 1);

    let snapshot = store.analytics_at(now);
    assert_eq!(snapshot.realtime.current_requests, 0);
    assert!(snapshot.realtime.top_ips.is_empty());
    // lifetime counters survive cleanup
    assert_eq!(snapshot.summary.total_violations, 1);
    assert!(store.endpoint_stats("/api/old").is_some());
}

#[test]
fn test_traffic_summary_over_hourly_rollups() {
    let (ctx, _) = context(test_config());
    let store = ctx.store();
    let start = at(2026, 3, 1, 0);

    // three hourly rollups with 2, 5 and 1 requests
    for (hour, requests) in [(1_i64, 2_u32), (2, 5), (3, 1)] {
        let rollup_at = start + ChronoDuration::hours(hour);
        for n in 0..requests {
            let at = rollup_at - ChronoDuration::minutes(i64::from(n) + 1);
            store.log_request_at("10.9.0.1", "/api/tasks", Method::Get, n == 0, "ua", at);
        }
        store.update_hourly_stats_at(rollup_at);
    }

    let now = start + ChronoDuration::hours(3);
    let day = ctx.queries().traffic_summary_at(Timeframe::Day, now);
    assert_eq!(day.buckets.len(), 3);
    assert_eq!(day.total_requests, 8);
    assert_eq!(day.blocked_requests, 3);
    assert_eq!(day.average_per_hour, 2.67);
    assert_eq!(day.peak.as_ref().map(|p| p.requests), Some(5));

    let hour = ctx.queries().traffic_summary_at(Timeframe::Hour, now);
    assert_eq!(hour.buckets.len(), 2);
    assert_eq!(hour.total_requests, 6);
}
