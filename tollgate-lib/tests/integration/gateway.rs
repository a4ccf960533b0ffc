use http::{Method, StatusCode};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tollgate_lib::config::IpFilterMode;
use tollgate_lib::pipeline::TrafficGate;

use crate::common::{
    body_json, context, get, get_as, peer, request, test_config, token, HeldHandler, OkHandler,
};

fn gate(config: tollgate_lib::Config) -> (TrafficGate, Arc<OkHandler>) {
    let (ctx, _) = context(config);
    let handler = Arc::new(OkHandler::default());
    (TrafficGate::new(ctx, handler.clone()), handler)
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_response_contract() {
    let (gate, handler) = gate(test_config());

    for _ in 0..5 {
        let resp = gate.handle(get("/api/auth/login"), peer("1.2.3.4")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
    tokio::time::advance(Duration::from_secs(60)).await;

    let resp = gate.handle(get("/api/auth/login"), peer("1.2.3.4")).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let header = |name: &str| {
        resp.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    };
    assert_eq!(header("retry-after").as_deref(), Some("840"));
    assert_eq!(header("content-type").as_deref(), Some("application/json"));

    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["retryAfter"], 840);
    assert_eq!(body["limit"], 5);
    assert_eq!(body["windowMs"], 900_000);
    assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

    assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn test_allowed_response_carries_rate_limit_headers() {
    let (gate, _) = gate(test_config());

    let resp = gate.handle(get("/api/auth/login"), peer("1.2.3.5")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let header = |name: &str| {
        resp.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    };
    assert_eq!(header("ratelimit-limit").as_deref(), Some("5"));
    assert_eq!(header("ratelimit-remaining").as_deref(), Some("4"));
    assert_eq!(header("ratelimit-reset").as_deref(), Some("900"));
}

#[tokio::test]
async fn test_forwarded_for_is_the_client_ip() {
    let (gate, _) = gate(test_config());

    let mut req = get("/api/tasks");
    req.headers_mut().insert(
        "x-forwarded-for",
        "203.0.113.9, 10.0.0.1".parse().unwrap_or_else(|e| panic!("header: {e}")),
    );
    let resp = gate.handle(req, peer("10.0.0.1")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let store = gate.context().store();
    assert_eq!(store.ip_analytics("203.0.113.9").total_requests, 1);
    assert_eq!(store.ip_analytics("10.0.0.1").total_requests, 0);
}

#[tokio::test]
async fn test_public_health_endpoint() {
    let (gate, handler) = gate(test_config());

    let resp = gate.handle(get("/health"), peer("9.9.9.9")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["queue"]["maxConcurrent"], 30);
    assert_eq!(body["queue"]["queued"], 0);
    assert!(body["memory"]["percentage"].is_number());
    assert!(body["uptime"].is_string());
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exempt_endpoint_subpaths_are_counted() {
    let (gate, handler) = gate(test_config());

    // unmatched paths fall in the public class (200 per window)
    let mut limited = 0;
    for _ in 0..201 {
        let resp = gate.handle(get("/health/../api/tasks"), peer("6.6.6.6")).await;
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert_eq!(limited, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 200);

    // logout sub-paths fall in the auth class (5 per window)
    let statuses: Vec<StatusCode> = {
        let mut out = Vec::new();
        for _ in 0..6 {
            out.push(gate.handle(get("/api/auth/logout/x"), peer("6.6.6.7")).await.status());
        }
        out
    };
    assert!(statuses[..5].iter().all(|s| *s == StatusCode::OK));
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);

    // the endpoints themselves stay exempt, trailing slash included
    for _ in 0..10 {
        let resp = gate.handle(get("/api/auth/logout/"), peer("6.6.6.7")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_exempt_endpoint_subpath_takes_a_queue_slot() {
    let mut config = test_config();
    config.admission.max_concurrent = 1;
    let (ctx, _) = context(config);
    let handler = Arc::new(HeldHandler::new());
    let release = handler.release.clone();
    let gate = Arc::new(TrafficGate::new(ctx.clone(), handler));

    let held = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.handle(get("/health/x"), peer("6.6.6.8")).await })
    };
    for _ in 0..100 {
        if ctx.queue().active() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(ctx.queue().active(), 1);

    release.add_permits(1);
    let resp = held.await.unwrap_or_else(|e| panic!("join: {e}"));
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(ctx.queue().active(), 0);
}

#[tokio::test]
async fn test_health_is_critical_under_high_memory() {
    let (ctx, dial) = context(test_config());
    let gate = TrafficGate::new(ctx.clone(), Arc::new(OkHandler::default()));

    dial.set_percent(95);
    ctx.monitor().sample();

    let resp = gate.handle(get("/health"), peer("9.9.9.9")).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["status"], "critical");
}

#[tokio::test(start_paused = true)]
async fn test_queue_timeout_returns_server_busy() {
    let mut config = test_config();
    config.admission.max_concurrent = 1;
    config.admission.queue_timeout_ms = 100;
    let (ctx, _) = context(config);
    let handler = Arc::new(HeldHandler::new());
    let release = handler.release.clone();
    let gate = Arc::new(TrafficGate::new(ctx.clone(), handler));

    let held = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.handle(get("/api/tasks"), peer("5.5.5.5")).await })
    };
    for _ in 0..100 {
        if ctx.queue().active() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(ctx.queue().active(), 1);

    let resp = gate.handle(get("/api/tasks"), peer("5.5.5.6")).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["code"], "SERVER_BUSY");
    assert_eq!(body["success"], false);

    // a capacity rejection is not a rate-limit violation
    assert_eq!(ctx.store().ip_analytics("5.5.5.6").blocked_requests, 0);

    release.add_permits(1);
    let first = held.await.unwrap_or_else(|e| panic!("join: {e}"));
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(ctx.queue().active(), 0);
}

#[tokio::test]
async fn test_denylisted_ip_is_rejected_before_counting() {
    let mut config = test_config();
    config.ip_filter.mode = IpFilterMode::Denylist;
    config.ip_filter.denylist =
        vec!["198.51.100.0/24".parse().unwrap_or_else(|e| panic!("network: {e}"))];
    let (gate, handler) = gate(config);

    let resp = gate.handle(get("/api/tasks"), peer("198.51.100.7")).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["code"], "IP_BLOCKED");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    let detail = gate.context().store().ip_analytics("198.51.100.7");
    assert_eq!(detail.blocked_requests, 1);
}

#[tokio::test]
async fn test_analytics_requires_privileged_identity() {
    let (gate, handler) = gate(test_config());

    let anonymous = gate.handle(get("/api/analytics/rate-limits"), peer("4.4.4.4")).await;
    assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(anonymous).await["code"], "FORBIDDEN");

    let user = gate
        .handle(get_as("/api/analytics/rate-limits", &token("user")), peer("4.4.4.4"))
        .await;
    assert_eq!(user.status(), StatusCode::FORBIDDEN);

    let moderator = gate
        .handle(get_as("/api/analytics/rate-limits", &token("moderator")), peer("4.4.4.4"))
        .await;
    assert_eq!(moderator.status(), StatusCode::OK);
    let body = body_json(moderator).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["analytics"]["summary"]["totalRequests"].is_number());
    assert_eq!(body["data"]["limits"].as_array().map(Vec::len), Some(5));
    assert_eq!(body["data"]["queue"]["maxConcurrent"], 30);

    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ip_drill_down_returns_latest_request_first() {
    let (gate, _) = gate(test_config());
    let admin = token("admin");

    gate.handle(get("/api/tasks"), peer("8.8.4.4")).await;
    gate.handle(get("/api/projects"), peer("8.8.4.4")).await;

    let resp = gate.handle(get_as("/api/analytics/ip/8.8.4.4", &admin), peer("1.1.1.1")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let data = &body_json(resp).await["data"];
    assert_eq!(data["ip"], "8.8.4.4");
    assert_eq!(data["totalRequests"], 2);
    assert_eq!(data["recentActivity"][0]["endpoint"], "/api/projects");
    assert_eq!(data["recentActivity"][1]["endpoint"], "/api/tasks");
}

#[tokio::test]
async fn test_traffic_timeframe_validation() {
    let (gate, _) = gate(test_config());
    let admin = token("admin");

    let ok = gate
        .handle(get_as("/api/analytics/traffic?timeframe=6h", &admin), peer("1.1.1.1"))
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_json(ok).await["data"]["timeframe"], "6h");

    let bad = gate
        .handle(get_as("/api/analytics/traffic?timeframe=2h", &admin), peer("1.1.1.1"))
        .await;
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(bad).await["success"], false);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_ips_pagination() {
    let (gate, _) = gate(test_config());
    let admin = token("admin");

    for ip in ["6.0.0.1", "6.0.0.2", "6.0.0.3"] {
        for _ in 0..6 {
            gate.handle(get("/api/auth/login"), peer(ip)).await;
        }
    }
    // an extra violation puts 6.0.0.2 on top
    gate.handle(get("/api/auth/login"), peer("6.0.0.2")).await;

    let resp = gate
        .handle(get_as("/api/analytics/blocked-ips?page=1&limit=2", &admin), peer("1.1.1.1"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let data = &body_json(resp).await["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["totalPages"], 2);
    assert_eq!(data["ips"][0]["ip"], "6.0.0.2");
    assert_eq!(data["ips"][0]["violations"], 2);
    assert_eq!(data["ips"].as_array().map(Vec::len), Some(2));

    let page_two = gate
        .handle(get_as("/api/analytics/blocked-ips?page=2&limit=2", &admin), peer("1.1.1.1"))
        .await;
    let data = &body_json(page_two).await["data"];
    assert_eq!(data["ips"].as_array().map(Vec::len), Some(1));

    let invalid = gate
        .handle(get_as("/api/analytics/blocked-ips?page=0", &admin), peer("1.1.1.1"))
        .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_block_is_acknowledged_but_not_enforced() {
    let (gate, handler) = gate(test_config());
    let admin = token("admin");

    let req = request(
        Method::POST,
        "/api/analytics/block-ip",
        Some(&admin),
        r#"{"ip":"192.0.2.44","action":"block","reason":"scraping"}"#,
    );
    let resp = gate.handle(req, peer("1.1.1.1")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let data = &body_json(resp).await["data"];
    assert_eq!(data["ip"], "192.0.2.44");
    assert_eq!(data["action"], "block");
    assert_eq!(data["enforced"], false);

    let after = gate.handle(get("/api/tasks"), peer("192.0.2.44")).await;
    assert_eq!(after.status(), StatusCode::OK);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

    let invalid = request(
        Method::POST,
        "/api/analytics/block-ip",
        Some(&admin),
        r#"{"ip":"not-an-ip","action":"unblock"}"#,
    );
    assert_eq!(gate.handle(invalid, peer("1.1.1.1")).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_analytics_routes() {
    let (gate, _) = gate(test_config());
    let admin = token("admin");

    let missing = gate.handle(get_as("/api/analytics/nothing", &admin), peer("1.1.1.1")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let wrong_method = request(Method::DELETE, "/api/analytics/traffic", Some(&admin), "");
    let resp = gate.handle(wrong_method, peer("1.1.1.1")).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_system_health_reports_unconfigured_database() {
    let (gate, _) = gate(test_config());

    let resp = gate
        .handle(get_as("/api/analytics/health", &token("admin")), peer("1.1.1.1"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let data = &body_json(resp).await["data"];
    assert_eq!(data["database"]["status"], "unconfigured");
    assert!(data["uptime"].as_str().is_some_and(|u| u.ends_with('m')));
}
