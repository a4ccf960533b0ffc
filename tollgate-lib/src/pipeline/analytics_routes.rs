use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Limited};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::response::{error_response, internal_error, success_response, ReqBody, RespBody};
use crate::analytics::Timeframe;
use crate::context::TrafficContext;
use crate::error::Result;
use crate::security::{manual_block_action, BlockAction, Identity};

/// Mount point of the operator dashboard endpoints
pub const ANALYTICS_PREFIX: &str = "/api/analytics";

const MAX_BODY_BYTES: usize = 16 * 1024;
const DEFAULT_PAGE_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
struct BlockIpRequest {
    ip: String,
    action: BlockAction,
    #[serde(default)]
    reason: Option<String>,
}

/// Serve a request under [`ANALYTICS_PREFIX`].
///
/// The caller has already checked that `identity` is privileged.
pub async fn serve(
    ctx: &TrafficContext,
    req: Request<ReqBody>,
    identity: &Identity,
) -> Response<RespBody> {
    route(ctx, req, identity).await.unwrap_or_else(|e| internal_error(&e))
}

async fn route(
    ctx: &TrafficContext,
    req: Request<ReqBody>,
    identity: &Identity,
) -> Result<Response<RespBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let sub = path.strip_prefix(ANALYTICS_PREFIX).unwrap_or("").trim_end_matches('/');

    debug!(path = %path, subject = %identity.subject, "Analytics request");

    match (&method, sub) {
        (&Method::GET, "/rate-limits") => rate_limits(ctx),
        (&Method::GET, "/traffic") => traffic(ctx, &query),
        (&Method::GET, "/blocked-ips") => blocked_ips(ctx, &query),
        (&Method::GET, "/health") => success_response(&ctx.queries().system_health().await),
        (&Method::POST, "/block-ip") => block_ip(req, identity).await,
        (&Method::GET, sub) if sub.starts_with("/ip/") => ip_detail(ctx, &sub["/ip/".len()..]),
        (_, "/rate-limits" | "/traffic" | "/blocked-ips" | "/health" | "/block-ip") => {
            error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => error_response(StatusCode::NOT_FOUND, "Analytics endpoint not found"),
    }
}

fn rate_limits(ctx: &TrafficContext) -> Result<Response<RespBody>> {
    success_response(&json!({
        "analytics": ctx.store().analytics(),
        "limits": ctx.rate_limits().effective_limits(),
        "queue": ctx.queue().stats(),
        "memory": ctx.monitor().status(),
    }))
}

fn ip_detail(ctx: &TrafficContext, ip: &str) -> Result<Response<RespBody>> {
    if ip.is_empty() || ip.contains('/') {
        return error_response(StatusCode::BAD_REQUEST, "IP address required");
    }
    success_response(&ctx.store().ip_analytics(ip))
}

fn traffic(ctx: &TrafficContext, query: &str) -> Result<Response<RespBody>> {
    let timeframe = match query_param(query, "timeframe") {
        None => Timeframe::Day,
        Some(raw) => match raw.parse::<Timeframe>() {
            Ok(tf) => tf,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        },
    };
    success_response(&ctx.queries().traffic_summary(timeframe))
}

fn blocked_ips(ctx: &TrafficContext, query: &str) -> Result<Response<RespBody>> {
    let page = parse_number(query, "page", 1);
    let limit = parse_number(query, "limit", DEFAULT_PAGE_LIMIT);
    match (page, limit) {
        (Some(page), Some(limit)) => success_response(&ctx.queries().blocked_ips(page, limit)),
        _ => error_response(StatusCode::BAD_REQUEST, "page and limit must be positive integers"),
    }
}

async fn block_ip(req: Request<ReqBody>, identity: &Identity) -> Result<Response<RespBody>> {
    let body = match read_body(req).await {
        Ok(body) => body,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };
    let request: BlockIpRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid request body: {e}"))
        }
    };

    match manual_block_action(
        &request.ip,
        request.action,
        request.reason.as_deref(),
        &identity.subject,
    ) {
        Ok(ack) => success_response(&ack),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn read_body(req: Request<ReqBody>) -> std::result::Result<Bytes, String> {
    Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

/// Value of `key` in a raw query string. No percent-decoding.
fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

/// `default` when absent, `None` when present but not a positive integer
fn parse_number(query: &str, key: &str, default: usize) -> Option<usize> {
    match query_param(query, key) {
        None | Some("") => Some(default),
        Some(raw) => raw.parse::<usize>().ok().filter(|n| *n > 0),
    }
}
