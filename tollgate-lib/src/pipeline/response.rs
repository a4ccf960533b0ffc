use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderMap, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

use crate::error::{GateError, Result};

pub type ReqBody = BoxBody<Bytes, hyper::Error>;
pub type RespBody = BoxBody<Bytes, hyper::Error>;

pub fn full_body(bytes: impl Into<Bytes>) -> RespBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Serialize `body` as the JSON payload of a response with `status`
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| GateError::Http(format!("Failed to serialize response body: {e}")))?;

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full_body(body_bytes))
        .map_err(|e| GateError::Http(format!("Failed to build response: {e}")))
}

/// `{success: true, data}`
pub fn success_response<T: Serialize>(data: &T) -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({ "success": true, "data": data }))
}

/// `{success: false, message}`
pub fn error_response(status: StatusCode, message: &str) -> Result<Response<RespBody>> {
    json_response(status, &json!({ "success": false, "message": message }))
}

/// Last resort when a response cannot be built
pub fn internal_error(error: &GateError) -> Response<RespBody> {
    tracing::error!(error = %error, "Failed to build response");
    let mut resp = Response::new(full_body("Internal Server Error"));
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

pub fn bad_gateway() -> Response<RespBody> {
    error_response(StatusCode::BAD_GATEWAY, "Upstream application unavailable")
        .unwrap_or_else(|e| internal_error(&e))
}

/// Standard `RateLimit-*` headers describing the caller's current window
pub fn set_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset: u64) {
    headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(limit));
    headers.insert(HeaderName::from_static("ratelimit-remaining"), HeaderValue::from(remaining));
    headers.insert(HeaderName::from_static("ratelimit-reset"), HeaderValue::from(reset));
}

/// A request stopped before reaching the handler pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Window exceeded; retry after `retry_after` seconds
    RateLimited { message: String, retry_after: u64, limit: u32, window: Duration },
    /// Not admitted before the queue timeout
    CapacityExceeded,
    /// Client IP rejected by the block list
    Blocked,
    /// Privileged endpoint without a privileged identity
    Forbidden,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Rejection::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::Blocked | Rejection::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    pub fn into_response(self) -> Response<RespBody> {
        self.build().unwrap_or_else(|e| internal_error(&e))
    }

    fn build(self) -> Result<Response<RespBody>> {
        let status = self.status();
        match self {
            Rejection::RateLimited { message, retry_after, limit, window } => {
                let body = json!({
                    "success": false,
                    "message": message,
                    "retryAfter": retry_after,
                    "limit": limit,
                    "windowMs": window.as_millis() as u64,
                });
                let mut resp = json_response(status, &body)?;
                let headers = resp.headers_mut();
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
                set_rate_limit_headers(headers, limit, 0, retry_after);
                Ok(resp)
            }
            Rejection::CapacityExceeded => json_response(
                status,
                &json!({
                    "success": false,
                    "message": "Server is busy, please try again later.",
                    "code": "SERVER_BUSY",
                }),
            ),
            Rejection::Blocked => json_response(
                status,
                &json!({
                    "success": false,
                    "message": "Access denied for this IP address.",
                    "code": "IP_BLOCKED",
                }),
            ),
            Rejection::Forbidden => json_response(
                status,
                &json!({
                    "success": false,
                    "message": "Admin or moderator access required.",
                    "code": "FORBIDDEN",
                }),
            ),
        }
    }
}
