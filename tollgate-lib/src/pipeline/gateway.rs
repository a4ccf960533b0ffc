use http::header::USER_AGENT;
use http::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::analytics_routes::{self, ANALYTICS_PREFIX};
use super::handler::RequestHandler;
use super::response::{internal_error, set_rate_limit_headers, Rejection, ReqBody, RespBody};
use crate::analytics::Method;
use crate::context::TrafficContext;
use crate::security::rate_limit::{path_is_endpoint, path_matches};
use crate::security::{extract_client_ip, RateDecision, RequestMeta};
use crate::telemetry::health_response;
use crate::telemetry::metrics::values;

/// Public health endpoint served by the gateway itself
pub const HEALTH_PATH: &str = "/health";

/// The traffic-control layer in front of a [`RequestHandler`].
///
/// Each request is rate limited, then waits for an admission slot, then is
/// served: `/health` and `/api/analytics/*` by the gateway, everything else by
/// the wrapped handler. The slot is held until the response head is ready.
pub struct TrafficGate {
    ctx: Arc<TrafficContext>,
    handler: Arc<dyn RequestHandler>,
}

impl TrafficGate {
    pub fn new(ctx: Arc<TrafficContext>, handler: Arc<dyn RequestHandler>) -> Self {
        Self { ctx, handler }
    }

    pub fn context(&self) -> &Arc<TrafficContext> {
        &self.ctx
    }

    pub async fn handle(&self, req: Request<ReqBody>, peer: SocketAddr) -> Response<RespBody> {
        let started = Instant::now();
        let rate_limits = self.ctx.rate_limits();

        let meta = RequestMeta {
            ip: extract_client_ip(peer, req.headers()),
            path: req.uri().path().to_string(),
            method: Method::from(req.method()),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|ua| ua.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            identity: rate_limits.identify(req.headers()),
        };
        let class = rate_limits.classify(&meta.path);

        let (response, outcome) = match rate_limits.check(&meta) {
            RateDecision::Blocked => (Rejection::Blocked.into_response(), values::OUTCOME_BLOCKED),
            RateDecision::Limited { result, window, message, .. } => {
                let rejection = Rejection::RateLimited {
                    message,
                    retry_after: result.retry_after_secs(),
                    limit: result.limit(),
                    window,
                };
                (rejection.into_response(), values::OUTCOME_RATE_LIMITED)
            }
            RateDecision::Allowed { result, .. } => {
                let (mut response, outcome) = self.admit_and_serve(req, &meta).await;
                set_rate_limit_headers(
                    response.headers_mut(),
                    result.limit(),
                    result.remaining(),
                    result.retry_after_secs(),
                );
                (response, outcome)
            }
            RateDecision::Exempt | RateDecision::Privileged { .. } => {
                self.admit_and_serve(req, &meta).await
            }
        };

        if let Some(m) = self.ctx.metrics() {
            let status = response.status().as_u16();
            m.record_request(&meta.method.to_string(), class.as_str(), outcome, status);
            m.record_request_duration(started.elapsed().as_secs_f64(), class.as_str(), status);
        }
        debug!(
            ip = %meta.ip,
            path = %meta.path,
            outcome,
            status = response.status().as_u16(),
            "Request completed"
        );
        response
    }

    async fn admit_and_serve(
        &self,
        req: Request<ReqBody>,
        meta: &RequestMeta,
    ) -> (Response<RespBody>, &'static str) {
        let permit = match self.ctx.queue().admit(&meta.path).await {
            Ok(permit) => permit,
            Err(_) => {
                return (Rejection::CapacityExceeded.into_response(), values::OUTCOME_SERVER_BUSY)
            }
        };

        let result = self.dispatch(req, meta).await;
        drop(permit);
        result
    }

    async fn dispatch(
        &self,
        req: Request<ReqBody>,
        meta: &RequestMeta,
    ) -> (Response<RespBody>, &'static str) {
        if path_is_endpoint(&meta.path, HEALTH_PATH) {
            let response = health_response(&self.ctx).unwrap_or_else(|e| internal_error(&e));
            return (response, values::OUTCOME_SERVED);
        }

        if path_matches(&meta.path, ANALYTICS_PREFIX) {
            return match meta.identity.as_ref().filter(|id| id.is_privileged()) {
                Some(identity) => {
                    let response = analytics_routes::serve(&self.ctx, req, identity).await;
                    (response, values::OUTCOME_SERVED)
                }
                None => (Rejection::Forbidden.into_response(), values::OUTCOME_FORBIDDEN),
            };
        }

        (self.handler.handle(req).await, values::OUTCOME_SERVED)
    }
}
