use async_trait::async_trait;
use http::{Request, Response, Uri};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::response::{bad_gateway, ReqBody, RespBody};
use crate::telemetry::Metrics;

/// The application behind the gateway.
///
/// Only admitted requests reach it; it owns its own error responses.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: Request<ReqBody>) -> Response<RespBody>;
}

type HttpClient = Client<HttpConnector, ReqBody>;

/// Forwards admitted requests to a single upstream over plain HTTP
pub struct UpstreamHandler {
    upstream: Option<String>,
    client: HttpClient,
    metrics: Option<Arc<Metrics>>,
}

impl UpstreamHandler {
    pub fn new(upstream: Option<String>, metrics: Option<Arc<Metrics>>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_keepalive(Some(Duration::from_secs(60)));

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_idle_timeout(Duration::from_secs(90));

        Self { upstream, client: builder.build(connector), metrics }
    }

    fn upstream_uri(upstream: &str, original: &Uri) -> Option<Uri> {
        let pq = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("http://{upstream}{pq}").parse::<Uri>().ok()
    }
}

#[async_trait]
impl RequestHandler for UpstreamHandler {
    async fn handle(&self, req: Request<ReqBody>) -> Response<RespBody> {
        let Some(upstream) = self.upstream.as_deref() else {
            return bad_gateway();
        };

        let (mut parts, body) = req.into_parts();
        let Some(uri) = Self::upstream_uri(upstream, &parts.uri) else {
            warn!(upstream, uri = %parts.uri, "Cannot build upstream URI");
            return bad_gateway();
        };
        parts.uri = uri;
        // hyper's client speaks h1 to the upstream unless told otherwise
        parts.version = http::Version::HTTP_11;

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(resp) => resp.map(|b| b.boxed()),
            Err(e) => {
                warn!(upstream, error = %e, "Upstream request failed");
                if let Some(m) = &self.metrics {
                    m.record_upstream_error(if e.is_connect() { "connect" } else { "request" });
                }
                bad_gateway()
            }
        }
    }
}
