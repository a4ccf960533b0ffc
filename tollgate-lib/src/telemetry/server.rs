use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::TrafficContext;
use crate::error::Result;
use crate::pipeline::response::{error_response, internal_error, RespBody};
use crate::telemetry::{handle_metrics, health_response, live_check_response};

/// Start the observability server on a dedicated port.
///
/// Serves:
/// - `/metrics` - Prometheus metrics
/// - `/health` - gateway health (queue, memory, uptime)
/// - `/live` - Liveness check endpoint
///
/// Returns once `shutdown` is cancelled.
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    ctx: Arc<TrafficContext>,
    shutdown: CancellationToken,
) -> Result<()> {
    let registry = Arc::new(registry);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(?addr, "Observability server started (metrics + health checks)");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let registry = registry.clone();
                        let ctx = ctx.clone();
                        async move {
                            Ok::<_, hyper::Error>(route(req.uri().path(), &registry, &ctx))
                        }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
    Ok(())
}

fn route(path: &str, registry: &Registry, ctx: &TrafficContext) -> Response<RespBody> {
    let result = match path {
        "/health" => health_response(ctx),
        "/live" => live_check_response(),
        "/metrics" => handle_metrics(registry),
        _ => error_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    result.unwrap_or_else(|e| internal_error(&e))
}
