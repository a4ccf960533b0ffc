use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{GateError, Result};
use crate::pipeline::TrafficGate;

/// Guard to decrement active connections counter when dropped
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Accept connections on `listener` and serve them through `gate` until
/// `shutdown` is cancelled, then wait up to `shutdown_timeout` for open
/// connections to finish.
pub async fn serve(
    listener: TcpListener,
    gate: Arc<TrafficGate>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
) -> Result<()> {
    let builder = ConnBuilder::new(TokioExecutor::new());
    let active_connections = Arc::new(AtomicUsize::new(0));

    info!(addr = ?listener.local_addr().ok(), "Traffic gateway listening (h1/h2)");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                active_connections.fetch_add(1, Ordering::Relaxed);

                let builder = builder.clone();
                let gate = gate.clone();
                let active_connections = active_connections.clone();

                tokio::spawn(async move {
                    let _guard = ConnectionGuard(active_connections);

                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let gate = gate.clone();
                        async move {
                            let req = req.map(|body| body.boxed());
                            Ok::<_, hyper::Error>(gate.handle(req, peer).await)
                        }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    info!(
        "Waiting for active connections to finish (timeout: {}s)",
        shutdown_timeout.as_secs()
    );
    let start = std::time::Instant::now();

    loop {
        let active = active_connections.load(Ordering::Relaxed);
        if active == 0 {
            info!("All connections closed, shutdown complete");
            break;
        }

        if start.elapsed() >= shutdown_timeout {
            warn!(
                active_connections = active,
                "Shutdown timeout reached, {} connections still active", active
            );
            break;
        }

        sleep(Duration::from_millis(100)).await;
    }

    info!("Traffic gateway stopped");
    Ok(())
}

/// Cancel `shutdown` on the first SIGTERM or SIGINT
pub fn install_signal_handlers(shutdown: CancellationToken) -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        GateError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        GateError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
    Ok(())
}

/// Bind the configured listen address and serve until a shutdown signal arrives
pub async fn run(gate: Arc<TrafficGate>, shutdown: CancellationToken) -> Result<()> {
    let config = gate.context().config().clone();
    let listener = TcpListener::bind(config.listen).await.map_err(GateError::Io)?;

    install_signal_handlers(shutdown.clone())?;

    serve(listener, gate, shutdown, Duration::from_secs(config.shutdown_secs)).await
}
