#![forbid(unsafe_code)]

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tollgate_lib::config::load_from_path;
use tollgate_lib::pipeline::{TrafficGate, UpstreamHandler};
use tollgate_lib::telemetry::{init_metrics, init_tracing, start_observability_server};
use tollgate_lib::{server, TrafficContext};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Adaptive rate limiting and admission control gateway")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", default_value = "config/tollgate.toml")]
    config: PathBuf,

    /// Override the configured listen address
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut cfg = match load_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };
    if let Some(listen) = cli.listen {
        cfg.listen = listen;
    }

    if let Err(err) = init_tracing(&cfg.logging, &cfg.telemetry) {
        eprintln!("failed to initialise tracing: {err}");
        std::process::exit(1);
    }

    let (metrics, registry) = match init_metrics() {
        Ok((metrics, registry)) => (Some(metrics), Some(registry)),
        Err(err) => {
            warn!(%err, "metrics disabled");
            (None, None)
        }
    };

    info!(
        listen = %cfg.listen,
        upstream = cfg.upstream.as_deref().unwrap_or("none"),
        max_concurrent = cfg.admission.max_concurrent,
        "configuration loaded"
    );

    let upstream = cfg.upstream.clone();
    let metrics_port = cfg.telemetry.metrics_port;
    let ctx = Arc::new(TrafficContext::builder(cfg).metrics(metrics.clone()).build());
    ctx.start_background_jobs();

    let shutdown = ctx.shutdown_token();

    let observability = match (metrics_port, registry) {
        (Some(port), Some(registry)) => {
            let ctx = ctx.clone();
            let shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(err) = start_observability_server(port, registry, ctx, shutdown).await {
                    error!(%err, "observability server exited with error");
                }
            }))
        }
        _ => None,
    };

    let handler = Arc::new(UpstreamHandler::new(upstream, metrics));
    let gate = Arc::new(TrafficGate::new(ctx.clone(), handler));

    let result = server::run(gate, shutdown.clone()).await;

    ctx.shutdown().await;
    if let Some(task) = observability {
        let _ = task.await;
    }

    if let Err(err) = result {
        error!(%err, "gateway exited with error");
        std::process::exit(1);
    }
}
