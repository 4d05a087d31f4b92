//! chassisd - Rack Management Agent Daemon
//!
//! Wires the reconciliation engine to its collaborators and runs discovery
//! until shutdown.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          chassisd                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ Observation  │───▶│  Reconcile   │───▶│    Event     │       │
//! │  │   Source     │    │   Driver     │    │    Queue     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two status listeners run alongside the scheduler: health probes plus a
//! read-only resource summary, and Prometheus metrics exposition.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chassisd::adapters::{InMemorySettingsStore, LoggingEventSink, SimulatedChassis};
use chassisd::error::Error;
use chassisd::{
    AgentContext, CycleScheduler, DriverConfig, ResourceKind, Result, SchedulerConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// chassisd - rack management agent with stable-identity discovery
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the chassis inventory file
    #[arg(long, env = "INVENTORY_PATH", default_value = "inventory.yaml")]
    inventory: PathBuf,

    /// Re-poll interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value = "30")]
    poll_interval_seconds: u64,

    /// Per-hook hardware I/O timeout in seconds
    #[arg(long, env = "HOOK_TIMEOUT_SECONDS", default_value = "10")]
    hook_timeout_seconds: u64,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    info!(
        inventory = %args.inventory.display(),
        poll_interval_seconds = args.poll_interval_seconds,
        hook_timeout_seconds = args.hook_timeout_seconds,
        "starting chassisd"
    );

    let source = SimulatedChassis::from_path(&args.inventory).map_err(|e| {
        error!(path = %args.inventory.display(), error = %e, "failed to load inventory");
        e
    })?;

    let ctx = AgentContext::new(
        Arc::new(source),
        Arc::new(LoggingEventSink::new(true)),
        Arc::new(InMemorySettingsStore::new()),
    );

    let scheduler_config = SchedulerConfig {
        poll_interval: Duration::from_secs(args.poll_interval_seconds),
        driver: DriverConfig {
            hook_timeout: Duration::from_secs(args.hook_timeout_seconds),
        },
        ..Default::default()
    };

    spawn_status_server("health", args.health_addr.clone(), &ctx, health_routes);
    spawn_status_server("metrics", args.metrics_addr.clone(), &ctx, metrics_routes);

    // Shut down cleanly on ctrl-c; an abandoned cycle is swept next start.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    info!("starting discovery scheduler");
    CycleScheduler::new(ctx, scheduler_config).run(shutdown).await;

    info!("agent shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level: Level = args.log_level.parse().unwrap_or(Level::INFO);

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Status Servers
// =============================================================================

/// Route table for one status listener: path in, response out, None -> 404.
type StatusRoutes = fn(&str, &AgentContext) -> Option<Response<Full<Bytes>>>;

fn spawn_status_server(
    name: &'static str,
    addr: String,
    ctx: &Arc<AgentContext>,
    routes: StatusRoutes,
) {
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        if let Err(e) = serve_status(name, &addr, ctx, routes).await {
            error!(server = name, error = %e, "status server exited");
        }
    });
}

async fn serve_status(
    name: &'static str,
    addr: &str,
    ctx: Arc<AgentContext>,
    routes: StatusRoutes,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("invalid {} server address: {}", name, e)))?;
    let listener = TcpListener::bind(addr).await?;
    info!(server = name, %addr, "listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                let ctx = Arc::clone(&ctx);
                async move {
                    let response = routes(req.uri().path(), &ctx)
                        .unwrap_or_else(|| plain(StatusCode::NOT_FOUND, "not found"));
                    Ok::<_, std::convert::Infallible>(response)
                }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                error!(server = name, error = %e, "connection error");
            }
        });
    }
}

fn plain(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap()
}

fn health_routes(path: &str, ctx: &AgentContext) -> Option<Response<Full<Bytes>>> {
    match path {
        "/healthz" | "/livez" | "/readyz" => Some(plain(StatusCode::OK, "ok")),
        // Read-only store summary, one `<kind> <count>` line per kind.
        "/resources" => {
            let mut summary = String::new();
            for kind in ResourceKind::ALL {
                summary.push_str(&format!("{} {}\n", kind, ctx.stores.store(kind).len()));
            }
            Some(plain(StatusCode::OK, summary))
        }
        _ => None,
    }
}

fn metrics_routes(path: &str, _ctx: &AgentContext) -> Option<Response<Full<Bytes>>> {
    if path != "/metrics" {
        return None;
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "metrics encoding failed");
        return Some(plain(StatusCode::INTERNAL_SERVER_ERROR, "encoding failure"));
    }
    Some(
        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", encoder.format_type())
            .body(Full::new(Bytes::from(buffer)))
            .unwrap(),
    )
}
