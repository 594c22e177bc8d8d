//! Gatehouse server binary.
//!
//! Loads tenants (and optionally principals and sessions) from JSON files,
//! mounts the built-in `/me` endpoint behind the dispatch pipeline, and
//! serves until Ctrl-C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gatehouse_server::auth::{
    load_principal_file, load_session_file, spawn_session_purger, DefaultResolverFactory,
    InMemoryPrincipalStore, InMemorySessionStore,
};
use gatehouse_server::network::{NetworkConfig, NetworkModule};
use gatehouse_server::service::domain::attach_me_handler;
use gatehouse_server::tenant::{load_tenant_file, AuthStrategy, StaticTenantStore};
use gatehouse_server::{Dependencies, PipelineConfig, Server};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about = "Multi-tenant HTTP request pipeline")]
struct Args {
    #[arg(long, env = "GATEHOUSE_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "GATEHOUSE_PORT", default_value_t = 8080)]
    port: u16,

    /// JSON array of tenant configurations.
    #[arg(long, env = "GATEHOUSE_TENANTS")]
    tenants: PathBuf,

    /// JSON array of principals to seed the in-memory principal store.
    #[arg(long, env = "GATEHOUSE_PRINCIPALS")]
    principals: Option<PathBuf>,

    /// JSON array of sessions to seed the in-memory session store.
    #[arg(long, env = "GATEHOUSE_SESSIONS")]
    sessions: Option<PathBuf>,

    /// Interval between sweeps of expired sessions.
    #[arg(long, env = "GATEHOUSE_SESSION_PURGE_SECS", default_value_t = 60)]
    session_purge_secs: u64,

    #[arg(long, env = "GATEHOUSE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Exposes Prometheus metrics on this address when set.
    #[arg(long, env = "GATEHOUSE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "GATEHOUSE_TENANT_LOOKUP_TIMEOUT_MS", default_value_t = 3_000)]
    tenant_lookup_timeout_ms: u64,

    #[arg(long, env = "GATEHOUSE_REQUEST_TIMEOUT_MS", default_value_t = 30_000)]
    request_timeout_ms: u64,

    #[arg(long, env = "GATEHOUSE_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    drain_timeout_secs: u64,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!(%addr, "metrics exporter listening");
    }

    let configs = load_tenant_file(&args.tenants)?;
    let uses_sessions = configs
        .iter()
        .any(|tenant| matches!(tenant.auth, AuthStrategy::SessionCookie { .. }));
    let tenants = StaticTenantStore::new(configs).context("invalid tenant configuration")?;
    info!(tenants = tenants.snapshot().len(), "tenants loaded");

    let principals = match &args.principals {
        Some(path) => load_principal_file(path)?,
        None => InMemoryPrincipalStore::new(),
    };
    let sessions = Arc::new(match &args.sessions {
        Some(path) => load_session_file(path)?,
        None => InMemorySessionStore::new(),
    });
    if uses_sessions && sessions.is_empty() {
        warn!("session-cookie tenants configured but no sessions were loaded");
    }

    let mut network = NetworkModule::new(NetworkConfig {
        host: args.host,
        port: args.port,
        drain_timeout: Duration::from_secs(args.drain_timeout_secs),
        ..NetworkConfig::default()
    });
    let purger = spawn_session_purger(
        Arc::clone(&sessions),
        Duration::from_secs(args.session_purge_secs.max(1)),
        network.shutdown_controller().shutdown_token(),
    );

    let resolvers = DefaultResolverFactory::new(sessions, Arc::new(principals));

    let mut server = Server::new(
        Arc::new(tenants),
        Arc::new(resolvers),
        Dependencies::new(),
        PipelineConfig {
            tenant_lookup_timeout_ms: args.tenant_lookup_timeout_ms,
            request_timeout_ms: args.request_timeout_ms,
        },
    );
    attach_me_handler(&mut server);

    let port = network.start().await?;
    info!(port, "gatehouse ready");

    network
        .serve(server.into_router(), shutdown_signal())
        .await?;
    purger.await.context("session purger task failed")?;
    Ok(())
}
