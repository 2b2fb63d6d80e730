//! Registry Tag Guard
//!
//! A gateway enforcing per-project image tag policies in front of a registry.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tag_guard::{
    config::{AppConfig, LogFormat, load_config},
    filter::TagFilter,
    metrics::FilterStats,
    policy::{PolicySet, PolicyStore},
    proxy::UpstreamClient,
    server,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Registry Tag Guard - reject image pushes whose tag breaks project policy
#[derive(Parser, Debug)]
#[command(name = "tag-guard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TAG_GUARD_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TAG_GUARD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Address to listen on
    #[arg(long, env = "TAG_GUARD_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "TAG_GUARD_PORT")]
    port: Option<u16>,

    /// Upstream registry URL
    #[arg(long, env = "TAG_GUARD_UPSTREAM")]
    upstream: Option<String>,
}

impl Args {
    /// Command line values win over the configuration file
    fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.upstream {
            config.upstream.url = url.clone();
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }
}

/// Reload policies from the configuration file on every SIGHUP
#[cfg(unix)]
fn spawn_reload_on_hangup(store: Arc<PolicyStore>, config_path: Option<String>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(e) => {
                error!(error = %e, "Failed to install SIGHUP handler, hot reload disabled");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading tag policies");
            // Errors are logged by the store; the previous policies stay in place.
            let _ = store.reload_from(config_path.as_deref());
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_store: Arc<PolicyStore>, _config_path: Option<String>) {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so its level and format apply
    let mut config = load_config(args.config.as_deref())?;
    args.apply(&mut config);

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting registry tag guard"
    );

    // Compile tag policies
    let policies = PolicySet::new(&config.projects)
        .inspect_err(|e| error!(error = %e, "Failed to compile tag policies"))?;
    if policies.is_empty() {
        info!("No tag policies configured, all pushes will be forwarded");
    } else {
        info!(projects = policies.len(), "Loaded tag policies");
    }
    let store = Arc::new(PolicyStore::new(policies));
    spawn_reload_on_hangup(store.clone(), args.config.clone());

    // Create upstream client
    let upstream = Arc::new(
        UpstreamClient::new(&config.upstream)
            .inspect_err(|e| error!(error = %e, "Failed to create upstream client"))?,
    );
    info!(upstream = %config.upstream.url, "Forwarding to upstream registry");

    let filter = TagFilter::with_stats(store, Arc::new(FilterStats::new()));
    let app = server::router(filter.clone(), upstream);

    let bind: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        signal_token.cancel();
    });

    server::serve(bind, app, shutdown).await?;

    let stats = filter.stats().snapshot();
    info!(
        inspected = stats.inspected,
        allowed = stats.allowed,
        denied_blacklist = stats.denied_blacklist,
        denied_whitelist = stats.denied_whitelist,
        "Final tag filter statistics"
    );

    Ok(())
}
