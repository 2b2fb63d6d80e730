//! Gateway HTTP server
//!
//! Every request runs through the tag filter; the ones it lets pass are
//! forwarded to the upstream registry. Two local endpoints sit beside the
//! registry API, which lives entirely under `/v2/`:
//!
//! - `GET /-/healthy` liveness probe
//! - `GET /-/stats` filter statistics as JSON

use crate::filter::{TagFilter, tag_check};
use crate::metrics::StatsSnapshot;
use crate::proxy::UpstreamClient;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared state for gateway handlers
#[derive(Clone)]
pub struct GatewayState {
    pub filter: TagFilter,
    pub upstream: Arc<UpstreamClient>,
}

/// Build the gateway router
pub fn router(filter: TagFilter, upstream: Arc<UpstreamClient>) -> Router {
    let state = GatewayState {
        filter: filter.clone(),
        upstream,
    };

    Router::new()
        .route("/-/healthy", get(healthy))
        .route("/-/stats", get(stats))
        .fallback(forward)
        .layer(middleware::from_fn_with_state(filter, tag_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway until `shutdown` is cancelled
pub async fn serve(
    bind: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("Registry gateway listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Registry gateway stopped");
    Ok(())
}

async fn healthy() -> &'static str {
    "ok"
}

async fn stats(State(state): State<GatewayState>) -> Json<StatsSnapshot> {
    Json(state.filter.stats().snapshot())
}

/// Forward anything else to the upstream registry
async fn forward(State(state): State<GatewayState>, request: Request) -> Response {
    match state.upstream.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to forward request to upstream registry");
            (
                StatusCode::BAD_GATEWAY,
                format!("Upstream registry unavailable: {}", e),
            )
                .into_response()
        }
    }
}
