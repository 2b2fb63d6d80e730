//! Axum middleware enforcing tag policies
//!
//! ```ignore
//! let filter = TagFilter::new(Arc::new(PolicyStore::new(policies)));
//! let app = Router::new()
//!     .fallback(forward_to_registry)
//!     .layer(axum::middleware::from_fn_with_state(filter, tag_check));
//! ```

use crate::filter::classifier::{classify, decode_path};
use crate::metrics::FilterStats;
use crate::policy::{Decision, DenyReason, PolicyProvider};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};

/// Tag policy gate shared by every request
#[derive(Clone)]
pub struct TagFilter {
    provider: Arc<dyn PolicyProvider>,
    stats: Arc<FilterStats>,
}

impl TagFilter {
    pub fn new(provider: Arc<dyn PolicyProvider>) -> Self {
        Self::with_stats(provider, Arc::new(FilterStats::new()))
    }

    pub fn with_stats(provider: Arc<dyn PolicyProvider>, stats: Arc<FilterStats>) -> Self {
        Self { provider, stats }
    }

    pub fn stats(&self) -> &Arc<FilterStats> {
        &self.stats
    }

    /// Decide a request by method and URL path
    ///
    /// Anything that is not a manifest push to a project with a policy is
    /// allowed without further inspection, and is not counted.
    pub fn check(&self, method: &Method, path: &str) -> Decision {
        let Some(policies) = self.provider.current() else {
            return Decision::Allow;
        };

        let path = decode_path(path);
        let Some(request) = classify(method, &path) else {
            return Decision::Allow;
        };

        let Some((project, policy)) = policies.lookup(request.project) else {
            return Decision::Allow;
        };

        debug!(project, tag = request.tag, "Checking image tag policy");

        let decision = policy.evaluate(request.tag);
        match decision {
            Decision::Allow => self.stats.record_allowed(),
            Decision::Deny(reason) => {
                warn!(
                    project,
                    tag = request.tag,
                    %reason,
                    "Rejected image tag push"
                );
                self.stats.record_denied(project, reason);
            }
        }
        decision
    }
}

/// Middleware: reject disallowed manifest pushes, pass everything else on
pub async fn tag_check(State(filter): State<TagFilter>, request: Request, next: Next) -> Response {
    match filter.check(request.method(), request.uri().path()) {
        Decision::Allow => next.run(request).await,
        Decision::Deny(reason) => reason.into_response(),
    }
}

impl IntoResponse for DenyReason {
    fn into_response(self) -> Response {
        (
            StatusCode::NOT_ACCEPTABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message(),
        )
            .into_response()
    }
}
