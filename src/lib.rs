//! Registry Tag Guard
//!
//! A gateway for container image registries that rejects manifest pushes whose
//! tag violates a per-project naming policy.
//!
//! ## Features
//!
//! - **Tag policies** per project, as regex blacklists and whitelists
//! - **Axum middleware** usable in front of any registry router
//! - **Standalone gateway** streaming accepted requests to an upstream registry
//! - **Hot reload** of policies on `SIGHUP`, keeping the last good policy on error
//!
//! ## Policy Model
//!
//! Only `PUT /v2/{project}/manifests/{tag}` is inspected. For the project's
//! policy:
//!
//! 1. A tag matching any `black_list` pattern is rejected
//! 2. If `white_list` is non-empty, a tag matching none of it is rejected
//! 3. Anything else passes untouched
//!
//! Rejections are `406 Not Acceptable` with a plain-text reason.
//!
//! ## Example Configuration
//!
//! ```toml
//! [upstream]
//! url = "http://127.0.0.1:5000"
//!
//! [projects."library/nginx"]
//! black_list = ["^latest$"]       # No mutable latest tag
//!
//! [projects."team/service"]
//! white_list = ["^v[0-9]+\\.", "^release-"]
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod policy;
pub mod proxy;
pub mod server;

// Re-export main types
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use filter::TagFilter;
pub use policy::{Decision, DenyReason, PolicySet, PolicyStore};
