//! Tag policy module
//!
//! Compiles per-project blacklist/whitelist rules once at load time and
//! evaluates pushed tags against them.
//!
//! ## Example Configuration
//!
//! ```toml
//! [projects."library/nginx"]
//! black_list = ["^latest$"]        # Never accept a mutable `latest`
//! white_list = ["^v[0-9]+\\."]     # Only versioned tags
//! ```

pub mod evaluator;
pub mod store;

pub use evaluator::{Decision, DenyReason, PolicySet, TagPolicy};
pub use store::{PolicyProvider, PolicyStore};

/// Canonical form of a project path used as the policy lookup key
///
/// Lower-cased and stripped of leading/trailing slashes, so `/TeamA/app/`
/// and `teama/app` name the same project.
pub fn normalize_project(project: &str) -> String {
    project.trim_matches('/').to_ascii_lowercase()
}
