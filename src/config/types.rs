//! Configuration types for tag-guard
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use serde::Deserialize;
use std::collections::HashMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener settings
    pub server: ServerConfig,

    /// The registry requests are forwarded to
    pub upstream: UpstreamConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Tag policies keyed by project path (e.g. `library/nginx`)
    pub projects: PolicyConfig,
}

/// Per-project tag policies as written by the operator
pub type PolicyConfig = HashMap<String, TagPolicyConfig>;

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5080,
        }
    }
}

/// Upstream registry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the registry (e.g., `http://127.0.0.1:5000`)
    pub url: String,

    /// Request timeout in seconds. Blob uploads can be slow, keep this generous.
    pub timeout_secs: u64,

    /// Whether to verify SSL certificates
    pub verify_ssl: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 300,
            verify_ssl: true,
        }
    }
}

/// Tag policy for a single project
///
/// Both lists hold regular expressions that are matched anywhere in the tag;
/// anchor them with `^`/`$` for whole-tag matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TagPolicyConfig {
    /// Tags matching any of these patterns are rejected
    #[serde(alias = "blackList", alias = "blacklist")]
    pub black_list: Vec<String>,

    /// When non-empty, tags must match at least one of these patterns
    #[serde(alias = "whiteList", alias = "whitelist")]
    pub white_list: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
