//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (TAG_GUARD__*)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use crate::policy::PolicySet;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "tag-guard.toml",
    ".tag-guard.toml",
    "~/.config/tag-guard/config.toml",
    "/etc/tag-guard/config.toml",
];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Resolve which configuration file to read
///
/// An explicit path must exist. Without one, the first existing default path
/// wins; `None` means no file was found and only defaults and the environment
/// apply.
pub fn resolve_config_path(config_path: Option<&str>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = config_path {
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        return Ok(Some(PathBuf::from(path)));
    }

    Ok(DEFAULT_CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists()))
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = resolve_config_path(config_path)? {
        builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
    }

    // e.g., TAG_GUARD__UPSTREAM__URL, TAG_GUARD__SERVER__PORT
    // Double underscore (__) maps to nested keys (upstream.url)
    builder = builder.add_source(
        Environment::with_prefix("TAG_GUARD")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.upstream.url.is_empty() {
        return Err(ConfigError::Missing {
            field: "upstream.url".to_string(),
        });
    }

    if !config.upstream.url.starts_with("http://") && !config.upstream.url.starts_with("https://")
    {
        return Err(ConfigError::Invalid {
            message: format!(
                "upstream.url must start with http:// or https://, got: {}",
                config.upstream.url
            ),
        });
    }

    if config.upstream.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "upstream.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.server.port == 0 {
        return Err(ConfigError::Invalid {
            message: "server.port must be greater than 0".to_string(),
        });
    }

    validate_projects(config)?;

    Ok(())
}

/// Validate project keys and every tag pattern
///
/// Compiles the policy set and discards it, so loading and evaluation share
/// one set of rules.
fn validate_projects(config: &AppConfig) -> Result<(), ConfigError> {
    PolicySet::new(&config.projects).map(|_| ())
}
