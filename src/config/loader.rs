//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{ProxyConfig, RouteDocument};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse configuration from a TOML file without semantic checks, for
/// callers that apply overrides before validating.
pub fn read_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let config = read_config(path)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Syntax of a routing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteFormat {
    Yaml,
    Toml,
}

impl RouteFormat {
    /// `.yml` / `.yaml` are YAML, everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml") => {
                RouteFormat::Yaml
            }
            _ => RouteFormat::Toml,
        }
    }
}

/// Parse raw routing-document bytes. Semantic checks happen when the
/// document is compiled into a route table.
pub fn parse_route_document(bytes: &[u8], format: RouteFormat) -> Result<RouteDocument, ConfigError> {
    match format {
        RouteFormat::Yaml => {
            // An empty file is an empty table, not an error.
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(RouteDocument::default());
            }
            Ok(serde_yaml::from_slice(bytes)?)
        }
        RouteFormat::Toml => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                ConfigError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            Ok(toml::from_str(text)?)
        }
    }
}
