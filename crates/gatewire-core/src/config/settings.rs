//! Declarative route configuration loading.
//!
//! Reads a JSON or YAML route file from disk, guarding against path
//! traversal and oversized files before handing the bytes to serde.

use crate::route::RouteConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Env var naming the route file to load; defaults to `./gatewire.json`.
pub const CONFIG_PATH_ENV: &str = "GATEWIRE_CONFIG_PATH";

/// Configuration files larger than this are rejected outright rather than
/// read into memory; a declarative route list has no legitimate reason to
/// approach this size.
pub const MAX_CONFIG_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config path escapes the working directory: {0}")]
    PathTraversal(String),
    #[error("config file too large ({actual} bytes, max {max})")]
    TooLarge { actual: u64, max: u64 },
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}' as JSON or YAML: {message}")]
    Parse { path: String, message: String },
}

/// Top-level declarative configuration: the `DefaultHandlerConfig` fields,
/// in their wire (JSON/YAML) shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub start_path: String,
    #[serde(default)]
    pub protected_headers: Vec<String>,
    #[serde(default)]
    pub forwarded_url: Option<RouteConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9080
}

/// Loads the route configuration from the path named by
/// [`CONFIG_PATH_ENV`] (or `./gatewire.json` when unset), rejecting paths
/// that escape the current working directory and files past
/// [`MAX_CONFIG_BYTES`]. Format (JSON vs. YAML) is inferred from the file
/// extension, falling back to JSON.
pub fn load_settings() -> Result<GatewayConfig, SettingsError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "./gatewire.json".to_string());
    load_settings_from_path(Path::new(&path))
}

pub fn load_settings_from_path(path: &Path) -> Result<GatewayConfig, SettingsError> {
    let resolved = canonicalize_within_cwd(path)?;

    let metadata = std::fs::metadata(&resolved).map_err(|source| SettingsError::Io {
        path: resolved.display().to_string(),
        source,
    })?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(SettingsError::TooLarge {
            actual: metadata.len(),
            max: MAX_CONFIG_BYTES,
        });
    }

    let contents = std::fs::read_to_string(&resolved).map_err(|source| SettingsError::Io {
        path: resolved.display().to_string(),
        source,
    })?;

    parse_contents(&resolved, &contents)
}

fn parse_contents(path: &Path, contents: &str) -> Result<GatewayConfig, SettingsError> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );

    let result = if is_yaml {
        serde_yaml::from_str(contents).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(contents)
            .map_err(|e| e.to_string())
            .or_else(|_| serde_yaml::from_str(contents).map_err(|e| e.to_string()))
    };

    result.map_err(|message| SettingsError::Parse {
        path: path.display().to_string(),
        message,
    })
}

/// Canonicalizes `path` and requires it stay under the process's working
/// directory, rejecting `../` escapes before the file is ever opened.
fn canonicalize_within_cwd(path: &Path) -> Result<PathBuf, SettingsError> {
    let cwd = std::env::current_dir().map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let candidate = cwd.join(path);
    let resolved = candidate.canonicalize().map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let canonical_cwd = cwd
        .canonicalize()
        .unwrap_or(cwd);
    if !resolved.starts_with(&canonical_cwd) {
        return Err(SettingsError::PathTraversal(resolved.display().to_string()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_minimal_json_config() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile_in(std::env::current_dir().unwrap())
            .unwrap();
        write!(file, r#"{{"routes": []}}"#).unwrap();
        let cfg = load_settings_from_path(file.path()).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9080);
        assert!(cfg.routes.is_empty());
    }

    #[test]
    fn loads_yaml_config() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile_in(std::env::current_dir().unwrap())
            .unwrap();
        write!(file, "host: 127.0.0.1\nport: 9999\nroutes: []\n").unwrap();
        let cfg = load_settings_from_path(file.path()).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 9999);
    }

    #[test]
    fn rejects_path_escaping_cwd() {
        let err = load_settings_from_path(Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, SettingsError::PathTraversal(_)));
    }
}
