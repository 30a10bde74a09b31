//! Gateway configuration
//!
//! Stored as JSON. Missing fields take their defaults so an older file keeps
//! working after new settings are added.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides [`GatewayConfig::base_url`]
pub const BASE_URL_ENV: &str = "ANNOTATOR_BASE_URL";

const CONFIG_FILE: &str = "gateway.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to resolve config directory")]
    NoConfigDirectory,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Backend root, without a trailing slash
    pub base_url: String,

    /// Router prefix the annotation routes are mounted under, e.g. `/reviews`
    pub annotations_prefix: String,

    pub timeout_secs: u64,

    pub user_agent: String,

    /// Ask the server to echo the persisted list after a save
    pub return_full: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_owned(),
            annotations_prefix: "/reviews".to_owned(),
            timeout_secs: 30,
            user_agent: format!("review-annotator/{}", env!("CARGO_PKG_VERSION")),
            return_full: false,
        }
    }
}

impl GatewayConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_annotations_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.annotations_prefix = prefix.into();
        self
    }

    /// Annotation route prefix with one leading slash and no trailing one
    pub fn annotations_root(&self) -> String {
        let trimmed = self.annotations_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_return_full(mut self, return_full: bool) -> Self {
        self.return_full = return_full;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Platform config location, e.g. `~/.config/review-annotator/gateway.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("dev", "ReviewAnnotator", "review-annotator")
            .ok_or(ConfigError::NoConfigDirectory)?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_slice(&bytes)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Explicit path if given, else the platform file if present, else defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path),
            Ok(_) => Ok(Self::default()),
            Err(err) => {
                tracing::debug!(%err, "using default gateway config");
                Ok(Self::default())
            }
        }
    }

    /// Apply environment overrides through `lookup`
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url;
        }
        self
    }
}
