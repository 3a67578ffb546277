//! Fetch configuration
//!
//! Controls how images are retrieved from their sources: where remote
//! images are cached after download and how the HTTP client behaves.
//! The configuration is plain data and can be stored as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ImageError, Result};

/// Name of the per-user cache folder
const CACHE_NAMESPACE: &str = "spatial-images";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory downloaded images are written to before decoding.
    /// `None` = `<user cache dir>/spatial-images/remote`
    pub cache_dir: Option<PathBuf>,

    /// HTTP timeout in seconds.
    /// `None` = no timeout; callers bound latency themselves
    pub timeout_secs: Option<u64>,

    /// User-Agent header sent with remote requests
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            timeout_secs: None,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific download cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Get the download cache directory, creating it if needed.
    /// Returns ~/.cache/spatial-images/remote on Linux unless overridden.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        let path = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => {
                let mut path = dirs_next::cache_dir()
                    .or_else(dirs_next::home_dir)
                    .ok_or_else(|| ImageError::invalid_argument("cache_dir", "could not determine cache directory"))?;
                path.push(CACHE_NAMESPACE);
                path.push("remote");
                path
            }
        };

        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON string; missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
