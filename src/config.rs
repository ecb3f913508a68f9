// ⚙️ Configuration - where data lives and where it comes from
//
// Loaded from a JSON file, then overridden by GEOASSIST_* environment
// variables. Every field has a default so an empty object is valid.

use crate::fetcher::{BundledSource, FallbackSource, PlaceSource, RemoteSource};
use crate::place::CategoryFilter;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_ENV: &str = "GEOASSIST_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "geoassist.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite cache location
    pub database_path: PathBuf,

    /// Remote place endpoint; when unset only the bundled data is used
    pub remote_url: Option<String>,

    /// JSON or CSV dataset replacing the embedded one
    pub dataset_path: Option<PathBuf>,

    /// Address for the API server
    pub bind_address: String,

    pub fetch_timeout_secs: u64,

    /// Initial category toggles
    pub default_filter: CategoryFilter,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("geoassist.db"),
            remote_url: None,
            dataset_path: None,
            bind_address: "0.0.0.0:3000".to_string(),
            fetch_timeout_secs: 10,
            default_filter: CategoryFilter::default(),
        }
    }
}

impl AppConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Config file named by `GEOASSIST_CONFIG`, else `geoassist.json` when
    /// present, else defaults; then environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        debug!(?config, "loaded configuration");
        Ok(config)
    }

    /// Apply `GEOASSIST_*` overrides from a lookup function
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(db) = lookup("GEOASSIST_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(url) = lookup("GEOASSIST_REMOTE_URL") {
            self.remote_url = if url.is_empty() { None } else { Some(url) };
        }
        if let Some(dataset) = lookup("GEOASSIST_DATASET") {
            self.dataset_path = Some(PathBuf::from(dataset));
        }
        if let Some(bind) = lookup("GEOASSIST_BIND") {
            self.bind_address = bind;
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn bundled_source(&self) -> BundledSource {
        match &self.dataset_path {
            Some(path) => BundledSource::from_path(path),
            None => BundledSource::embedded(),
        }
    }

    /// Remote endpoint with bundled fallback, or just the bundle
    pub fn build_source(&self) -> Box<dyn PlaceSource> {
        match &self.remote_url {
            Some(url) => Box::new(FallbackSource::new(
                RemoteSource::new(url).with_timeout(self.fetch_timeout()),
                self.bundled_source(),
            )),
            None => Box::new(self.bundled_source()),
        }
    }
}
