/// Configuration module.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_cache_root() -> String {
    "./data/handbook-cache".to_string()
}

fn default_channel() -> String {
    "stable".to_string()
}

fn default_document_delimiter() -> String {
    "<!-- handbook-page-break -->".to_string()
}

fn default_excerpt_chars() -> usize {
    crate::query::DEFAULT_EXCERPT_CHARS
}

fn default_search_limit() -> usize {
    10
}

fn default_search_max_limit() -> usize {
    20
}

fn default_refresh_interval_secs() -> u64 {
    300
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_cache_root")]
    pub cache_root: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    /// Line that separates concatenated pages inside one cached file.
    #[serde(default = "default_document_delimiter")]
    pub document_delimiter: String,

    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    #[serde(default = "default_search_limit")]
    pub search_default_limit: usize,

    #[serde(default = "default_search_max_limit")]
    pub search_max_limit: usize,

    /// Seconds between freshness checks; 0 disables the scheduler.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// URL answering with the upstream handbook version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_manifest_url: Option<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            channel: default_channel(),
            document_delimiter: default_document_delimiter(),
            excerpt_chars: default_excerpt_chars(),
            search_default_limit: default_search_limit(),
            search_max_limit: default_search_max_limit(),
            refresh_interval_secs: default_refresh_interval_secs(),
            upstream_manifest_url: None,
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.cache_root.is_empty(), "cache_root must be set");
        anyhow::ensure!(
            is_plain_channel(&self.channel),
            "channel must be a single directory name, got {:?}",
            self.channel
        );
        anyhow::ensure!(
            !self.document_delimiter.trim().is_empty(),
            "document_delimiter must not be blank"
        );
        anyhow::ensure!(self.excerpt_chars > 0, "excerpt_chars must be positive");
        anyhow::ensure!(
            self.search_max_limit > 0,
            "search_max_limit must be positive"
        );
        anyhow::ensure!(
            (1..=self.search_max_limit).contains(&self.search_default_limit),
            "search_default_limit must be between 1 and search_max_limit"
        );
        Ok(())
    }
}

/// A channel names one directory below the cache root, nothing more.
fn is_plain_channel(channel: &str) -> bool {
    !channel.is_empty()
        && channel != "."
        && channel != ".."
        && !channel.contains(['/', '\\'])
}

// ── Tests ────────────────────────────────────────────────────────────
