/// Upstream manifest probe.
///
/// Asks an HTTP endpoint which handbook version upstream currently serves so
/// the freshness manager can tell when the local cache has fallen behind.
/// Downloading the pages themselves is left to whatever fills the cache.
use std::time::Duration;

use anyhow::{Context, Result, bail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = concat!("glyphs-info-mcp/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct UpstreamProbe {
    client: reqwest::Client,
    url: String,
}

impl UpstreamProbe {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("HTTP client build failed")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the current upstream version string.
    pub async fn fetch_version(&self) -> Result<String> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("upstream manifest request failed: {}", self.url))?;

        if !resp.status().is_success() {
            bail!("upstream manifest returned status {}", resp.status());
        }

        let body = resp
            .text()
            .await
            .context("failed to read upstream manifest body")?;
        parse_manifest_version(&body)
    }
}

/// Extract the version from a manifest body.
///
/// Accepts a JSON object with a string or numeric `version` field, or plain
/// text whose first non-blank line is the version.
pub fn parse_manifest_version(body: &str) -> Result<String> {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(body) {
        let version = match fields.get("version") {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => bail!("manifest JSON has no version field"),
        };
        if version.is_empty() {
            bail!("manifest version is empty");
        }
        return Ok(version);
    }

    match body.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) if !line.contains(char::is_whitespace) => Ok(line.to_string()),
        Some(line) => bail!("unrecognised manifest line: {line:?}"),
        None => bail!("empty manifest"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
