use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_media_path")]
    pub media_path: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            media_path: default_media_path(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoteConfig {
    /// WebSocket URL of the conversational-AI agent.
    #[serde(default)]
    pub url: String,
    /// Sent to the agent as the `agent_id` query parameter when set.
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl RemoteConfig {
    /// The URL the bridge dials for every call.
    ///
    /// An unset URL is returned as-is so the connector can reject it.
    pub fn endpoint(&self) -> anyhow::Result<String> {
        if self.url.trim().is_empty() {
            return Ok(String::new());
        }

        let mut url = url::Url::parse(&self.url)
            .map_err(|e| anyhow::anyhow!("invalid remote url {}: {e}", self.url))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            anyhow::bail!("remote url {} must use ws:// or wss://", self.url);
        }
        if let Some(agent_id) = self.agent_id.as_deref().filter(|id| !id.is_empty()) {
            url.query_pairs_mut().append_pair("agent_id", agent_id);
        }

        Ok(url.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            journal_path: default_journal_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_listen() -> String {
    "127.0.0.1:8765".to_string()
}

fn default_media_path() -> String {
    stream_bridge::listener::DEFAULT_MEDIA_PATH.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("sessions.jsonl")
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// A missing file yields the defaults and a warning, so the bridge can be
/// started from CLI flags alone.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}
