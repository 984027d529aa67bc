//! Run configuration.
//!
//! An optional JSON file supplies commands, timeouts and a fallback song list.
//! CLI flags and environment variables override file values; everything has a
//! default so a bare `songprep --clipboard` works.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Environment variable consulted for the oracle command.
pub const ORACLE_COMMAND_ENV: &str = "SONGPREP_ORACLE_COMMAND";

const DEFAULT_ORACLE_COMMAND: &str = "claude -p --model haiku";
const DEFAULT_ROOT_DIR_NAME: &str = "youtube_songs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SongprepConfig {
    pub schema_version: u32,

    /// Library root holding the working, output and verification trees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub oracle: OracleSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    /// Songs to process when no other input source is given.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub songs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleSettings {
    /// Local LM command line; the prompt is written to its stdin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// OpenAI-compatible endpoint; takes precedence over `command` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpOracleSettings>,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpOracleSettings {
    /// Full URL of the `chat/completions` endpoint.
    pub endpoint: String,

    #[serde(default = "default_http_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    /// Search-and-download command (yt-dlp compatible).
    #[serde(default = "default_downloader")]
    pub downloader: String,

    /// Transcoder command (ffmpeg compatible).
    #[serde(default = "default_transcoder")]
    pub transcoder: String,

    /// Command printing the clipboard contents to stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paste_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    #[serde(default = "default_oracle_secs")]
    pub oracle_secs: u64,
    #[serde(default = "default_search_secs")]
    pub search_secs: u64,
    #[serde(default = "default_download_secs")]
    pub download_secs: u64,
    #[serde(default = "default_transcode_secs")]
    pub transcode_secs: u64,
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_http_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_downloader() -> String {
    "yt-dlp".to_string()
}

fn default_transcoder() -> String {
    "ffmpeg".to_string()
}

fn default_oracle_secs() -> u64 {
    120
}

fn default_search_secs() -> u64 {
    60
}

fn default_download_secs() -> u64 {
    600
}

fn default_transcode_secs() -> u64 {
    600
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            command: None,
            http: None,
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            downloader: default_downloader(),
            transcoder: default_transcoder(),
            paste_command: None,
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            oracle_secs: default_oracle_secs(),
            search_secs: default_search_secs(),
            download_secs: default_download_secs(),
            transcode_secs: default_transcode_secs(),
        }
    }
}

impl TimeoutSettings {
    pub fn oracle(&self) -> Duration {
        Duration::from_secs(self.oracle_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_secs)
    }
}

impl OracleSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Config used when no file is given.
pub fn default_config() -> SongprepConfig {
    SongprepConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        root: None,
        oracle: OracleSettings::default(),
        tools: ToolSettings::default(),
        timeouts: TimeoutSettings::default(),
        songs: Vec::new(),
    }
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<SongprepConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: SongprepConfig =
        serde_json::from_slice(&bytes).context("parse songprep config JSON")?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configs the pipeline cannot run with.
pub fn validate_config(config: &SongprepConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if let Some(command) = config.oracle.command.as_deref() {
        if command.trim().is_empty() {
            return Err(anyhow!("oracle.command must be non-empty when set"));
        }
    }
    if let Some(http) = &config.oracle.http {
        if !(http.endpoint.starts_with("http://") || http.endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "oracle.http.endpoint must be an http(s) URL (got {:?})",
                http.endpoint
            ));
        }
        if !(0.0..=2.0).contains(&http.temperature) {
            return Err(anyhow!(
                "oracle.http.temperature must be within 0.0..=2.0 (got {})",
                http.temperature
            ));
        }
    }
    if config.tools.downloader.trim().is_empty() {
        return Err(anyhow!("tools.downloader must be non-empty"));
    }
    if config.tools.transcoder.trim().is_empty() {
        return Err(anyhow!("tools.transcoder must be non-empty"));
    }
    let timeouts = &config.timeouts;
    for (label, secs) in [
        ("oracle_secs", timeouts.oracle_secs),
        ("search_secs", timeouts.search_secs),
        ("download_secs", timeouts.download_secs),
        ("transcode_secs", timeouts.transcode_secs),
    ] {
        if secs == 0 {
            return Err(anyhow!("timeouts.{label} must be greater than zero"));
        }
    }
    Ok(())
}

/// Resolve the oracle command: explicit flag > config > environment > default.
pub fn resolve_oracle_command(explicit: Option<&str>, config: &SongprepConfig) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| config.oracle.command.clone())
        .or_else(|| std::env::var(ORACLE_COMMAND_ENV).ok())
        .filter(|command| !command.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ORACLE_COMMAND.to_string())
}

/// Resolve the library root: explicit flag > config > `<downloads>/youtube_songs`.
pub fn resolve_root(explicit: Option<&Path>, config: &SongprepConfig) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = &config.root {
        return path.clone();
    }
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ROOT_DIR_NAME)
}

/// Clipboard command for the current platform unless configured.
pub fn resolve_paste_command(config: &SongprepConfig) -> String {
    if let Some(command) = &config.tools.paste_command {
        return command.clone();
    }
    if cfg!(target_os = "macos") {
        "pbpaste".to_string()
    } else if cfg!(target_os = "windows") {
        "powershell -NoProfile -Command Get-Clipboard".to_string()
    } else {
        "xclip -selection clipboard -o".to_string()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
