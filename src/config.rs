use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Client settings. Later layers win: defaults, `config.toml`, environment
/// (a `.env` file is honoured), then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api_url: String,
    pub log: String,
    pub toast_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            log: "info".to_string(),
            toast_seconds: 4,
        }
    }
}

impl Config {
    pub fn load(explicit: Option<&Path>, api_url: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match explicit.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) if explicit.is_some() => {
                anyhow::bail!("Config file not found: {}", path.display())
            }
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        if let Some(url) = api_url {
            config.api_url = url.to_string();
        }
        config.api_url = normalize_url(&config.api_url);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("PROSPECTOR_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(log) = var("PROSPECTOR_LOG") {
            self.log = log;
        }
        if let Some(secs) = var("PROSPECTOR_TOAST_SECONDS") {
            self.toast_seconds = secs
                .trim()
                .parse()
                .context("PROSPECTOR_TOAST_SECONDS must be a whole number of seconds")?;
        }
        Ok(())
    }

    pub fn toast_ttl(&self) -> Duration {
        Duration::from_secs(self.toast_seconds.max(1))
    }

    fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "prospector")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Where the browser writes its log, since stderr belongs to the screen.
    pub fn log_path() -> PathBuf {
        if let Some(dirs) = directories::ProjectDirs::from("", "", "prospector") {
            dirs.data_dir().join("prospector.log")
        } else {
            PathBuf::from("prospector.log")
        }
    }
}

fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        DEFAULT_API_URL.to_string()
    } else if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}
