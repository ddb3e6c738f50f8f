use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment keys checked for the base URL, in order.
pub const BASE_URL_ENV_KEYS: [&str; 2] = ["SPELLTALE_API_URL", "VITE_API_URL"];

/// Construction-time configuration shared by every client component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    pub request_timeout: Duration,

    /// Delay between a fetch reporting `next_page_ready: false` and the
    /// background fetch of the following page.
    pub prefetch_delay: Duration,

    pub reveal_tick: Duration,
    pub continuation_delay: Duration,
    pub keepalive_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout: Duration::from_secs(10),
            prefetch_delay: Duration::from_secs(1),
            reveal_tick: Duration::from_millis(20),
            continuation_delay: Duration::from_secs(4),
            keepalive_interval: Duration::from_secs(30),
        }
    }
}

/* =========================
   Settings file
   ========================= */

/// On-disk overrides. Every field is optional; missing ones keep the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub prefetch_delay_ms: Option<u64>,
    pub reveal_tick_ms: Option<u64>,
    pub continuation_delay_ms: Option<u64>,
    pub keepalive_interval_ms: Option<u64>,
}

pub fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("spelltale");
    path
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Missing file means "no overrides"; a present but broken file is an error.
pub fn load_settings(path: &Path) -> Result<FileSettings, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileSettings::default()),
        Err(e) => Err(e.into()),
    }
}

impl Config {
    /// Defaults, then the settings file, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let settings = load_settings(&settings_path())?;
        let mut config = Config::default().with_settings(&settings);
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_settings(mut self, settings: &FileSettings) -> Self {
        if let Some(url) = &settings.base_url {
            self.base_url = url.clone();
        }
        let ms = Duration::from_millis;
        if let Some(v) = settings.request_timeout_ms {
            self.request_timeout = ms(v);
        }
        if let Some(v) = settings.prefetch_delay_ms {
            self.prefetch_delay = ms(v);
        }
        if let Some(v) = settings.reveal_tick_ms {
            self.reveal_tick = ms(v);
        }
        if let Some(v) = settings.continuation_delay_ms {
            self.continuation_delay = ms(v);
        }
        if let Some(v) = settings.keepalive_interval_ms {
            self.keepalive_interval = ms(v);
        }
        self
    }

    /// First non-empty value among [`BASE_URL_ENV_KEYS`] wins.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let found = BASE_URL_ENV_KEYS
            .iter()
            .filter_map(|key| lookup(key))
            .find(|value| !value.trim().is_empty());

        if let Some(url) = found {
            self.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.starts_with("http://") || self.base_url.starts_with("https://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidBaseUrl(self.base_url.clone()))
        }
    }

    /// Base URL without a trailing slash, ready for path joining.
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Real-time endpoint root: `http` becomes `ws`, `https` becomes `wss`.
    pub fn ws_root(&self) -> String {
        let root = self.api_root();
        if let Some(rest) = root.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = root.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            root.to_string()
        }
    }
}
