use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::listing::SortKey;
use crate::openfoodfacts;

const DEFAULT_ENV_PREFIX: &str = "FOOD_FEED";
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    openfoodfacts::OFF_API_BASE.to_string()
}

fn default_page_size() -> u32 {
    crate::feed::DEFAULT_PAGE_SIZE
}

fn default_user_agent() -> String {
    format!("food-feed/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    openfoodfacts::DEFAULT_TIMEOUT
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_scroll_debounce", with = "humantime_serde")]
    pub scroll_debounce: Duration,
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            scroll_debounce: default_scroll_debounce(),
            scroll_threshold: default_scroll_threshold(),
        }
    }
}

fn default_scroll_debounce() -> Duration {
    crate::scheduler::DEFAULT_WINDOW
}

fn default_scroll_threshold() -> usize {
    crate::scroll::DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UIConfig {
    #[serde(default)]
    pub default_sort: SortKey,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        anyhow::ensure!(
            path.exists(),
            "config: file {} does not exist",
            path.display()
        );
        cfg = read_config_file(path)?;
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    validate(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

// Unparseable, empty or zero values leave the file/default value in place.
fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    let value = value.trim().to_string();
    if value.is_empty() {
        return;
    }
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.page_size" => {
            if let Some(parsed) = value.parse::<u32>().ok().filter(|size| *size > 0) {
                cfg.api.page_size = parsed;
            }
        }
        "api.timeout" => {
            if let Some(duration) = nonzero_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "feed.scroll_debounce" => {
            if let Some(duration) = nonzero_duration(&value) {
                cfg.feed.scroll_debounce = duration;
            }
        }
        "feed.scroll_threshold" => {
            if let Some(parsed) = value.parse::<usize>().ok().filter(|rows| *rows > 0) {
                cfg.feed.scroll_threshold = parsed;
            }
        }
        "ui.default_sort" => {
            if let Ok(key) = value.parse::<SortKey>() {
                cfg.ui.default_sort = key;
            }
        }
        _ => {}
    }
}

fn nonzero_duration(value: &str) -> Option<Duration> {
    humantime::parse_duration(value)
        .ok()
        .filter(|duration| !duration.is_zero())
}

pub fn validate(cfg: &Config) -> Result<()> {
    anyhow::ensure!(
        (1..=MAX_PAGE_SIZE).contains(&cfg.api.page_size),
        "config: api.page_size must be between 1 and {MAX_PAGE_SIZE}"
    );
    anyhow::ensure!(
        !cfg.api.user_agent.trim().is_empty(),
        "config: api.user_agent is required"
    );
    url::Url::parse(cfg.api.base_url.trim())
        .with_context(|| format!("config: api.base_url {:?} is not a url", cfg.api.base_url))?;
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("food-feed").join("config.yaml"))
}
