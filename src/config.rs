use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed;

const DEFAULT_ENV_PREFIX: &str = "IBB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_media_base")]
    pub media_base: String,
    #[serde(default = "default_site_base")]
    pub site_base: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_refresh_interval", with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            media_base: default_media_base(),
            site_base: default_site_base(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            refresh_interval: default_refresh_interval(),
        }
    }
}

fn default_api_base() -> String {
    feed::API_BASE.to_string()
}

fn default_media_base() -> String {
    feed::MEDIA_BASE.to_string()
}

fn default_site_base() -> String {
    feed::SITE_BASE.to_string()
}

fn default_user_agent() -> String {
    format!("ibb/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    /// Below this many rows only the list is drawn and media is never rendered.
    #[serde(default = "default_min_media_height")]
    pub min_media_height: u16,
    #[serde(default = "default_chrome_width")]
    pub chrome_width: u16,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            min_media_height: default_min_media_height(),
            chrome_width: default_chrome_width(),
        }
    }
}

fn default_min_media_height() -> u16 {
    50
}

fn default_chrome_width() -> u16 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_save_dir")]
    pub save_dir: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_image_px")]
    pub max_image_px: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            save_dir: default_save_dir(),
            workers: default_workers(),
            max_image_px: default_max_image_px(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    env::temp_dir().join("ibb")
}

fn default_save_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

fn default_workers() -> usize {
    2
}

fn default_max_image_px() -> u32 {
    1200
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
        }
    }
}

fn default_player_command() -> Vec<String> {
    vec!["mpv".into(), "--force-window".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

fn default_log_file() -> PathBuf {
    env::temp_dir().join("ibb.log")
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.feed.api_base.is_empty() {
        base.feed.api_base = other.feed.api_base;
    }
    if !other.feed.media_base.is_empty() {
        base.feed.media_base = other.feed.media_base;
    }
    if !other.feed.site_base.is_empty() {
        base.feed.site_base = other.feed.site_base;
    }
    if !other.feed.user_agent.is_empty() {
        base.feed.user_agent = other.feed.user_agent;
    }
    if !other.feed.timeout.is_zero() {
        base.feed.timeout = other.feed.timeout;
    }
    if !other.feed.refresh_interval.is_zero() {
        base.feed.refresh_interval = other.feed.refresh_interval;
    }

    if other.ui.min_media_height != 0 {
        base.ui.min_media_height = other.ui.min_media_height;
    }
    base.ui.chrome_width = other.ui.chrome_width;

    if !other.media.cache_dir.as_os_str().is_empty() {
        base.media.cache_dir = other.media.cache_dir;
    }
    if other.media.save_dir.is_some() {
        base.media.save_dir = other.media.save_dir;
    }
    if other.media.workers != 0 {
        base.media.workers = other.media.workers;
    }
    if other.media.max_image_px != 0 {
        base.media.max_image_px = other.media.max_image_px;
    }

    if !other.player.command.is_empty() {
        base.player.command = other.player.command;
    }

    if !other.logging.file.as_os_str().is_empty() {
        base.logging.file = other.logging.file;
    }
    if !other.logging.level.is_empty() {
        base.logging.level = other.logging.level;
    }

    base
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

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "feed.api_base" => cfg.feed.api_base = value,
        "feed.media_base" => cfg.feed.media_base = value,
        "feed.site_base" => cfg.feed.site_base = value,
        "feed.user_agent" => cfg.feed.user_agent = value,
        "feed.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.timeout = duration;
            }
        }
        "feed.refresh_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.refresh_interval = duration;
            }
        }
        "ui.min_media_height" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.ui.min_media_height = parsed;
            }
        }
        "ui.chrome_width" => {
            if let Ok(parsed) = value.parse::<u16>() {
                cfg.ui.chrome_width = parsed;
            }
        }
        "media.cache_dir" => cfg.media.cache_dir = PathBuf::from(value),
        "media.save_dir" => cfg.media.save_dir = Some(PathBuf::from(value)),
        "media.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.media.workers = parsed;
            }
        }
        "media.max_image_px" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.media.max_image_px = parsed;
            }
        }
        "player.command" => {
            cfg.player.command = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        "logging.file" => cfg.logging.file = PathBuf::from(value),
        "logging.level" => cfg.logging.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ibb").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("IBB_TEST_DEFAULTS".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.api_base, feed::API_BASE);
        assert_eq!(cfg.feed.refresh_interval, Duration::from_secs(600));
        assert_eq!(cfg.ui.min_media_height, 50);
        assert_eq!(cfg.player.command, vec!["mpv", "--force-window"]);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "feed:\n  refresh_interval: 5m\nui:\n  min_media_height: 30\n  chrome_width: 7\nplayer:\n  command: [vlc]\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("IBB_TEST_FILE".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.refresh_interval, Duration::from_secs(300));
        assert_eq!(cfg.feed.media_base, feed::MEDIA_BASE);
        assert_eq!(cfg.ui.min_media_height, 30);
        assert_eq!(cfg.ui.chrome_width, 7);
        assert_eq!(cfg.player.command, vec!["vlc"]);
    }

    #[test]
    fn env_overrides() {
        env::set_var("IBB_TEST_ENV_FEED__REFRESH_INTERVAL", "90s");
        env::set_var("IBB_TEST_ENV_PLAYER__COMMAND", "mpv, --fs");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/ibb.yaml")),
            env_prefix: Some("IBB_TEST_ENV".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.refresh_interval, Duration::from_secs(90));
        assert_eq!(cfg.player.command, vec!["mpv", "--fs"]);
        env::remove_var("IBB_TEST_ENV_FEED__REFRESH_INTERVAL");
        env::remove_var("IBB_TEST_ENV_PLAYER__COMMAND");
    }
}
