//! Layered settings: built-in defaults, a TOML file, then `VIDPANE_*`
//! environment variables

use crate::utils::error::{PlayerError, Result, ResultExt};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Everything the shell and the media element read at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window configuration
    pub window: WindowConfig,

    /// Native engine configuration
    pub engine: EngineConfig,

    /// Render loop and GPU configuration
    pub render: RenderConfig,

    /// Playback session configuration
    pub player: PlayerSettings,

    /// Host-side log filtering
    pub logging: LoggingConfig,
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial window width
    pub width: u32,

    /// Initial window height
    pub height: u32,

    /// Window title
    pub title: String,
}

/// Native engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit path to the engine shared library
    pub library_path: Option<PathBuf>,

    /// Engine log file, passed through as the `log-file` option
    pub log_file: Option<PathBuf>,

    /// Engine message level filter, passed as `msg-level`
    pub msg_level: String,

    /// Hardware decoding mode, passed as `hwdec`
    pub hwdec: String,

    /// Extra engine options applied before initialization
    pub options: BTreeMap<String, String>,
}

/// GPU power preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PowerPreference {
    LowPower,
    HighPerformance,
}

/// Render loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Upper bound on how long the loop sleeps waiting for a frame
    pub frame_interval_ms: u64,

    /// Present with vertical sync
    pub vsync: bool,

    /// Adapter selection hint
    pub power_preference: PowerPreference,
}

/// Bounded retry for property reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay
    pub max_backoff_ms: u64,
}

/// Playback session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Load and start playing as soon as a source is set
    pub auto_play: bool,

    /// Replay the source when it reaches its end
    pub auto_repeat: bool,

    /// Initial volume (0 - 100)
    pub default_volume: u8,

    /// Relative seek step for keyboard shortcuts, in seconds
    pub seek_step_secs: f64,

    /// Property retry policy
    pub property_retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `env_logger` level; `RUST_LOG` still wins when set
    pub level: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vidpane".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            log_file: None,
            msg_level: "all=v".to_string(),
            hwdec: "auto-safe".to_string(),
            options: BTreeMap::new(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            vsync: true,
            power_preference: PowerPreference::HighPerformance,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            auto_play: true,
            auto_repeat: false,
            default_volume: 70,
            seek_step_secs: 5.0,
            property_retry: RetryConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| PlayerError::Config(format!("{} has an unusable value '{}'", key, raw)))
}

impl Config {
    /// Defaults, then the user file if it exists, then the environment
    ///
    /// The user file lives at `<config dir>/vidpane/config.toml`.
    pub fn load() -> Result<Self> {
        let base = match Self::user_config_path() {
            Some(path) if path.is_file() => Self::read_file(&path)?,
            _ => Self::default(),
        };
        base.finish(|key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] but reads `path` instead of the user file
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read_file(path)?.finish(|key| std::env::var(key).ok())
    }

    fn finish<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.apply_overrides(lookup)?;
        self.validate()?;
        Ok(self)
    }

    /// Write to the user file
    pub fn save(&self) -> Result<()> {
        match Self::user_config_path() {
            Some(path) => self.save_to(&path),
            None => Err(PlayerError::Config("no user config directory on this platform".to_string())),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).config_err("serializing settings")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).config_err(&format!("creating {}", dir.display()))?;
        }
        std::fs::write(path, text).config_err(&format!("writing {}", path.display()))
    }

    /// Missing keys fall back to their defaults
    fn read_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .config_err(&format!("reading {}", path.display()))?;
        toml::from_str(&text).config_err(&format!("parsing {}", path.display()))
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("VIDPANE_WINDOW_WIDTH") {
            self.window.width = parse_var("VIDPANE_WINDOW_WIDTH", &raw)?;
        }
        if let Some(raw) = lookup("VIDPANE_WINDOW_HEIGHT") {
            self.window.height = parse_var("VIDPANE_WINDOW_HEIGHT", &raw)?;
        }
        if let Some(raw) = lookup("VIDPANE_VOLUME") {
            self.player.default_volume = parse_var("VIDPANE_VOLUME", &raw)?;
        }
        if let Some(raw) = lookup("VIDPANE_MPV_LIB") {
            self.engine.library_path = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("VIDPANE_ENGINE_LOG") {
            self.engine.log_file = Some(PathBuf::from(raw));
        }
        if let Some(raw) = lookup("VIDPANE_LOG_LEVEL") {
            self.logging.level = raw;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PlayerError::Config(msg.to_string()));

        if self.window.width == 0 || self.window.height == 0 {
            return invalid("window size must be non-zero");
        }
        if self.player.default_volume > 100 {
            return invalid("default_volume is a percentage (0 - 100)");
        }
        let retry = &self.player.property_retry;
        if retry.max_attempts == 0 {
            return invalid("property_retry.max_attempts must be at least 1");
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return invalid("property_retry.initial_backoff_ms exceeds max_backoff_ms");
        }
        if self.render.frame_interval_ms == 0 {
            return invalid("frame_interval_ms must be non-zero");
        }
        if LevelFilter::from_str(&self.logging.level).is_err() {
            return Err(PlayerError::Config(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("vidpane").join("config.toml"))
    }
}
