//! Shared plumbing: the crate error type, layered settings and the panic
//! guard used at native callback boundaries

pub mod config;
pub mod error;
pub mod ffi;

// Re-export commonly used items
pub use config::{
    Config, EngineConfig, LoggingConfig, PlayerSettings, RenderConfig, RetryConfig, WindowConfig,
};
pub use error::{PlayerError, Result};

/// Settings from the user file and environment, see [`Config::load`]
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// `MM:SS`, or `HH:MM:SS` from one hour on; negative or non-finite input shows as zero
pub fn format_position(seconds: f64) -> String {
    let total_secs = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
