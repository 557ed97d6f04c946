use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use vidpane::utils::{load_config, Config};
use vidpane::{window, MediaSource};

/// vidpane - plays media through an embedded native engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file or URI to play
    #[arg(value_name = "MEDIA")]
    media: Option<String>,

    /// Hand the path to the engine instead of streaming it through the bridge
    #[arg(long)]
    direct: bool,

    /// Set initial volume (0-100)
    #[arg(short, long, value_name = "VOLUME")]
    volume: Option<u8>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Window width
    #[arg(long)]
    width: Option<u32>,

    /// Window height
    #[arg(long)]
    height: Option<u32>,

    /// Path to the libmpv shared library
    #[arg(long, value_name = "PATH")]
    mpv_lib: Option<PathBuf>,

    /// Write the engine's own log to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Replay the media when it ends
    #[arg(long)]
    repeat: bool,

    /// Read settings from this file instead of the user config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(volume) = self.volume {
            config.player.default_volume = volume.min(100);
        }
        if let Some(width) = self.width {
            config.window.width = width;
        }
        if let Some(height) = self.height {
            config.window.height = height;
        }
        if let Some(path) = &self.mpv_lib {
            config.engine.library_path = Some(path.clone());
        }
        if let Some(path) = &self.log_file {
            config.engine.log_file = Some(path.clone());
        }
        if self.repeat {
            config.player.auto_repeat = true;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
    }

    fn source(&self) -> Result<Option<MediaSource>> {
        let Some(media) = &self.media else {
            return Ok(None);
        };
        let path = PathBuf::from(media);
        if self.direct || !path.is_file() {
            return Ok(Some(MediaSource::uri(media.clone())));
        }
        let source = MediaSource::open_file(&path).with_context(|| format!("Failed to open {}", media))?;
        Ok(Some(source))
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => load_config().context("Failed to load configuration")?,
    };
    args.apply(&mut config);

    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or(config.logging.level.as_str()))
        .format_timestamp_millis()
        .init();

    info!("Starting vidpane v{}", env!("CARGO_PKG_VERSION"));

    let source = args.source()?;
    if let Err(e) = window::run(config, source) {
        error!("vidpane failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
