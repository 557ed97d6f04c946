//! Error taxonomy shared by the surface, stream, engine and render layers
//!
//! Library code returns [`PlayerError`]; `anyhow` appears only in the binary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    /// The GPU context could not bind a presentable surface to a region
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Presentation failed; the device context is no longer usable
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// A command was issued before the engine was initialized
    #[error("Engine not initialized")]
    EngineNotInitialized,

    /// The engine rejected a command or a property never became available
    #[error("Engine command error: {0}")]
    EngineCommand(String),

    /// Read or seek failure on a backing store
    #[error("Stream I/O error: {0}")]
    StreamIo(#[from] std::io::Error),

    /// A native-held callback would outlive its owner
    #[error("Callback lifetime violation: {0}")]
    CallbackLifetime(String),

    /// The native engine library could not be loaded or created
    #[error("Engine error: {0}")]
    Engine(String),

    /// The render loop itself failed, as opposed to a single frame
    #[error("Render loop error: {0}")]
    Renderer(String),

    /// A settings file or override could not be used
    #[error("Bad configuration: {0}")]
    Config(String),

    /// A caller argument outside the accepted range or state
    #[error("Invalid argument: {0}")]
    InvalidInput(String),

    /// Host failures with no better home, such as a thread that would not spawn
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl From<std::ffi::NulError> for PlayerError {
    fn from(nul: std::ffi::NulError) -> Self {
        PlayerError::InvalidInput(format!("interior NUL at byte {}", nul.nul_position()))
    }
}

impl PlayerError {
    pub fn command_error<S: Into<String>>(msg: S) -> Self {
        PlayerError::EngineCommand(msg.into())
    }

    /// Whether this error is recovered locally by recreating the surface
    pub fn is_device_lost(&self) -> bool {
        matches!(self, PlayerError::DeviceLost(_))
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

/// Tags a foreign error with the taxonomy variant of the layer it came from
pub trait ResultExt<T> {
    fn surface_err(self, context: &str) -> Result<T>;
    fn engine_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn surface_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::SurfaceCreation(format!("{}: {}", context, e)))
    }

    fn engine_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Engine(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}

/// [`PlayerError::Internal`] stamped with the call site
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)+) => {
        $crate::utils::error::PlayerError::Internal(format!(
            "{} ({}:{})",
            format_args!($($arg)+),
            file!(),
            line!()
        ))
    };
}
