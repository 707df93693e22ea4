//! Error types shared across Framewright crates.

use std::path::PathBuf;

/// Top-level error type for Framewright operations.
///
/// Stream-scoped variants carry the stream label (`"video"`, `"audio"`)
/// so a failure can always be attributed to one side of a frame pair.
#[derive(Debug, thiserror::Error)]
pub enum FramewrightError {
    #[error("Module not found: {class} module '{name}' for {media}")]
    ModuleNotFound {
        class: &'static str,
        name: String,
        media: String,
    },

    #[error("Module '{module}' error: {message}")]
    ModuleConfig { module: String, message: String },

    #[error("Incompatible modules: {message}")]
    Incompatible { message: String },

    #[error("Error encoding {stream} frame: {message}")]
    Encode {
        stream: &'static str,
        message: String,
    },

    #[error("Error flushing {stream} encoder: {message}")]
    Flush {
        stream: &'static str,
        message: String,
    },

    #[error("{stream} multiplexor error: {message}")]
    Mux {
        stream: &'static str,
        message: String,
    },

    #[error("Rotation to {path} failed: {message}")]
    Rotation { path: PathBuf, message: String },

    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid state: {message}")]
    State { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error("{} errors: {}", .0.len(), join_errors(.0))]
    Multiple(Vec<FramewrightError>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramewrightError.
pub type FramewrightResult<T> = Result<T, FramewrightError>;

fn join_errors(errors: &[FramewrightError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl FramewrightError {
    pub fn module_not_found(
        class: &'static str,
        name: impl Into<String>,
        media: impl Into<String>,
    ) -> Self {
        Self::ModuleNotFound {
            class,
            name: name.into(),
            media: media.into(),
        }
    }

    pub fn module_config(module: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ModuleConfig {
            module: module.into(),
            message: msg.into(),
        }
    }

    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::Incompatible {
            message: msg.into(),
        }
    }

    pub fn encode(stream: &'static str, msg: impl Into<String>) -> Self {
        Self::Encode {
            stream,
            message: msg.into(),
        }
    }

    pub fn flush(stream: &'static str, msg: impl Into<String>) -> Self {
        Self::Flush {
            stream,
            message: msg.into(),
        }
    }

    pub fn mux(stream: &'static str, msg: impl Into<String>) -> Self {
        Self::Mux {
            stream,
            message: msg.into(),
        }
    }

    pub fn rotation(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Rotation {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Collapse a list of errors: `Ok` when empty, the error itself when
    /// there is exactly one, `Multiple` otherwise.
    pub fn aggregate(mut errors: Vec<FramewrightError>) -> FramewrightResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}
