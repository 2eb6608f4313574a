//! Error taxonomy for capture sessions.
//!
//! Every failure the recorder can hit falls into one of four classes. The class
//! decides what happens next:
//!
//! - `Config`: rejected before any device interaction.
//! - `Device`: fatal for initialize/start/set_mode/request_frame; logged only
//!   when stopping the camera.
//! - `DataUnavailable`: fatal for the run, no file is written for the frame.
//! - `Io`: logged by the writer, never aborts the capture loop.

use std::path::PathBuf;

use thiserror::Error;

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("device error: {operation} failed: {message}")]
    Device {
        operation: &'static str,
        message: String,
    },

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wrap a camera-adapter error. The full context chain is kept in the message.
    pub fn device(operation: &'static str, err: anyhow::Error) -> Self {
        Self::Device {
            operation,
            message: format!("{:#}", err),
        }
    }

    pub fn data_unavailable(message: impl Into<String>) -> Self {
        Self::DataUnavailable(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error ends the session. Write failures do not.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}
