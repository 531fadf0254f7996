//! Error taxonomy for the player library.
//!
//! Startup failures (format, open, decode, device) are fatal and surface to the binary.
//! Runtime control operations clamp instead of failing, so `SeekOutOfRange` and
//! `InvalidSpeed` never escape the [`Controller`](crate::controller::Controller).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// File extension is not one of the supported codecs.
    #[error("unsupported file type: {extension:?}")]
    UnsupportedFormat { extension: String },

    #[error("open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The codec rejected the file content.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The output device could not be opened at the requested rate/buffer size.
    #[error("output device init failed: {0}")]
    DeviceInit(String),

    #[error("seek to frame {frame} is outside 0..={len}")]
    SeekOutOfRange { frame: usize, len: usize },

    #[error("speed ratio must be positive and finite, got {0}")]
    InvalidSpeed(f64),
}

impl From<symphonia::core::errors::Error> for PlayerError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        PlayerError::Decode(err.to_string())
    }
}

pub type Result<T, E = PlayerError> = std::result::Result<T, E>;
