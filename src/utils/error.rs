//! Error types for playctl
//!
//! This module defines the error taxonomy used throughout the engine.
//! Synchronous failures are returned as `PlayerError`; faults detected on
//! the scheduling thread are additionally reported to the listener as a
//! `PlaybackError` code.

use crate::player::{Command, PlayerState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for playctl
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Command is not valid in the current lifecycle state
    #[error("Illegal state action: {command:?} not allowed in state {state:?}")]
    IllegalStateAction { command: Command, state: PlayerState },

    /// A required sub-component has not been created (or was released)
    #[error("Null pointer: {0} not available")]
    NullPointer(&'static str),

    /// Demultiplexer / source errors
    #[error("Demux error: {0}")]
    Demux(String),

    /// Video decode or render failure
    #[error("Video play failure: {0}")]
    VideoPlay(String),

    /// Audio decode or render failure
    #[error("Audio play failure: {0}")]
    AudioPlay(String),

    /// Decoder errors
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation not supported for the current media
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Invalid argument
    #[error("Illegal parameter: {0}")]
    IllegalParam(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a `PlayerError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IllegalStateAction,
    NullPointer,
    Demux,
    VideoPlay,
    AudioPlay,
    Timeout,
    NotSupported,
    IllegalParam,
    Unknown,
}

/// Error code delivered asynchronously through the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackError {
    /// Reading from the source failed
    DemuxFail,

    /// Video decoding or rendering failed
    VideoPlayFail,

    /// Audio decoding or rendering failed
    AudioPlayFail,

    /// Reserved
    Timeout,

    /// Anything else
    Unknown,
}

impl PlayerError {
    /// Create a demux error from string
    pub fn demux<S: Into<String>>(msg: S) -> Self {
        PlayerError::Demux(msg.into())
    }

    /// Create a decoder error from string
    pub fn decoder_error<S: Into<String>>(msg: S) -> Self {
        PlayerError::Decoder(msg.into())
    }

    /// Create a not-supported error from string
    pub fn not_supported<S: Into<String>>(msg: S) -> Self {
        PlayerError::NotSupported(msg.into())
    }

    /// Create an illegal-parameter error from string
    pub fn illegal_param<S: Into<String>>(msg: S) -> Self {
        PlayerError::IllegalParam(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::IllegalStateAction { .. } => ErrorKind::IllegalStateAction,
            PlayerError::NullPointer(_) => ErrorKind::NullPointer,
            PlayerError::Demux(_) => ErrorKind::Demux,
            PlayerError::VideoPlay(_) | PlayerError::Decoder(_) => ErrorKind::VideoPlay,
            PlayerError::AudioPlay(_) => ErrorKind::AudioPlay,
            PlayerError::Timeout(_) => ErrorKind::Timeout,
            PlayerError::NotSupported(_) => ErrorKind::NotSupported,
            PlayerError::IllegalParam(_) => ErrorKind::IllegalParam,
            PlayerError::Config(_) | PlayerError::FileIO(_) | PlayerError::Internal(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// Error code reported to the listener when this error happens at runtime
    pub fn playback_code(&self) -> PlaybackError {
        match self.kind() {
            ErrorKind::Demux => PlaybackError::DemuxFail,
            ErrorKind::VideoPlay => PlaybackError::VideoPlayFail,
            ErrorKind::AudioPlay => PlaybackError::AudioPlayFail,
            ErrorKind::Timeout => PlaybackError::Timeout,
            _ => PlaybackError::Unknown,
        }
    }
}

/// Convenience type alias for Results in playctl
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn demux_err(self, context: &str) -> Result<T>;
    fn decoder_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn demux_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Demux(format!("{}: {}", context, e)))
    }

    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Decoder(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
