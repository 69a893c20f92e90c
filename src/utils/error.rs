//! Error types for the decoding core
//!
//! This module defines the custom error types used throughout the crate.
//! We use thiserror for convenient error type definitions. Initialization
//! errors propagate to the caller; runtime decode errors are demoted to
//! log warnings by the pumps and never tear the pipeline down.

use thiserror::Error;

/// Main error type for the decoding core
#[derive(Error, Debug)]
pub enum MediaCoreError {
    /// Invalid argument passed by the caller (null container, bad stream index)
    #[error("Argument error: {0}")]
    Argument(String),

    /// Container-level failure: no usable codec, bad stream parameters
    #[error("Container error: {0}")]
    Container(String),

    /// Decoder errors surfaced outside the pump's swallow-and-log policy
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Stream carries a media type the core does not handle
    #[error("Unsupported media type: {0}")]
    Unsupported(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ffmpeg_next::Error> for MediaCoreError {
    fn from(err: ffmpeg_next::Error) -> Self {
        MediaCoreError::Decoder(format!("FFmpeg error: {}", err))
    }
}

impl From<std::ffi::NulError> for MediaCoreError {
    fn from(err: std::ffi::NulError) -> Self {
        MediaCoreError::Decoder(format!("FFI string error: {}", err))
    }
}

impl MediaCoreError {
    /// Create a container error from string
    pub fn container<S: Into<String>>(msg: S) -> Self {
        MediaCoreError::Container(msg.into())
    }

    /// Create a decoder error from string
    pub fn decoder<S: Into<String>>(msg: S) -> Self {
        MediaCoreError::Decoder(msg.into())
    }
}

/// Convenience type alias for Results in the decoding core
pub type Result<T> = std::result::Result<T, MediaCoreError>;

/// Extension trait for converting other errors to MediaCoreError
pub trait IntoMediaError<T> {
    /// Convert this error into a container error with the given context
    fn container_err(self, context: &str) -> Result<T>;
    /// Convert this error into a decoder error with the given context
    fn decoder_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoMediaError<T> for std::result::Result<T, E> {
    fn container_err(self, context: &str) -> Result<T> {
        self.map_err(|e| MediaCoreError::Container(format!("{}: {}", context, e)))
    }

    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| MediaCoreError::Decoder(format!("{}: {}", context, e)))
    }
}
