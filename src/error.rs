//! Error types for the decode pipeline (thiserror-based).
//!
//! Streaming conditions (incomplete NAL data, overflow) are not errors and never
//! show up here; they surface as an empty frame list plus a [`DecodeStatus`].
//!
//! [`DecodeStatus`]: crate::decoder::DecodeStatus

use std::time::Duration;

use thiserror::Error;

/// Faults raised inside a decode backend. The facade catches every one of these.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("{backend} backend failed: {reason}")]
    Failed {
        backend: &'static str,
        reason: String,
    },

    #[error("{backend} backend timed out after {elapsed:?}")]
    Timeout {
        backend: &'static str,
        elapsed: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub fn failed(backend: &'static str, reason: impl ToString) -> Self {
        Self::Failed {
            backend,
            reason: reason.to_string(),
        }
    }

    /// True when retrying with more data cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Raised when building a frame by hand with bad geometry.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimension {width}x{height}: both must be positive")]
    InvalidDimension { width: usize, height: usize },

    #[error("pixel buffer holds {actual} bytes, {expected} required for {height} rows of stride {stride}")]
    ShortBuffer {
        expected: usize,
        actual: usize,
        stride: usize,
        height: usize,
    },

    #[error("stride {stride} is smaller than one BGR row ({row} bytes)")]
    StrideTooSmall { stride: usize, row: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
