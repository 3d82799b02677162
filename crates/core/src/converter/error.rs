//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

use super::types::ExitOutcome;

/// Message returned to callers when the duration probe fails.
pub const PROBE_FAILED_MESSAGE: &str = "Unable to determine video duration";

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Duration probe failed: unreachable tool, non-zero exit or unparsable output.
    #[error("Failed to probe media duration: {reason}")]
    ProbeFailed { reason: String },

    /// Transcode process could not be spawned.
    #[error("Failed to spawn {}: {source}", path.display())]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transcode process exited unsuccessfully.
    #[error("Transcode tool exited with status {exit}")]
    TranscodeFailed {
        exit: ExitOutcome,
        stderr: Option<String>,
    },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a transcode failure, keeping the stderr tail only when non-empty.
    pub fn transcode_failed(exit: ExitOutcome, stderr: String) -> Self {
        Self::TranscodeFailed {
            exit,
            stderr: if stderr.trim().is_empty() {
                None
            } else {
                Some(stderr)
            },
        }
    }

    /// Message surfaced in a negative `ConversionResult`.
    ///
    /// Probe failures get a generic message; the raw reason is only logged.
    pub fn user_message(&self) -> String {
        match self {
            Self::ProbeFailed { .. } | Self::FfprobeNotFound { .. } => {
                PROBE_FAILED_MESSAGE.to_string()
            }
            Self::SpawnFailed { source, .. } => source.to_string(),
            Self::TranscodeFailed {
                stderr: Some(stderr),
                ..
            } => stderr.clone(),
            Self::TranscodeFailed { exit, stderr: None } => {
                format!("transcode tool exited with status {}", exit)
            }
            other => other.to_string(),
        }
    }
}
