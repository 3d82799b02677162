//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A single conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    /// Input file path (must exist).
    pub input_path: PathBuf,
    /// Output file path (overwritten if present).
    pub output_path: PathBuf,
    /// Container/format token passed to the transcode tool's `-f`.
    pub output_format: String,
}

impl ConversionRequest {
    /// Creates a new request.
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            output_format: output_format.into(),
        }
    }
}

/// Terminal outcome of a conversion, produced exactly once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConversionResult {
    /// A successful result.
    pub fn succeeded() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// A failed result carrying a human-readable reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Progress update during conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Elapsed processed time in seconds, as reported by the transcode tool.
    pub current_time: f64,
    /// Total input duration in seconds, fixed for the whole conversion.
    pub total_duration: f64,
}

impl ProgressEvent {
    /// Progress percentage (0.0 - 100.0), or `None` when the duration is unknown.
    pub fn percent(&self) -> Option<f32> {
        if self.total_duration > 0.0 {
            Some((self.current_time / self.total_duration * 100.0).clamp(0.0, 100.0) as f32)
        } else {
            None
        }
    }
}

/// Lifecycle of a single conversion.
///
/// `Idle -> Probing -> {ProbeFailed | Transcoding} -> {Succeeded | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    Idle,
    Probing,
    ProbeFailed,
    Transcoding,
    Succeeded,
    Failed,
}

impl ConversionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ProbeFailed | Self::Succeeded | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: ConversionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Probing)
                | (Self::Probing, Self::ProbeFailed)
                | (Self::Probing, Self::Transcoding)
                | (Self::Transcoding, Self::Succeeded)
                | (Self::Transcoding, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::ProbeFailed => "probe_failed",
            Self::Transcoding => "transcoding",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit status of a finished transcode process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{}", code),
            None => f.write_str("signal"),
        }
    }
}
