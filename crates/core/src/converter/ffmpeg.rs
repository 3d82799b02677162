//! FFmpeg/FFprobe-backed toolchain.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::{MediaToolchain, TranscodeProcess};
use super::types::{ConversionRequest, ExitOutcome};

/// Video encoder used for every conversion.
pub const VIDEO_ENCODER: &str = "libx264";

/// Builds ffprobe arguments that print only the container duration in seconds.
pub fn probe_args(input: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        input.to_string_lossy().to_string(),
    ]
}

/// Builds ffmpeg arguments for a conversion.
///
/// Overwrites the output, re-encodes video with [`VIDEO_ENCODER`], copies the
/// audio stream verbatim and forces the output format.
pub fn transcode_args(request: &ConversionRequest) -> Vec<String> {
    vec![
        "-i".to_string(),
        request.input_path.to_string_lossy().to_string(),
        "-y".to_string(),
        "-c:v".to_string(),
        VIDEO_ENCODER.to_string(),
        "-strict".to_string(),
        "-2".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        request.output_format.clone(),
        request.output_path.to_string_lossy().to_string(),
    ]
}

/// Parses ffprobe's duration output.
///
/// Empty, non-numeric, negative and non-finite values are all probe failures.
pub fn parse_duration_output(stdout: &str) -> Result<f64, ConverterError> {
    let trimmed = stdout.trim();
    let duration = trimmed.parse::<f64>().map_err(|e| {
        ConverterError::probe_failed(format!("unparsable duration {:?}: {}", trimmed, e))
    })?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(ConverterError::probe_failed(format!(
            "invalid duration {:?}",
            trimmed
        )));
    }

    Ok(duration)
}

/// Toolchain that shells out to ffprobe and ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegToolchain {
    config: ConverterConfig,
}

impl FfmpegToolchain {
    /// Creates a new toolchain with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a toolchain with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Runs `<path> -version`; a binary that starts but exits non-zero is an error.
    async fn check_version(path: &Path) -> std::io::Result<()> {
        let status = Command::new(path)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "{} -version exited with status {}",
                path.display(),
                ExitOutcome::from(status)
            )))
        }
    }
}

#[async_trait]
impl MediaToolchain for FfmpegToolchain {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64, ConverterError> {
        let output = Command::new(&self.config.ffprobe_path)
            .args(probe_args(input))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ConverterError::probe_failed(format!(
                    "failed to run {}: {}",
                    self.config.ffprobe_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ConverterError::probe_failed(format!(
                "ffprobe exited with status {}: {}",
                ExitOutcome::from(output.status),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration = parse_duration_output(&stdout)?;
        debug!(input = %input.display(), duration, "Probed media duration");
        Ok(duration)
    }

    async fn spawn_transcode(&self, args: &[String]) -> Result<TranscodeProcess, ConverterError> {
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConverterError::SpawnFailed {
                path: self.config.ffmpeg_path.clone(),
                source,
            })?;

        debug!(pid = ?child.id(), "Spawned transcode process");

        let stderr = child.stderr.take().ok_or_else(|| {
            ConverterError::Io(std::io::Error::other("transcode stderr was not captured"))
        })?;

        Ok(TranscodeProcess {
            stderr: Box::pin(stderr),
            exit: Box::pin(async move { child.wait().await.map(ExitOutcome::from) }),
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        if let Err(e) = Self::check_version(&self.config.ffmpeg_path).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        if let Err(e) = Self::check_version(&self.config.ffprobe_path).await {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(ConverterError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(ConverterError::Io(e));
        }

        Ok(())
    }
}
