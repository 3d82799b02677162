//! Converter module for transcoding video files through ffmpeg.
//!
//! A conversion probes the input's duration with ffprobe, runs ffmpeg with a
//! fixed argument template, and relays the `time=` values ffmpeg prints on
//! stderr as [`ProgressEvent`]s.
//!
//! # Example
//!
//! ```ignore
//! use vidconv_core::converter::{
//!     ConversionRequest, ConversionService, ConverterConfig, FfmpegToolchain,
//! };
//!
//! let config = ConverterConfig::default();
//! let service = ConversionService::new(FfmpegToolchain::new(config.clone()), &config);
//!
//! let request = ConversionRequest::new("video.rmvb", "video.mp4", "mp4");
//! let result = service
//!     .convert(request, |p| println!("{:.1}/{:.1}s", p.current_time, p.total_duration))
//!     .await;
//!
//! if !result.success {
//!     eprintln!("conversion failed: {}", result.message.unwrap_or_default());
//! }
//! ```

mod config;
mod error;
mod ffmpeg;
mod progress;
mod service;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::{ConverterError, PROBE_FAILED_MESSAGE};
pub use ffmpeg::{parse_duration_output, probe_args, transcode_args, FfmpegToolchain, VIDEO_ENCODER};
pub use progress::{parse_progress_time, StderrLines};
pub use service::ConversionService;
pub use traits::{MediaToolchain, TranscodeProcess};
pub use types::{ConversionRequest, ConversionResult, ConversionState, ExitOutcome, ProgressEvent};
