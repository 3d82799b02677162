//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`MediaToolchain`](crate::converter::MediaToolchain)
//! so the conversion service can be exercised without ffmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidconv_core::testing::{fixtures, MockToolchain};
//!
//! let toolchain = MockToolchain::new();
//! toolchain.set_duration(120.0).await;
//! toolchain.set_stderr_chunks(fixtures::status_lines(&[30.0, 60.0, 120.0])).await;
//! ```

mod mock_toolchain;

pub use mock_toolchain::MockToolchain;

/// Test fixtures and helper functions.
pub mod fixtures {
    /// Formats seconds the way ffmpeg prints `time=` (`HH:MM:SS.ff`).
    pub fn ffmpeg_timestamp(secs: f64) -> String {
        let centis = (secs * 100.0).round() as u64;
        let hours = centis / 360_000;
        let minutes = (centis / 6_000) % 60;
        let seconds = (centis / 100) % 60;
        format!("{:02}:{:02}:{:02}.{:02}", hours, minutes, seconds, centis % 100)
    }

    /// A realistic ffmpeg status line for the given elapsed time, `\r` terminated.
    pub fn status_line(secs: f64) -> String {
        format!(
            "frame={:>5} fps= 25 q=28.0 size=    1024kB time={} bitrate=2097.2kbits/s speed=4.0x\r",
            (secs * 25.0) as u64,
            ffmpeg_timestamp(secs)
        )
    }

    /// One status line chunk per elapsed time.
    pub fn status_lines(times: &[f64]) -> Vec<String> {
        times.iter().map(|t| status_line(*t)).collect()
    }

}
