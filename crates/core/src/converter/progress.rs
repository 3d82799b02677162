//! Progress parsing for the transcode tool's diagnostic stream.
//!
//! ffmpeg writes lines like
//! `frame=  123 fps= 30 q=28.0 size=    1024kB time=00:00:04.00 bitrate=2097.2kbits/s speed=1.2x`
//! to stderr, rewriting the status line with `\r` while it runs.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::VecDeque;

static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=(\d+):(\d+):(\d+\.\d+)").expect("time pattern is a valid regex")
});

/// Extracts the elapsed time in seconds from a status line.
///
/// Returns `None` for lines without a `time=HH:MM:SS.ff` token, and for
/// matches that do not produce a finite number.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    let caps = TIME_REGEX.captures(line)?;

    let field = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(f64::NAN)
    };

    let elapsed = field(1) * 3600.0 + field(2) * 60.0 + field(3);
    elapsed.is_finite().then_some(elapsed)
}

/// Longest unterminated line kept; older bytes are discarded past this.
pub const MAX_PENDING_LINE_BYTES: usize = 64 * 1024;

/// Splits an arbitrarily chunked byte stream into lines.
///
/// Both `\n` and `\r` terminate a line. Empty lines are skipped. The last
/// `tail_capacity` lines are retained for error reporting. A line longer
/// than [`MAX_PENDING_LINE_BYTES`] keeps only its most recent bytes.
#[derive(Debug)]
pub struct StderrLines {
    pending: Vec<u8>,
    tail: VecDeque<String>,
    tail_capacity: usize,
}

impl StderrLines {
    pub fn new(tail_capacity: usize) -> Self {
        Self {
            pending: Vec::new(),
            tail: VecDeque::with_capacity(tail_capacity),
            tail_capacity,
        }
    }

    /// Feeds a chunk and returns the lines it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = self.accept(&raw[..raw.len() - 1]) {
                lines.push(line);
            }
        }

        if self.pending.len() > MAX_PENDING_LINE_BYTES {
            let excess = self.pending.len() - MAX_PENDING_LINE_BYTES;
            self.pending.drain(..excess);
        }
        lines
    }

    /// Flushes a trailing line that was not terminated before end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        self.accept(&raw)
    }

    /// The retained tail, oldest line first, joined with `\n`.
    pub fn tail(&self) -> String {
        self.tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    fn accept(&mut self, raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw).trim_end().to_string();
        if line.is_empty() {
            return None;
        }

        if self.tail_capacity > 0 {
            if self.tail.len() == self.tail_capacity {
                self.tail.pop_front();
            }
            self.tail.push_back(line.clone());
        }
        Some(line)
    }
}
