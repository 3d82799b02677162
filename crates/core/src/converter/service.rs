//! Conversion orchestration: probe, spawn, relay progress, report.

use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics::{
    CONVERSIONS_ACTIVE, CONVERSIONS_TOTAL, CONVERSION_DURATION, PROGRESS_EVENTS_TOTAL,
};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::ffmpeg::transcode_args;
use super::progress::{parse_progress_time, StderrLines};
use super::traits::MediaToolchain;
use super::types::{ConversionRequest, ConversionResult, ConversionState, ProgressEvent};

/// Runs conversions against a [`MediaToolchain`].
///
/// Each call to [`convert`](Self::convert) owns its processes and its
/// progress listener; concurrent calls share nothing.
pub struct ConversionService<T: MediaToolchain + ?Sized> {
    toolchain: Arc<T>,
    read_chunk_size: usize,
    stderr_tail_lines: usize,
}

impl<T: MediaToolchain + ?Sized> Clone for ConversionService<T> {
    fn clone(&self) -> Self {
        Self {
            toolchain: Arc::clone(&self.toolchain),
            read_chunk_size: self.read_chunk_size,
            stderr_tail_lines: self.stderr_tail_lines,
        }
    }
}

/// Holds one slot of the active-conversions gauge until dropped.
struct ActiveGuard;

impl ActiveGuard {
    fn acquire() -> Self {
        CONVERSIONS_ACTIVE.inc();
        Self
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        CONVERSIONS_ACTIVE.dec();
    }
}

/// Tracks the lifecycle of one conversion.
struct Lifecycle {
    state: ConversionState,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: ConversionState::Idle,
        }
    }

    fn advance(&mut self, next: ConversionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Conversion state changed");
        self.state = next;
    }
}

impl<T: MediaToolchain> ConversionService<T> {
    /// Creates a new service.
    pub fn new(toolchain: T, config: &ConverterConfig) -> Self {
        Self::from_shared(Arc::new(toolchain), config)
    }
}

impl<T: MediaToolchain + ?Sized> ConversionService<T> {
    /// Creates a service around a shared, possibly type-erased, toolchain.
    ///
    /// Only the stderr settings are taken from `config`; tool paths belong
    /// to the toolchain.
    pub fn from_shared(toolchain: Arc<T>, config: &ConverterConfig) -> Self {
        Self {
            toolchain,
            read_chunk_size: config.read_chunk_size,
            stderr_tail_lines: config.stderr_tail_lines,
        }
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    /// Converts a file, calling `on_progress` for every progress line.
    ///
    /// Never fails: every failure is reported as a negative result. No progress
    /// is delivered after this future resolves.
    pub async fn convert<F>(&self, request: ConversionRequest, mut on_progress: F) -> ConversionResult
    where
        F: FnMut(ProgressEvent) + Send,
    {
        let start = Instant::now();
        let mut lifecycle = Lifecycle::new();
        let active = ActiveGuard::acquire();

        info!(
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            format = %request.output_format,
            toolchain = self.toolchain.name(),
            "Starting conversion"
        );

        let outcome = self.run(&request, &mut lifecycle, &mut on_progress).await;

        drop(active);
        let label = lifecycle.state.as_str();
        CONVERSIONS_TOTAL.with_label_values(&[label]).inc();
        CONVERSION_DURATION
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                info!(
                    output = %request.output_path.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Conversion succeeded"
                );
                ConversionResult::succeeded()
            }
            Err(e) => {
                warn!(
                    input = %request.input_path.display(),
                    state = %lifecycle.state,
                    error = %e,
                    "Conversion failed"
                );
                ConversionResult::failed(e.user_message())
            }
        }
    }

    /// Converts a file, forwarding progress to a channel.
    ///
    /// Events are sent with `try_send`: a full or closed channel drops the
    /// event without affecting the conversion.
    pub async fn convert_with_channel(
        &self,
        request: ConversionRequest,
        progress_tx: mpsc::Sender<ProgressEvent>,
    ) -> ConversionResult {
        self.convert(request, move |event| {
            if let Err(e) = progress_tx.try_send(event) {
                debug!("Dropped progress event: {}", e);
            }
        })
        .await
    }

    async fn run<F>(
        &self,
        request: &ConversionRequest,
        lifecycle: &mut Lifecycle,
        on_progress: &mut F,
    ) -> Result<(), ConverterError>
    where
        F: FnMut(ProgressEvent) + Send,
    {
        lifecycle.advance(ConversionState::Probing);
        let total_duration = match self.toolchain.probe_duration(&request.input_path).await {
            Ok(duration) => duration,
            Err(e) => {
                lifecycle.advance(ConversionState::ProbeFailed);
                return Err(e);
            }
        };

        lifecycle.advance(ConversionState::Transcoding);
        let args = transcode_args(request);
        debug!(?args, "Transcode arguments");

        let process = match self.toolchain.spawn_transcode(&args).await {
            Ok(process) => process,
            Err(e) => {
                lifecycle.advance(ConversionState::Failed);
                return Err(e);
            }
        };

        let mut lines = StderrLines::new(self.stderr_tail_lines);
        let emitted = relay_progress(
            process.stderr,
            self.read_chunk_size,
            &mut lines,
            total_duration,
            on_progress,
        )
        .await;
        debug!(events = emitted, "Diagnostic stream closed");

        let exit = match process.exit.await {
            Ok(exit) => exit,
            Err(e) => {
                lifecycle.advance(ConversionState::Failed);
                return Err(ConverterError::Io(e));
            }
        };

        if exit.success() {
            lifecycle.advance(ConversionState::Succeeded);
            Ok(())
        } else {
            lifecycle.advance(ConversionState::Failed);
            Err(ConverterError::transcode_failed(exit, lines.tail()))
        }
    }
}

/// Reads the diagnostic stream to its end, emitting one event per progress line.
///
/// Returns the number of events emitted. A read error ends the stream early.
async fn relay_progress<R, F>(
    mut stderr: R,
    chunk_size: usize,
    lines: &mut StderrLines,
    total_duration: f64,
    on_progress: &mut F,
) -> usize
where
    R: AsyncRead + Unpin,
    F: FnMut(ProgressEvent),
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut emitted = 0;

    let mut emit = |line: &str| {
        if let Some(current_time) = parse_progress_time(line) {
            PROGRESS_EVENTS_TOTAL.inc();
            on_progress(ProgressEvent {
                current_time,
                total_duration,
            });
            emitted += 1;
        }
    };

    loop {
        match stderr.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in lines.push(&buf[..n]) {
                    emit(&line);
                }
            }
            Err(e) => {
                warn!("Failed to read transcode diagnostics: {}", e);
                break;
            }
        }
    }

    if let Some(line) = lines.finish() {
        emit(&line);
    }

    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockToolchain;
    use std::path::PathBuf;

    fn request() -> ConversionRequest {
        ConversionRequest::new("video.rmvb", "video.mp4", "mp4")
    }

    fn service(toolchain: MockToolchain) -> ConversionService<MockToolchain> {
        ConversionService::new(toolchain, &ConverterConfig::default())
    }

    async fn collect(
        service: &ConversionService<MockToolchain>,
    ) -> (ConversionResult, Vec<ProgressEvent>) {
        let mut events = Vec::new();
        let result = service.convert(request(), |e| events.push(e)).await;
        (result, events)
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let toolchain = MockToolchain::new();
        toolchain.set_duration(120.0).await;
        toolchain
            .set_stderr_chunks(vec![
                "frame=  750 fps=250 time=00:00:30.00 speed=10x\r",
                "frame= 1500 fps=250 time=00:01:00.00 speed=10x\r",
                "frame= 3000 fps=250 time=00:02:00.00 speed=10x\n",
            ])
            .await;
        toolchain.set_exit_code(0).await;

        let service = service(toolchain.clone());
        let (result, events) = collect(&service).await;

        assert_eq!(result, ConversionResult::succeeded());
        let times: Vec<f64> = events.iter().map(|e| e.current_time).collect();
        assert_eq!(times, vec![30.0, 60.0, 120.0]);
        assert!(events.iter().all(|e| e.total_duration == 120.0));

        let spawned = toolchain.recorded_spawns().await;
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0], transcode_args(&request()));
        assert_eq!(
            toolchain.recorded_probes().await,
            vec![PathBuf::from("video.rmvb")]
        );
    }

    #[tokio::test]
    async fn test_probe_failure_skips_transcode() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_probe_error(ConverterError::probe_failed("ffprobe exited with status 1"))
            .await;

        let service = service(toolchain.clone());
        let (result, events) = collect(&service).await;

        assert!(!result.success);
        assert_eq!(
            result.message.as_deref(),
            Some(crate::converter::PROBE_FAILED_MESSAGE)
        );
        assert!(events.is_empty());
        assert_eq!(toolchain.probe_count().await, 1);
        assert_eq!(toolchain.spawn_count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_uses_error_message() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_spawn_error(ConverterError::SpawnFailed {
                path: PathBuf::from("/resources/ffmpeg"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "spawn ENOENT"),
            })
            .await;

        let service = service(toolchain);
        let (result, events) = collect(&service).await;

        assert_eq!(result, ConversionResult::failed("spawn ENOENT"));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_success_without_progress() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(Vec::<String>::new()).await;
        toolchain.set_exit_code(0).await;

        let (result, events) = collect(&service(toolchain)).await;
        assert!(result.success);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr_tail() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_stderr_chunks(vec![
                "time=00:00:01.00\r",
                "Error while decoding stream #0:0\n",
                "Conversion failed!\n",
            ])
            .await;
        toolchain.set_exit_code(1).await;

        let (result, events) = collect(&service(toolchain)).await;
        assert!(!result.success);
        let message = result.message.unwrap();
        assert!(message.ends_with("Error while decoding stream #0:0\nConversion failed!"));
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_stderr_settings_come_from_config() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_stderr_chunks(vec!["first\n", "second\n", "last words\n"])
            .await;
        toolchain.set_exit_code(1).await;

        let config = ConverterConfig::default()
            .with_read_chunk_size(3)
            .with_stderr_tail_lines(1);
        let service = ConversionService::new(toolchain, &config);
        let (result, _) = collect(&service).await;

        assert_eq!(result, ConversionResult::failed("last words"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_without_stderr() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(Vec::<String>::new()).await;
        toolchain.set_exit_code(1).await;

        let (result, _) = collect(&service(toolchain)).await;
        assert_eq!(
            result,
            ConversionResult::failed("transcode tool exited with status 1")
        );
    }

    #[tokio::test]
    async fn test_timestamp_split_across_chunks() {
        let toolchain = MockToolchain::new();
        toolchain.set_duration(10.0).await;
        toolchain
            .set_stderr_chunks(vec!["frame=1 time=00:00:0", "5.50 speed=1x\r"])
            .await;

        let (result, events) = collect(&service(toolchain)).await;
        assert!(result.success);
        assert_eq!(
            events,
            vec![ProgressEvent {
                current_time: 5.5,
                total_duration: 10.0
            }]
        );
    }

    #[tokio::test]
    async fn test_progress_is_pass_through() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_stderr_chunks(vec!["time=00:00:20.00\r", "time=00:00:10.00\r"])
            .await;

        let (_, events) = collect(&service(toolchain)).await;
        let times: Vec<f64> = events.iter().map(|e| e.current_time).collect();
        assert_eq!(times, vec![20.0, 10.0]);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_flushed() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(vec!["time=00:00:42.00"]).await;

        let (_, events) = collect(&service(toolchain)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].current_time, 42.0);
    }

    #[tokio::test]
    async fn test_wait_error_is_reported() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_wait_error(std::io::Error::other("wait failed"))
            .await;

        let (result, _) = collect(&service(toolchain)).await;
        assert!(!result.success);
        assert!(result.message.unwrap().contains("wait failed"));
    }

    #[tokio::test]
    async fn test_convert_with_channel_drops_when_full() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_stderr_chunks(vec![
                "time=00:00:01.00\r",
                "time=00:00:02.00\r",
                "time=00:00:03.00\r",
            ])
            .await;

        let (tx, mut rx) = mpsc::channel(1);
        let result = service(toolchain).convert_with_channel(request(), tx).await;

        assert!(result.success);
        let first = rx.recv().await.unwrap();
        assert_eq!(first.current_time, 1.0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_convert_with_closed_channel() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(vec!["time=00:00:01.00\r"]).await;

        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let result = service(toolchain).convert_with_channel(request(), tx).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_concurrent_conversions_keep_listeners_apart() {
        let fast = MockToolchain::new();
        fast.set_duration(60.0).await;
        fast.set_stderr_chunks(vec!["time=00:00:30.00\r"]).await;

        let slow = MockToolchain::new();
        slow.set_duration(90.0).await;
        slow.set_stderr_chunks(vec!["time=00:00:45.00\r", "time=00:01:30.00\r"])
            .await;

        let fast = service(fast);
        let slow = service(slow);

        let ((fast_result, fast_events), (slow_result, slow_events)) =
            tokio::join!(collect(&fast), collect(&slow));

        assert!(fast_result.success && slow_result.success);
        assert_eq!(fast_events.len(), 1);
        assert!(fast_events.iter().all(|e| e.total_duration == 60.0));
        assert_eq!(slow_events.len(), 2);
        assert!(slow_events.iter().all(|e| e.total_duration == 90.0));
    }

    #[tokio::test]
    async fn test_relay_progress_over_mock_reader() {
        let reader = tokio_test::io::Builder::new()
            .read(b"Input #0, rm, from 'video.rmvb':\n")
            .read(b"frame=1 time=00:00:")
            .read(b"04.00 speed=1x\rframe=2 time=01:02:03.50\r")
            .build();

        let mut lines = StderrLines::new(4);
        let mut events = Vec::new();
        let emitted = relay_progress(reader, 8, &mut lines, 4000.0, &mut |e| events.push(e)).await;

        assert_eq!(emitted, 2);
        assert_eq!(events[0].current_time, 4.0);
        assert_eq!(events[1].current_time, 3723.5);
        assert!(lines.tail().starts_with("Input #0"));
    }
}
