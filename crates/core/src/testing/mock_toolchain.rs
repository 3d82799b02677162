//! Mock toolchain for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::converter::{ConverterError, ExitOutcome, MediaToolchain, TranscodeProcess};

/// Pipe capacity between the simulated transcode process and its reader.
const STDERR_PIPE_CAPACITY: usize = 64 * 1024;

/// Mock implementation of the MediaToolchain trait.
///
/// Provides controllable behavior for testing:
/// - Configure the probed duration or a probe failure
/// - Feed the diagnostic stream as a sequence of chunks, optionally paced
/// - Choose the exit code, or fail the spawn or the wait
/// - Record every probe and spawn for assertions
///
/// # Example
///
/// ```rust,ignore
/// use vidconv_core::testing::MockToolchain;
///
/// let toolchain = MockToolchain::new();
/// toolchain.set_duration(120.0).await;
/// toolchain.set_stderr_chunks(vec!["time=00:01:00.00\r"]).await;
///
/// let service = ConversionService::new(toolchain.clone(), &ConverterConfig::default());
/// let result = service.convert(request, |_| {}).await;
///
/// assert_eq!(toolchain.spawn_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockToolchain {
    /// Duration returned by successful probes.
    duration: Arc<RwLock<f64>>,
    /// If set, the next probe fails with this error.
    probe_error: Arc<RwLock<Option<ConverterError>>>,
    /// If set, the next spawn fails with this error.
    spawn_error: Arc<RwLock<Option<ConverterError>>>,
    /// If set, the next process wait fails with this error.
    wait_error: Arc<RwLock<Option<std::io::Error>>>,
    /// If set, the next validation fails with this error.
    validate_error: Arc<RwLock<Option<ConverterError>>>,
    /// Chunks written to the simulated stderr, in order.
    stderr_chunks: Arc<RwLock<Vec<Vec<u8>>>>,
    /// Pause before each chunk after the first.
    chunk_delay: Arc<RwLock<Option<Duration>>>,
    /// Exit code of the simulated process.
    exit_code: Arc<RwLock<i32>>,
    /// Spawned processes whose handle has not been released yet.
    live_processes: Arc<AtomicUsize>,
    /// Recorded probe inputs.
    probes: Arc<RwLock<Vec<PathBuf>>>,
    /// Recorded spawn argument lists.
    spawns: Arc<RwLock<Vec<Vec<String>>>>,
}

impl Default for MockToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolchain {
    /// Create a new mock toolchain: 60 s duration, silent stderr, exit 0.
    pub fn new() -> Self {
        Self {
            duration: Arc::new(RwLock::new(60.0)),
            probe_error: Arc::new(RwLock::new(None)),
            spawn_error: Arc::new(RwLock::new(None)),
            wait_error: Arc::new(RwLock::new(None)),
            validate_error: Arc::new(RwLock::new(None)),
            stderr_chunks: Arc::new(RwLock::new(Vec::new())),
            chunk_delay: Arc::new(RwLock::new(None)),
            exit_code: Arc::new(RwLock::new(0)),
            live_processes: Arc::new(AtomicUsize::new(0)),
            probes: Arc::new(RwLock::new(Vec::new())),
            spawns: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the duration returned by probes.
    pub async fn set_duration(&self, secs: f64) {
        *self.duration.write().await = secs;
    }

    /// Configure the next probe to fail.
    pub async fn set_probe_error(&self, error: ConverterError) {
        *self.probe_error.write().await = Some(error);
    }

    /// Configure the next spawn to fail.
    pub async fn set_spawn_error(&self, error: ConverterError) {
        *self.spawn_error.write().await = Some(error);
    }

    /// Configure the next process wait to fail.
    pub async fn set_wait_error(&self, error: std::io::Error) {
        *self.wait_error.write().await = Some(error);
    }

    /// Configure the next validation to fail.
    pub async fn set_validate_error(&self, error: ConverterError) {
        *self.validate_error.write().await = Some(error);
    }

    /// Set the chunks the simulated process writes to stderr.
    pub async fn set_stderr_chunks<I, C>(&self, chunks: I)
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        *self.stderr_chunks.write().await = chunks.into_iter().map(Into::into).collect();
    }

    /// Keep the simulated stderr open for `delay` between chunks.
    pub async fn set_chunk_delay(&self, delay: Duration) {
        *self.chunk_delay.write().await = Some(delay);
    }

    /// Set the exit code of the simulated process.
    pub async fn set_exit_code(&self, code: i32) {
        *self.exit_code.write().await = code;
    }

    /// Inputs passed to `probe_duration`, in call order.
    pub async fn recorded_probes(&self) -> Vec<PathBuf> {
        self.probes.read().await.clone()
    }

    /// Argument lists passed to `spawn_transcode`, in call order.
    pub async fn recorded_spawns(&self) -> Vec<Vec<String>> {
        self.spawns.read().await.clone()
    }

    /// Number of probe invocations.
    pub async fn probe_count(&self) -> usize {
        self.probes.read().await.len()
    }

    /// Spawned processes whose exit future has neither completed nor been dropped.
    pub fn live_process_count(&self) -> usize {
        self.live_processes.load(Ordering::SeqCst)
    }

    /// Number of transcode spawn attempts.
    pub async fn spawn_count(&self) -> usize {
        self.spawns.read().await.len()
    }
}

/// Counts a simulated process as live until the exit future is done with it.
#[derive(Debug)]
struct ProcessHandle(Arc<AtomicUsize>);

impl ProcessHandle {
    fn register(live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaToolchain for MockToolchain {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe_duration(&self, input: &Path) -> Result<f64, ConverterError> {
        self.probes.write().await.push(input.to_path_buf());

        if let Some(err) = self.probe_error.write().await.take() {
            return Err(err);
        }
        Ok(*self.duration.read().await)
    }

    async fn spawn_transcode(&self, args: &[String]) -> Result<TranscodeProcess, ConverterError> {
        self.spawns.write().await.push(args.to_vec());

        if let Some(err) = self.spawn_error.write().await.take() {
            return Err(err);
        }

        let chunks = self.stderr_chunks.read().await.clone();
        let code = *self.exit_code.read().await;
        let wait_error = self.wait_error.write().await.take();
        let chunk_delay = *self.chunk_delay.read().await;
        let handle = ProcessHandle::register(Arc::clone(&self.live_processes));

        let (reader, mut writer) = tokio::io::duplex(STDERR_PIPE_CAPACITY);
        let writer_task = tokio::spawn(async move {
            for (i, chunk) in chunks.into_iter().enumerate() {
                if let Some(delay) = chunk_delay.filter(|_| i > 0) {
                    tokio::time::sleep(delay).await;
                }
                if writer.write_all(&chunk).await.is_err() {
                    break;
                }
                // Let the reader observe each chunk separately.
                tokio::task::yield_now().await;
            }
        });

        Ok(TranscodeProcess {
            stderr: Box::pin(reader),
            exit: Box::pin(async move {
                let _handle = handle;
                let _ = writer_task.await;
                match wait_error {
                    Some(err) => Err(err),
                    None => Ok(ExitOutcome::from_code(code)),
                }
            }),
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        if let Some(err) = self.validate_error.write().await.take() {
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_probe_records_and_returns_duration() {
        let toolchain = MockToolchain::new();
        toolchain.set_duration(120.0).await;

        let duration = toolchain.probe_duration(Path::new("/in/video.rmvb")).await.unwrap();
        assert_eq!(duration, 120.0);
        assert_eq!(
            toolchain.recorded_probes().await,
            vec![PathBuf::from("/in/video.rmvb")]
        );
    }

    #[tokio::test]
    async fn test_probe_error_is_consumed() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_probe_error(ConverterError::probe_failed("boom"))
            .await;

        assert!(toolchain.probe_duration(Path::new("a")).await.is_err());
        assert!(toolchain.probe_duration(Path::new("a")).await.is_ok());
        assert_eq!(toolchain.probe_count().await, 2);
    }

    #[tokio::test]
    async fn test_spawned_process_streams_chunks() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(vec!["abc", "def"]).await;
        toolchain.set_exit_code(2).await;

        let mut process = toolchain.spawn_transcode(&["-i".to_string()]).await.unwrap();
        let mut stderr = String::new();
        process.stderr.read_to_string(&mut stderr).await.unwrap();

        assert_eq!(stderr, "abcdef");
        assert_eq!(process.exit.await.unwrap(), ExitOutcome::from_code(2));
        assert_eq!(toolchain.recorded_spawns().await, vec![vec!["-i".to_string()]]);
    }

    #[tokio::test]
    async fn test_process_released_when_dropped() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(vec!["a", "b"]).await;
        toolchain.set_chunk_delay(Duration::from_secs(60)).await;

        let process = toolchain.spawn_transcode(&[]).await.unwrap();
        assert_eq!(toolchain.live_process_count(), 1);

        drop(process);
        assert_eq!(toolchain.live_process_count(), 0);
    }

    #[tokio::test]
    async fn test_process_released_after_exit() {
        let toolchain = MockToolchain::new();
        toolchain.set_stderr_chunks(vec!["a"]).await;

        let mut process = toolchain.spawn_transcode(&[]).await.unwrap();
        let mut stderr = String::new();
        process.stderr.read_to_string(&mut stderr).await.unwrap();
        process.exit.await.unwrap();

        assert_eq!(toolchain.live_process_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_error_is_recorded() {
        let toolchain = MockToolchain::new();
        toolchain
            .set_spawn_error(ConverterError::FfmpegNotFound {
                path: PathBuf::from("ffmpeg"),
            })
            .await;

        assert!(toolchain.spawn_transcode(&[]).await.is_err());
        assert_eq!(toolchain.spawn_count().await, 1);
    }
}
