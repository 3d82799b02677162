//! Trait definitions for the converter module.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

use super::error::ConverterError;
use super::types::ExitOutcome;

/// A running transcode process, exclusively owned by one conversion.
///
/// `stderr` is the diagnostic stream; `exit` resolves once the process has
/// terminated and been reaped. Dropping the value releases the process.
pub struct TranscodeProcess {
    pub stderr: Pin<Box<dyn AsyncRead + Send>>,
    pub exit: BoxFuture<'static, std::io::Result<ExitOutcome>>,
}

impl fmt::Debug for TranscodeProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeProcess").finish_non_exhaustive()
    }
}

/// The external tools a conversion is delegated to.
#[async_trait]
pub trait MediaToolchain: Send + Sync {
    /// Returns the name of this toolchain implementation.
    fn name(&self) -> &str;

    /// Returns the total duration of the input in seconds.
    async fn probe_duration(&self, input: &Path) -> Result<f64, ConverterError>;

    /// Spawns the transcode tool with the given arguments.
    async fn spawn_transcode(&self, args: &[String]) -> Result<TranscodeProcess, ConverterError>;

    /// Validates that the tools are installed and runnable.
    async fn validate(&self) -> Result<(), ConverterError>;
}
