//! Output trait for log destinations

use super::{
    error::{panic_message, LoggerError, Result},
    log_entry::LogEntry,
};
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// A destination that records entries
///
/// Outputs are shared between the logger's dispatch workers and their own
/// timers, so every method takes `&self`; implementations keep their
/// buffers behind interior mutability. Calling `close()` more than once is
/// a no-op.
///
/// # Example
///
/// ```no_run
/// use log_hood::core::{LogEntry, Output, Result};
/// use async_trait::async_trait;
///
/// struct StderrOutput;
///
/// #[async_trait]
/// impl Output for StderrOutput {
///     async fn write(&self, entry: &LogEntry) -> Result<()> {
///         eprintln!("{}", entry.message);
///         Ok(())
///     }
///
///     async fn flush(&self) -> Result<()> {
///         Ok(())
///     }
///
///     async fn close(&self) -> Result<()> {
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "stderr"
///     }
/// }
/// ```
#[async_trait]
pub trait Output: Send + Sync {
    /// Record one entry
    async fn write(&self, entry: &LogEntry) -> Result<()>;

    /// Record several entries in order
    async fn write_batch(&self, entries: &[LogEntry]) -> Result<()> {
        for entry in entries {
            self.write(entry).await?;
        }
        Ok(())
    }

    /// Push buffered data out without losing any of it
    async fn flush(&self) -> Result<()>;

    /// Flush, then release timers, handles and connections
    async fn close(&self) -> Result<()>;

    /// Get the output name
    fn name(&self) -> &str;
}

/// Run one output operation, turning a panic into an error
///
/// One misbehaving output must not take down the task that drives the
/// others, so every call into an output goes through here.
pub(crate) async fn isolate<F>(output: &str, operation: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(LoggerError::panicked(output, panic_message(payload.as_ref()))),
    }
}
