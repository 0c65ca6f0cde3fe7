//! Fan-out over several outputs

use crate::core::output::isolate;
use crate::core::{LogEntry, Output, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type OutputFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Runs every operation on all child outputs concurrently
///
/// A call completes once every child has finished. Child failures and
/// panics are reported through `tracing` and never fail the composite,
/// so one broken child cannot stop the others.
pub struct MultiOutput {
    outputs: Vec<Arc<dyn Output>>,
    name: String,
}

impl MultiOutput {
    pub fn new(outputs: Vec<Arc<dyn Output>>) -> Self {
        let names: Vec<&str> = outputs.iter().map(|o| o.name()).collect();
        let name = format!("multi[{}]", names.join(","));
        Self { outputs, name }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    async fn fan_out<'a, F>(&'a self, operation: &str, call: F)
    where
        F: Fn(&'a dyn Output) -> OutputFuture<'a>,
    {
        let calls = self.outputs.iter().map(|output| {
            let name = output.name();
            let future = call(output.as_ref());
            async move { (name, isolate(name, future).await) }
        });

        for (output, result) in join_all(calls).await {
            if let Err(e) = result {
                tracing::warn!(
                    composite = %self.name,
                    output,
                    operation,
                    error = %e,
                    "output failed inside composite"
                );
            }
        }
    }
}

#[async_trait]
impl Output for MultiOutput {
    async fn write(&self, entry: &LogEntry) -> Result<()> {
        self.fan_out("write", |output| output.write(entry)).await;
        Ok(())
    }

    async fn write_batch(&self, entries: &[LogEntry]) -> Result<()> {
        self.fan_out("write_batch", |output| output.write_batch(entries))
            .await;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.fan_out("flush", |output| output.flush()).await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.fan_out("close", |output| output.close()).await;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LogLevel, LoggerError};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingOutput {
        label: &'static str,
        entries: Mutex<Vec<LogEntry>>,
        closes: AtomicUsize,
    }

    impl RecordingOutput {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self {
                label,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl Output for RecordingOutput {
        async fn write(&self, entry: &LogEntry) -> Result<()> {
            self.entries.lock().push(entry.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    struct BrokenOutput {
        panic: bool,
    }

    #[async_trait]
    impl Output for BrokenOutput {
        async fn write(&self, _entry: &LogEntry) -> Result<()> {
            if self.panic {
                panic!("broken output");
            }
            Err(LoggerError::other("always fails"))
        }

        async fn flush(&self) -> Result<()> {
            Err(LoggerError::other("always fails"))
        }

        async fn close(&self) -> Result<()> {
            Err(LoggerError::other("always fails"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_failing_child_is_isolated() {
        let a = RecordingOutput::new("a");
        let c = RecordingOutput::new("c");
        let multi = MultiOutput::new(vec![
            a.clone(),
            Arc::new(BrokenOutput { panic: false }),
            c.clone(),
        ]);

        let entry = LogEntry::new(LogLevel::Info, "fan out");
        multi.write(&entry).await.unwrap();
        multi.flush().await.unwrap();

        assert_eq!(a.entries.lock().as_slice(), &[entry.clone()]);
        assert_eq!(c.entries.lock().as_slice(), &[entry]);
    }

    #[tokio::test]
    async fn test_panicking_child_is_isolated() {
        let a = RecordingOutput::new("a");
        let multi = MultiOutput::new(vec![Arc::new(BrokenOutput { panic: true }), a.clone()]);

        let batch = vec![
            LogEntry::new(LogLevel::Info, "one"),
            LogEntry::new(LogLevel::Info, "two"),
        ];
        multi.write_batch(&batch).await.unwrap();
        assert_eq!(a.entries.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_close_reaches_every_child() {
        let a = RecordingOutput::new("a");
        let b = RecordingOutput::new("b");
        let multi = MultiOutput::new(vec![a.clone(), Arc::new(BrokenOutput { panic: false }), b.clone()]);

        multi.close().await.unwrap();
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 1);
        assert_eq!(multi.name(), "multi[a,broken,b]");
    }

    #[tokio::test]
    async fn test_empty_composite_succeeds() {
        let multi = MultiOutput::new(Vec::new());
        assert!(multi.is_empty());
        multi.write(&LogEntry::new(LogLevel::Info, "nobody")).await.unwrap();
        multi.flush().await.unwrap();
        multi.close().await.unwrap();
    }
}
