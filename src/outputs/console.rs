//! Console output implementation

use crate::core::{LogEntry, LogFormatter, LogLevel, Output, Result, SimpleFormatter};
use async_trait::async_trait;
use colored::Colorize;
use std::sync::Arc;

pub struct ConsoleOutput {
    formatter: Arc<dyn LogFormatter>,
    use_colors: bool,
    use_tracing: bool,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            formatter: Arc::new(SimpleFormatter::new()),
            use_colors: true,
            use_tracing: false,
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self {
            use_colors,
            ..Self::new()
        }
    }

    /// Set the formatter used to render each line
    ///
    /// # Example
    ///
    /// ```
    /// use log_hood::outputs::ConsoleOutput;
    /// use log_hood::core::JsonFormatter;
    ///
    /// let output = ConsoleOutput::new().with_formatter(JsonFormatter::new());
    /// ```
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl LogFormatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Emit entries as `tracing` events instead of printing them
    ///
    /// The host's subscriber then decides where they go.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.use_tracing = enabled;
        self
    }

    fn render(&self, entry: &LogEntry) -> String {
        let line = self.formatter.format(entry);
        if self.use_colors {
            line.color(entry.level.color_code()).to_string()
        } else {
            line
        }
    }

    fn emit_tracing(&self, entry: &LogEntry) {
        let logger = entry.logger_name.as_deref().unwrap_or("");
        let error = entry.error.as_deref().unwrap_or("");
        let stack = entry.stack_trace.as_deref().unwrap_or("");
        let timestamp = entry.timestamp.to_rfc3339();
        let message = &entry.message;

        // tracing has five severities; the three highest levels share ERROR
        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(
                    target: "log_hood::console",
                    $level,
                    logger,
                    timestamp = %timestamp,
                    level_name = entry.level.to_str(),
                    error,
                    stack,
                    "{}",
                    message
                )
            };
        }

        match entry.level {
            LogLevel::Verbose => emit!(tracing::Level::TRACE),
            LogLevel::Debug => emit!(tracing::Level::DEBUG),
            LogLevel::Info => emit!(tracing::Level::INFO),
            LogLevel::Warning => emit!(tracing::Level::WARN),
            LogLevel::Error | LogLevel::Critical | LogLevel::Fatal => {
                emit!(tracing::Level::ERROR)
            }
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Output for ConsoleOutput {
    async fn write(&self, entry: &LogEntry) -> Result<()> {
        if self.use_tracing {
            self.emit_tracing(entry);
            return Ok(());
        }

        let output = self.render(entry);
        // Route Error and above to stderr, others to stdout
        if entry.level >= LogLevel::Error {
            eprintln!("{}", output);
        } else {
            println!("{}", output);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_colors_is_formatter_output() {
        let output = ConsoleOutput::with_colors(false)
            .with_formatter(|entry: &LogEntry| format!("{}|{}", entry.level, entry.message));
        let entry = LogEntry::new(LogLevel::Warning, "disk low");
        assert_eq!(output.render(&entry), "WARNING|disk low");
    }

    #[tokio::test]
    async fn test_write_never_fails() {
        let output = ConsoleOutput::new();
        for level in LogLevel::ALL {
            output.write(&LogEntry::new(level, "message")).await.unwrap();
        }
        output.flush().await.unwrap();
        output.close().await.unwrap();
        output.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_tracing_route() {
        let output = ConsoleOutput::new().with_tracing(true);
        let entry = LogEntry::new(LogLevel::Critical, "routed").with_error("boom");
        output.write(&entry).await.unwrap();
    }
}
