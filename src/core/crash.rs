//! Crash capture
//!
//! Hosts report unhandled errors through [`CrashRecorder::record_error`].
//! Each report is logged at error level with the `crash` tag and kept in a
//! ring of the most recent reports for later inspection.

use super::{
    error::panic_message,
    log_entry::Fields,
    log_level::LogLevel,
    logger::{LogOptions, Logger},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

/// Number of reports kept by default
pub const DEFAULT_CRASH_HISTORY: usize = 100;

pub const CRASH_TAG: &str = "crash";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Fields>,
    pub fatal: bool,
}

pub struct CrashRecorder {
    logger: Arc<Logger>,
    history: Mutex<VecDeque<CrashReport>>,
    capacity: usize,
    log_fatal_entry: bool,
}

impl CrashRecorder {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self {
            logger,
            history: Mutex::new(VecDeque::with_capacity(DEFAULT_CRASH_HISTORY)),
            capacity: DEFAULT_CRASH_HISTORY,
            log_fatal_entry: true,
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Whether a fatal report also logs a second entry at fatal level
    #[must_use]
    pub fn with_fatal_entry(mut self, enabled: bool) -> Self {
        self.log_fatal_entry = enabled;
        self
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn record_error(
        &self,
        error: impl fmt::Display,
        stack_trace: Option<String>,
        metadata: Option<Fields>,
        fatal: bool,
    ) {
        let report = CrashReport {
            timestamp: Utc::now(),
            error: error.to_string(),
            stack_trace,
            metadata,
            fatal,
        };

        let mut options = LogOptions::new()
            .with_error(&report.error)
            .with_tag(CRASH_TAG);
        if let Some(metadata) = report.metadata.clone() {
            options = options.with_metadata(metadata);
        }
        options = options.with_field("fatal", fatal);
        if let Some(trace) = &report.stack_trace {
            options = options.with_stack_trace(trace.clone());
        }

        self.logger.log_with(
            LogLevel::Error,
            format!("Unhandled error: {}", report.error),
            options.clone(),
        );
        if fatal && self.log_fatal_entry {
            self.logger.log_with(
                LogLevel::Fatal,
                format!("Fatal crash: {}", report.error),
                options.with_tag("fatal"),
            );
        }

        let mut history = self.history.lock();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(report);
    }

    /// Reports oldest first
    pub fn recent_errors(&self) -> Vec<CrashReport> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.history.lock().clear();
    }

    /// Record every Rust panic as a fatal report, then run the previous hook
    pub fn install_panic_hook(self: &Arc<Self>) {
        let recorder: Weak<Self> = Arc::downgrade(self);
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(recorder) = recorder.upgrade() {
                let mut metadata = Fields::new();
                metadata.insert("source".into(), "panic".into());
                if let Some(location) = info.location() {
                    metadata.insert("file".into(), location.file().into());
                    metadata.insert("line".into(), location.line().into());
                }
                if let Some(name) = std::thread::current().name() {
                    metadata.insert("thread".into(), name.into());
                }

                recorder.record_error(
                    panic_message(info.payload()),
                    Some(std::backtrace::Backtrace::force_capture().to_string()),
                    Some(metadata),
                    true,
                );
            }
            previous(info);
        }));
    }
}

impl fmt::Debug for CrashRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashRecorder")
            .field("logger", &self.logger.name())
            .field("recorded", &self.history.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
