//! Main logger implementation
//!
//! A [`Logger`] turns log calls into [`LogEntry`] values and fans them out
//! to its outputs. Every output gets its own worker task fed by a bounded
//! queue, so a slow or failing output never delays the others, and entries
//! reach each output in the order they were logged. The log call itself
//! only enqueues: it never waits on an output and never returns an error.

use super::{
    context::GlobalContext,
    error::{panic_message, LoggerError, Result},
    filter::LogFilter,
    identity::IdentityProvider,
    log_entry::{Fields, LogEntry},
    log_level::LogLevel,
    metrics::LoggerMetrics,
    output::{isolate, Output},
};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{mpsc, oneshot};

/// Default per-output queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Maximum number of queued writes a worker hands to `write_batch` at once
const WORKER_BATCH_SIZE: usize = 50;

/// Per-call additions to an entry
///
/// # Example
///
/// ```
/// use log_hood::LogOptions;
///
/// let options = LogOptions::new()
///     .with_field("status", 503)
///     .with_tag("network")
///     .with_error("upstream unavailable");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub metadata: Option<Fields>,
    pub tags: Option<BTreeSet<String>>,
    pub error: Option<String>,
    pub stack_trace: Option<String>,
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Fields) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Fields::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(BTreeSet::new).insert(tag.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .get_or_insert_with(BTreeSet::new)
            .extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Attach a trace; it takes precedence over one the logger would capture
    #[must_use]
    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }
}

/// When the logger captures a stack trace for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackTracePolicy {
    pub capture: bool,
    /// Capture only at this level or above
    pub min_level: LogLevel,
}

impl Default for StackTracePolicy {
    fn default() -> Self {
        Self {
            capture: true,
            min_level: LogLevel::Error,
        }
    }
}

impl StackTracePolicy {
    pub fn disabled() -> Self {
        Self {
            capture: false,
            min_level: LogLevel::Fatal,
        }
    }

    pub fn from_level(min_level: LogLevel) -> Self {
        Self {
            capture: true,
            min_level,
        }
    }

    #[inline]
    pub fn should_capture(&self, level: LogLevel) -> bool {
        self.capture && level.rank() >= self.min_level.rank()
    }
}

fn capture_stack_trace() -> String {
    std::backtrace::Backtrace::force_capture().to_string()
}

enum OutputCommand {
    Write(Arc<LogEntry>),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// Queue handle for one output's worker task
struct OutputWorker {
    name: String,
    sender: mpsc::Sender<OutputCommand>,
}

impl OutputWorker {
    fn spawn(
        runtime: &Handle,
        output: Arc<dyn Output>,
        capacity: usize,
        logger_name: String,
        metrics: Arc<LoggerMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let name = output.name().to_string();
        let lease = OutputLease::acquire(output);
        runtime.spawn(Self::run(lease, receiver, logger_name, metrics));
        Self { name, sender }
    }

    /// Drain the queue in order, coalescing consecutive writes into batches
    async fn run(
        mut lease: OutputLease,
        mut receiver: mpsc::Receiver<OutputCommand>,
        logger_name: String,
        metrics: Arc<LoggerMetrics>,
    ) {
        let output = Arc::clone(&lease.output);
        let output_name = output.name().to_string();
        let report = |operation: &str, err: &LoggerError| {
            metrics.record_output_failure();
            tracing::warn!(
                logger = %logger_name,
                output = %output_name,
                operation,
                error = %err,
                "log output failed"
            );
        };

        let mut next = receiver.recv().await;
        while let Some(command) = next.take() {
            match command {
                OutputCommand::Write(first) => {
                    let mut batch = vec![first];
                    while batch.len() < WORKER_BATCH_SIZE {
                        match receiver.try_recv() {
                            Ok(OutputCommand::Write(entry)) => batch.push(entry),
                            Ok(other) => {
                                next = Some(other);
                                break;
                            }
                            Err(_) => break,
                        }
                    }

                    let result = if batch.len() == 1 {
                        isolate(&output_name, output.write(&batch[0])).await
                    } else {
                        let entries: Vec<LogEntry> =
                            batch.iter().map(|entry| LogEntry::clone(entry)).collect();
                        isolate(&output_name, output.write_batch(&entries)).await
                    };
                    if let Err(e) = result {
                        report("write", &e);
                    }
                }
                OutputCommand::Flush(done) => {
                    if let Err(e) = isolate(&output_name, output.flush()).await {
                        report("flush", &e);
                    }
                    let _ = done.send(());
                }
                OutputCommand::Close(done) => {
                    // Another logger still writes here: hand over our entries only
                    let result = if lease.release() {
                        isolate(&output_name, output.close()).await
                    } else {
                        isolate(&output_name, output.flush()).await
                    };
                    if let Err(e) = result {
                        report("close", &e);
                    }
                    let _ = done.send(());
                    return;
                }
            }

            if next.is_none() {
                next = receiver.recv().await;
            }
        }
    }
}

/// Live workers per output, keyed by the output's address
fn output_owners() -> &'static Mutex<HashMap<usize, usize>> {
    static OWNERS: OnceLock<Mutex<HashMap<usize, usize>>> = OnceLock::new();
    OWNERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// One worker's claim on an output that several loggers may share
///
/// Only the worker giving up the last claim closes the output. The claim
/// is also given up when the worker is dropped without a close command.
struct OutputLease {
    output: Arc<dyn Output>,
    released: bool,
}

impl OutputLease {
    fn acquire(output: Arc<dyn Output>) -> Self {
        let key = Self::key_of(&output);
        *output_owners().lock().entry(key).or_insert(0) += 1;
        Self {
            output,
            released: false,
        }
    }

    fn key_of(output: &Arc<dyn Output>) -> usize {
        Arc::as_ptr(output) as *const () as usize
    }

    /// Give up the claim, returning whether it was the last one
    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        let key = Self::key_of(&self.output);
        let mut owners = output_owners().lock();
        match owners.get_mut(&key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            _ => {
                owners.remove(&key);
                true
            }
        }
    }
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runtime the dispatch workers run on
///
/// The ambient tokio runtime when there is one, otherwise a small
/// background runtime shared by every logger in the process.
fn dispatch_runtime() -> Result<Handle> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }

    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    if RUNTIME.get().is_none() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("log-hood-dispatch")
            .enable_all()
            .build()
            .map_err(|e| {
                LoggerError::io_operation("starting dispatch runtime", "cannot build runtime", e)
            })?;
        // Losing the race just drops the spare runtime; we are not inside one.
        let _ = RUNTIME.set(runtime);
    }

    RUNTIME
        .get()
        .map(|runtime| runtime.handle().clone())
        .ok_or_else(|| LoggerError::other("dispatch runtime unavailable"))
}

pub struct Logger {
    name: String,
    min_level: RwLock<LogLevel>,
    default_metadata: RwLock<Fields>,
    default_tags: RwLock<BTreeSet<String>>,
    stack_trace: RwLock<StackTracePolicy>,
    filters: RwLock<Vec<Arc<dyn LogFilter>>>,
    outputs: RwLock<Vec<OutputWorker>>,
    context: Arc<GlobalContext>,
    identity: Option<Arc<dyn IdentityProvider>>,
    runtime: Handle,
    queue_capacity: usize,
    metrics: Arc<LoggerMetrics>,
    closed: AtomicBool,
}

impl Logger {
    /// Start building a logger with the given name
    pub fn builder(name: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn set_default_metadata(&self, metadata: Fields) {
        *self.default_metadata.write() = metadata;
    }

    pub fn add_default_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.default_metadata.write().insert(key.into(), value.into());
    }

    pub fn add_default_tag(&self, tag: impl Into<String>) {
        self.default_tags.write().insert(tag.into());
    }

    pub fn remove_default_tag(&self, tag: &str) {
        self.default_tags.write().remove(tag);
    }

    pub fn set_stack_trace_policy(&self, policy: StackTracePolicy) {
        *self.stack_trace.write() = policy;
    }

    pub fn add_filter(&self, filter: Arc<dyn LogFilter>) {
        self.filters.write().push(filter);
    }

    pub fn clear_filters(&self) {
        self.filters.write().clear();
    }

    /// Attach an output; it receives entries logged from now on
    pub fn add_output(&self, output: Arc<dyn Output>) {
        let worker = OutputWorker::spawn(
            &self.runtime,
            output,
            self.queue_capacity,
            self.name.clone(),
            Arc::clone(&self.metrics),
        );
        self.outputs.write().push(worker);
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.read().iter().map(|w| w.name.clone()).collect()
    }

    pub fn global_context(&self) -> &Arc<GlobalContext> {
        &self.context
    }

    /// Get the logger metrics for detailed observability
    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        !self.is_closed() && level >= *self.min_level.read()
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_with(level, message, LogOptions::default());
    }

    pub fn log_with(&self, level: LogLevel, message: impl Into<String>, options: LogOptions) {
        if !self.is_enabled(level) {
            return;
        }

        let entry = self.build_entry(level, message.into(), options);
        self.dispatch(entry);
    }

    /// Send an already-built entry through the level gate, filters and outputs
    ///
    /// Returns whether the entry was dispatched.
    pub fn submit(&self, entry: LogEntry) -> bool {
        if !self.is_enabled(entry.level) {
            return false;
        }
        self.dispatch(entry)
    }

    fn build_entry(&self, level: LogLevel, message: String, options: LogOptions) -> LogEntry {
        let metadata = {
            let defaults = self.default_metadata.read();
            match options.metadata {
                Some(call) => {
                    let mut merged = defaults.clone();
                    merged.extend(call);
                    Some(merged)
                }
                None if defaults.is_empty() => None,
                None => Some(defaults.clone()),
            }
        };

        let tags = {
            let defaults = self.default_tags.read();
            match options.tags {
                Some(call) => Some(defaults.iter().cloned().chain(call).collect()),
                None if defaults.is_empty() => None,
                None => Some(defaults.clone()),
            }
        };

        let stack_trace = options.stack_trace.or_else(|| {
            self.stack_trace
                .read()
                .should_capture(level)
                .then(capture_stack_trace)
        });

        let snapshot = self.context.snapshot();
        let identity = self.identity.as_ref().map(|provider| provider.identity());

        let mut entry = LogEntry::new(level, message);
        entry.logger_name = Some(self.name.clone());
        entry.metadata = metadata;
        entry.tags = tags;
        entry.error = options.error;
        entry.stack_trace = stack_trace;
        entry.context = snapshot.values;
        entry.user_id = snapshot.user_id;
        entry.session_id = Some(snapshot.session_id);
        if let Some(identity) = identity {
            entry.device_id = identity.device_id.clone();
            entry.platform = identity.platform.clone();
            entry.app_version = identity.app_version.clone();
            entry.build_number = identity.build_number.clone();
        }
        entry
    }

    fn dispatch(&self, entry: LogEntry) -> bool {
        {
            let filters = self.filters.read();
            if !filters.iter().all(|filter| filter.should_log(&entry)) {
                self.metrics.record_filtered();
                return false;
            }
        }

        let entry = Arc::new(entry);
        let outputs = self.outputs.read();
        for worker in outputs.iter() {
            match worker.sender.try_send(OutputCommand::Write(Arc::clone(&entry))) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = self.metrics.record_dropped();
                    // Alert on first drop and periodically thereafter
                    if dropped == 0 || (dropped + 1) % 1000 == 0 {
                        tracing::warn!(
                            logger = %self.name,
                            output = %worker.name,
                            dropped = dropped + 1,
                            "log output queue full, entries dropped"
                        );
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(
                        logger = %self.name,
                        output = %worker.name,
                        "log output worker stopped"
                    );
                }
            }
        }
        self.metrics.record_dispatched();
        true
    }

    fn senders(&self) -> Vec<mpsc::Sender<OutputCommand>> {
        self.outputs.read().iter().map(|w| w.sender.clone()).collect()
    }

    /// Wait until every entry logged so far has been handed to its outputs,
    /// then flush all outputs concurrently
    pub async fn flush(&self) {
        let waits = self.senders().into_iter().map(|sender| async move {
            let (done, wait) = oneshot::channel();
            if sender.send(OutputCommand::Flush(done)).await.is_ok() {
                let _ = wait.await;
            }
        });
        join_all(waits).await;
    }

    /// Flush and close every output; later log calls are ignored
    ///
    /// Calling `close` again is a no-op.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let workers = std::mem::take(&mut *self.outputs.write());
        let waits = workers.into_iter().map(|worker| async move {
            let (done, wait) = oneshot::channel();
            if worker.sender.send(OutputCommand::Close(done)).await.is_ok() {
                let _ = wait.await;
            }
        });
        join_all(waits).await;
    }

    #[inline]
    pub fn verbose(&self, message: impl Into<String>) {
        self.log(LogLevel::Verbose, message);
    }

    #[inline]
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    #[inline]
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    #[inline]
    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    #[inline]
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    #[inline]
    pub fn critical(&self, message: impl Into<String>) {
        self.log(LogLevel::Critical, message);
    }

    #[inline]
    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogLevel::Fatal, message);
    }

    /// Log an error-level entry carrying an error value
    pub fn error_with(&self, message: impl Into<String>, error: impl fmt::Display) {
        self.log_with(LogLevel::Error, message, LogOptions::new().with_error(error));
    }

    fn log_measurement(&self, operation: &str, elapsed: Duration, failure: Option<String>) {
        let mut options = LogOptions::new()
            .with_field("operation", operation)
            .with_field("durationMs", elapsed.as_millis() as u64)
            .with_field("success", failure.is_none())
            .with_tag("performance");

        match failure {
            None => self.log_with(LogLevel::Info, format!("{} completed", operation), options),
            Some(error) => {
                options = options.with_field("error", error.clone()).with_error(error);
                self.log_with(LogLevel::Error, format!("{} failed", operation), options);
            }
        }
    }

    /// Time a unit of work and log its outcome
    ///
    /// The work's result is returned untouched; a panic is logged and then
    /// resumed.
    pub fn measure<T, E, F>(&self, operation: &str, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        let started = Instant::now();
        match std::panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => {
                self.log_measurement(operation, started.elapsed(), None);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.log_measurement(operation, started.elapsed(), Some(err.to_string()));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.log_measurement(operation, started.elapsed(), Some(message));
                std::panic::resume_unwind(payload)
            }
        }
    }

    /// Async counterpart of [`Logger::measure`]
    pub async fn measure_async<T, E, F>(&self, operation: &str, work: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(value)) => {
                self.log_measurement(operation, started.elapsed(), None);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.log_measurement(operation, started.elapsed(), Some(err.to_string()));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.log_measurement(operation, started.elapsed(), Some(message));
                std::panic::resume_unwind(payload)
            }
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("min_level", &self.min_level())
            .field("outputs", &self.output_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for constructing a [`Logger`] with a fluent API
///
/// # Example
/// ```no_run
/// use log_hood::prelude::*;
///
/// let logger = Logger::builder("Net")
///     .min_level(LogLevel::Debug)
///     .output(ConsoleOutput::new())
///     .default_tag("network")
///     .build()
///     .expect("dispatch runtime");
/// logger.info("connected");
/// ```
pub struct LoggerBuilder {
    name: String,
    min_level: LogLevel,
    outputs: Vec<Arc<dyn Output>>,
    filters: Vec<Arc<dyn LogFilter>>,
    default_metadata: Fields,
    default_tags: BTreeSet<String>,
    stack_trace: StackTracePolicy,
    context: Option<Arc<GlobalContext>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    runtime: Option<Handle>,
    queue_capacity: usize,
}

impl LoggerBuilder {
    /// Create a new builder with default values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_level: LogLevel::Verbose,
            outputs: Vec::new(),
            filters: Vec::new(),
            default_metadata: Fields::new(),
            default_tags: BTreeSet::new(),
            stack_trace: StackTracePolicy::default(),
            context: None,
            identity: None,
            runtime: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use = "builder methods return a new value"]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn output(mut self, output: impl Output + 'static) -> Self {
        self.outputs.push(Arc::new(output));
        self
    }

    /// Attach an output that is also held elsewhere
    #[must_use = "builder methods return a new value"]
    pub fn shared_output(mut self, output: Arc<dyn Output>) -> Self {
        self.outputs.push(output);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn filter(mut self, filter: impl LogFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn default_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_metadata.insert(key.into(), value.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tags.insert(tag.into());
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn stack_trace(mut self, policy: StackTracePolicy) -> Self {
        self.stack_trace = policy;
        self
    }

    /// Share a global context; by default each logger gets its own
    #[must_use = "builder methods return a new value"]
    pub fn context(mut self, context: Arc<GlobalContext>) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Run output workers on a specific runtime
    #[must_use = "builder methods return a new value"]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Build the logger and start one worker per output
    ///
    /// # Errors
    ///
    /// Fails only when no runtime is available and the background runtime
    /// cannot be started.
    pub fn build(self) -> Result<Logger> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => dispatch_runtime()?,
        };

        let logger = Logger {
            name: self.name,
            min_level: RwLock::new(self.min_level),
            default_metadata: RwLock::new(self.default_metadata),
            default_tags: RwLock::new(self.default_tags),
            stack_trace: RwLock::new(self.stack_trace),
            filters: RwLock::new(self.filters),
            outputs: RwLock::new(Vec::new()),
            context: self.context.unwrap_or_default(),
            identity: self.identity,
            runtime,
            queue_capacity: self.queue_capacity,
            metrics: Arc::new(LoggerMetrics::new()),
            closed: AtomicBool::new(false),
        };

        for output in self.outputs {
            logger.add_output(output);
        }

        Ok(logger)
    }
}
