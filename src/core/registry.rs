//! Named logger registry
//!
//! [`LogHood`] is the composition root for an application's logging: it
//! owns the shared [`GlobalContext`], the identity provider and the
//! name-to-logger map. Asking for a name that already exists returns the
//! same [`Logger`]; `close_all` closes every logger and empties the map.

use super::{
    context::GlobalContext,
    crash::CrashRecorder,
    error::Result,
    identity::{IdentityProvider, StaticIdentity},
    log_level::LogLevel,
    logger::{Logger, LoggerBuilder},
    output::Output,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Logger that receives crash reports
pub const CRASH_LOGGER_NAME: &str = "Crash";

pub struct LogHood {
    context: Arc<GlobalContext>,
    identity: Arc<dyn IdentityProvider>,
    loggers: Mutex<HashMap<String, Arc<Logger>>>,
    default_outputs: Vec<Arc<dyn Output>>,
    default_level: LogLevel,
    runtime: Option<Handle>,
    crash_recorder: Mutex<Option<Arc<CrashRecorder>>>,
}

impl LogHood {
    /// Registry with a fresh context and no identity information
    pub fn new() -> Self {
        Self::with_identity(Arc::new(StaticIdentity::default()))
    }

    pub fn with_identity(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            context: Arc::new(GlobalContext::new()),
            identity,
            loggers: Mutex::new(HashMap::new()),
            default_outputs: Vec::new(),
            default_level: LogLevel::Verbose,
            runtime: None,
            crash_recorder: Mutex::new(None),
        }
    }

    /// Outputs attached to every logger created through [`LogHood::logger`]
    #[must_use]
    pub fn with_default_output(mut self, output: Arc<dyn Output>) -> Self {
        self.default_outputs.push(output);
        self
    }

    #[must_use]
    pub fn with_default_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    #[must_use]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn context(&self) -> &Arc<GlobalContext> {
        &self.context
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    /// Get the logger for `name`, creating it with the registry defaults
    pub fn logger(&self, name: &str) -> Result<Arc<Logger>> {
        let mut builder = Logger::builder(name).min_level(self.default_level);
        for output in &self.default_outputs {
            builder = builder.shared_output(Arc::clone(output));
        }
        self.register(builder)
    }

    /// Build and register a logger unless one with the same name exists
    ///
    /// An existing logger is returned untouched and the builder is
    /// discarded.
    pub fn register(&self, builder: LoggerBuilder) -> Result<Arc<Logger>> {
        let mut loggers = self.loggers.lock();
        if let Some(existing) = loggers.get(builder.name()) {
            return Ok(Arc::clone(existing));
        }

        let mut builder = builder
            .context(Arc::clone(&self.context))
            .identity(Arc::clone(&self.identity));
        if let Some(handle) = &self.runtime {
            builder = builder.runtime(handle.clone());
        }

        let name = builder.name().to_string();
        let logger = Arc::new(builder.build()?);
        loggers.insert(name, Arc::clone(&logger));
        Ok(logger)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Logger>> {
        self.loggers.lock().get(name).cloned()
    }

    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loggers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Crash recorder writing through the `Crash` logger
    pub fn crash_recorder(&self) -> Result<Arc<CrashRecorder>> {
        let mut slot = self.crash_recorder.lock();
        if let Some(recorder) = slot.as_ref() {
            return Ok(Arc::clone(recorder));
        }

        let recorder = Arc::new(CrashRecorder::new(self.logger(CRASH_LOGGER_NAME)?));
        *slot = Some(Arc::clone(&recorder));
        Ok(recorder)
    }

    pub fn set_user_id(&self, user_id: Option<String>) {
        self.context.set_user_id(user_id);
    }

    pub async fn flush_all(&self) {
        let loggers: Vec<Arc<Logger>> = self.loggers.lock().values().cloned().collect();
        join_all(loggers.iter().map(|logger| logger.flush())).await;
    }

    /// Close every logger and clear the registry
    pub async fn close_all(&self) {
        let loggers: Vec<Arc<Logger>> = self.loggers.lock().drain().map(|(_, l)| l).collect();
        self.crash_recorder.lock().take();
        join_all(loggers.iter().map(|logger| logger.close())).await;
    }
}

impl Default for LogHood {
    fn default() -> Self {
        Self::new()
    }
}
