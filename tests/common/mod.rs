//! Shared outputs and transports for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use log_hood::{HttpRequest, HttpTransport, LogEntry, LoggerError, Output, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Records every entry it is handed
pub struct MockOutput {
    name: String,
    entries: Mutex<Vec<LogEntry>>,
    closes: AtomicUsize,
}

impl MockOutput {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entries: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Output for MockOutput {
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
        &self.name
    }
}

/// Fails every write, or panics when asked to
pub struct BrokenOutput {
    pub panics: bool,
}

#[async_trait]
impl Output for BrokenOutput {
    async fn write(&self, _entry: &LogEntry) -> Result<()> {
        if self.panics {
            panic!("output exploded");
        }
        Err(LoggerError::other("write refused"))
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Replays scripted results, then answers 200
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<u16>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<u16>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answers with `status`
    pub fn always(status: u16, times: usize) -> Arc<Self> {
        Self::new((0..times).map(|_| Ok(status)).collect())
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<u16> {
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        next.unwrap_or(Ok(200))
    }
}
