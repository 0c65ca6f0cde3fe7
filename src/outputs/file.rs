//! Rotating file output
//!
//! Entries are buffered in memory and written to a timestamped segment
//! file (`<base>_<timestamp>.log`) once the buffer fills up, on the
//! periodic flush timer, or on an explicit flush. When a segment reaches
//! `max_file_size` it is closed (and gzip-compressed if enabled), a fresh
//! segment is opened and the oldest segments beyond `max_files` are
//! removed.

use crate::core::error::{LoggerError, Result};
use crate::core::{LogEntry, LogFormatter, Output, SimpleFormatter};
use crate::core::timestamp::file_safe_stamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const SEGMENT_EXTENSION: &str = "log";
const COMPRESSED_EXTENSION: &str = "log.gz";

/// Configuration for [`FileOutput`]
///
/// # Examples
///
/// ```
/// use log_hood::outputs::FileOutputConfig;
/// use std::time::Duration;
///
/// let config = FileOutputConfig::new("/var/log/myapp")
///     .with_base_name("myapp")
///     .with_max_file_size(10 * 1024 * 1024)
///     .with_max_files(7)
///     .with_flush_interval(Some(Duration::from_secs(2)))
///     .with_compression(true);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutputConfig {
    pub directory: PathBuf,
    pub base_name: String,
    /// Rotate once the current segment holds at least this many bytes
    pub max_file_size: u64,
    /// Segments kept after pruning, the current one included
    pub max_files: usize,
    /// Buffered entries that trigger a write
    pub buffer_size: usize,
    pub flush_interval: Option<Duration>,
    pub compress: bool,
}

impl Default for FileOutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            base_name: "app".to_string(),
            max_file_size: 5 * 1024 * 1024,
            max_files: 5,
            buffer_size: 100,
            flush_interval: Some(Duration::from_secs(5)),
            compress: false,
        }
    }
}

impl FileOutputConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_base_name(mut self, name: impl Into<String>) -> Self {
        self.base_name = name.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_buffer_size(mut self, entries: usize) -> Self {
        self.buffer_size = entries;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(LoggerError::config("FileOutput", "base_name must not be empty"));
        }
        if self.max_files == 0 {
            return Err(LoggerError::config("FileOutput", "max_files must be at least 1"));
        }
        if self.max_file_size == 0 {
            return Err(LoggerError::config("FileOutput", "max_file_size must be positive"));
        }
        Ok(())
    }
}

/// Options for [`FileOutput::read_logs`]
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Skip segments last modified before this instant
    pub since: Option<DateTime<Utc>>,
    /// Keep only the last N lines of each segment
    pub tail_lines: Option<usize>,
}

struct Segment {
    path: PathBuf,
    writer: BufWriter<tokio::fs::File>,
    bytes: u64,
}

enum FileState {
    Uninitialized,
    Open(Segment),
    Closed,
}

struct FileInner {
    state: FileState,
    buffer: Vec<LogEntry>,
}

struct FileShared {
    config: FileOutputConfig,
    formatter: Arc<dyn LogFormatter>,
    inner: Mutex<FileInner>,
}

pub struct FileOutput {
    shared: Arc<FileShared>,
    timer: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl FileOutput {
    /// Create a file output; nothing touches the disk until the first write
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: FileOutputConfig) -> Result<Self> {
        Self::with_formatter(config, SimpleFormatter::new())
    }

    pub fn with_formatter(
        config: FileOutputConfig,
        formatter: impl LogFormatter + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(FileShared {
                config,
                formatter: Arc::new(formatter),
                inner: Mutex::new(FileInner {
                    state: FileState::Uninitialized,
                    buffer: Vec::new(),
                }),
            }),
            timer: parking_lot::Mutex::new(None),
        })
    }

    pub fn config(&self) -> &FileOutputConfig {
        &self.shared.config
    }

    /// Path of the segment currently written to
    pub async fn current_segment(&self) -> Option<PathBuf> {
        match &self.shared.inner.lock().await.state {
            FileState::Open(segment) => Some(segment.path.clone()),
            _ => None,
        }
    }

    /// Entries waiting in the buffer
    pub async fn buffered(&self) -> usize {
        self.shared.inner.lock().await.buffer.len()
    }

    /// All segments for this base name, newest first
    pub fn segments(&self) -> Result<Vec<PathBuf>> {
        list_segments(&self.shared.config.directory, &self.shared.config.base_name)
            .map(|segments| segments.into_iter().map(|(path, _)| path).collect())
    }

    /// Read segments back as text, newest first
    ///
    /// Compressed segments are decompressed transparently.
    pub async fn read_logs(&self, options: ReadOptions) -> Result<String> {
        let directory = self.shared.config.directory.clone();
        let base_name = self.shared.config.base_name.clone();
        tokio::task::spawn_blocking(move || read_segments(&directory, &base_name, &options))
            .await?
    }

    fn start_timer(&self) {
        let Some(interval) = self.shared.config.flush_interval else {
            return;
        };
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }
        let weak: Weak<FileShared> = Arc::downgrade(&self.shared);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                let mut inner = shared.inner.lock().await;
                if matches!(inner.state, FileState::Closed) {
                    break;
                }
                if let Err(e) = shared.flush_buffer(&mut inner).await {
                    tracing::warn!(error = %e, "periodic log file flush failed");
                }
            }
        }));
    }

    fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

impl FileShared {
    async fn ensure_open(&self, inner: &mut FileInner) -> Result<()> {
        match inner.state {
            FileState::Open(_) => Ok(()),
            FileState::Closed => Err(LoggerError::closed("file")),
            FileState::Uninitialized => {
                tokio::fs::create_dir_all(&self.config.directory)
                    .await
                    .map_err(|e| {
                        LoggerError::io_operation(
                            "create log directory",
                            format!(
                                "Failed to create directory '{}'",
                                self.config.directory.display()
                            ),
                            e,
                        )
                    })?;
                inner.state = FileState::Open(self.open_segment().await?);
                Ok(())
            }
        }
    }

    /// Open a new segment named after the current time
    async fn open_segment(&self) -> Result<Segment> {
        let stamp = file_safe_stamp(&Utc::now());
        let mut path = self.config.directory.join(format!(
            "{}_{}.{}",
            self.config.base_name, stamp, SEGMENT_EXTENSION
        ));
        let mut suffix = 1;
        while tokio::fs::try_exists(&path).await.unwrap_or(false)
            || tokio::fs::try_exists(path.with_extension(COMPRESSED_EXTENSION))
                .await
                .unwrap_or(false)
        {
            path = self.config.directory.join(format!(
                "{}_{}_{}.{}",
                self.config.base_name, stamp, suffix, SEGMENT_EXTENSION
            ));
            suffix += 1;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                LoggerError::file_output(path.display().to_string(), format!("Failed to open: {}", e))
            })?;

        Ok(Segment {
            path,
            writer: BufWriter::new(file),
            bytes: 0,
        })
    }

    /// Write the buffer to the current segment and rotate if it is full
    async fn flush_buffer(&self, inner: &mut FileInner) -> Result<()> {
        if inner.buffer.is_empty() {
            return Ok(());
        }
        self.ensure_open(inner).await?;
        self.write_buffer(inner).await?;

        let needs_rotation = matches!(
            &inner.state,
            FileState::Open(segment) if segment.bytes >= self.config.max_file_size
        );
        if needs_rotation {
            self.rotate(inner).await?;
        }
        Ok(())
    }

    async fn write_buffer(&self, inner: &mut FileInner) -> Result<()> {
        let FileState::Open(segment) = &mut inner.state else {
            return Ok(());
        };
        if inner.buffer.is_empty() {
            return Ok(());
        }

        let mut chunk = String::new();
        for entry in &inner.buffer {
            chunk.push_str(&self.formatter.format(entry));
            chunk.push('\n');
        }

        segment.writer.write_all(chunk.as_bytes()).await.map_err(|e| {
            LoggerError::io_operation(
                "write log segment",
                format!("Failed to write to '{}'", segment.path.display()),
                e,
            )
        })?;
        segment.writer.flush().await?;
        segment.bytes += chunk.len() as u64;
        inner.buffer.clear();
        Ok(())
    }

    /// Close the current segment, open a fresh one, then prune
    async fn rotate(&self, inner: &mut FileInner) -> Result<()> {
        let old = match std::mem::replace(&mut inner.state, FileState::Uninitialized) {
            FileState::Open(segment) => segment,
            other => {
                inner.state = other;
                return Ok(());
            }
        };

        let rotated = self.close_segment(old).await;
        inner.state = FileState::Open(self.open_segment().await?);
        let rotated_path = rotated?;
        tracing::debug!(segment = %rotated_path.display(), "rotated log segment");

        let directory = self.config.directory.clone();
        let base_name = self.config.base_name.clone();
        let keep = self.config.max_files;
        tokio::task::spawn_blocking(move || prune_segments(&directory, &base_name, keep)).await?
    }

    /// Flush and close a segment, compressing it if configured
    async fn close_segment(&self, mut segment: Segment) -> Result<PathBuf> {
        segment.writer.flush().await.map_err(|e| {
            LoggerError::file_rotation(
                segment.path.display().to_string(),
                format!("Failed to flush before rotation: {}", e),
            )
        })?;
        segment.writer.shutdown().await?;
        drop(segment.writer);

        if !self.config.compress {
            return Ok(segment.path);
        }
        let path = segment.path;
        tokio::task::spawn_blocking(move || compress_file(&path)).await?
    }
}

/// Gzip a closed segment to `<name>.log.gz` and remove the original
///
/// Streams through a temporary file so a failed compression never loses
/// the source segment.
fn compress_file(path: &Path) -> Result<PathBuf> {
    use std::io::{BufWriter, Write};

    let gz_path = path.with_extension(COMPRESSED_EXTENSION);
    let temp_gz_path = path.with_extension("log.gz.tmp");

    let input = File::open(path).map_err(|e| {
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to open file for compression: {}", path.display()),
            e,
        )
    })?;
    let mut reader = BufReader::with_capacity(64 * 1024, input);

    let output = File::create(&temp_gz_path).map_err(|e| {
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to create temporary compressed file: {}", temp_gz_path.display()),
            e,
        )
    })?;
    let mut encoder = flate2::write::GzEncoder::new(
        BufWriter::with_capacity(64 * 1024, output),
        flate2::Compression::default(),
    );

    let streamed = std::io::copy(&mut reader, &mut encoder)
        .and_then(|_| encoder.finish())
        .and_then(|mut writer| writer.flush());
    if let Err(e) = streamed {
        let _ = fs::remove_file(&temp_gz_path);
        return Err(LoggerError::io_operation(
            "compress log file",
            format!("Failed to compress {}", path.display()),
            e,
        ));
    }

    fs::rename(&temp_gz_path, &gz_path).map_err(|e| {
        let _ = fs::remove_file(&temp_gz_path);
        LoggerError::io_operation(
            "compress log file",
            format!("Failed to rename compressed file to: {}", gz_path.display()),
            e,
        )
    })?;

    // Compression succeeded; a leftover original is pruned with its generation
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(
            segment = %path.display(),
            error = %e,
            "compressed segment but could not remove the original"
        );
    }

    Ok(gz_path)
}

fn is_segment_of(file_name: &str, base_name: &str) -> bool {
    file_name
        .strip_prefix(base_name)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|rest| {
            rest.ends_with(&format!(".{}", SEGMENT_EXTENSION))
                || rest.ends_with(&format!(".{}", COMPRESSED_EXTENSION))
        })
}

/// Segments with their modification times, newest first
fn list_segments(directory: &Path, base_name: &str) -> Result<Vec<(PathBuf, SystemTime)>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(LoggerError::io_operation(
                "list log segments",
                format!("Failed to read directory '{}'", directory.display()),
                e,
            ))
        }
    };

    let mut segments = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_segment_of(name, base_name) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        segments.push((entry.path(), modified));
    }

    // Names embed the creation time, so they break mtime ties chronologically
    segments.sort_by(|(a_path, a_time), (b_path, b_time)| {
        b_time.cmp(a_time).then_with(|| b_path.cmp(a_path))
    });
    Ok(segments)
}

/// Delete the oldest segments so at most `keep` remain
fn prune_segments(directory: &Path, base_name: &str, keep: usize) -> Result<()> {
    for (path, _) in list_segments(directory, base_name)?.into_iter().skip(keep) {
        match fs::remove_file(&path) {
            Ok(()) => tracing::debug!(segment = %path.display(), "pruned log segment"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LoggerError::file_rotation(
                    path.display().to_string(),
                    format!("Failed to remove old segment: {}", e),
                ))
            }
        }
    }
    Ok(())
}

fn read_segment(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.to_string_lossy().ends_with(".gz") {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    BufReader::new(reader)
        .lines()
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(LoggerError::from)
}

fn read_segments(directory: &Path, base_name: &str, options: &ReadOptions) -> Result<String> {
    let since = options.since.map(SystemTime::from);
    let mut output = String::new();

    for (path, modified) in list_segments(directory, base_name)? {
        if since.is_some_and(|since| modified < since) {
            continue;
        }
        let lines = read_segment(&path)?;
        let skip = options
            .tail_lines
            .map_or(0, |tail| lines.len().saturating_sub(tail));
        for line in &lines[skip..] {
            output.push_str(line);
            output.push('\n');
        }
    }
    Ok(output)
}

#[async_trait]
impl Output for FileOutput {
    async fn write(&self, entry: &LogEntry) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let was_uninitialized = matches!(inner.state, FileState::Uninitialized);
        self.shared.ensure_open(&mut inner).await?;
        if was_uninitialized {
            self.start_timer();
        }

        inner.buffer.push(entry.clone());
        if inner.buffer.len() >= self.shared.config.buffer_size {
            self.shared.flush_buffer(&mut inner).await?;
        }
        Ok(())
    }

    async fn write_batch(&self, entries: &[LogEntry]) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        let was_uninitialized = matches!(inner.state, FileState::Uninitialized);
        self.shared.ensure_open(&mut inner).await?;
        if was_uninitialized {
            self.start_timer();
        }

        for entry in entries {
            inner.buffer.push(entry.clone());
            if inner.buffer.len() >= self.shared.config.buffer_size {
                self.shared.flush_buffer(&mut inner).await?;
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if matches!(inner.state, FileState::Closed) {
            return Ok(());
        }
        self.shared.flush_buffer(&mut inner).await
    }

    async fn close(&self) -> Result<()> {
        // Holding the lock, the timer can only be parked between flushes
        let mut inner = self.shared.inner.lock().await;
        self.stop_timer();
        if matches!(inner.state, FileState::Closed) {
            return Ok(());
        }
        if !inner.buffer.is_empty() {
            self.shared.ensure_open(&mut inner).await?;
        }
        self.shared.write_buffer(&mut inner).await?;

        match std::mem::replace(&mut inner.state, FileState::Closed) {
            FileState::Open(segment) => {
                self.shared.close_segment(segment).await?;
            }
            FileState::Uninitialized | FileState::Closed => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        self.stop_timer();
    }
}
