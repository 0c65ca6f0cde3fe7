//! Embedded database output
//!
//! Stores one row per entry in a SQLite table named `logs`, keyed by the
//! entry id. Re-inserting an id replaces the row. A cleanup timer keeps
//! the row count at or below `max_entries` by deleting the oldest rows.
//!
//! All SQLite work runs on the blocking thread pool; the connection is
//! opened lazily on first use and shared behind a mutex.

use crate::core::error::{LoggerError, Result};
use crate::core::{Fields, LogEntry, LogLevel, Output};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

const INSERT_SQL: &str = "INSERT OR REPLACE INTO logs (
    id, timestamp, level, logger, message, metadata, error, stack_trace,
    device_id, user_id, session_id, platform, app_version, build_number,
    context, tags, thread_name, process_id
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)";

const SELECT_COLUMNS: &str = "SELECT id, timestamp, level, logger, message, metadata, error,
    stack_trace, device_id, user_id, session_id, platform, app_version, build_number,
    context, tags, thread_name, process_id FROM logs";

/// Which secondary indexes to create with the table
///
/// Only consulted when the table is first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub timestamp: bool,
    pub level: bool,
    pub logger: bool,
    pub user_id: bool,
    pub session_id: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            timestamp: true,
            level: true,
            logger: true,
            user_id: true,
            session_id: true,
        }
    }
}

impl IndexOptions {
    pub fn none() -> Self {
        Self {
            timestamp: false,
            level: false,
            logger: false,
            user_id: false,
            session_id: false,
        }
    }

    fn statements(&self) -> Vec<&'static str> {
        [
            (self.timestamp, "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp)"),
            (self.level, "CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level)"),
            (self.logger, "CREATE INDEX IF NOT EXISTS idx_logs_logger ON logs(logger)"),
            (self.user_id, "CREATE INDEX IF NOT EXISTS idx_logs_user_id ON logs(user_id)"),
            (self.session_id, "CREATE INDEX IF NOT EXISTS idx_logs_session_id ON logs(session_id)"),
        ]
        .into_iter()
        .filter_map(|(enabled, sql)| enabled.then_some(sql))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOutputConfig {
    /// Database file; `:memory:` keeps everything in memory
    pub path: PathBuf,
    /// Row ceiling enforced by cleanup
    pub max_entries: u64,
    pub cleanup_interval: Option<Duration>,
    pub indexes: IndexOptions,
}

impl Default for DatabaseOutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs.db"),
            max_entries: 10_000,
            cleanup_interval: Some(Duration::from_secs(3600)),
            indexes: IndexOptions::default(),
        }
    }
}

impl DatabaseOutputConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = interval;
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_indexes(mut self, indexes: IndexOptions) -> Self {
        self.indexes = indexes;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// Conjunctive query over stored entries
///
/// # Example
///
/// ```
/// use log_hood::outputs::LogQuery;
/// use log_hood::LogLevel;
///
/// let query = LogQuery::new()
///     .with_levels([LogLevel::Error, LogLevel::Fatal])
///     .with_search("timeout")
///     .with_limit(20);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub levels: Vec<LogLevel>,
    /// Substring of the logger name
    pub logger: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    /// Substring of the message or error text
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub order: SortOrder,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    #[must_use]
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

fn to_nanos(timestamp: &DateTime<Utc>) -> Result<i64> {
    timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| LoggerError::other(format!("timestamp {} out of range", timestamp)))
}

/// Append `WHERE` clauses for a time range
fn push_range(
    sql: &mut String,
    params: &mut Vec<SqlValue>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<()> {
    if let Some(start) = start {
        sql.push_str(" AND timestamp >= ?");
        params.push(SqlValue::Integer(to_nanos(&start)?));
    }
    if let Some(end) = end {
        sql.push_str(" AND timestamp <= ?");
        params.push(SqlValue::Integer(to_nanos(&end)?));
    }
    Ok(())
}

fn build_query(query: &LogQuery) -> Result<(String, Vec<SqlValue>)> {
    let mut sql = format!("{} WHERE 1=1", SELECT_COLUMNS);
    let mut params = Vec::new();

    push_range(&mut sql, &mut params, query.start, query.end)?;

    if !query.levels.is_empty() {
        let placeholders = vec!["?"; query.levels.len()].join(", ");
        sql.push_str(&format!(" AND level IN ({})", placeholders));
        params.extend(
            query
                .levels
                .iter()
                .map(|level| SqlValue::Text(level.to_str().to_string())),
        );
    }
    if let Some(logger) = &query.logger {
        sql.push_str(" AND instr(logger, ?) > 0");
        params.push(SqlValue::Text(logger.clone()));
    }
    if let Some(user_id) = &query.user_id {
        sql.push_str(" AND user_id = ?");
        params.push(SqlValue::Text(user_id.clone()));
    }
    if let Some(session_id) = &query.session_id {
        sql.push_str(" AND session_id = ?");
        params.push(SqlValue::Text(session_id.clone()));
    }
    if let Some(search) = &query.search {
        sql.push_str(" AND (instr(message, ?) > 0 OR instr(COALESCE(error, ''), ?) > 0)");
        params.push(SqlValue::Text(search.clone()));
        params.push(SqlValue::Text(search.clone()));
    }

    let order = query.order.sql();
    sql.push_str(&format!(" ORDER BY timestamp {}, rowid {}", order, order));

    match (query.limit, query.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlValue::Integer(limit as i64));
            params.push(SqlValue::Integer(offset.unwrap_or(0) as i64));
        }
        (None, Some(offset)) => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(SqlValue::Integer(offset as i64));
        }
        (None, None) => {}
    }

    Ok((sql, params))
}

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    column: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| conversion_error(column, e)),
        None => Ok(None),
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let level: String = row.get(2)?;
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: DateTime::from_timestamp_nanos(row.get(1)?),
        level: level.parse().map_err(|e: String| conversion_error(2, e))?,
        logger_name: row.get(3)?,
        message: row.get(4)?,
        metadata: json_column::<Fields>(row, 5)?,
        error: row.get(6)?,
        stack_trace: row.get(7)?,
        device_id: row.get(8)?,
        user_id: row.get(9)?,
        session_id: row.get(10)?,
        platform: row.get(11)?,
        app_version: row.get(12)?,
        build_number: row.get(13)?,
        context: json_column::<Fields>(row, 14)?,
        tags: json_column::<BTreeSet<String>>(row, 15)?,
        thread_name: row.get(16)?,
        process_id: row.get(17)?,
    })
}

fn json_text<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value.map(serde_json::to_string).transpose().map_err(LoggerError::from)
}

fn insert_entry(conn: &Connection, entry: &LogEntry) -> Result<()> {
    let mut statement = conn.prepare_cached(INSERT_SQL)?;
    statement.execute(params![
        entry.id,
        to_nanos(&entry.timestamp)?,
        entry.level.to_str(),
        entry.logger_name,
        entry.message,
        json_text(entry.metadata.as_ref())?,
        entry.error,
        entry.stack_trace,
        entry.device_id,
        entry.user_id,
        entry.session_id,
        entry.platform,
        entry.app_version,
        entry.build_number,
        json_text(entry.context.as_ref())?,
        json_text(entry.tags.as_ref())?,
        entry.thread_name,
        entry.process_id,
    ])?;
    Ok(())
}

fn initialize_schema(conn: &Connection, indexes: &IndexOptions) -> Result<()> {
    conn.execute_batch(
        r#"CREATE TABLE IF NOT EXISTS logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            level TEXT NOT NULL,
            logger TEXT,
            message TEXT NOT NULL,
            metadata TEXT,
            error TEXT,
            stack_trace TEXT,
            device_id TEXT,
            user_id TEXT,
            session_id TEXT,
            platform TEXT,
            app_version TEXT,
            build_number TEXT,
            context TEXT,
            tags TEXT,
            thread_name TEXT,
            process_id INTEGER
        )"#,
    )?;
    for statement in indexes.statements() {
        conn.execute(statement, [])?;
    }
    Ok(())
}

/// Delete the oldest rows above `max_entries`, returning how many went
fn enforce_retention(conn: &Connection, max_entries: u64) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
    let excess = count - max_entries as i64;
    if excess <= 0 {
        return Ok(0);
    }

    let deleted = conn.execute(
        "DELETE FROM logs WHERE id IN (
            SELECT id FROM logs ORDER BY timestamp ASC, rowid ASC LIMIT ?1
        )",
        params![excess],
    )?;
    if deleted > 0 {
        conn.execute_batch("VACUUM")?;
    }
    Ok(deleted)
}

enum DbState {
    Uninitialized,
    Open(Connection),
    Closed,
}

fn open_connection<'a>(
    state: &'a mut DbState,
    config: &DatabaseOutputConfig,
) -> Result<&'a mut Connection> {
    if let DbState::Uninitialized = state {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LoggerError::io_operation(
                    "create database directory",
                    format!("Failed to create directory '{}'", parent.display()),
                    e,
                )
            })?;
        }
        let conn = Connection::open(&config.path)?;
        initialize_schema(&conn, &config.indexes)?;
        *state = DbState::Open(conn);
    }

    match state {
        DbState::Open(conn) => Ok(conn),
        DbState::Closed => Err(LoggerError::closed("database")),
        DbState::Uninitialized => Err(LoggerError::other("database connection not initialized")),
    }
}

pub struct DatabaseOutput {
    config: Arc<DatabaseOutputConfig>,
    state: Arc<Mutex<DbState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DatabaseOutput {
    /// Create a database output; the file is opened on first use
    pub fn new(config: DatabaseOutputConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(DbState::Uninitialized)),
            timer: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DatabaseOutputConfig {
        &self.config
    }

    /// Run `operation` against the open connection on the blocking pool
    async fn with_connection<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let config = Arc::clone(&self.config);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = state.lock();
            let conn = open_connection(&mut guard, &config)?;
            operation(conn)
        })
        .await?;

        if result.is_ok() {
            self.start_cleanup_timer();
        }
        result
    }

    fn start_cleanup_timer(&self) {
        let Some(interval) = self.config.cleanup_interval else {
            return;
        };
        let mut timer = self.timer.lock();
        if timer.is_some() || self.closed.load(Ordering::Acquire) {
            return;
        }

        let state: Weak<Mutex<DbState>> = Arc::downgrade(&self.state);
        let config = Arc::clone(&self.config);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(state) = state.upgrade() else { break };
                let max_entries = config.max_entries;
                let outcome = tokio::task::spawn_blocking(move || -> Result<usize> {
                    let mut guard = state.lock();
                    match &mut *guard {
                        DbState::Open(conn) => enforce_retention(conn, max_entries),
                        _ => Ok(0),
                    }
                })
                .await;

                match outcome {
                    Ok(Ok(0)) => {}
                    Ok(Ok(deleted)) => tracing::debug!(deleted, "database log cleanup"),
                    Ok(Err(e)) => tracing::warn!(error = %e, "database log cleanup failed"),
                    Err(e) => tracing::warn!(error = %e, "database log cleanup task failed"),
                }
            }
        }));
    }

    fn stop_cleanup_timer(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    pub async fn query(&self, query: LogQuery) -> Result<Vec<LogEntry>> {
        self.with_connection(move |conn| {
            let (sql, params) = build_query(&query)?;
            let mut statement = conn.prepare(&sql)?;
            let rows = statement.query_map(rusqlite::params_from_iter(params), row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
    }

    /// Count entries per level within an optional time range
    pub async fn statistics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<LogLevel, u64>> {
        self.with_connection(move |conn| {
            let mut sql = String::from("SELECT level, COUNT(*) FROM logs WHERE 1=1");
            let mut params = Vec::new();
            push_range(&mut sql, &mut params, start, end)?;
            sql.push_str(" GROUP BY level");

            let mut statement = conn.prepare(&sql)?;
            let rows = statement.query_map(rusqlite::params_from_iter(params), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;

            let mut stats = BTreeMap::new();
            for row in rows {
                let (level, count) = row?;
                match level.parse::<LogLevel>() {
                    Ok(level) => {
                        stats.insert(level, count as u64);
                    }
                    Err(e) => tracing::warn!(level = %level, error = %e, "unknown level in logs table"),
                }
            }
            Ok(stats)
        })
        .await
    }

    pub async fn count(&self) -> Result<u64> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    /// Enforce the row ceiling now, returning the number of rows removed
    pub async fn cleanup(&self) -> Result<usize> {
        let max_entries = self.config.max_entries;
        self.with_connection(move |conn| enforce_retention(conn, max_entries))
            .await
    }

    pub async fn delete_older_than(&self, age: Duration) -> Result<usize> {
        let age = chrono::Duration::from_std(age)
            .map_err(|e| LoggerError::config("DatabaseOutput", e.to_string()))?;
        let cutoff = to_nanos(&(Utc::now() - age))?;
        self.with_connection(move |conn| {
            Ok(conn.execute("DELETE FROM logs WHERE timestamp < ?1", params![cutoff])?)
        })
        .await
    }

    pub async fn clear(&self) -> Result<usize> {
        self.with_connection(|conn| Ok(conn.execute("DELETE FROM logs", [])?))
            .await
    }
}

#[async_trait]
impl Output for DatabaseOutput {
    async fn write(&self, entry: &LogEntry) -> Result<()> {
        let entry = entry.clone();
        self.with_connection(move |conn| insert_entry(conn, &entry))
            .await
    }

    /// Insert all entries in one transaction
    async fn write_batch(&self, entries: &[LogEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let entries = entries.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            for entry in &entries {
                insert_entry(&tx, entry)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Operations finishing after this point must not restart the timer
        self.closed.store(true, Ordering::Release);
        self.stop_cleanup_timer();
        let state = Arc::clone(&self.state);
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut guard = state.lock();
            match std::mem::replace(&mut *guard, DbState::Closed) {
                DbState::Open(conn) => conn.close().map_err(|(_, e)| LoggerError::from(e)),
                DbState::Uninitialized | DbState::Closed => Ok(()),
            }
        })
        .await?
    }

    fn name(&self) -> &str {
        "database"
    }
}

impl Drop for DatabaseOutput {
    fn drop(&mut self) {
        self.stop_cleanup_timer();
    }
}
