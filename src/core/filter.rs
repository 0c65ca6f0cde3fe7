//! Entry filters
//!
//! A filter is a pure predicate over a [`LogEntry`]. A Logger runs its
//! filters in order and drops the entry as soon as one rejects it;
//! [`CompositeFilter`] expresses OR logic explicitly.

use super::error::{LoggerError, Result};
use super::log_entry::LogEntry;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;

pub trait LogFilter: Send + Sync {
    fn should_log(&self, entry: &LogEntry) -> bool;
}

impl<F> LogFilter for F
where
    F: Fn(&LogEntry) -> bool + Send + Sync,
{
    fn should_log(&self, entry: &LogEntry) -> bool {
        self(entry)
    }
}

/// Passes entries at or above a minimum level
#[derive(Debug, Clone)]
pub struct LevelFilter {
    min_level: LogLevel,
}

impl LevelFilter {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl LogFilter for LevelFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        entry.level >= self.min_level
    }
}

/// Allow/exclude lists over entry tags (exact match)
///
/// Exclusion wins over allowance. An entry without tags passes only when
/// the allow list is empty.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    allowed: Vec<String>,
    excluded: Vec<String>,
}

impl TagFilter {
    pub fn new<A, E, S, T>(allowed: A, excluded: E) -> Self
    where
        A: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(tags, Vec::<String>::new())
    }

    pub fn exclude<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Vec::<String>::new(), tags)
    }
}

impl LogFilter for TagFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        let tags = match entry.tags.as_ref().filter(|t| !t.is_empty()) {
            Some(tags) => tags,
            None => return self.allowed.is_empty(),
        };

        if self.excluded.iter().any(|t| tags.contains(t)) {
            return false;
        }

        self.allowed.is_empty() || self.allowed.iter().any(|t| tags.contains(t))
    }
}

/// Allow/exclude lists over the logger name (substring containment)
#[derive(Debug, Clone, Default)]
pub struct LoggerNameFilter {
    allowed: Vec<String>,
    excluded: Vec<String>,
}

impl LoggerNameFilter {
    pub fn new<A, E, S, T>(allowed: A, excluded: E) -> Self
    where
        A: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }
}

impl LogFilter for LoggerNameFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        let name = match entry.logger_name.as_deref() {
            Some(name) => name,
            None => return self.allowed.is_empty(),
        };

        if self.excluded.iter().any(|pattern| name.contains(pattern.as_str())) {
            return false;
        }

        self.allowed.is_empty()
            || self.allowed.iter().any(|pattern| name.contains(pattern.as_str()))
    }
}

/// Inclusive time window; a missing bound leaves that side open
#[derive(Debug, Clone, Default)]
pub struct TimeRangeFilter {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl TimeRangeFilter {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }
}

impl LogFilter for TimeRangeFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// Message regex; `include = false` inverts the match
#[derive(Debug, Clone)]
pub struct RegexFilter {
    pattern: Regex,
    include: bool,
}

impl RegexFilter {
    pub fn new(pattern: &str, include: bool) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| LoggerError::config("RegexFilter", e.to_string()))?;
        Ok(Self { pattern, include })
    }

    pub fn from_regex(pattern: Regex, include: bool) -> Self {
        Self { pattern, include }
    }
}

impl LogFilter for RegexFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        self.pattern.is_match(&entry.message) == self.include
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// Every child filter must pass
    #[default]
    All,
    /// At least one child filter must pass
    Any,
}

/// AND/OR combination of child filters
///
/// With no children, `All` passes everything and `Any` rejects everything.
#[derive(Clone, Default)]
pub struct CompositeFilter {
    filters: Vec<Arc<dyn LogFilter>>,
    mode: CompositeMode,
}

impl CompositeFilter {
    pub fn new(mode: CompositeMode) -> Self {
        Self {
            filters: Vec::new(),
            mode,
        }
    }

    pub fn all(filters: Vec<Arc<dyn LogFilter>>) -> Self {
        Self {
            filters,
            mode: CompositeMode::All,
        }
    }

    pub fn any(filters: Vec<Arc<dyn LogFilter>>) -> Self {
        Self {
            filters,
            mode: CompositeMode::Any,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl LogFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn mode(&self) -> CompositeMode {
        self.mode
    }
}

impl LogFilter for CompositeFilter {
    fn should_log(&self, entry: &LogEntry) -> bool {
        match self.mode {
            CompositeMode::All => self.filters.iter().all(|f| f.should_log(entry)),
            CompositeMode::Any => self.filters.iter().any(|f| f.should_log(entry)),
        }
    }
}
