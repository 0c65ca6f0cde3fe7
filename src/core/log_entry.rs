//! Log entry structure

use super::error::Result;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;

/// String-keyed JSON map used for metadata and context
pub type Fields = Map<String, Value>;

// Thread-local cache so repeated entries on one thread don't re-allocate the name
thread_local! {
    static THREAD_NAME_CACHE: RefCell<Option<Option<String>>> = const { RefCell::new(None) };
}

/// Get cached thread name, computing and caching it on first access
fn get_thread_name() -> Option<String> {
    THREAD_NAME_CACHE.with(|cache| {
        cache
            .borrow_mut()
            .get_or_insert_with(|| std::thread::current().name().map(String::from))
            .clone()
    })
}

/// Time-derived id with a random suffix: `<unix-micros hex>-<random hex>`
pub(crate) fn generate_id(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{:x}-{:08x}",
        timestamp.timestamp_micros(),
        rand::random::<u32>()
    )
}

/// One logged event
///
/// Entries are built once per log call and not mutated after dispatch.
/// Optional fields that are `None` are omitted from JSON, while present but
/// empty maps and tag sets are kept, so the two stay distinguishable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Fields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            id: generate_id(&timestamp),
            timestamp,
            level,
            message: message.into(),
            logger_name: None,
            metadata: None,
            error: None,
            stack_trace: None,
            device_id: None,
            user_id: None,
            session_id: None,
            platform: None,
            app_version: None,
            build_number: None,
            context: None,
            tags: None,
            thread_name: get_thread_name(),
            process_id: Some(std::process::id()),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn with_logger_name(mut self, name: impl Into<String>) -> Self {
        self.logger_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Fields) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add a single metadata field, creating the map if needed
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Fields::new)
            .insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[must_use]
    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
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
    pub fn with_context(mut self, context: Fields) -> Self {
        self.context = Some(context);
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the entry carries the given tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.as_ref().is_some_and(|tags| tags.contains(tag))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_json_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_entry_has_required_fields() {
        let entry = LogEntry::new(LogLevel::Info, "hello");
        assert!(!entry.id.is_empty());
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.process_id, Some(std::process::id()));
        assert!(entry.metadata.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = LogEntry::new(LogLevel::Info, "a");
        let b = LogEntry::new(LogLevel::Info, "b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_json_uses_camel_case_and_omits_absent_fields() {
        let entry = LogEntry::new(LogLevel::Error, "boom")
            .with_logger_name("Net")
            .with_stack_trace("at main");
        let value = entry.to_json_value().unwrap();

        assert_eq!(value["level"], "ERROR");
        assert_eq!(value["loggerName"], "Net");
        assert_eq!(value["stackTrace"], "at main");
        assert!(value.get("metadata").is_none());
        assert!(value.get("userId").is_none());
    }

    #[test]
    fn test_empty_map_is_distinct_from_absent() {
        let with_empty = LogEntry::new(LogLevel::Info, "x").with_metadata(Fields::new());
        let json = with_empty.to_json().unwrap();
        assert!(json.contains("\"metadata\":{}"));

        let back = LogEntry::from_json(&json).unwrap();
        assert_eq!(back.metadata, Some(Fields::new()));

        let without = LogEntry::new(LogLevel::Info, "x");
        let back = LogEntry::from_json(&without.to_json().unwrap()).unwrap();
        assert_eq!(back.metadata, None);
    }

    #[test]
    fn test_round_trip_all_fields() {
        let mut context = Fields::new();
        context.insert("screen".into(), json!("home"));

        let entry = LogEntry::new(LogLevel::Critical, "disk almost full")
            .with_logger_name("Storage")
            .with_field("free_mb", 12)
            .with_field("nested", json!({"a": [1, 2, 3]}))
            .with_error("ENOSPC")
            .with_stack_trace("frame 0\nframe 1")
            .with_user_id("u-1")
            .with_session_id("s-1")
            .with_context(context)
            .with_tags(["disk", "alert"]);

        let back = LogEntry::from_json(&entry.to_json().unwrap()).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_has_tag() {
        let entry = LogEntry::new(LogLevel::Info, "x").with_tags(["a", "b"]);
        assert!(entry.has_tag("a"));
        assert!(!entry.has_tag("c"));
        assert!(!LogEntry::new(LogLevel::Info, "x").has_tag("a"));
    }
}
