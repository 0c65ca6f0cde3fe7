//! Entry formatters
//!
//! Formatters render an entry to text and are expected to be total: every
//! valid [`LogEntry`] produces a string.
//!
//! - [`SimpleFormatter`]: one human-readable line (default for console and file)
//! - [`CsvFormatter`]: one RFC 4180 row
//! - [`JsonFormatter`]: the entry's JSON wire form
//! - [`DetailedFormatter`]: a multi-line block with every populated field

use super::log_entry::{Fields, LogEntry};
use super::timestamp::TimestampFormat;
use serde_json::Value;

pub trait LogFormatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> String;
}

impl<F> LogFormatter for F
where
    F: Fn(&LogEntry) -> String + Send + Sync,
{
    fn format(&self, entry: &LogEntry) -> String {
        self(entry)
    }
}

/// Escape line breaks and tabs so one entry can never forge another line
fn escape_line(text: &str) -> String {
    text.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render map entries as `key=value`, quoting values with spaces
fn format_fields(fields: &Fields) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            let rendered = render_value(value);
            if rendered.contains(' ') || rendered.contains('"') || rendered.contains('=') {
                format!(
                    "{}=\"{}\"",
                    key,
                    rendered.replace('\\', "\\\\").replace('"', "\\\"")
                )
            } else {
                format!("{}={}", key, rendered)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-line human-readable format
///
/// Example: `[2025-01-08T10:30:45.123Z] [INFO] [Net] Request processed status=200`
#[derive(Debug, Clone)]
pub struct SimpleFormatter {
    timestamp_format: TimestampFormat,
    show_symbol: bool,
    show_metadata: bool,
}

impl Default for SimpleFormatter {
    fn default() -> Self {
        Self {
            timestamp_format: TimestampFormat::default(),
            show_symbol: false,
            show_metadata: true,
        }
    }
}

impl SimpleFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    #[must_use]
    pub fn with_symbols(mut self, enabled: bool) -> Self {
        self.show_symbol = enabled;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.show_metadata = enabled;
        self
    }
}

impl LogFormatter for SimpleFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut line = format!("[{}] ", self.timestamp_format.format(&entry.timestamp));
        if self.show_symbol {
            line.push_str(entry.level.symbol());
            line.push(' ');
        }
        line.push_str(&format!("[{}]", entry.level.to_str()));
        if let Some(ref name) = entry.logger_name {
            line.push_str(&format!(" [{}]", name));
        }
        line.push(' ');
        line.push_str(&escape_line(&entry.message));

        if self.show_metadata {
            if let Some(ref metadata) = entry.metadata {
                if !metadata.is_empty() {
                    line.push(' ');
                    line.push_str(&escape_line(&format_fields(metadata)));
                }
            }
        }
        if let Some(ref tags) = entry.tags {
            if !tags.is_empty() {
                let joined: Vec<&str> = tags.iter().map(String::as_str).collect();
                line.push_str(&format!(" #{}", joined.join(" #")));
            }
        }
        if let Some(ref error) = entry.error {
            line.push_str(&format!(" | error: {}", escape_line(error)));
        }

        line
    }
}

/// Comma-separated values, one row per entry
#[derive(Debug, Clone, Default)]
pub struct CsvFormatter {
    timestamp_format: TimestampFormat,
}

impl CsvFormatter {
    pub const COLUMNS: [&'static str; 9] = [
        "id",
        "timestamp",
        "level",
        "logger",
        "message",
        "error",
        "user_id",
        "session_id",
        "tags",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Header row matching [`CsvFormatter::COLUMNS`]
    pub fn header(&self) -> String {
        Self::COLUMNS.join(",")
    }

    /// Quote a field when it contains a delimiter, quote or line break
    pub fn escape_field(value: &str) -> String {
        if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
        {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }
}

impl LogFormatter for CsvFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let tags = entry
            .tags
            .as_ref()
            .map(|tags| tags.iter().map(String::as_str).collect::<Vec<_>>().join(";"))
            .unwrap_or_default();

        let fields = [
            entry.id.clone(),
            self.timestamp_format.format(&entry.timestamp),
            entry.level.to_str().to_string(),
            entry.logger_name.clone().unwrap_or_default(),
            entry.message.clone(),
            entry.error.clone().unwrap_or_default(),
            entry.user_id.clone().unwrap_or_default(),
            entry.session_id.clone().unwrap_or_default(),
            tags,
        ];

        fields
            .iter()
            .map(|f| Self::escape_field(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The entry's JSON wire form (JSONL when compact)
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let rendered = if self.pretty {
            entry.to_json_pretty()
        } else {
            entry.to_json()
        };
        rendered.unwrap_or_default()
    }
}

/// Multi-line block listing every populated field
#[derive(Debug, Clone, Default)]
pub struct DetailedFormatter {
    timestamp_format: TimestampFormat,
}

impl DetailedFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    fn push_optional(out: &mut String, label: &str, value: Option<&str>) {
        if let Some(value) = value {
            out.push_str(&format!("\n  {}: {}", label, value));
        }
    }

    fn push_fields(out: &mut String, label: &str, fields: Option<&Fields>) {
        if let Some(fields) = fields {
            out.push_str(&format!("\n  {}:", label));
            for (key, value) in fields {
                out.push_str(&format!("\n    {}: {}", key, render_value(value)));
            }
        }
    }
}

impl LogFormatter for DetailedFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut out = format!(
            "{} {} [{}] {}",
            entry.level.symbol(),
            self.timestamp_format.format(&entry.timestamp),
            entry.level.to_str(),
            entry.message
        );

        out.push_str(&format!("\n  id: {}", entry.id));
        Self::push_optional(&mut out, "logger", entry.logger_name.as_deref());
        Self::push_optional(&mut out, "user", entry.user_id.as_deref());
        Self::push_optional(&mut out, "session", entry.session_id.as_deref());
        Self::push_optional(&mut out, "device", entry.device_id.as_deref());
        Self::push_optional(&mut out, "platform", entry.platform.as_deref());
        if entry.app_version.is_some() || entry.build_number.is_some() {
            out.push_str(&format!(
                "\n  app: {}+{}",
                entry.app_version.as_deref().unwrap_or("?"),
                entry.build_number.as_deref().unwrap_or("?")
            ));
        }
        Self::push_optional(&mut out, "thread", entry.thread_name.as_deref());
        if let Some(pid) = entry.process_id {
            out.push_str(&format!("\n  pid: {}", pid));
        }
        if let Some(ref tags) = entry.tags {
            let joined: Vec<&str> = tags.iter().map(String::as_str).collect();
            out.push_str(&format!("\n  tags: [{}]", joined.join(", ")));
        }
        Self::push_fields(&mut out, "metadata", entry.metadata.as_ref());
        Self::push_fields(&mut out, "context", entry.context.as_ref());
        Self::push_optional(&mut out, "error", entry.error.as_deref());
        if let Some(ref trace) = entry.stack_trace {
            out.push_str("\n  stack trace:");
            for frame in trace.lines() {
                out.push_str(&format!("\n    {}", frame));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;
    use serde_json::json;

    #[test]
    fn test_simple_format() {
        let entry = LogEntry::new(LogLevel::Info, "Request processed")
            .with_logger_name("Net")
            .with_field("status", 200);
        let line = SimpleFormatter::new().format(&entry);

        assert!(line.contains("[INFO]"));
        assert!(line.contains("[Net]"));
        assert!(line.contains("Request processed"));
        assert!(line.contains("status=200"));
    }

    #[test]
    fn test_simple_format_escapes_newlines() {
        let entry = LogEntry::new(LogLevel::Info, "line one\nERROR forged line");
        let line = SimpleFormatter::new().format(&entry);

        assert!(!line.contains('\n'));
        assert!(line.contains("\\n"));
    }

    #[test]
    fn test_simple_format_quotes_spaced_values() {
        let entry = LogEntry::new(LogLevel::Debug, "query").with_field("sql", "SELECT * FROM t");
        let line = SimpleFormatter::new().format(&entry);
        assert!(line.contains("sql=\"SELECT * FROM t\""));
    }

    #[test]
    fn test_csv_quotes_commas() {
        let entry = LogEntry::new(LogLevel::Info, "a,b");
        let row = CsvFormatter::new().format(&entry);
        let fields: Vec<&str> = row.split(',').collect();

        assert!(row.contains("\"a,b\""));
        // the quoted comma adds exactly one extra naive split
        assert_eq!(fields.len(), CsvFormatter::COLUMNS.len() + 1);
    }

    #[test]
    fn test_csv_doubles_quotes() {
        assert_eq!(CsvFormatter::escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(CsvFormatter::escape_field("plain"), "plain");
    }

    #[test]
    fn test_csv_header() {
        assert_eq!(
            CsvFormatter::new().header(),
            "id,timestamp,level,logger,message,error,user_id,session_id,tags"
        );
    }

    #[test]
    fn test_json_format_round_trips() {
        let entry = LogEntry::new(LogLevel::Error, "Error occurred").with_field("code", 7);
        let json = JsonFormatter::new().format(&entry);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["level"], "ERROR");
        assert_eq!(parsed["message"], "Error occurred");
        assert_eq!(LogEntry::from_json(&json).unwrap(), entry);
    }

    #[test]
    fn test_detailed_format() {
        let entry = LogEntry::new(LogLevel::Fatal, "crashed")
            .with_logger_name("App")
            .with_field("screen", json!("home"))
            .with_error("null pointer")
            .with_stack_trace("frame 0\nframe 1");
        let block = DetailedFormatter::new().format(&entry);

        assert!(block.starts_with(LogLevel::Fatal.symbol()));
        assert!(block.contains("logger: App"));
        assert!(block.contains("screen: home"));
        assert!(block.contains("error: null pointer"));
        assert!(block.contains("    frame 1"));
    }

    #[test]
    fn test_closure_formatter() {
        let formatter = |e: &LogEntry| format!("{}|{}", e.level, e.message);
        let entry = LogEntry::new(LogLevel::Warning, "careful");
        assert_eq!(formatter.format(&entry), "WARNING|careful");
    }
}
