//! Core logger types and traits

pub mod context;
pub mod crash;
pub mod error;
pub mod filter;
pub mod formatter;
pub mod identity;
pub mod log_entry;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod output;
pub mod performance;
pub mod registry;
pub mod timestamp;

pub use context::{ContextSnapshot, GlobalContext};
pub use crash::{CrashRecorder, CrashReport, CRASH_TAG};
pub use error::{LoggerError, Result};
pub use filter::{
    CompositeFilter, CompositeMode, LevelFilter, LogFilter, LoggerNameFilter, RegexFilter,
    TagFilter, TimeRangeFilter,
};
pub use formatter::{
    CsvFormatter, DetailedFormatter, JsonFormatter, LogFormatter, SimpleFormatter,
};
pub use identity::{DeviceIdentity, IdentityProvider, StaticIdentity, SystemIdentity};
pub use log_entry::{Fields, LogEntry};
pub use log_level::LogLevel;
pub use logger::{LogOptions, Logger, LoggerBuilder, StackTracePolicy, DEFAULT_QUEUE_CAPACITY};
pub use metrics::LoggerMetrics;
pub use output::Output;
pub use performance::{PerformanceMonitor, PerformanceStats, PerformanceTimer};
pub use registry::LogHood;
pub use timestamp::TimestampFormat;
