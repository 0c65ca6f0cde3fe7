//! # log_hood
//!
//! An application logging library with named loggers, pluggable outputs and
//! asynchronous, per-output delivery.
//!
//! ## Features
//!
//! - **Named loggers**: a [`LogHood`] registry hands out one [`Logger`] per name,
//!   sharing a global context and device identity
//! - **Filtering**: level, tag, logger-name, time-range, regex and composite filters
//! - **Outputs**: console, rotating files, SQLite, batched HTTP and fan-out
//! - **Isolation**: every output runs on its own worker, so a slow or failing
//!   output never blocks the caller or the other outputs
//! - **Crash and performance reporting** built on the same pipeline
//!
//! ## Example
//!
//! ```
//! use log_hood::prelude::*;
//!
//! let logger = Logger::builder("Net")
//!     .min_level(LogLevel::Info)
//!     .output(ConsoleOutput::new())
//!     .build()
//!     .unwrap();
//!
//! logger.info("connected");
//! logger.log_with(
//!     LogLevel::Warning,
//!     "slow response",
//!     LogOptions::new().with_field("latencyMs", 950).with_tag("network"),
//! );
//! ```

pub mod core;
pub mod macros;
pub mod outputs;

pub mod prelude {
    pub use crate::core::{
        CompositeFilter, CrashRecorder, CsvFormatter, DetailedFormatter, Fields, GlobalContext,
        JsonFormatter, LevelFilter, LogEntry, LogFilter, LogFormatter, LogHood, LogLevel,
        LogOptions, Logger, LoggerBuilder, LoggerError, LoggerMetrics, Output,
        PerformanceMonitor, Result, SimpleFormatter, StackTracePolicy, TagFilter,
        TimestampFormat,
    };
    #[cfg(feature = "console")]
    pub use crate::outputs::ConsoleOutput;
    #[cfg(feature = "database")]
    pub use crate::outputs::{DatabaseOutput, DatabaseOutputConfig, LogQuery};
    #[cfg(feature = "file")]
    pub use crate::outputs::{FileOutput, FileOutputConfig};
    pub use crate::outputs::{HttpOutput, HttpOutputConfig, MultiOutput};
}

pub use core::{
    CompositeFilter, CompositeMode, ContextSnapshot, CrashRecorder, CrashReport, CsvFormatter,
    DetailedFormatter, DeviceIdentity, Fields, GlobalContext, IdentityProvider, JsonFormatter,
    LevelFilter, LogEntry, LogFilter, LogFormatter, LogHood, LogLevel, LogOptions, Logger,
    LoggerBuilder, LoggerError, LoggerMetrics, LoggerNameFilter, Output, PerformanceMonitor,
    PerformanceStats, PerformanceTimer, RegexFilter, Result, SimpleFormatter, StackTracePolicy,
    StaticIdentity, SystemIdentity, TagFilter, TimeRangeFilter, TimestampFormat, CRASH_TAG,
    DEFAULT_QUEUE_CAPACITY,
};
#[cfg(feature = "console")]
pub use outputs::ConsoleOutput;
#[cfg(feature = "database")]
pub use outputs::{DatabaseOutput, DatabaseOutputConfig, IndexOptions, LogQuery, SortOrder};
#[cfg(feature = "file")]
pub use outputs::{FileOutput, FileOutputConfig, ReadOptions};
pub use outputs::{HttpOutput, HttpOutputConfig, HttpRequest, HttpTransport, MultiOutput};
