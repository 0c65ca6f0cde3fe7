//! Output implementations

#[cfg(feature = "console")]
pub mod console;
#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "file")]
pub mod file;
pub mod http;
pub mod multi;

#[cfg(feature = "console")]
pub use console::ConsoleOutput;
#[cfg(feature = "database")]
pub use database::{DatabaseOutput, DatabaseOutputConfig, IndexOptions, LogQuery, SortOrder};
#[cfg(feature = "file")]
pub use file::{FileOutput, FileOutputConfig, ReadOptions};
#[cfg(feature = "http")]
pub use http::ReqwestTransport;
pub use http::{redact_headers, ErrorCallback, HttpOutput, HttpOutputConfig, HttpRequest, HttpTransport};
pub use multi::MultiOutput;

// Re-export the contract next to its implementations
pub use crate::core::Output;
