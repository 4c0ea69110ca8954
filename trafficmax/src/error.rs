//! Error types for the trafficmax pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all trafficmax operations.
///
/// Channel, aggregator and parser operations only fail on misconfiguration
/// or malformed input; everything that can go wrong while a pipeline runs
/// (unreadable sources, panicking workers) is surfaced through this enum as
/// well.
#[derive(Error, Debug)]
pub enum TrafficError {
    /// Error constructing a channel.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Error reading from a record source.
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Error parsing an input line into a record.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error loading or validating pipeline configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error while running the pipeline.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Error rendering a report.
    #[error("report error: {0}")]
    Report(#[from] ReportError),
}

/// Errors that can occur when constructing a bounded channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The requested capacity cannot hold a single value.
    #[error("invalid channel capacity: {capacity} (must be > 0)")]
    InvalidCapacity {
        /// The rejected capacity.
        capacity: usize,
    },
}

/// Errors that can occur while opening or reading a record source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source could not be opened.
    #[error("failed to open source '{}': {source}", path.display())]
    Unavailable {
        /// The path that could not be opened.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a line from an opened source failed.
    #[error("failed to read line {line} of '{}': {source}", path.display())]
    Read {
        /// The source path, or a descriptive name for in-memory readers.
        path: PathBuf,
        /// The 1-based line number that failed.
        line: usize,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when parsing an input line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line has no timestamp token.
    #[error("line {line} has no timestamp")]
    MissingTimestamp {
        /// The 1-based line number, or 0 when parsed outside a source.
        line: usize,
    },

    /// The line is not valid UTF-8.
    #[error("line {line} is not valid UTF-8")]
    InvalidUtf8 {
        /// The 1-based line number.
        line: usize,
    },
}

/// Errors that can occur when loading or validating pipeline configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configured consumer count is zero.
    #[error("invalid consumer count: {count} (must be > 0)")]
    InvalidConsumers {
        /// The rejected count.
        count: usize,
    },

    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`PipelineConfig`](crate::PipelineConfig).
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while running a pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A producer or consumer thread panicked.
    #[error("{role} thread panicked")]
    WorkerPanicked {
        /// Which side of the channel the thread was on.
        role: WorkerRole,
    },
}

/// Side of the channel a pipeline worker runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    /// Reads from a source and puts into the channel.
    Producer,
    /// Gets from the channel and folds into the aggregator.
    Consumer,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::Producer => f.write_str("producer"),
            WorkerRole::Consumer => f.write_str("consumer"),
        }
    }
}

/// Errors that can occur when rendering a report.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Error returned by the put side of a [`BoundedChannel`](crate::BoundedChannel).
///
/// Every variant hands the rejected value back to the caller, so a failed
/// put never loses data.
#[derive(PartialEq, Eq)]
pub enum PutError<T> {
    /// The channel was full and the call does not block.
    Full(T),
    /// The channel stayed full for the whole timeout.
    Timeout(T),
    /// The channel has been closed.
    Closed(T),
}

impl<T> PutError<T> {
    /// Returns the value that could not be put.
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(value) | PutError::Timeout(value) | PutError::Closed(value) => value,
        }
    }
}

// Manual impls so `T` does not need to be `Debug`.
impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => f.write_str("Full(..)"),
            PutError::Timeout(_) => f.write_str("Timeout(..)"),
            PutError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => f.write_str("channel is full"),
            PutError::Timeout(_) => f.write_str("timed out waiting for channel capacity"),
            PutError::Closed(_) => f.write_str("channel is closed"),
        }
    }
}

impl<T> std::error::Error for PutError<T> {}

/// Error returned by the get side of a [`BoundedChannel`](crate::BoundedChannel).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetError {
    /// The channel was empty and the call does not block.
    #[error("channel is empty")]
    Empty,
    /// The channel stayed empty for the whole timeout.
    #[error("timed out waiting for a value")]
    Timeout,
    /// The channel is closed and every queued value has been taken.
    #[error("channel is closed and drained")]
    Closed,
}

/// Type alias for `Result<T, TrafficError>`.
pub type Result<T> = std::result::Result<T, TrafficError>;
