//! # trafficmax
//!
//! Bounded producer/consumer pipeline that tracks peak car counts per
//! traffic light.
//!
//! trafficmax ingests timestamped traffic-sensor readings, hands them from
//! producer threads to consumer threads through a fixed-capacity blocking
//! channel, and folds them into a table holding, for every timestamp, the
//! maximum number of cars each light has seen.
//!
//! ## Key Properties
//!
//! - Backpressure: producers block when the channel is full
//! - FIFO handoff with no lost or duplicated records, for any number of
//!   producers and consumers
//! - Explicit end-of-stream signal, so consumers drain and stop instead of
//!   blocking forever
//! - Deterministic report order (ascending timestamp)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trafficmax::{Pipeline, PipelineConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//!
//! let report = pipeline.run_files(&["test_data.txt"], |record| {
//!     println!("Consumed: {record}");
//! })?;
//!
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Record`] — One parsed input line: timestamp plus readings
//! - [`BoundedChannel`] — Blocking, fixed-capacity FIFO with `close()`
//! - [`Aggregator`] — Running maximum per (timestamp, sensor)
//! - [`Pipeline`] — Producer/consumer threads wired through the channel
//!
//! ## Modules
//!
//! - [`record`] — Record types and the line parser
//! - [`channel`] — Bounded channel
//! - [`aggregate`] — Aggregator and snapshot table
//! - [`source`] — Line-oriented record sources
//! - [`config`] — Pipeline configuration
//! - [`pipeline`] — Pipeline driver and report
//! - [`error`] — Error types

pub mod aggregate;
pub mod channel;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod source;

// Re-export primary API types at crate root for convenience.
pub use aggregate::{AggregationTable, Aggregator};
pub use channel::BoundedChannel;
pub use config::PipelineConfig;
pub use error::{GetError, PutError, Result, TrafficError};
pub use pipeline::{Pipeline, PipelineReport, PipelineState};
pub use record::{Reading, Record};
pub use source::LineSource;
