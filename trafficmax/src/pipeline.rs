//! Pipeline driver wiring record sources through a bounded channel into an
//! aggregator.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──run()──▶ Producing ──all producers done──▶ Draining ──consumers joined──▶ Done
//! ```
//!
//! - One producer thread per source puts records into the channel
//! - `consumers` threads get records, report them through the `on_consumed`
//!   callback and fold them into a shared aggregator
//! - When every producer has finished, the driver closes the channel; the
//!   consumers drain what is left and exit
//! - The snapshot is taken only after every thread has been joined
//!
//! A failing source ends its own producer and is recorded in the
//! [`PipelineReport`]; the run still completes with whatever was consumed.
//!
//! # Example
//!
//! ```rust
//! use trafficmax::{Pipeline, PipelineConfig, Record};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let records: Vec<Record> = ["08:00 A 5 B 3", "08:00 A 2 B 9", "08:05 A 1"]
//!     .iter()
//!     .map(|line| line.parse())
//!     .collect::<Result<_, _>>()?;
//!
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let report = pipeline.run_iter(records, |record| println!("Consumed: {record}"))?;
//!
//! assert_eq!(report.table.max_for("08:00", "B"), Some(9));
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use crate::aggregate::{AggregationTable, Aggregator};
use crate::channel::BoundedChannel;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, ReportError, Result, SourceError, WorkerRole};
use crate::record::Record;
use crate::source::LineSource;

/// A boxed record source, for mixing source types in one run.
pub type BoxedSource = Box<dyn Iterator<Item = std::result::Result<Record, SourceError>> + Send>;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    /// No run in progress.
    Idle = 0,
    /// Producers and consumers are running.
    Producing = 1,
    /// Producers are done; consumers are draining the channel.
    Draining = 2,
    /// Every worker has been joined and the report is ready.
    Done = 3,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Producing,
            2 => Self::Draining,
            3 => Self::Done,
            _ => Self::Idle,
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Aggregated maxima over every consumed record.
    pub table: AggregationTable,
    /// Records successfully put into the channel.
    pub produced: u64,
    /// Records taken from the channel and folded into the table.
    pub consumed: u64,
    /// Errors from sources that failed to open or read.
    pub source_errors: Vec<SourceError>,
}

impl PipelineReport {
    /// Returns whether every source was read to the end.
    pub fn is_complete(&self) -> bool {
        self.source_errors.is_empty()
    }

    /// Renders the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialize`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String> {
        let errors: Vec<String> = self.source_errors.iter().map(ToString::to_string).collect();
        let value = serde_json::json!({
            "produced": self.produced,
            "consumed": self.consumed,
            "source_errors": errors,
            "maxima": self.table,
        });

        Ok(serde_json::to_string_pretty(&value).map_err(ReportError::from)?)
    }
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.table, f)
    }
}

/// Closes the channel if the owning thread unwinds, so threads on the other
/// side are not left blocked forever. Held by every worker and by the driver
/// while it spawns and joins them.
struct CloseOnPanic<'a>(&'a BoundedChannel<Record>);

impl Drop for CloseOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

/// Runs producer/consumer threads over a shared bounded channel.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    state: AtomicU8,
}

impl Pipeline {
    /// Creates an idle pipeline.
    ///
    /// # Errors
    ///
    /// Returns any error from [`PipelineConfig::validate`].
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: AtomicU8::new(PipelineState::Idle as u8),
        })
    }

    /// Returns the configuration this pipeline was built with.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the current phase. Safe to call from other threads while
    /// [`run`](Self::run) is in progress.
    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, next: PipelineState) {
        let previous = PipelineState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        tracing::debug!(from = ?previous, to = ?next, "pipeline state change");
    }

    /// Runs the pipeline over `sources`, one producer thread per source.
    ///
    /// `on_consumed` is called from consumer threads once per record, before
    /// the record is folded into the aggregator. With more than one consumer
    /// the calls may interleave in any order.
    ///
    /// Blocks until every producer and consumer has finished.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if a producer or consumer
    /// thread panicked (including a panic inside `on_consumed`). Source
    /// failures are not errors; they are listed in
    /// [`PipelineReport::source_errors`].
    pub fn run<I, S, F>(&self, sources: I, on_consumed: F) -> Result<PipelineReport>
    where
        I: IntoIterator<Item = S>,
        S: IntoIterator<Item = std::result::Result<Record, SourceError>> + Send,
        F: Fn(&Record) + Sync,
    {
        let started = Instant::now();
        let channel = BoundedChannel::new(self.config.capacity)?;
        let aggregator = Mutex::new(Aggregator::new());
        let produced = AtomicU64::new(0);
        let consumed = AtomicU64::new(0);
        let source_errors = Mutex::new(Vec::new());

        self.transition(PipelineState::Producing);

        let panicked = thread::scope(|s| {
            let _guard = CloseOnPanic(&channel);
            let consumers: Vec<_> = (0..self.config.consumers)
                .map(|id| {
                    let (channel, aggregator, consumed, on_consumed) =
                        (&channel, &aggregator, &consumed, &on_consumed);
                    s.spawn(move || {
                        let _guard = CloseOnPanic(channel);
                        while let Some(record) = channel.get() {
                            on_consumed(&record);
                            aggregator
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .update(record);
                            consumed.fetch_add(1, Ordering::Relaxed);
                        }
                        tracing::debug!(consumer = id, "consumer finished");
                    })
                })
                .collect();

            let producers: Vec<_> = sources
                .into_iter()
                .enumerate()
                .map(|(id, source)| {
                    let (channel, produced, source_errors) = (&channel, &produced, &source_errors);
                    s.spawn(move || {
                        let _guard = CloseOnPanic(channel);
                        for item in source {
                            match item {
                                Ok(record) => {
                                    if channel.put(record).is_err() {
                                        tracing::warn!(producer = id, "channel closed, stopping producer");
                                        break;
                                    }
                                    produced.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(e) => {
                                    tracing::warn!(producer = id, "source failed: {e}");
                                    source_errors
                                        .lock()
                                        .unwrap_or_else(PoisonError::into_inner)
                                        .push(e);
                                    break;
                                }
                            }
                        }
                        tracing::debug!(producer = id, "producer finished");
                    })
                })
                .collect();

            let mut panicked = None;
            for producer in producers {
                if producer.join().is_err() {
                    panicked.get_or_insert(WorkerRole::Producer);
                }
            }

            self.transition(PipelineState::Draining);
            channel.close();

            for consumer in consumers {
                if consumer.join().is_err() {
                    panicked.get_or_insert(WorkerRole::Consumer);
                }
            }

            panicked
        });

        self.transition(PipelineState::Done);

        if let Some(role) = panicked {
            return Err(PipelineError::WorkerPanicked { role }.into());
        }

        let table = aggregator
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_table();
        let report = PipelineReport {
            table,
            produced: produced.into_inner(),
            consumed: consumed.into_inner(),
            source_errors: source_errors
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        };

        tracing::info!(
            produced = report.produced,
            consumed = report.consumed,
            timestamps = report.table.len(),
            failed_sources = report.source_errors.len(),
            peak_queue = channel.peak_len(),
            elapsed = ?started.elapsed(),
            "pipeline finished"
        );

        Ok(report)
    }

    /// Runs the pipeline over a single in-memory sequence of records.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_iter<I, F>(&self, records: I, on_consumed: F) -> Result<PipelineReport>
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Send,
        F: Fn(&Record) + Sync,
    {
        self.run([records.into_iter().map(Ok)], on_consumed)
    }

    /// Runs the pipeline with one producer per input file.
    ///
    /// A file that cannot be opened contributes zero records and shows up in
    /// [`PipelineReport::source_errors`].
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_files<P, F>(&self, paths: &[P], on_consumed: F) -> Result<PipelineReport>
    where
        P: AsRef<std::path::Path>,
        F: Fn(&Record) + Sync,
    {
        let sources: Vec<BoxedSource> = paths.iter().map(|path| open_source(path.as_ref())).collect();
        self.run(sources, on_consumed)
    }
}

/// Opens `path` as a boxed source. An open failure becomes a source that
/// yields that single error.
fn open_source(path: &std::path::Path) -> BoxedSource {
    match LineSource::open(path) {
        Ok(source) => Box::new(source),
        Err(e) => Box::new(std::iter::once(Err(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Reading;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    fn records(lines: &[&str]) -> Vec<Record> {
        lines.iter().map(|line| line.parse().unwrap()).collect()
    }

    #[test]
    fn test_new_pipeline_is_idle() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.config().capacity, 10);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            capacity: 0,
            consumers: 1,
        };
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn test_run_iter_concrete_scenario() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let seen = AtomicUsize::new(0);

        let report = pipeline
            .run_iter(records(&["08:00 A 5 B 3", "08:00 A 2 B 9", "08:05 A 1"]), |_| {
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(seen.load(Ordering::Relaxed), 3);
        assert_eq!(report.produced, 3);
        assert_eq!(report.consumed, 3);
        assert!(report.is_complete());
        assert_eq!(report.table.max_for("08:00", "A"), Some(5));
        assert_eq!(report.table.max_for("08:00", "B"), Some(9));
        assert_eq!(report.table.max_for("08:05", "A"), Some(1));
    }

    #[test]
    fn test_run_without_sources() {
        let pipeline = Pipeline::new(PipelineConfig::new(2, 3).unwrap()).unwrap();
        let sources: Vec<Vec<std::result::Result<Record, SourceError>>> = Vec::new();
        let report = pipeline.run(sources, |_| {}).unwrap();

        assert_eq!(report.produced, 0);
        assert_eq!(report.consumed, 0);
        assert!(report.table.is_empty());
    }

    #[test]
    fn test_source_error_keeps_partial_results() {
        let pipeline = Pipeline::new(PipelineConfig::new(1, 1).unwrap()).unwrap();
        let source: Vec<std::result::Result<Record, SourceError>> = vec![
            Ok("08:00 A 5".parse().unwrap()),
            Err(SourceError::Read {
                path: PathBuf::from("broken"),
                line: 2,
                source: std::io::Error::other("boom"),
            }),
            Ok("08:05 A 1".parse().unwrap()),
        ];

        let report = pipeline.run([source], |_| {}).unwrap();

        assert!(!report.is_complete());
        assert_eq!(report.source_errors.len(), 1);
        assert_eq!(report.consumed, 1);
        assert_eq!(report.table.max_for("08:00", "A"), Some(5));
        assert!(report.table.get("08:05").is_none());
    }

    #[test]
    fn test_consumer_panic_is_reported() {
        let pipeline = Pipeline::new(PipelineConfig::new(1, 1).unwrap()).unwrap();
        let input = records(&["08:00 A 1", "08:00 A 2", "08:00 A 3", "08:00 A 4"]);

        let err = pipeline
            .run_iter(input, |record| {
                if record.readings()[0].count() == 2 {
                    panic!("callback failure");
                }
            })
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::TrafficError::Pipeline(PipelineError::WorkerPanicked {
                role: WorkerRole::Consumer
            })
        ));
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn test_producer_panic_is_reported() {
        let pipeline = Pipeline::new(PipelineConfig::new(1, 2).unwrap()).unwrap();
        let source = (0..4).map(|i| {
            if i == 1 {
                panic!("source failure");
            }
            Ok::<_, SourceError>(Record::new("08:00", vec![Reading::new("A", i)]))
        });

        let err = pipeline.run([source], |_| {}).unwrap_err();

        assert!(matches!(
            err,
            crate::error::TrafficError::Pipeline(PipelineError::WorkerPanicked {
                role: WorkerRole::Producer
            })
        ));
        assert_eq!(pipeline.state(), PipelineState::Done);
    }

    #[test]
    fn test_panicking_source_list_releases_consumers() {
        let (done_tx, done_rx) = mpsc::channel();

        std::thread::spawn(move || {
            let pipeline = Pipeline::new(PipelineConfig::new(2, 3).unwrap()).unwrap();
            let sources = (0..2).map(|i| {
                if i == 1 {
                    panic!("cannot build source");
                }
                vec![Ok::<_, SourceError>(Record::new("08:00", vec![Reading::new("A", 1)]))]
            });

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                pipeline.run(sources, |_| {})
            }));
            let _ = done_tx.send(outcome.is_err());
        });

        let unwound = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("run stayed blocked after the driver panicked");
        assert!(unwound);
    }

    #[test]
    fn test_report_json() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.run_iter(records(&["08:00 A 5"]), |_| {}).unwrap();

        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["produced"], 1);
        assert_eq!(json["consumed"], 1);
        assert_eq!(json["maxima"]["08:00"][0]["count"], 5);
        assert_eq!(json["source_errors"], serde_json::json!([]));
    }

    #[test]
    fn test_report_display_matches_table() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.run_iter(records(&["08:00 A 5"]), |_| {}).unwrap();
        assert_eq!(report.to_string(), report.table.to_string());
    }
}
