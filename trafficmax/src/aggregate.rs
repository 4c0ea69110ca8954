//! Running per-timestamp maximum of car counts.
//!
//! The [`Aggregator`] folds [`Record`]s into an [`AggregationTable`] that maps
//! each timestamp to the largest count seen for every traffic light at that
//! timestamp.
//!
//! # Folding Rules
//!
//! - The first time a sensor id shows up for a timestamp fixes its position
//!   in that timestamp's entry
//! - A later reading for the same (timestamp, sensor) keeps `max(old, new)`
//! - A sensor id not yet present for a known timestamp is appended
//! - Readings inside one record are folded left to right, so a repeated id
//!   is compared against the running maximum, not the value before the call
//!
//! `max` is idempotent, so replaying the same records leaves the table
//! unchanged, and counts for a (timestamp, sensor) pair never decrease.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use serde::Serialize;

use crate::record::{Reading, Record};

/// Snapshot of aggregated maxima, keyed by timestamp.
///
/// Iteration is in ascending lexicographic timestamp order. Each entry lists
/// readings in first-seen order, where the count is the maximum observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AggregationTable {
    entries: BTreeMap<String, Vec<Reading>>,
}

impl AggregationTable {
    /// Returns the per-sensor maxima for `timestamp`.
    pub fn get(&self, timestamp: &str) -> Option<&[Reading]> {
        self.entries.get(timestamp).map(Vec::as_slice)
    }

    /// Returns the maximum count recorded for `sensor_id` at `timestamp`.
    pub fn max_for(&self, timestamp: &str, sensor_id: &str) -> Option<u64> {
        self.get(timestamp)?
            .iter()
            .find(|r| r.sensor_id() == sensor_id)
            .map(Reading::count)
    }

    /// Iterates `(timestamp, maxima)` pairs in ascending timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Reading])> {
        self.entries
            .iter()
            .map(|(ts, readings)| (ts.as_str(), readings.as_slice()))
    }

    /// Returns the number of distinct timestamps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no record has been folded in.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for AggregationTable {
    /// Renders the final report, one line per timestamp.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Maximum cars passed for each timestamp:")?;
        for (timestamp, readings) in self.iter() {
            write!(f, "\nTimestamp: {timestamp} Light Data:")?;
            Record::write_readings(f, readings, "Max Cars Passed")?;
        }
        Ok(())
    }
}

/// Stateful reducer maintaining the running maximum per (timestamp, sensor).
///
/// # Thread Safety
///
/// The aggregator is not internally synchronized. When several consumer
/// threads feed one aggregator, serialize calls to [`update`](Self::update),
/// e.g. behind a `Mutex` as the pipeline driver does.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    table: AggregationTable,
    records_applied: u64,
}

impl Aggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one record into the table.
    ///
    /// Each reading is folded left to right: a sensor already present for the
    /// timestamp keeps its position and takes the larger count, an unseen one
    /// is appended. This holds for the first record of a timestamp too, so a
    /// repeated id within it collapses into one entry (`"08:00 A 1 A 9"`
    /// yields a single `A` with 9).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trafficmax::{Aggregator, Record};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut aggregator = Aggregator::new();
    /// aggregator.update("08:00 A 5 B 3".parse::<Record>()?);
    /// aggregator.update("08:00 A 2 B 9".parse::<Record>()?);
    ///
    /// let table = aggregator.snapshot();
    /// assert_eq!(table.max_for("08:00", "A"), Some(5));
    /// assert_eq!(table.max_for("08:00", "B"), Some(9));
    /// # Ok(())
    /// # }
    /// ```
    pub fn update(&mut self, record: Record) {
        let (timestamp, readings) = record.into_parts();
        self.records_applied += 1;

        let entry = match self.table.entries.entry(timestamp) {
            Entry::Vacant(slot) => slot.insert(Vec::with_capacity(readings.len())),
            Entry::Occupied(slot) => slot.into_mut(),
        };

        for reading in readings {
            match entry
                .iter_mut()
                .find(|existing| existing.sensor_id() == reading.sensor_id())
            {
                Some(existing) => {
                    existing.raise_to(reading.count());
                }
                None => entry.push(reading),
            }
        }
    }

    /// Returns a copy of the table as of this call.
    pub fn snapshot(&self) -> AggregationTable {
        self.table.clone()
    }

    /// Borrows the current table without copying it.
    pub fn table(&self) -> &AggregationTable {
        &self.table
    }

    /// Consumes the aggregator and returns its table.
    pub fn into_table(self) -> AggregationTable {
        self.table
    }

    /// Returns the number of records folded in so far.
    pub fn records_applied(&self) -> u64 {
        self.records_applied
    }

    /// Returns the number of distinct timestamps seen.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns whether no record has been folded in.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
