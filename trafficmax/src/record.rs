//! Sensor records and the line format they are parsed from.
//!
//! A [`Record`] is one timestamped batch of per-light car counts. Records are
//! built once by the parser and never mutated afterwards; the pipeline moves
//! them through the channel by value.
//!
//! # Line Format
//!
//! ```text
//! <timestamp> <sensor_id_1> <count_1> <sensor_id_2> <count_2> ...
//! ```
//!
//! Tokens are separated by any whitespace. The timestamp is an opaque string
//! key. Pair extraction stops at the first count that is not a non-negative
//! integer, and a dangling sensor id without a count is dropped.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A single car count observed for one traffic light.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reading {
    sensor_id: String,
    count: u64,
}

impl Reading {
    /// Creates a new reading.
    pub fn new(sensor_id: impl Into<String>, count: u64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            count,
        }
    }

    /// Returns the traffic light identifier.
    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Returns the number of cars counted.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Raises the count to `count` if it is larger. Returns the resulting count.
    pub(crate) fn raise_to(&mut self, count: u64) -> u64 {
        self.count = self.count.max(count);
        self.count
    }
}

/// One parsed input line: a timestamp plus zero or more readings.
///
/// Readings keep their input order and may repeat a sensor id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    timestamp: String,
    readings: Vec<Reading>,
}

impl Record {
    /// Creates a record from a timestamp and its readings.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trafficmax::{Reading, Record};
    ///
    /// let record = Record::new("08:00", vec![Reading::new("A", 5)]);
    /// assert_eq!(record.timestamp(), "08:00");
    /// assert_eq!(record.readings().len(), 1);
    /// ```
    pub fn new(timestamp: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self {
            timestamp: timestamp.into(),
            readings,
        }
    }

    /// Returns the timestamp key.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Returns the readings in input order.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Consumes the record and returns its timestamp and readings.
    pub fn into_parts(self) -> (String, Vec<Reading>) {
        (self.timestamp, self.readings)
    }

    /// Parses one input line.
    ///
    /// `line_number` is only used for error reporting and diagnostics; pass 0
    /// when the line does not come from a numbered source.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingTimestamp`] if the line is blank.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trafficmax::Record;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let record = Record::parse_line("08:10 A 4 B", 1)?;
    /// assert_eq!(record.readings().len(), 1); // dangling "B" is dropped
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse_line(line: &str, line_number: usize) -> Result<Self, ParseError> {
        let mut tokens = line.split_whitespace();

        let timestamp = tokens
            .next()
            .ok_or(ParseError::MissingTimestamp { line: line_number })?;

        let mut readings = Vec::new();
        while let Some(sensor_id) = tokens.next() {
            let Some(count_token) = tokens.next() else {
                tracing::debug!(line = line_number, sensor_id, "dropping dangling sensor id");
                break;
            };

            match count_token.parse::<u64>() {
                Ok(count) => readings.push(Reading::new(sensor_id, count)),
                Err(_) => {
                    tracing::debug!(
                        line = line_number,
                        sensor_id,
                        count = count_token,
                        "invalid count, dropping rest of line"
                    );
                    break;
                }
            }
        }

        Ok(Self::new(timestamp, readings))
    }

    /// Formats the readings as `ID: <id> <label>: <n>` pairs.
    pub(crate) fn write_readings(
        f: &mut fmt::Formatter<'_>,
        readings: &[Reading],
        label: &str,
    ) -> fmt::Result {
        for reading in readings {
            write!(f, " ID: {} {label}: {}", reading.sensor_id, reading.count)?;
        }
        Ok(())
    }
}

impl FromStr for Record {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s, 0)
    }
}

impl fmt::Display for Record {
    /// Renders `Timestamp: <ts> Light Data: ID: <id> Cars Passed: <n> ...`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp: {} Light Data:", self.timestamp)?;
        Self::write_readings(f, &self.readings, "Cars Passed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(record: &Record) -> Vec<(&str, u64)> {
        record
            .readings()
            .iter()
            .map(|r| (r.sensor_id(), r.count()))
            .collect()
    }

    #[test]
    fn test_parse_full_line() {
        let record = Record::parse_line("08:00 A 5 B 3", 1).unwrap();
        assert_eq!(record.timestamp(), "08:00");
        assert_eq!(pairs(&record), vec![("A", 5), ("B", 3)]);
    }

    #[test]
    fn test_parse_timestamp_only() {
        let record: Record = "08:05".parse().unwrap();
        assert_eq!(record.timestamp(), "08:05");
        assert!(record.readings().is_empty());
    }

    #[test]
    fn test_parse_drops_dangling_token() {
        let record = Record::parse_line("08:10 A 4 B", 3).unwrap();
        assert_eq!(pairs(&record), vec![("A", 4)]);
    }

    #[test]
    fn test_parse_stops_at_invalid_count() {
        let record = Record::parse_line("08:10 A 4 B x C 7", 1).unwrap();
        assert_eq!(pairs(&record), vec![("A", 4)]);

        // Negative counts are not valid car counts.
        let record = Record::parse_line("08:10 A -1 C 7", 1).unwrap();
        assert!(record.readings().is_empty());
    }

    #[test]
    fn test_parse_keeps_duplicate_sensors() {
        let record = Record::parse_line("08:00 A 1 A 9 A 3", 1).unwrap();
        assert_eq!(pairs(&record), vec![("A", 1), ("A", 9), ("A", 3)]);
    }

    #[test]
    fn test_parse_mixed_whitespace() {
        let record = Record::parse_line("  08:00\tA  5 \t B 3  ", 1).unwrap();
        assert_eq!(record.timestamp(), "08:00");
        assert_eq!(pairs(&record), vec![("A", 5), ("B", 3)]);
    }

    #[test]
    fn test_parse_blank_line_errors() {
        assert_eq!(
            Record::parse_line("   ", 7),
            Err(ParseError::MissingTimestamp { line: 7 })
        );
        assert!("".parse::<Record>().is_err());
    }

    #[test]
    fn test_display() {
        let record = Record::parse_line("08:00 A 5 B 3", 1).unwrap();
        assert_eq!(
            record.to_string(),
            "Timestamp: 08:00 Light Data: ID: A Cars Passed: 5 ID: B Cars Passed: 3"
        );

        let empty = Record::new("09:00", Vec::new());
        assert_eq!(empty.to_string(), "Timestamp: 09:00 Light Data:");
    }

    #[test]
    fn test_into_parts() {
        let record = Record::new("08:00", vec![Reading::new("A", 1)]);
        let (ts, readings) = record.into_parts();
        assert_eq!(ts, "08:00");
        assert_eq!(readings, vec![Reading::new("A", 1)]);
    }

    #[test]
    fn test_raise_to() {
        let mut reading = Reading::new("A", 5);
        assert_eq!(reading.raise_to(3), 5);
        assert_eq!(reading.raise_to(8), 8);
        assert_eq!(reading.count(), 8);
    }
}
