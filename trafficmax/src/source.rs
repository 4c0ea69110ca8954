//! Line-oriented record sources.
//!
//! [`LineSource`] turns any [`BufRead`] into an iterator of parsed records.
//! Lines without a timestamp or with invalid UTF-8 are skipped with a
//! warning; an I/O error ends the iteration after it has been yielded once.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{ParseError, SourceError};
use crate::record::Record;

/// Iterator over the records of a line-oriented reader.
#[derive(Debug)]
pub struct LineSource<R> {
    reader: R,
    name: PathBuf,
    line_number: usize,
    skipped: usize,
    finished: bool,
    buf: Vec<u8>,
}

impl LineSource<BufReader<File>> {
    /// Opens a file as a record source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "opened record source");
        Ok(Self::from_reader(BufReader::new(file), path))
    }
}

impl<R: BufRead> LineSource<R> {
    /// Wraps a reader. `name` identifies the source in errors and logs.
    pub fn from_reader(reader: R, name: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_number: 0,
            skipped: 0,
            finished: false,
            buf: Vec::new(),
        }
    }

    /// Returns the name used for this source in errors and logs.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Returns the number of lines read so far.
    pub fn lines_read(&self) -> usize {
        self.line_number
    }

    /// Returns the number of lines skipped because they had no timestamp or
    /// were not valid UTF-8.
    pub fn lines_skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = std::result::Result<Record, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.finished = true,
                Ok(_) => {
                    self.line_number += 1;
                    let parsed = match std::str::from_utf8(&self.buf) {
                        Ok(line) => Record::parse_line(line, self.line_number),
                        Err(_) => Err(ParseError::InvalidUtf8 {
                            line: self.line_number,
                        }),
                    };
                    match parsed {
                        Ok(record) => return Some(Ok(record)),
                        Err(e) => {
                            self.skipped += 1;
                            tracing::warn!(source = %self.name.display(), "skipping line: {e}");
                        }
                    }
                }
                Err(source) => {
                    self.finished = true;
                    return Some(Err(SourceError::Read {
                        path: self.name.clone(),
                        line: self.line_number + 1,
                        source,
                    }));
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};
    use tempfile::tempdir;

    #[test]
    fn test_reads_all_records() {
        let input = "08:00 A 5 B 3\n08:00 A 2 B 9\n08:05 A 1\n";
        let source = LineSource::from_reader(Cursor::new(input), "memory");

        let records: Vec<_> = source.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].timestamp(), "08:00");
        assert_eq!(records[2].timestamp(), "08:05");
    }

    #[test]
    fn test_last_line_without_newline() {
        let source = LineSource::from_reader(Cursor::new("08:00 A 5\n08:10 A 4 B"), "memory");
        let records: Vec<_> = source.map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].readings().len(), 1);
    }

    #[test]
    fn test_skips_blank_lines() {
        let mut source = LineSource::from_reader(Cursor::new("\n08:00 A 5\n   \n08:05 A 1\n"), "memory");

        assert_eq!(source.next().unwrap().unwrap().timestamp(), "08:00");
        assert_eq!(source.next().unwrap().unwrap().timestamp(), "08:05");
        assert!(source.next().is_none());
        assert_eq!(source.lines_read(), 4);
        assert_eq!(source.lines_skipped(), 2);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let input: &[u8] = b"08:00 A 5\n08:01 Caf\xE9 3\n08:02 B 7\n08:03 C 9\n";
        let mut source = LineSource::from_reader(Cursor::new(input), "latin1");

        let timestamps: Vec<String> = source
            .by_ref()
            .map(|r| r.unwrap().timestamp().to_string())
            .collect();

        assert_eq!(timestamps, ["08:00", "08:02", "08:03"]);
        assert_eq!(source.lines_read(), 4);
        assert_eq!(source.lines_skipped(), 1);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = LineSource::open(dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[test]
    fn test_open_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, "08:00 A 5 B 3\n08:05 A 1\n").unwrap();

        let source = LineSource::open(&path).unwrap();
        assert_eq!(source.name(), path.as_path());
        assert_eq!(source.count(), 2);
    }

    /// Reader that yields one good line and then fails.
    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("disk on fire"));
            }
            self.served = true;
            let line = b"08:00 A 5\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[test]
    fn test_read_error_ends_iteration() {
        let reader = BufReader::new(FailingReader { served: false });
        let mut source = LineSource::from_reader(reader, "failing");

        assert!(source.next().unwrap().is_ok());
        let err = source.next().unwrap().unwrap_err();
        assert!(matches!(err, SourceError::Read { line: 2, .. }));
        assert!(source.next().is_none());
    }
}
