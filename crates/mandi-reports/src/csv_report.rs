use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use mandi_core::PriceRecord;
use tracing::warn;

use crate::layout::RowMapper;
use crate::{CellValue, ParseError, ParseStats, ReportLayout, RowParseError};

/// Streams records out of a CSV export, one line at a time.
pub struct CsvReport<R> {
    records: csv::StringRecordsIntoIter<R>,
    mapper: RowMapper,
    origin: PathBuf,
    read_error: Option<ParseError>,
    done: bool,
}

impl<R> std::fmt::Debug for CsvReport<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvReport")
            .field("origin", &self.origin)
            .field("mapper", &self.mapper)
            .field("read_error", &self.read_error)
            .field("done", &self.done)
            .finish()
    }
}

impl CsvReport<File> {
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        let file = File::open(path).map_err(|err| ParseError::source_read(path, err))?;
        let mut report = Self::from_reader(file);
        report.origin = path.to_path_buf();
        Ok(report)
    }
}

impl<R: Read> CsvReport<R> {
    pub fn from_reader(reader: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self {
            records: reader.into_records(),
            mapper: RowMapper::new(None),
            origin: PathBuf::from("<stream>"),
            read_error: None,
            done: false,
        }
    }

    /// Final once the iterator has returned `None`.
    pub fn stats(&self) -> &ParseStats {
        self.mapper.stats()
    }

    pub fn layout(&self) -> Option<ReportLayout> {
        self.mapper.layout()
    }

    /// Set when the underlying reader failed and iteration stopped early.
    pub fn take_read_error(&mut self) -> Option<ParseError> {
        self.read_error.take()
    }
}

impl<R: Read> Iterator for CsvReport<R> {
    type Item = PriceRecord;

    fn next(&mut self) -> Option<PriceRecord> {
        loop {
            if let Some(record) = self.mapper.pop() {
                return Some(record);
            }
            if self.done {
                return None;
            }
            match self.records.next() {
                Some(Ok(row)) => {
                    let cells = row.iter().map(CellValue::from_text).collect();
                    self.mapper.feed(cells);
                }
                Some(Err(err)) if err.is_io_error() => {
                    let rows = self.mapper.stats().rows_read;
                    warn!(error = %err, rows, "csv read aborted");
                    self.read_error = Some(ParseError::source_read(
                        &self.origin,
                        format!("read failed after {rows} rows: {err}"),
                    ));
                    self.done = true;
                    self.mapper.finish();
                }
                Some(Err(err)) => self.mapper.drop_row(RowParseError::Malformed(err.to_string())),
                None => {
                    self.done = true;
                    self.mapper.finish();
                }
            }
        }
    }
}
