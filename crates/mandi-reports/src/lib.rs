//! Mandi price report readers: format sniffing, header classification, and
//! lazy record streams over CSV and spreadsheet exports.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use mandi_core::PriceRecord;
use serde::Serialize;
use thiserror::Error;

mod csv_report;
mod layout;
mod sheet_report;

pub use csv_report::CsvReport;
pub use layout::{classify_header, ReportLayout};
pub use sheet_report::SheetReport;

pub const CRATE_NAME: &str = "mandi-reports";

/// Spreadsheet headers must appear within this many leading rows.
pub const SHEET_HEADER_SEARCH_ROWS: usize = 10;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read report {}: {reason}", path.display())]
    SourceRead { path: PathBuf, reason: String },
}

impl ParseError {
    pub(crate) fn source_read(path: &Path, reason: impl fmt::Display) -> Self {
        ParseError::SourceRead {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Why a single row or record was dropped. Counted, never propagated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowParseError {
    #[error("unparsable date `{0}`")]
    InvalidDate(String),
    #[error("non-positive price `{raw}` for {commodity}")]
    NonPositivePrice { commodity: String, raw: String },
    #[error("malformed row: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub rows_read: usize,
    /// Blank, separator, preamble, and total rows.
    pub rows_skipped: usize,
    pub records_emitted: usize,
    pub records_dropped: usize,
    /// Numeric cells that failed to parse and were stored as 0.
    pub values_coerced: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn from_text(raw: &str) -> Self {
        if raw.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(raw.to_string())
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Pick a reader from the file's leading bytes; anything not a workbook is read as CSV.
pub fn sniff_source_format(path: &Path) -> Result<SourceFormat, ParseError> {
    let mut file = File::open(path).map_err(|err| ParseError::source_read(path, err))?;
    let mut head = [0u8; 8];
    let mut filled = 0;
    while filled < head.len() {
        let n = file
            .read(&mut head[filled..])
            .map_err(|err| ParseError::source_read(path, err))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let head = &head[..filled];
    if head.starts_with(ZIP_MAGIC) || head.starts_with(OLE_MAGIC) {
        Ok(SourceFormat::Spreadsheet)
    } else {
        Ok(SourceFormat::Csv)
    }
}

/// A lazy stream of records from either reader. Each report is read once.
#[derive(Debug)]
pub enum ReportReader {
    Csv(CsvReport<File>),
    Sheet(SheetReport),
}

impl ReportReader {
    pub fn format(&self) -> SourceFormat {
        match self {
            ReportReader::Csv(_) => SourceFormat::Csv,
            ReportReader::Sheet(_) => SourceFormat::Spreadsheet,
        }
    }

    pub fn stats(&self) -> ParseStats {
        match self {
            ReportReader::Csv(r) => *r.stats(),
            ReportReader::Sheet(r) => *r.stats(),
        }
    }

    pub fn layout(&self) -> Option<ReportLayout> {
        match self {
            ReportReader::Csv(r) => r.layout(),
            ReportReader::Sheet(r) => r.layout(),
        }
    }

    /// A read failure that cut the stream short. Workbooks are loaded whole
    /// on open, so only CSV streams can fail here.
    pub fn take_read_error(&mut self) -> Option<ParseError> {
        match self {
            ReportReader::Csv(r) => r.take_read_error(),
            ReportReader::Sheet(_) => None,
        }
    }
}

impl Iterator for ReportReader {
    type Item = PriceRecord;

    fn next(&mut self) -> Option<PriceRecord> {
        match self {
            ReportReader::Csv(r) => r.next(),
            ReportReader::Sheet(r) => r.next(),
        }
    }
}

pub fn open_report(path: &Path) -> Result<ReportReader, ParseError> {
    match sniff_source_format(path)? {
        SourceFormat::Csv => Ok(ReportReader::Csv(CsvReport::open(path)?)),
        SourceFormat::Spreadsheet => Ok(ReportReader::Sheet(SheetReport::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file
    }

    #[test]
    fn sniffs_workbooks_by_magic_bytes() {
        let xlsx = temp_with(b"PK\x03\x04\x14\x00\x06\x00rest-of-zip");
        let xls = temp_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
        let csv = temp_with(b"Commodity,Market\n");
        let tiny = temp_with(b"P");

        assert_eq!(sniff_source_format(xlsx.path()).unwrap(), SourceFormat::Spreadsheet);
        assert_eq!(sniff_source_format(xls.path()).unwrap(), SourceFormat::Spreadsheet);
        assert_eq!(sniff_source_format(csv.path()).unwrap(), SourceFormat::Csv);
        assert_eq!(sniff_source_format(tiny.path()).unwrap(), SourceFormat::Csv);
    }

    #[test]
    fn missing_file_is_a_source_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = open_report(&dir.path().join("absent.csv")).expect_err("must fail");
        assert!(matches!(err, ParseError::SourceRead { .. }));
    }

    #[test]
    fn corrupt_workbook_is_a_source_read_error() {
        let fake = temp_with(b"PK\x03\x04 definitely not a workbook");
        let err = open_report(fake.path()).expect_err("must fail");
        assert!(matches!(err, ParseError::SourceRead { .. }));
    }

    #[test]
    fn open_report_streams_csv_records() {
        let file = temp_with(
            b"Commodity,State,District,Market,Modal Price,Arrivals,Arrival_Date\n\
              Onion,Maharashtra,Nashik,Lasalgaon,1800,120,02/01/2025\n",
        );
        let mut reader = open_report(file.path()).expect("open");
        assert_eq!(reader.format(), SourceFormat::Csv);

        let records: Vec<PriceRecord> = reader.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].arrival_volume, Some(120.0));
        assert_eq!(reader.layout(), Some(ReportLayout::LongReport));
        assert_eq!(reader.stats().records_emitted, 1);
    }

    #[test]
    fn number_cells_render_without_trailing_zeroes() {
        assert_eq!(CellValue::Number(1500.0).as_text(), "1500");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
        assert_eq!(CellValue::from_text("   "), CellValue::Empty);
    }
}
