use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use mandi_core::PriceRecord;

use crate::layout::RowMapper;
use crate::{CellValue, ParseError, ParseStats, ReportLayout, SHEET_HEADER_SEARCH_ROWS};

/// Reads the first worksheet of an xlsx/xls export.
#[derive(Debug)]
pub struct SheetReport {
    range: Range<Data>,
    next_row: usize,
    mapper: RowMapper,
    done: bool,
}

impl SheetReport {
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        let mut workbook = open_workbook_auto(path).map_err(|err| ParseError::source_read(path, err))?;
        let first = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ParseError::source_read(path, "workbook has no sheets"))?;
        let range = workbook
            .worksheet_range(&first)
            .map_err(|err| ParseError::source_read(path, err))?;
        Ok(Self::from_range(range))
    }

    pub fn from_range(range: Range<Data>) -> Self {
        Self {
            range,
            next_row: 0,
            mapper: RowMapper::new(Some(SHEET_HEADER_SEARCH_ROWS)),
            done: false,
        }
    }

    pub fn stats(&self) -> &ParseStats {
        self.mapper.stats()
    }

    pub fn layout(&self) -> Option<ReportLayout> {
        self.mapper.layout()
    }

    fn row_cells(&self, row: usize) -> Vec<CellValue> {
        (0..self.range.width())
            .map(|col| self.range.get((row, col)).map(cell_value).unwrap_or(CellValue::Empty))
            .collect()
    }
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from_text(s),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| CellValue::Date(d.date()))
            .unwrap_or(CellValue::Empty),
    }
}

impl Iterator for SheetReport {
    type Item = PriceRecord;

    fn next(&mut self) -> Option<PriceRecord> {
        loop {
            if let Some(record) = self.mapper.pop() {
                return Some(record);
            }
            if self.done {
                return None;
            }
            if self.next_row >= self.range.height() {
                self.done = true;
                self.mapper.finish();
                continue;
            }
            let cells = self.row_cells(self.next_row);
            self.next_row += 1;
            self.mapper.feed(cells);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sheet(rows: &[Vec<Data>]) -> Range<Data> {
        let height = rows.len() as u32;
        let width = rows.iter().map(Vec::len).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (height - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    #[test]
    fn wide_sheet_uses_native_numbers() {
        let range = sheet(&[
            vec![s("Daily Price and Arrival Report")],
            vec![],
            vec![s("Commodity Group"), s("Commodity"), s("Price on 1 Jan, 2025"), s("Price on 2 Jan, 2025")],
            vec![s("Oil Seeds"), s("Soybean"), Data::Float(4650.0), s("-")],
            vec![s("Oil Seeds"), s("Total"), Data::Float(9999.0), Data::Float(9999.0)],
        ]);
        let mut report = SheetReport::from_range(range);
        let records: Vec<PriceRecord> = report.by_ref().collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].commodity, "Soybean");
        assert_eq!(records[0].modal_price, 4650.0);
        assert_eq!(records[0].observation_date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(report.layout(), Some(ReportLayout::WideReport));
    }

    #[test]
    fn long_sheet_reads_integer_cells() {
        let range = sheet(&[
            vec![s("Commodity"), s("Market"), s("Modal Price"), s("Arrival_Date")],
            vec![s("Cotton"), s("Akola"), Data::Int(7100), s("04/01/2025")],
        ]);
        let records: Vec<PriceRecord> = SheetReport::from_range(range).collect();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].modal_price, 7100.0);
        assert_eq!(records[0].observation_date, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
    }

    #[test]
    fn header_beyond_first_ten_rows_is_ignored() {
        let mut rows: Vec<Vec<Data>> = (0..10).map(|i| vec![s(&format!("note {i}"))]).collect();
        rows.push(vec![s("Commodity"), s("Price on 1 Jan, 2025")]);
        rows.push(vec![s("Onion"), Data::Float(1500.0)]);
        let mut report = SheetReport::from_range(sheet(&rows));

        assert_eq!(report.by_ref().count(), 0);
        assert_eq!(report.layout(), None);
    }
}
