//! Header classification and row-to-record mapping shared by every reader.

use std::collections::VecDeque;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use mandi_core::PriceRecord;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{CellValue, ParseStats, RowParseError};

static PRICE_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Price on (\d+ \w+, \d+)").expect("valid price column regex"));
static ARRIVAL_ON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Arrival on (\d+ \w+, \d+)").expect("valid arrival column regex"));

pub(crate) const NATIONAL_STATE: &str = "National";
pub(crate) const SUMMARY_DISTRICT: &str = "Summary";
pub(crate) const MULTIPLE_MARKETS: &str = "Multiple";

const COMMODITY_KEYS: &[&str] = &["Commodity"];
const STATE_KEYS: &[&str] = &["State"];
const DISTRICT_KEYS: &[&str] = &["District"];
const MARKET_KEYS: &[&str] = &["Market"];
const DATE_KEYS: &[&str] = &["Arrival_Date", "Date", "Arrival Date"];
const PRICE_KEYS: &[&str] = &["Modal Price", "Modal_x0020_Price", "Price"];
const ARRIVAL_KEYS: &[&str] = &["Arrivals (tonnes)", "Arrival", "Arrivals"];
/// Unit-suffixed price headers such as `Modal Price (Rs./Quintal)`.
const PRICE_PREFIX: &str = "modal price";

/// Which of the known report shapes a header row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReportLayout {
    /// One row per commodity with `Price on <date>` / `Arrival on <date>` column pairs.
    WideReport,
    /// One row per market and date.
    LongReport,
    Unrecognized,
}

fn normalize_header(cell: &str) -> String {
    cell.trim().trim_start_matches('\u{feff}').trim().to_string()
}

fn snake_key(key: &str) -> String {
    key.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

fn find_column(headers: &[String], keys: &[&str]) -> Option<usize> {
    keys.iter().find_map(|key| {
        headers.iter().position(|h| h == key).or_else(|| {
            let snake = snake_key(key);
            headers.iter().position(|h| *h == snake)
        })
    })
}

fn find_price_column(headers: &[String]) -> Option<usize> {
    find_column(headers, PRICE_KEYS)
        .or_else(|| headers.iter().position(|h| h.to_lowercase().starts_with(PRICE_PREFIX)))
}

/// A `Commodity` column alone marks a long report; a missing price column
/// then coerces every price to 0.
pub fn classify_header(cells: &[String]) -> ReportLayout {
    let headers: Vec<String> = cells.iter().map(|c| normalize_header(c)).collect();
    let joined = headers.join("|");
    if joined.contains("Commodity Group")
        || (joined.contains("Commodity") && joined.contains("Price on"))
    {
        return ReportLayout::WideReport;
    }
    if find_column(&headers, COMMODITY_KEYS).is_some() {
        return ReportLayout::LongReport;
    }
    ReportLayout::Unrecognized
}

pub(crate) fn parse_wide_date(label: &str) -> Option<NaiveDate> {
    let label = label.trim();
    ["%d %b, %Y", "%d %B, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(label, fmt).ok())
}

/// Accepts `DD/MM/YYYY` and ISO-like dates, with or without a time part.
pub(crate) fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('/') {
        return NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%d-%b-%Y", "%d %b %Y", "%d %b, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn is_placeholder(cell: &CellValue) -> bool {
    match cell {
        CellValue::Empty => true,
        CellValue::Text(s) => {
            let s = s.trim();
            s.is_empty() || s == "-"
        }
        CellValue::Number(_) | CellValue::Date(_) => false,
    }
}

fn is_blank_or_separator(row: &[CellValue]) -> bool {
    row.iter().all(|cell| match cell {
        CellValue::Empty => true,
        CellValue::Text(s) => s.trim().chars().all(|c| matches!(c, '-' | '=' | '_' | '*')),
        CellValue::Number(_) | CellValue::Date(_) => false,
    })
}

#[derive(Debug, Clone)]
struct WideDate {
    label: String,
    date: Option<NaiveDate>,
    price: Option<usize>,
    arrival: Option<usize>,
}

#[derive(Debug, Clone)]
enum HeaderLayout {
    Wide {
        commodity: Option<usize>,
        commodity_group: Option<usize>,
        dates: Vec<WideDate>,
    },
    Long(LongColumns),
}

impl HeaderLayout {
    fn build(kind: ReportLayout, headers: &[String]) -> Option<Self> {
        match kind {
            ReportLayout::WideReport => {
                let mut dates: Vec<WideDate> = Vec::new();
                for (idx, header) in headers.iter().enumerate() {
                    let (label, is_price) = if let Some(caps) = PRICE_ON_RE.captures(header) {
                        (caps[1].to_string(), true)
                    } else if let Some(caps) = ARRIVAL_ON_RE.captures(header) {
                        (caps[1].to_string(), false)
                    } else {
                        continue;
                    };
                    let slot = match dates.iter().position(|d| d.label == label) {
                        Some(pos) => pos,
                        None => {
                            dates.push(WideDate {
                                date: parse_wide_date(&label),
                                label,
                                price: None,
                                arrival: None,
                            });
                            dates.len() - 1
                        }
                    };
                    if is_price {
                        dates[slot].price = Some(idx);
                    } else {
                        dates[slot].arrival = Some(idx);
                    }
                }
                Some(HeaderLayout::Wide {
                    commodity: headers.iter().position(|h| h == "Commodity"),
                    commodity_group: headers.iter().position(|h| h == "Commodity Group"),
                    dates,
                })
            }
            ReportLayout::LongReport => Some(HeaderLayout::Long(LongColumns {
                commodity: find_column(headers, COMMODITY_KEYS),
                state: find_column(headers, STATE_KEYS),
                district: find_column(headers, DISTRICT_KEYS),
                market: find_column(headers, MARKET_KEYS),
                price: find_price_column(headers),
                arrival: find_column(headers, ARRIVAL_KEYS),
                date: find_column(headers, DATE_KEYS),
            })),
            ReportLayout::Unrecognized => None,
        }
    }
}

/// Feeds raw rows in, yields normalized records out.
#[derive(Debug)]
pub(crate) struct RowMapper {
    header_search_limit: Option<usize>,
    rows_before_header: usize,
    kind: Option<ReportLayout>,
    layout: Option<HeaderLayout>,
    pending: VecDeque<PriceRecord>,
    stats: ParseStats,
}

impl RowMapper {
    pub(crate) fn new(header_search_limit: Option<usize>) -> Self {
        Self {
            header_search_limit,
            rows_before_header: 0,
            kind: None,
            layout: None,
            pending: VecDeque::new(),
            stats: ParseStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> &ParseStats {
        &self.stats
    }

    pub(crate) fn layout(&self) -> Option<ReportLayout> {
        self.kind
    }

    pub(crate) fn pop(&mut self) -> Option<PriceRecord> {
        let record = self.pending.pop_front()?;
        self.stats.records_emitted += 1;
        Some(record)
    }

    pub(crate) fn drop_row(&mut self, reason: RowParseError) {
        debug!(%reason, "dropping report row");
        self.stats.records_dropped += 1;
    }

    pub(crate) fn finish(&self) {
        if self.layout.is_none() {
            warn!(rows = self.stats.rows_read, "report has no recognizable header row");
        }
        debug!(stats = ?self.stats, "report parse finished");
    }

    pub(crate) fn feed(&mut self, row: Vec<CellValue>) {
        self.stats.rows_read += 1;
        if self.layout.is_none() {
            self.detect_header(&row);
            return;
        }
        if is_blank_or_separator(&row) {
            self.stats.rows_skipped += 1;
            return;
        }
        let Some(layout) = self.layout.take() else {
            return;
        };
        match &layout {
            HeaderLayout::Wide {
                commodity,
                commodity_group,
                dates,
            } => self.map_wide(&row, *commodity, *commodity_group, dates),
            HeaderLayout::Long(columns) => self.map_long(&row, columns),
        }
        self.layout = Some(layout);
    }

    fn detect_header(&mut self, row: &[CellValue]) {
        self.stats.rows_skipped += 1;
        if let Some(limit) = self.header_search_limit {
            if self.rows_before_header >= limit {
                return;
            }
        }
        self.rows_before_header += 1;
        if is_blank_or_separator(row) {
            return;
        }

        let headers: Vec<String> = row.iter().map(|c| normalize_header(&c.as_text())).collect();
        let kind = classify_header(&headers);
        if let Some(layout) = HeaderLayout::build(kind, &headers) {
            debug!(layout = ?kind, columns = headers.len(), "detected report header");
            self.kind = Some(kind);
            self.layout = Some(layout);
        }
    }

    fn numeric(&mut self, cell: &CellValue, field: &'static str) -> f64 {
        match parse_amount(cell) {
            Some(value) => value,
            None => {
                debug!(field, raw = %cell.as_text(), "coercing unparsable number to 0");
                self.stats.values_coerced += 1;
                0.0
            }
        }
    }

    fn map_wide(
        &mut self,
        row: &[CellValue],
        commodity: Option<usize>,
        commodity_group: Option<usize>,
        dates: &[WideDate],
    ) {
        let name = text_at(row, commodity)
            .filter(|s| !s.is_empty())
            .or_else(|| text_at(row, commodity_group).filter(|s| !s.is_empty()));
        let Some(name) = name else {
            self.stats.rows_skipped += 1;
            return;
        };
        if name == "Total" {
            self.stats.rows_skipped += 1;
            return;
        }

        for wide in dates {
            let Some(price_cell) = wide.price.and_then(|idx| row.get(idx)) else {
                continue;
            };
            if is_placeholder(price_cell) {
                continue;
            }
            let price = self.numeric(price_cell, "price");
            if price <= 0.0 {
                self.drop_row(RowParseError::NonPositivePrice {
                    commodity: name.clone(),
                    raw: price_cell.as_text(),
                });
                continue;
            }
            let Some(observation_date) = wide.date else {
                self.drop_row(RowParseError::InvalidDate(wide.label.clone()));
                continue;
            };
            let arrival_volume = match wide.arrival.and_then(|idx| row.get(idx)) {
                Some(cell) if !is_placeholder(cell) => Some(self.numeric(cell, "arrival")),
                _ => None,
            };
            self.pending.push_back(PriceRecord {
                commodity: name.clone(),
                state: NATIONAL_STATE.to_string(),
                district: SUMMARY_DISTRICT.to_string(),
                market: MULTIPLE_MARKETS.to_string(),
                modal_price: price,
                arrival_volume,
                observation_date,
            });
        }
    }

    fn map_long(&mut self, row: &[CellValue], columns: &LongColumns) {
        let observation_date = match columns.date.and_then(|idx| row.get(idx)) {
            Some(CellValue::Date(date)) => Some(*date),
            Some(cell) => parse_report_date(&cell.as_text()),
            None => None,
        };
        let Some(observation_date) = observation_date else {
            let raw = columns
                .date
                .and_then(|idx| row.get(idx))
                .map(CellValue::as_text)
                .unwrap_or_default();
            self.drop_row(RowParseError::InvalidDate(raw));
            return;
        };

        let modal_price = match columns.price.and_then(|idx| row.get(idx)) {
            Some(cell) => self.numeric(cell, "modal_price"),
            None => self.numeric(&CellValue::Empty, "modal_price"),
        };
        let arrival_volume = match columns.arrival.and_then(|idx| row.get(idx)) {
            Some(cell) if !is_placeholder(cell) => Some(self.numeric(cell, "arrival")),
            _ => None,
        };

        self.pending.push_back(PriceRecord {
            commodity: text_at(row, columns.commodity).unwrap_or_default(),
            state: text_at(row, columns.state).unwrap_or_default(),
            district: text_at(row, columns.district).unwrap_or_default(),
            market: text_at(row, columns.market).unwrap_or_default(),
            modal_price,
            arrival_volume,
            observation_date,
        });
    }
}

#[derive(Debug, Clone)]
struct LongColumns {
    commodity: Option<usize>,
    state: Option<usize>,
    district: Option<usize>,
    market: Option<usize>,
    price: Option<usize>,
    arrival: Option<usize>,
    date: Option<usize>,
}

fn text_at(row: &[CellValue], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i)).map(|cell| cell.as_text().trim().to_string())
}

/// Strips thousands separators; rejects negative or non-finite amounts.
pub(crate) fn parse_amount(cell: &CellValue) -> Option<f64> {
    let value = match cell {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => {
            let cleaned: String = s.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
            cleaned.parse::<f64>().ok()?
        }
        CellValue::Empty | CellValue::Date(_) => return None,
    };
    (value.is_finite() && value >= 0.0).then_some(value)
}
