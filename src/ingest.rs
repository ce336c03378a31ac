//! CSV normalization pipeline.
//!
//! Turns an uploaded inventory file into staged records:
//! 1. the file is read as header-delimited text (`csv` crate, flexible rows)
//! 2. every header is mapped through [`normalize_header`]
//! 3. each data row is coerced into a `NormalizedItem` or `NormalizedContainer`
//!
//! Malformed cells never fail the pipeline; they degrade to `None` (or an empty
//! string) on that field. Only a row without its identifying field is rejected.
//! The whole module is side-effect free.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use utoipa::ToSchema;

use crate::header::normalize_header;
use crate::model::{NormalizedContainer, NormalizedItem};

/// Suffix tolerated after the number in usage limit cells ("25 uses").
const USAGE_SUFFIX: &str = " uses";
/// Time of day appended to bare expiry dates.
const MIDNIGHT: &str = "T00:00:00";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Failure of the file as a whole. Individual cells never produce one.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File contains no header row")]
    Empty,
    #[error("Malformed CSV near line {line}: {reason}")]
    Malformed { line: u64, reason: String },
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|pos| pos.line()).unwrap_or(0);
        IngestError::Malformed {
            line,
            reason: err.to_string(),
        }
    }
}

/// Which canonical record shape an upload targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Items,
    Containers,
}

impl RecordKind {
    /// Field whose absence rejects a row.
    pub fn identifying_field(&self) -> &'static str {
        match self {
            RecordKind::Items => "item_id",
            RecordKind::Containers => "container_id",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Items => write!(f, "items"),
            RecordKind::Containers => write!(f, "containers"),
        }
    }
}

/// One data row exactly as uploaded, keyed by the original header text.
///
/// Serializes as a JSON object that keeps the column order of the file.
/// Repeated headers get a numbered key (`Width (2)`) so no cell is lost.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(cells: Vec<(String, String)>) -> Self {
        Self { cells }
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.trim().is_empty())
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        let mut used: HashSet<String> = HashSet::with_capacity(self.cells.len());
        for (header, value) in &self.cells {
            let mut key = header.clone();
            let mut occurrence = 1;
            while used.contains(&key) {
                occurrence += 1;
                key = format!("{header} ({occurrence})");
            }
            map.serialize_entry(&key, value)?;
            used.insert(key);
        }
        map.end()
    }
}

/// How one uploaded header was interpreted.
#[derive(Clone, Debug, PartialEq, serde::Serialize, ToSchema)]
pub struct ColumnMapping {
    pub header: String,
    pub field: String,
}

/// Row values keyed by canonical field name, trimmed.
///
/// When several columns map onto the same field, the first non-empty value wins.
#[derive(Debug, Default)]
pub(crate) struct CanonicalRow {
    values: HashMap<String, String>,
}

impl CanonicalRow {
    fn from_raw(row: &RawRow, columns: &[ColumnMapping]) -> Self {
        let mut values: HashMap<String, String> = HashMap::new();
        for (column, (_, value)) in columns.iter().zip(row.cells.iter()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            values
                .entry(column.field.clone())
                .or_insert_with(|| value.to_string());
        }
        Self { values }
    }

    pub(crate) fn text(&self, field: &str) -> String {
        self.values.get(field).cloned().unwrap_or_default()
    }

    pub(crate) fn float(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(|raw| parse_float(raw))
    }

    pub(crate) fn integer(&self, field: &str) -> Option<i64> {
        self.values.get(field).and_then(|raw| parse_integer(raw))
    }
}

/// Parsed tabular text: header interpretation plus the non-blank data rows.
#[derive(Debug)]
pub(crate) struct Table {
    pub(crate) columns: Vec<ColumnMapping>,
    pub(crate) rows: Vec<RawRow>,
}

impl Table {
    pub(crate) fn canonical(&self, row: &RawRow) -> CanonicalRow {
        CanonicalRow::from_raw(row, &self.columns)
    }
}

/// Reads header-delimited text. Blank rows are dropped here and never counted.
pub(crate) fn read_table(contents: &[u8]) -> Result<Table, IngestError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::None)
        .from_reader(contents);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::Empty);
    }

    let columns: Vec<ColumnMapping> = headers
        .iter()
        .map(|header| ColumnMapping {
            header: header.clone(),
            field: normalize_header(header),
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Short rows leave the trailing columns empty; surplus cells are ignored.
        let cells = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| (header.clone(), record.get(idx).unwrap_or("").to_string()))
            .collect();
        let row = RawRow::new(cells);
        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(Table { columns, rows })
}

/// Normalized records of one upload.
#[derive(Clone, Debug, PartialEq)]
pub enum Records {
    Items(Vec<NormalizedItem>),
    Containers(Vec<NormalizedContainer>),
}

impl Records {
    pub fn len(&self) -> usize {
        match self {
            Records::Items(items) => items.len(),
            Records::Containers(containers) => containers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of one pass over an uploaded file.
#[derive(Clone, Debug)]
pub struct ParsedUpload {
    /// Accepted records in file order.
    pub records: Records,
    /// Rows dropped for a missing identifying field.
    pub rejected_count: usize,
    /// Every non-blank data row as uploaded, rejected ones included.
    pub raw_rows: Vec<RawRow>,
    pub columns: Vec<ColumnMapping>,
}

impl ParsedUpload {
    pub fn preview(&self, limit: usize) -> Vec<RawRow> {
        build_preview(&self.raw_rows, limit)
    }
}

/// Parses an uploaded file into canonical records of the requested kind.
///
/// # Parameters
/// * `contents` - Complete file contents
/// * `kind` - Target record shape
///
/// # Returns
/// `ParsedUpload` with records in file order, or `IngestError` when the file is
/// not readable as tabular text at all
pub fn parse_rows(contents: &[u8], kind: RecordKind) -> Result<ParsedUpload, IngestError> {
    let table = read_table(contents)?;
    let identifying_field = kind.identifying_field();

    let mut rejected_count = 0;
    let accepted = table.rows.iter().filter_map(|raw| {
        let row = table.canonical(raw);
        if row.text(identifying_field).is_empty() {
            rejected_count += 1;
            None
        } else {
            Some(row)
        }
    });

    let records = match kind {
        RecordKind::Items => Records::Items(accepted.map(|row| item_from_row(&row)).collect()),
        RecordKind::Containers => {
            Records::Containers(accepted.map(|row| container_from_row(&row)).collect())
        }
    };

    Ok(ParsedUpload {
        records,
        rejected_count,
        raw_rows: table.rows,
        columns: table.columns,
    })
}

/// Returns the first `limit` uploaded rows, untouched by normalization.
pub fn build_preview(raw_rows: &[RawRow], limit: usize) -> Vec<RawRow> {
    raw_rows.iter().take(limit).cloned().collect()
}

fn item_from_row(row: &CanonicalRow) -> NormalizedItem {
    NormalizedItem {
        item_id: row.text("item_id"),
        name: row.text("name"),
        width: row.float("width"),
        depth: row.float("depth"),
        height: row.float("height"),
        mass: row.float("mass"),
        priority: row.integer("priority"),
        expiry_date: normalize_expiry(&row.text("expiry_date")),
        usage_limit: parse_usage_limit(&row.text("usage_limit")),
        usage_count: row.integer("usage_count"),
        preferred_zone: row.text("preferred_zone"),
    }
}

fn container_from_row(row: &CanonicalRow) -> NormalizedContainer {
    NormalizedContainer {
        container_id: row.text("container_id"),
        zone: row.text("zone"),
        width: row.float("width"),
        depth: row.float("depth"),
        height: row.float("height"),
    }
}

/// Finite floating point value, or `None`.
pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Integer value; integral decimals such as `"3.0"` are accepted as well.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    parse_float(raw)
        .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .map(|value| value as i64)
}

/// Usage limit with an optional trailing `" uses"`.
pub fn parse_usage_limit(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let split = raw.len().checked_sub(USAGE_SUFFIX.len());
    let number = match split {
        Some(idx)
            if raw.is_char_boundary(idx) && raw[idx..].eq_ignore_ascii_case(USAGE_SUFFIX) =>
        {
            &raw[..idx]
        }
        _ => raw,
    };
    parse_integer(number)
}

/// Completes bare calendar dates to a zero-padded midnight date-time.
///
/// Values that already carry a time, empty values and free text ("N/A") are
/// returned trimmed but otherwise untouched.
pub fn normalize_expiry(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || has_time_component(raw) {
        return raw.to_string();
    }
    match calendar_date(raw) {
        Some(date) => format!("{}{MIDNIGHT}", date.format(DATE_FORMAT)),
        None => raw.to_string(),
    }
}

fn has_time_component(value: &str) -> bool {
    value.contains('T') || value.contains(':')
}

fn calendar_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}
