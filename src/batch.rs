//! Batch placement rows.
//!
//! A batch file assigns coordinates by hand and bypasses the recommendation
//! engine. Each row names an item, a target container and the six corner
//! coordinates (`start_width` .. `end_height`); headers go through the same
//! normalization as inventory uploads.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::ingest::{CanonicalRow, IngestError, RawRow, read_table};
use crate::model::{Dimensions, PlacementRequest, Position};

const START_FIELDS: [&str; 3] = ["start_width", "start_depth", "start_height"];
const END_FIELDS: [&str; 3] = ["end_width", "end_depth", "end_height"];

/// Placement requests recovered from a batch file.
#[derive(Clone, Debug)]
pub struct ParsedBatch {
    pub requests: Vec<PlacementRequest>,
    /// Rows missing an identifier or carrying an unusable coordinate.
    pub rejected_count: usize,
    pub raw_rows: Vec<RawRow>,
}

/// Parses a batch placement file, stamping undated rows with the current time.
pub fn parse_batch(contents: &[u8]) -> Result<ParsedBatch, IngestError> {
    parse_batch_at(contents, Utc::now())
}

/// Same as [`parse_batch`] with an explicit clock.
pub fn parse_batch_at(contents: &[u8], now: DateTime<Utc>) -> Result<ParsedBatch, IngestError> {
    let table = read_table(contents)?;
    let default_timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut requests = Vec::with_capacity(table.rows.len());
    let mut rejected_count = 0;
    for raw in &table.rows {
        match request_from_row(&table.canonical(raw), &default_timestamp) {
            Some(request) => requests.push(request),
            None => rejected_count += 1,
        }
    }

    Ok(ParsedBatch {
        requests,
        rejected_count,
        raw_rows: table.rows,
    })
}

fn request_from_row(row: &CanonicalRow, default_timestamp: &str) -> Option<PlacementRequest> {
    let item_id = row.text("item_id");
    let container_id = row.text("container_id");
    if item_id.is_empty() || container_id.is_empty() {
        return None;
    }

    let position = Position {
        start_coordinates: corner(row, &START_FIELDS)?,
        end_coordinates: corner(row, &END_FIELDS)?,
    };

    let mut timestamp = row.text("timestamp");
    if timestamp.is_empty() {
        timestamp = default_timestamp.to_string();
    }

    Some(PlacementRequest {
        item_id,
        user_id: row.text("user_id"),
        timestamp,
        container_id,
        position,
    })
}

fn corner(row: &CanonicalRow, fields: &[&str; 3]) -> Option<Dimensions> {
    Some(Dimensions::new(
        row.float(fields[0])?,
        row.float(fields[1])?,
        row.float(fields[2])?,
    ))
}
