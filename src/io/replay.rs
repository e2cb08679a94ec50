//! Reads recorded meter readings from CSV.
//!
//! Expected columns: `timestamp,watts[,device]`. Timestamps are RFC 3339 with
//! an explicit offset. The optional `device` column carries the known
//! appliance for accuracy scoring; an empty cell means "no device".

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use tracing::warn;

/// One replayable row. `watts` stays textual so that the engine performs
/// (and counts) numeric coercion itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRow {
    pub timestamp: DateTime<FixedOffset>,
    pub watts: String,
    pub truth: Option<String>,
}

/// Reads replay rows from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the CSV is malformed.
pub fn read_csv(path: &Path) -> Result<Vec<ReplayRow>, csv::Error> {
    let file = File::open(path)?;
    read_rows(io::BufReader::new(file))
}

/// Reads replay rows from any reader. Rows whose timestamp does not parse
/// are skipped with a warning.
///
/// # Errors
///
/// Returns a `csv::Error` on malformed CSV or I/O failure.
pub fn read_rows(reader: impl Read) -> Result<Vec<ReplayRow>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let ts_text = record.get(0).unwrap_or("").trim();
        let timestamp = match DateTime::parse_from_rfc3339(ts_text) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(row = line + 1, timestamp = ts_text, error = %e, "skipping row");
                continue;
            }
        };
        let truth = record
            .get(2)
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        rows.push(ReplayRow {
            timestamp,
            watts: record.get(1).unwrap_or("").to_string(),
            truth,
        });
    }
    Ok(rows)
}
