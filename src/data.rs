//! Recipient record loading.
//!
//! Two input shapes produce a [`Campaign`]: a CSV file whose header row
//! defines the column set, or a plain comma-separated address list that
//! becomes a single-column campaign. All records in one campaign share
//! the same columns and receive dense, zero-based ids in input order.

use crate::campaign::Campaign;
use crate::error::DataError;
use crate::transport::is_valid_address;
use std::collections::HashMap;
use std::path::Path;

/// Reserved CSV column carrying delivery state from a previous job.
/// Cells equal to "Sent" restore that record as already delivered.
const STATUS_COLUMN: &str = "Status";

/// Reserved CSV column from exported status tables; ignored on load
/// because ids are always reassigned densely in row order.
const RECORD_ID_COLUMN: &str = "Record ID";

/// Load a campaign from a CSV file.
///
/// The header row defines the campaign columns. Cells missing from short
/// rows read as empty strings. The reserved `Status` and `Record ID`
/// columns are stripped from the field maps; a `Status` cell of "Sent"
/// restores the record as already delivered so a re-run skips it.
///
/// # Errors
/// Returns [`DataError`] when the file cannot be read, a row is
/// malformed, or the file holds no data rows.
pub fn load_csv(path: &Path) -> Result<Campaign, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| DataError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| DataError::ReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let status_idx = headers.iter().position(|h| h == STATUS_COLUMN);
    let columns: Vec<String> = headers
        .iter()
        .filter(|h| h.as_str() != STATUS_COLUMN && h.as_str() != RECORD_ID_COLUMN)
        .cloned()
        .collect();

    let mut rows = Vec::new();
    let mut sent = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| DataError::MalformedRecord(e.to_string()))?;

        let mut fields = HashMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if header == STATUS_COLUMN || header == RECORD_ID_COLUMN {
                continue;
            }
            fields.insert(
                header.clone(),
                record.get(idx).unwrap_or("").to_string(),
            );
        }
        sent.push(
            status_idx
                .and_then(|idx| record.get(idx))
                .map(|cell| cell.trim() == "Sent")
                .unwrap_or(false),
        );
        rows.push(fields);
    }

    if rows.is_empty() {
        return Err(DataError::Empty);
    }

    let restored = sent.iter().filter(|s| **s).count();
    tracing::info!(
        path = %path.display(),
        records = rows.len(),
        columns = columns.len(),
        restored_sent = restored,
        "Loaded recipient CSV"
    );

    Ok(Campaign::with_sent_restored(columns, rows, sent))
}

/// Build a campaign from a comma-separated address list.
///
/// Syntactically invalid entries are dropped (with a warning); the
/// surviving addresses become a single-column campaign named after
/// `recipient_column`, so the address doubles as a placeholder.
///
/// # Errors
/// Returns [`DataError::Empty`] for a blank list and
/// [`DataError::NoValidAddresses`] when nothing survives validation.
pub fn from_address_list(input: &str, recipient_column: &str) -> Result<Campaign, DataError> {
    let entries: Vec<&str> = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if entries.is_empty() {
        return Err(DataError::Empty);
    }

    let valid: Vec<&str> = entries
        .iter()
        .copied()
        .filter(|e| is_valid_address(e))
        .collect();

    if valid.is_empty() {
        return Err(DataError::NoValidAddresses);
    }
    if valid.len() < entries.len() {
        tracing::warn!(
            dropped = entries.len() - valid.len(),
            kept = valid.len(),
            "Dropped syntactically invalid addresses from list"
        );
    }

    let rows = valid
        .iter()
        .map(|address| {
            let mut fields = HashMap::new();
            fields.insert(recipient_column.to_string(), address.to_string());
            fields
        })
        .collect();

    Ok(Campaign::new(vec![recipient_column.to_string()], rows))
}
