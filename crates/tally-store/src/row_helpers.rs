//! Typed column access that reports bad data as [`StoreError::CorruptRow`].

use chrono::{DateTime, Utc};
use tally_core::timestamp;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Get an optional column value.
pub fn get_opt<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<T>, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a required timestamp column.
pub fn parse_timestamp(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<DateTime<Utc>, StoreError> {
    timestamp::parse(raw).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid timestamp {raw:?}: {e}"),
    })
}

/// Parse a nullable timestamp column. NULL and `''` both mean "unset".
pub fn parse_optional_timestamp(
    raw: Option<&str>,
    table: &'static str,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => parse_timestamp(raw, table, column).map(Some),
    }
}
