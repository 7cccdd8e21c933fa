//! Decoding and header validation for uploaded CSV payloads.

use crate::models::EntityKind;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// File-level failure. The display text is what ends up in the file's
/// `failedRecords`.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Invalid base64 data")]
    Base64(#[from] base64::DecodeError),
    #[error("Payload is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Invalid CSV format")]
    Header,
    #[error("Invalid header. Missing required column(s): {missing}. Required fields: {required}")]
    MissingColumns { missing: String, required: String },
    #[error("Error reading CSV: {0}")]
    Rows(csv::Error),
}

/// Column names each entity kind needs, in the order workers read them.
pub fn required_columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::User => &["email", "name"],
        EntityKind::Team => &["title", "description"],
    }
}

/// Positions of the required columns within a validated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderColumns {
    width: usize,
    positions: Vec<usize>,
}

impl HeaderColumns {
    /// Number of columns in the header. Rows shorter than this are rejected.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Field of `row` under the `index`th required column, as written.
    pub fn field<'r>(&self, row: &'r StringRecord, index: usize) -> &'r str {
        self.positions
            .get(index)
            .and_then(|&position| row.get(position))
            .unwrap_or("")
    }
}

/// A payload that passed every file-level check.
#[derive(Debug)]
pub struct CsvTable {
    pub columns: HeaderColumns,
    pub rows: Vec<StringRecord>,
}

/// Decode a standard base64 payload into UTF-8 text.
pub fn decode(payload: &str) -> Result<String, PayloadError> {
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(String::from_utf8(bytes)?)
}

/// Locate the required columns for `kind`. Matching ignores case,
/// surrounding whitespace and a leading byte order mark.
pub fn match_header(kind: EntityKind, header: &StringRecord) -> Result<HeaderColumns, PayloadError> {
    let names: Vec<String> = header
        .iter()
        .map(|name| name.trim_start_matches(BYTE_ORDER_MARK).trim().to_lowercase())
        .collect();

    let required = required_columns(kind);
    let mut positions = Vec::with_capacity(required.len());
    let mut missing = Vec::new();

    for column in required {
        match names.iter().position(|name| name == column) {
            Some(position) => positions.push(position),
            None => missing.push(*column),
        }
    }

    if !missing.is_empty() {
        return Err(PayloadError::MissingColumns {
            missing: missing.join(", "),
            required: required.join(", "),
        });
    }

    Ok(HeaderColumns {
        width: names.len(),
        positions,
    })
}

/// Run every file-level stage: decode, header, row stream.
pub fn parse(kind: EntityKind, payload: &str) -> Result<CsvTable, PayloadError> {
    let text = decode(payload)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(Ok(header)) => header,
        Some(Err(err)) => {
            log::debug!("unreadable CSV header: {}", err);
            return Err(PayloadError::Header);
        }
        None => return Err(PayloadError::Header),
    };
    let columns = match_header(kind, &header)?;

    let rows = records
        .collect::<Result<Vec<_>, _>>()
        .map_err(PayloadError::Rows)?;

    Ok(CsvTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(text: &str) -> String {
        STANDARD.encode(text)
    }

    #[test]
    fn test_rejects_non_base64() {
        let err = parse(EntityKind::User, "%%% not base64 %%%").expect_err("bad payload");
        assert_eq!(err.to_string(), "Invalid base64 data");
    }

    #[test]
    fn test_rejects_non_utf8() {
        let payload = STANDARD.encode([0xff, 0xfe, 0x00]);
        let err = parse(EntityKind::User, &payload).expect_err("bad bytes");
        assert_eq!(err.to_string(), "Payload is not valid UTF-8");
    }

    #[test]
    fn test_empty_payload_is_invalid_csv() {
        let err = parse(EntityKind::Team, &encode("")).expect_err("no header");
        assert_eq!(err.to_string(), "Invalid CSV format");
    }

    #[test]
    fn test_missing_columns_are_named() {
        let err = parse(EntityKind::User, &encode("name,phone\nAda,123\n")).expect_err("header");
        assert_eq!(
            err.to_string(),
            "Invalid header. Missing required column(s): email. Required fields: email, name"
        );
    }

    #[test]
    fn test_header_match_ignores_case_order_and_bom() {
        let table = parse(
            EntityKind::User,
            &encode("\u{feff} Name ,EMAIL,extra\nAda, ada@example.com ,x\n"),
        )
        .expect("valid");

        assert_eq!(table.columns.width(), 3);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.columns.field(&table.rows[0], 0), " ada@example.com ");
        assert_eq!(table.columns.field(&table.rows[0], 1), "Ada");
    }

    #[test]
    fn test_rows_may_differ_in_width() {
        let table = parse(
            EntityKind::Team,
            &encode("title,description\nCore,Platform\nSolo\nWide,desc,extra\n"),
        )
        .expect("valid");

        let widths: Vec<usize> = table.rows.iter().map(|row| row.len()).collect();
        assert_eq!(widths, vec![2, 1, 3]);
        assert_eq!(table.columns.field(&table.rows[1], 1), "");
    }
}
