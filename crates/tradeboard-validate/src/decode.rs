//! Delimited-text decoding
//!
//! Splits input bytes into a header and rows of optional text cells. Two
//! kinds of failure are kept apart:
//!
//! - transport: the bytes are not text at all ([`DecodeError`]), surfaced to
//!   the caller as an error;
//! - structure: the text is not a rectangular table ([`Decoded::Malformed`]),
//!   reported to the user as a validation issue.

use crate::coerce::is_null_marker;

/// Input bytes that cannot be read as text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Input is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    NotUtf8 { valid_up_to: usize },

    #[error("Failed to read input: {0}")]
    Read(String),
}

/// Header plus rows of trimmed cells; `None` marks a null cell
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    /// Position of a header
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at (row, column index)
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }
}

/// Outcome of decoding readable text
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Table(RawTable),

    /// The text is not a well-formed table
    Malformed {
        message: String,
        /// Data row (1-indexed) where the problem was found
        row: Option<usize>,
    },
}

/// Decode comma-separated text with a header row
///
/// Cells are trimmed; empty cells and common null markers (`NA`, `N/A`,
/// `null`, ...) become `None`. Blank lines are skipped.
pub fn decode(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::NotUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(record) => record.iter().map(str::to_string).collect(),
        Err(e) => return classify(e, None),
    };

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Ok(Decoded::Malformed {
            message: "Input has no header row".to_string(),
            row: None,
        });
    }

    if let Some(pos) = headers.iter().position(String::is_empty) {
        return Ok(Decoded::Malformed {
            message: format!("Header column {} has no name", pos + 1),
            row: None,
        });
    }

    for (i, header) in headers.iter().enumerate() {
        if headers[..i].contains(header) {
            return Ok(Decoded::Malformed {
                message: format!("Header '{}' appears more than once", header),
                row: None,
            });
        }
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => return classify(e, Some(i + 1)),
        };

        let cells = record
            .iter()
            .map(|cell| {
                if is_null_marker(cell) {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }

    tracing::debug!(columns = headers.len(), rows = rows.len(), "decoded input table");

    Ok(Decoded::Table(RawTable { headers, rows }))
}

fn classify(error: csv::Error, row: Option<usize>) -> Result<Decoded, DecodeError> {
    match error.kind() {
        csv::ErrorKind::Io(e) => Err(DecodeError::Read(e.to_string())),
        csv::ErrorKind::Utf8 { err, .. } => Err(DecodeError::NotUtf8 {
            valid_up_to: err.valid_up_to(),
        }),
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => Ok(Decoded::Malformed {
            message: format!(
                "Row has {} fields but the header has {}",
                len, expected_len
            ),
            row,
        }),
        _ => Ok(Decoded::Malformed {
            message: error.to_string(),
            row,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(bytes: &[u8]) -> RawTable {
        match decode(bytes).unwrap() {
            Decoded::Table(t) => t,
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn decodes_header_and_rows() {
        let t = table(b"supplier, qty ,date\nAcme, 10 ,2024-01-05\nGlobex,,2024-01-06\n");
        assert_eq!(t.headers, vec!["supplier", "qty", "date"]);
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.cell(0, 1), Some("10"));
        assert_eq!(t.cell(1, 1), None);
        assert_eq!(t.column_index("date"), Some(2));
    }

    #[test]
    fn null_markers_become_none() {
        let t = table(b"a,b\nN/A,NA\n");
        assert_eq!(t.rows[0], vec![None, None]);
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let t = table(b"exporter,kgs\n\"Acme, Inc\",\"1,200\"\n");
        assert_eq!(t.cell(0, 0), Some("Acme, Inc"));
        assert_eq!(t.cell(0, 1), Some("1,200"));
    }

    #[test]
    fn ragged_row_is_malformed() {
        let decoded = decode(b"a,b\n1,2\n3\n").unwrap();
        assert!(matches!(decoded, Decoded::Malformed { row: Some(2), .. }));
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(decode(b"").unwrap(), Decoded::Malformed { row: None, .. }));
    }

    #[test]
    fn duplicate_header_is_malformed() {
        let decoded = decode(b"a,a\n1,2\n").unwrap();
        match decoded {
            Decoded::Malformed { message, .. } => assert!(message.contains("'a'")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn binary_input_is_a_transport_error() {
        let err = decode(&[b'a', b',', 0xff, 0xfe, b'\n']).unwrap_err();
        assert_eq!(err, DecodeError::NotUtf8 { valid_up_to: 2 });
    }
}
