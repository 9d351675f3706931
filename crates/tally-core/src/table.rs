//! Spreadsheet addressing types.
//!
//! A [`TableRef`] resolves a stored sheet configuration into the concrete
//! identity the row mutation engine operates on: an opaque spreadsheet id,
//! a sheet (tab) display name, and an A1 column span. Row positions are
//! exposed to API clients as 1-based [`RowIndex`] values; the zero-based
//! conversion happens only when a dimension delete is issued.

use std::fmt;

use crate::error::{Error, Result};

/// A parsed A1 column span such as `A:H`.
///
/// The span fixes the row schema width: every appended row is padded with
/// empty cells up to [`ColumnSpan::column_count`] so column alignment stays
/// stable across rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpan {
    start: String,
    end: String,
    count: usize,
}

impl ColumnSpan {
    /// Parses a column span of the form `A:H` (multi-letter columns allowed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the span is malformed or the start
    /// column comes after the end column.
    pub fn parse(span: &str) -> Result<Self> {
        let (start, end) = span
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("column span must look like A:H, got {span:?}")))?;

        let start = start.trim().to_ascii_uppercase();
        let end = end.trim().to_ascii_uppercase();
        let start_index = column_number(&start)?;
        let end_index = column_number(&end)?;

        if start_index > end_index {
            return Err(Error::InvalidInput(format!(
                "column span start {start} comes after end {end}"
            )));
        }

        Ok(Self {
            count: end_index - start_index + 1,
            start,
            end,
        })
    }

    /// Returns the number of columns covered by the span.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.count
    }

    /// Returns the first column letters (e.g. `A`).
    #[must_use]
    pub fn start(&self) -> &str {
        &self.start
    }

    /// Returns the last column letters (e.g. `H`).
    #[must_use]
    pub fn end(&self) -> &str {
        &self.end
    }
}

impl fmt::Display for ColumnSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Converts column letters to a 1-based column number (`A` = 1, `AA` = 27).
fn column_number(letters: &str) -> Result<usize> {
    if letters.is_empty() {
        return Err(Error::InvalidInput(
            "column reference cannot be empty".to_string(),
        ));
    }
    let mut number = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return Err(Error::InvalidInput(format!(
                "column reference must be letters only, got {letters:?}"
            )));
        }
        number = number * 26 + (c as usize - 'A' as usize + 1);
    }
    Ok(number)
}

/// Resolved identity of an external spreadsheet range.
///
/// Constructed per request from a stored [`crate::sheet_config::SheetConfig`];
/// never cached by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Opaque spreadsheet identifier.
    pub spreadsheet_id: String,
    /// Sheet (tab) display name inside the spreadsheet.
    pub sheet_name: String,
    /// Column span fixing the row schema width.
    pub columns: ColumnSpan,
}

impl TableRef {
    /// Creates a table reference, parsing the column span.
    ///
    /// # Errors
    ///
    /// Returns an error if the column span is malformed.
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        columns: &str,
    ) -> Result<Self> {
        Ok(Self {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            columns: ColumnSpan::parse(columns)?,
        })
    }

    /// Returns the number of columns in the declared row schema.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.column_count()
    }

    /// Returns the full A1 range covering the configured columns (`Sheet!A:H`).
    #[must_use]
    pub fn full_range(&self) -> String {
        format!("{}!{}", self.sheet_name, self.columns)
    }

    /// Returns the A1 range covering a single row (`Sheet!A5:H5`).
    #[must_use]
    pub fn row_range(&self, row: RowIndex) -> String {
        format!(
            "{}!{}{row}:{}{row}",
            self.sheet_name,
            self.columns.start(),
            self.columns.end(),
        )
    }
}

/// A 1-based row position within a sheet, as exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowIndex(u32);

impl RowIndex {
    /// Creates a row index, rejecting zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `index` is zero; sheet rows are
    /// 1-based.
    pub fn new(index: u32) -> Result<Self> {
        if index == 0 {
            return Err(Error::InvalidInput(
                "row index must be 1-based and greater than zero".to_string(),
            ));
        }
        Ok(Self(index))
    }

    /// Returns the 1-based index.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns the zero-based half-open span `[index-1, index)` used for
    /// dimension deletes.
    #[must_use]
    pub fn zero_based_span(self) -> (u32, u32) {
        (self.0 - 1, self.0)
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_span() {
        let span = ColumnSpan::parse("A:H").expect("parse");
        assert_eq!(span.column_count(), 8);
        assert_eq!(span.start(), "A");
        assert_eq!(span.end(), "H");
        assert_eq!(span.to_string(), "A:H");
    }

    #[test]
    fn test_parse_lowercase_and_whitespace() {
        let span = ColumnSpan::parse(" b:d ").expect("parse");
        assert_eq!(span.column_count(), 3);
        assert_eq!(span.to_string(), "B:D");
    }

    #[test]
    fn test_parse_multi_letter_columns() {
        let span = ColumnSpan::parse("A:AB").expect("parse");
        assert_eq!(span.column_count(), 28);
    }

    #[test]
    fn test_parse_rejects_missing_colon() {
        assert!(ColumnSpan::parse("AH").is_err());
    }

    #[test]
    fn test_parse_rejects_reversed_span() {
        assert!(ColumnSpan::parse("H:A").is_err());
    }

    #[test]
    fn test_parse_rejects_digits() {
        assert!(ColumnSpan::parse("A1:H9").is_err());
    }

    #[test]
    fn test_table_ref_ranges() {
        let table = TableRef::new("sheet-id", "Transactions", "A:H").expect("table ref");
        assert_eq!(table.full_range(), "Transactions!A:H");
        let row = RowIndex::new(5).expect("row index");
        assert_eq!(table.row_range(row), "Transactions!A5:H5");
        assert_eq!(table.column_count(), 8);
    }

    #[test]
    fn test_row_index_rejects_zero() {
        assert!(RowIndex::new(0).is_err());
    }

    #[test]
    fn test_row_index_zero_based_span() {
        let row = RowIndex::new(4).expect("row index");
        assert_eq!(row.zero_based_span(), (3, 4));
    }
}
