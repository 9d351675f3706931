//! Persisted sheet configuration records.
//!
//! A [`SheetConfig`] describes one target spreadsheet: which book (extracted
//! from a pasted Google Sheets URL), which tab, and which column span rows
//! are written to. Books are named per accounting period (e.g. `9/2025`),
//! and the period is parsed out of the display name for sorting.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::table::TableRef;

/// Default sheet (tab) name when the user does not specify one.
pub const DEFAULT_SHEET_NAME: &str = "Transactions";

/// Default column span for the transaction row schema.
pub const DEFAULT_COLUMN_SPAN: &str = "A:H";

/// A stored configuration pointing at one spreadsheet range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetConfig {
    /// Unique configuration id (ULID).
    pub id: String,
    /// Owner of this configuration.
    pub user_id: String,
    /// Spreadsheet id extracted from the pasted URL.
    pub spreadsheet_id: String,
    /// Spreadsheet display name (carries the accounting period).
    pub spreadsheet_name: String,
    /// Sheet (tab) name inside the spreadsheet.
    pub sheet_name: String,
    /// A1 column span of the transaction table (e.g. `A:H`).
    pub range: String,
    /// Accounting month parsed from the display name (1-12).
    pub month: u32,
    /// Accounting year parsed from the display name.
    pub year: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl SheetConfig {
    /// Creates a new configuration record with a fresh ULID and timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the accounting period cannot be parsed from
    /// `spreadsheet_name`.
    pub fn new(
        user_id: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        spreadsheet_name: impl Into<String>,
        sheet_name: impl Into<String>,
        range: impl Into<String>,
    ) -> Result<Self> {
        let spreadsheet_name = spreadsheet_name.into();
        let (month, year) = parse_month_year(&spreadsheet_name)?;
        let now = Utc::now();
        Ok(Self {
            id: Ulid::new().to_string(),
            user_id: user_id.into(),
            spreadsheet_id: spreadsheet_id.into(),
            spreadsheet_name,
            sheet_name: sheet_name.into(),
            range: range.into(),
            month,
            year,
            created_at: now,
            updated_at: now,
        })
    }

    /// Resolves this configuration into a [`TableRef`].
    ///
    /// # Errors
    ///
    /// Returns an error if the stored column span no longer parses.
    pub fn table_ref(&self) -> Result<TableRef> {
        TableRef::new(&self.spreadsheet_id, &self.sheet_name, &self.range)
    }

    /// Returns the accounting period as displayed to the user (`9/2025`).
    #[must_use]
    pub fn display_period(&self) -> String {
        format!("{}/{}", self.month, self.year)
    }
}

/// Extracts the spreadsheet id from a pasted Google Sheets URL.
///
/// URLs look like `https://docs.google.com/spreadsheets/d/<ID>/edit#gid=0`.
/// Returns `None` when the input is not a recognizable sheets URL.
#[must_use]
pub fn extract_spreadsheet_id(url: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"https://docs\.google\.com/spreadsheets/d/([a-zA-Z0-9-_]+)")
            .expect("spreadsheet URL pattern is valid")
    });
    pattern
        .captures(url)
        .map(|captures| captures[1].to_string())
}

/// Parses the accounting period out of a spreadsheet display name.
///
/// Users name books like `Chi tiêu 9/2025`; the first `M/YYYY` occurrence
/// wins, with the month validated to 1-12.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] when no period is present or the month is
/// out of range.
pub fn parse_month_year(name: &str) -> Result<(u32, i32)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"(\d{1,2})/(\d{4})").expect("period pattern is valid"));

    let captures = pattern.captures(name).ok_or_else(|| {
        Error::InvalidInput(format!(
            "cannot extract month/year from spreadsheet name {name:?}; expected 'M/YYYY' or 'MM/YYYY'"
        ))
    })?;

    let month: u32 = captures[1]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid month in {name:?}")))?;
    let year: i32 = captures[2]
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid year in {name:?}")))?;

    if !(1..=12).contains(&month) {
        return Err(Error::InvalidInput(format!(
            "month must be 1-12, got {month} in {name:?}"
        )));
    }

    Ok((month, year))
}
