//! Error types for Sheets client and engine operations.

/// The result type used throughout `tally-sheets`.
pub type Result<T> = std::result::Result<T, SheetsError>;

/// Errors from the Sheets client or the row mutation engine.
#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    /// Invalid input was provided to an engine operation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No sheet with the requested display name exists in the spreadsheet.
    #[error("sheet not found: {sheet_name:?} in spreadsheet {spreadsheet_id}")]
    SheetNotFound {
        /// Spreadsheet that was searched.
        spreadsheet_id: String,
        /// Display name that did not resolve.
        sheet_name: String,
    },

    /// The requested row is absent or entirely empty.
    #[error("row {row} not found in sheet {sheet_name:?}")]
    RowNotFound {
        /// 1-based row index that was requested.
        row: u32,
        /// Sheet the row was looked up in.
        sheet_name: String,
    },

    /// A multi-row delete failed partway through.
    ///
    /// Deletions run strictly highest-index-first and are not rolled back;
    /// `deleted` rows are gone, `unconfirmed` rows were not touched (or their
    /// state is unknown for the first of them).
    #[error(
        "batch delete aborted: rows {deleted:?} deleted, rows {unconfirmed:?} unconfirmed: {message}"
    )]
    BatchAborted {
        /// 1-based indices confirmed deleted, in deletion order.
        deleted: Vec<u32>,
        /// 1-based indices not confirmed deleted, highest first.
        unconfirmed: Vec<u32>,
        /// The underlying failure.
        message: String,
    },

    /// The Sheets API returned a non-success status.
    #[error("sheets api error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Message extracted from the API error envelope.
        message: String,
    },

    /// The request never produced a usable response (network, timeout).
    #[error("sheets transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The API responded with a payload that does not match the wire format.
    #[error("invalid sheets response: {message}")]
    Response {
        /// Description of the malformed payload.
        message: String,
    },
}
