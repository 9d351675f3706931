//! Ordered row mutations against a 1-indexed external table.
//!
//! The engine translates logical operations (append, delete-one,
//! delete-many, clone) into client calls, holding no state between
//! operations. Two properties carry the correctness weight:
//!
//! - **Fixed-width rows**: appended rows are always padded with explicit
//!   empty cells up to the declared column count, so column alignment stays
//!   stable no matter how sparse the input was.
//! - **Descending deletes**: a multi-row delete processes indices strictly
//!   highest-first. Deleting a row shifts every later row up by one, so any
//!   other order would leave pending higher indices pointing at the wrong
//!   rows. Processing from the highest index down keeps every remaining
//!   pending index aimed at its originally intended row.
//!
//! Sheet display names are resolved to the internal numeric sheet handle
//! before any delete; an unresolved name fails the operation with no
//! mutation issued.

use std::sync::Arc;

use tracing::Instrument;

use tally_core::observability::sheet_span;
use tally_core::table::{RowIndex, TableRef};

use crate::client::SheetsClient;
use crate::error::{Result, SheetsError};

/// Result of appending a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The range the external service reports it wrote.
    pub updated_range: String,
    /// The padded row that was sent.
    pub row: Vec<String>,
}

/// Result of a multi-row delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    /// 1-based indices deleted, in deletion order (highest first).
    pub deleted: Vec<u32>,
}

/// Stateless translator from logical row operations to client calls.
pub struct RowMutationEngine {
    client: Arc<dyn SheetsClient>,
}

impl std::fmt::Debug for RowMutationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowMutationEngine").finish_non_exhaustive()
    }
}

impl RowMutationEngine {
    /// Creates an engine over the given client.
    #[must_use]
    pub fn new(client: Arc<dyn SheetsClient>) -> Self {
        Self { client }
    }

    /// Reads all rows of the configured range.
    ///
    /// # Errors
    ///
    /// Returns an error if the external read fails.
    pub async fn read_rows(&self, table: &TableRef) -> Result<Vec<Vec<String>>> {
        self.client
            .get_range(&table.spreadsheet_id, &table.full_range())
            .await
    }

    /// Appends one row, normalizing missing cells to explicit empty strings
    /// and padding to the declared column count. Cells beyond the declared
    /// width are dropped; the span fixes the row schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the external append fails.
    pub async fn append(
        &self,
        table: &TableRef,
        cells: &[Option<String>],
    ) -> Result<AppendOutcome> {
        let span = sheet_span("append", &table.spreadsheet_id, &table.sheet_name);
        let row = pad_row(cells, table.column_count());
        async {
            let updated_range = self
                .client
                .append_row(&table.spreadsheet_id, &table.full_range(), row.clone())
                .await?;

            tracing::info!(updated_range = %updated_range, "Appended row");
            Ok(AppendOutcome { updated_range, row })
        }
        .instrument(span)
        .await
    }

    /// Deletes a single 1-based row.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::SheetNotFound`] if the display name does not
    /// resolve (no delete issued), or the client error otherwise.
    pub async fn delete_one(&self, table: &TableRef, row: RowIndex) -> Result<()> {
        let span = sheet_span("delete_row", &table.spreadsheet_id, &table.sheet_name);
        async {
            let sheet_id = self.resolve_sheet_id(table).await?;
            let (start, end) = row.zero_based_span();
            self.client
                .delete_rows(&table.spreadsheet_id, sheet_id, start, end)
                .await?;

            tracing::info!(row = %row, "Deleted row");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Deletes a set of 1-based rows, strictly highest-index-first.
    ///
    /// Duplicate indices are collapsed. Deletes are issued one index at a
    /// time and never rolled back: on a mid-batch failure the returned
    /// [`SheetsError::BatchAborted`] names which indices were deleted and
    /// which remain unconfirmed, so the caller can retry precisely.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::InvalidInput`] for an empty set or a zero
    /// index, [`SheetsError::SheetNotFound`] if the display name does not
    /// resolve (no delete issued), or [`SheetsError::BatchAborted`] on a
    /// mid-batch failure.
    pub async fn delete_many(&self, table: &TableRef, rows: &[u32]) -> Result<DeleteReport> {
        if rows.is_empty() {
            return Err(SheetsError::InvalidInput(
                "no row indices to delete".to_string(),
            ));
        }
        if rows.contains(&0) {
            return Err(SheetsError::InvalidInput(
                "row indices are 1-based; 0 is not a valid row".to_string(),
            ));
        }

        let span = sheet_span("delete_rows", &table.spreadsheet_id, &table.sheet_name);

        // Highest first; a lower-index delete would shift every pending
        // higher index off its intended row.
        let mut pending: Vec<u32> = rows.to_vec();
        pending.sort_unstable_by(|a, b| b.cmp(a));
        pending.dedup();

        async {
            let sheet_id = self.resolve_sheet_id(table).await?;

            let mut deleted: Vec<u32> = Vec::with_capacity(pending.len());
            for (position, &row) in pending.iter().enumerate() {
                let result = self
                    .client
                    .delete_rows(&table.spreadsheet_id, sheet_id, row - 1, row)
                    .await;
                if let Err(e) = result {
                    let unconfirmed = pending[position..].to_vec();
                    tracing::error!(
                        deleted = ?deleted,
                        unconfirmed = ?unconfirmed,
                        "Batch delete aborted mid-sequence"
                    );
                    return Err(SheetsError::BatchAborted {
                        deleted,
                        unconfirmed,
                        message: e.to_string(),
                    });
                }
                deleted.push(row);
            }

            tracing::info!(deleted = ?deleted, "Deleted rows");
            Ok(DeleteReport { deleted })
        }
        .instrument(span)
        .await
    }

    /// Clones the row at the given index by reading it, padding it to the
    /// declared width, and appending it through the normal append path.
    ///
    /// # Errors
    ///
    /// Returns [`SheetsError::RowNotFound`] if the source row is absent or
    /// entirely empty, or the client error otherwise.
    pub async fn clone_row(&self, table: &TableRef, row: RowIndex) -> Result<AppendOutcome> {
        let span = sheet_span("clone_row", &table.spreadsheet_id, &table.sheet_name);
        let rows = self
            .client
            .get_range(&table.spreadsheet_id, &table.row_range(row))
            .instrument(span)
            .await?;

        let source = rows
            .into_iter()
            .next()
            .filter(|cells| cells.iter().any(|cell| !cell.is_empty()))
            .ok_or_else(|| SheetsError::RowNotFound {
                row: row.get(),
                sheet_name: table.sheet_name.clone(),
            })?;

        let cells: Vec<Option<String>> = source.into_iter().map(Some).collect();
        self.append(table, &cells).await
    }

    /// Resolves the sheet's internal numeric handle by display name.
    async fn resolve_sheet_id(&self, table: &TableRef) -> Result<i64> {
        let sheets = self.client.list_sheets(&table.spreadsheet_id).await?;
        sheets
            .into_iter()
            .find(|sheet| sheet.title == table.sheet_name)
            .map(|sheet| sheet.sheet_id)
            .ok_or_else(|| SheetsError::SheetNotFound {
                spreadsheet_id: table.spreadsheet_id.clone(),
                sheet_name: table.sheet_name.clone(),
            })
    }
}

/// Normalizes a sparse row to exactly `width` cells, empty strings standing
/// in for missing values.
fn pad_row(cells: &[Option<String>], width: usize) -> Vec<String> {
    (0..width)
        .map(|i| cells.get(i).and_then(Clone::clone).unwrap_or_default())
        .collect()
}
