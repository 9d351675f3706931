//! Transaction row API routes.
//!
//! Row operations against the spreadsheet selected by a configuration id.
//! Appends honor the `Idempotency-Key` header: the first caller with a key
//! performs the external write, and retries within the TTL window replay the
//! winner's response byte-for-byte.
//!
//! ## Routes
//!
//! - `GET    /configs/{id}/rows` - Read all rows
//! - `POST   /configs/{id}/rows` - Append a transaction row (idempotent-keyed)
//! - `DELETE /configs/{id}/rows/{row}` - Delete one row
//! - `DELETE /configs/{id}/rows` - Delete a set of rows (highest first)
//! - `POST   /configs/{id}/rows/{row}/clone` - Clone a row

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tally_core::idempotency::Begin;
use tally_core::table::{RowIndex, TableRef};

use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody};
use crate::metrics::{record_idempotency_check, record_row_mutation};
use crate::routes::configs::load_config;
use crate::server::AppState;

/// A transaction row to append. All fields are optional; missing cells are
/// stored as explicit empty strings so column alignment stays stable.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendRowRequest {
    /// Transaction date (`YYYY-MM-DD`).
    pub date: Option<String>,
    /// Transaction time (`HH:MM`).
    pub time: Option<String>,
    /// What the money was spent on.
    pub description: Option<String>,
    /// Budget group (e.g. `Needs`).
    pub group: Option<String>,
    /// Budget subgroup.
    pub subgroup: Option<String>,
    /// Category within the subgroup.
    pub category: Option<String>,
    /// Amount, as entered.
    pub amount: Option<String>,
    /// Free-form note.
    pub note: Option<String>,
}

impl AppendRowRequest {
    /// Returns the cells in declared column order.
    fn to_cells(&self) -> Vec<Option<String>> {
        vec![
            self.date.clone(),
            self.time.clone(),
            self.description.clone(),
            self.group.clone(),
            self.subgroup.clone(),
            self.category.clone(),
            self.amount.clone(),
            self.note.clone(),
        ]
    }
}

/// Rows of the configured range.
#[derive(Debug, Serialize, ToSchema)]
pub struct RowsResponse {
    /// All rows, including any header row.
    pub rows: Vec<Vec<String>>,
}

/// Result of appending a row.
#[derive(Debug, Serialize, ToSchema)]
pub struct AppendRowResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// The range the external service reports it wrote.
    pub updated_range: String,
    /// The padded row that was stored.
    pub row: Vec<String>,
}

/// Request to delete a set of rows.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteRowsRequest {
    /// 1-based row indices; order and duplicates do not matter.
    pub row_indices: Vec<u32>,
}

/// Result of a multi-row delete.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteRowsResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// 1-based indices deleted, in deletion order (highest first).
    pub deleted: Vec<u32>,
}

/// Result of cloning a row.
#[derive(Debug, Serialize, ToSchema)]
pub struct CloneRowResponse {
    /// Human-readable confirmation.
    pub message: String,
    /// The padded row that was appended.
    pub row: Vec<String>,
}

/// Creates row routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/configs/:id/rows",
            get(list_rows).post(append_row).delete(delete_rows),
        )
        .route("/configs/:id/rows/:row", axum::routing::delete(delete_row))
        .route("/configs/:id/rows/:row/clone", post(clone_row))
}

async fn resolve_table(state: &AppState, config_id: &str) -> Result<TableRef, ApiError> {
    let config = load_config(state, config_id).await?;
    Ok(config.table_ref()?)
}

/// Read all rows of the configured range.
///
/// GET /api/v1/configs/{id}/rows
#[utoipa::path(
    get,
    path = "/api/v1/configs/{id}/rows",
    tag = "rows",
    params(
        ("id" = String, Path, description = "Configuration id")
    ),
    responses(
        (status = 200, description = "Rows read", body = RowsResponse),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 502, description = "Upstream failure", body = ApiErrorBody),
    )
)]
pub(crate) async fn list_rows(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve_table(&state, &config_id).await?;
    let rows = state.engine().read_rows(&table).await?;
    Ok(Json(RowsResponse { rows }))
}

/// Append a transaction row.
///
/// POST /api/v1/configs/{id}/rows
///
/// Honors the `Idempotency-Key` header: duplicates within the TTL window
/// replay the winner's response; a duplicate racing an in-flight write gets
/// 409 with a `Retry-After` header.
#[utoipa::path(
    post,
    path = "/api/v1/configs/{id}/rows",
    tag = "rows",
    request_body = AppendRowRequest,
    params(
        ("id" = String, Path, description = "Configuration id"),
        ("Idempotency-Key" = Option<String>, Header, description = "Deduplication key for safe retries"),
    ),
    responses(
        (status = 200, description = "Row appended (or replayed)", body = AppendRowResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 409, description = "Same key in flight; retry later", body = ApiErrorBody),
        (status = 502, description = "Upstream failure", body = ApiErrorBody),
    )
)]
pub(crate) async fn append_row(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Json(req): Json<AppendRowRequest>,
) -> Result<Response, ApiError> {
    let table = resolve_table(&state, &config_id).await?;

    match state.idempotency().try_begin(ctx.idempotency_key.as_deref()) {
        Begin::Bypass => {
            record_idempotency_check("bypass");
            let body = perform_append(&state, &table, &req).await?;
            Ok(Json(body).into_response())
        }
        Begin::Proceed(ticket) => {
            record_idempotency_check("proceed");
            match perform_append(&state, &table, &req).await {
                Ok(body) => {
                    let serialized = serde_json::to_string(&body)
                        .map_err(|e| ApiError::internal(format!("serialize response: {e}")))?;
                    state.idempotency().complete(ticket, serialized.clone());
                    Ok(raw_json(StatusCode::OK, serialized))
                }
                Err(e) => {
                    // A dead reservation would block every retry within the
                    // TTL window.
                    state.idempotency().release(ticket);
                    Err(e)
                }
            }
        }
        Begin::Replay(cached) => {
            record_idempotency_check("replay");
            tracing::info!(
                request_id = %ctx.request_id,
                "Duplicate request detected; returning cached response"
            );
            Ok(raw_json(StatusCode::OK, cached))
        }
        Begin::InFlight { started_at } => {
            record_idempotency_check("in_flight");
            let retry_after = state.idempotency().retry_after_secs(started_at);
            Err(ApiError::conflict_in_progress(retry_after).with_request_id(ctx.request_id))
        }
    }
}

async fn perform_append(
    state: &AppState,
    table: &TableRef,
    req: &AppendRowRequest,
) -> Result<AppendRowResponse, ApiError> {
    let outcome = state.engine().append(table, &req.to_cells()).await;
    match outcome {
        Ok(outcome) => {
            record_row_mutation("append", "ok");
            let message = format!(
                "Row added successfully: {} on {} {}",
                req.description.as_deref().unwrap_or(""),
                req.date.as_deref().unwrap_or(""),
                req.time.as_deref().unwrap_or(""),
            );
            Ok(AppendRowResponse {
                message,
                updated_range: outcome.updated_range,
                row: outcome.row,
            })
        }
        Err(e) => {
            record_row_mutation("append", "error");
            Err(e.into())
        }
    }
}

/// Responds with an already-serialized JSON body (idempotent replays must be
/// byte-identical to the original response).
fn raw_json(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

/// Delete one row.
///
/// DELETE /api/v1/configs/{id}/rows/{row}
#[utoipa::path(
    delete,
    path = "/api/v1/configs/{id}/rows/{row}",
    tag = "rows",
    params(
        ("id" = String, Path, description = "Configuration id"),
        ("row" = u32, Path, description = "1-based row index"),
    ),
    responses(
        (status = 204, description = "Row deleted"),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 502, description = "Upstream failure", body = ApiErrorBody),
    )
)]
pub(crate) async fn delete_row(
    State(state): State<Arc<AppState>>,
    Path((config_id, row)): Path<(String, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve_table(&state, &config_id).await?;
    let row = RowIndex::new(row)?;

    match state.engine().delete_one(&table, row).await {
        Ok(()) => {
            record_row_mutation("delete", "ok");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            record_row_mutation("delete", "error");
            Err(e.into())
        }
    }
}

/// Delete a set of rows.
///
/// DELETE /api/v1/configs/{id}/rows
///
/// Indices are deduplicated and processed strictly highest-first so earlier
/// deletions never shift a pending index onto the wrong row. Deletions are
/// not transactional: a mid-batch failure reports which indices were deleted
/// and which remain unconfirmed.
#[utoipa::path(
    delete,
    path = "/api/v1/configs/{id}/rows",
    tag = "rows",
    request_body = DeleteRowsRequest,
    params(
        ("id" = String, Path, description = "Configuration id"),
    ),
    responses(
        (status = 200, description = "Rows deleted", body = DeleteRowsResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 502, description = "Upstream failure (may be partial)", body = ApiErrorBody),
    )
)]
pub(crate) async fn delete_rows(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
    Json(req): Json<DeleteRowsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve_table(&state, &config_id).await?;

    match state.engine().delete_many(&table, &req.row_indices).await {
        Ok(report) => {
            record_row_mutation("delete", "ok");
            let message = format!("{} row(s) deleted successfully", report.deleted.len());
            Ok(Json(DeleteRowsResponse {
                message,
                deleted: report.deleted,
            }))
        }
        Err(e) => {
            record_row_mutation("delete", "error");
            Err(e.into())
        }
    }
}

/// Clone a row.
///
/// POST /api/v1/configs/{id}/rows/{row}/clone
#[utoipa::path(
    post,
    path = "/api/v1/configs/{id}/rows/{row}/clone",
    tag = "rows",
    params(
        ("id" = String, Path, description = "Configuration id"),
        ("row" = u32, Path, description = "1-based row index to clone"),
    ),
    responses(
        (status = 201, description = "Row cloned", body = CloneRowResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 502, description = "Upstream failure", body = ApiErrorBody),
    )
)]
pub(crate) async fn clone_row(
    State(state): State<Arc<AppState>>,
    Path((config_id, row)): Path<(String, u32)>,
) -> Result<impl IntoResponse, ApiError> {
    let table = resolve_table(&state, &config_id).await?;
    let row = RowIndex::new(row)?;

    match state.engine().clone_row(&table, row).await {
        Ok(outcome) => {
            record_row_mutation("clone", "ok");
            Ok((
                StatusCode::CREATED,
                Json(CloneRowResponse {
                    message: format!("Row {row} cloned successfully"),
                    row: outcome.row,
                }),
            ))
        }
        Err(e) => {
            record_row_mutation("clone", "error");
            Err(e.into())
        }
    }
}
