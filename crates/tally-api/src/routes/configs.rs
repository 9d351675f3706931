//! Sheet configuration API routes.
//!
//! A configuration points Tally at one spreadsheet: the book (pasted as a
//! Google Sheets URL), the tab, and the column span rows are written to.
//! Registration performs a connectivity test-read before saving, so a typo'd
//! URL or an unshared spreadsheet is rejected up front.
//!
//! ## Routes
//!
//! - `POST /configs` - Register a sheet configuration
//! - `GET  /configs` - List configurations (newest period first)
//! - `GET  /configs/{id}` - Get configuration by id

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tally_core::sheet_config::{
    extract_spreadsheet_id, SheetConfig, DEFAULT_COLUMN_SPAN, DEFAULT_SHEET_NAME,
};

use crate::context::RequestContext;
use crate::error::{ApiError, ApiErrorBody};
use crate::server::AppState;

/// Request to register a sheet configuration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConfigRequest {
    /// Full Google Sheets URL of the spreadsheet.
    pub spreadsheet_url: String,
    /// Spreadsheet display name; must carry the accounting period (`M/YYYY`).
    pub spreadsheet_name: String,
    /// Sheet (tab) name; defaults to `Transactions`.
    pub sheet_name: Option<String>,
    /// A1 column span; defaults to `A:H`.
    pub range: Option<String>,
}

/// Sheet configuration response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    /// Configuration id.
    pub id: String,
    /// Spreadsheet id extracted from the URL.
    pub spreadsheet_id: String,
    /// Spreadsheet display name.
    pub spreadsheet_name: String,
    /// Sheet (tab) name.
    pub sheet_name: String,
    /// A1 column span.
    pub range: String,
    /// Accounting period as displayed (`9/2025`).
    pub display_period: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

impl From<SheetConfig> for ConfigResponse {
    fn from(config: SheetConfig) -> Self {
        Self {
            display_period: config.display_period(),
            id: config.id,
            spreadsheet_id: config.spreadsheet_id,
            spreadsheet_name: config.spreadsheet_name,
            sheet_name: config.sheet_name,
            range: config.range,
            created_at: config.created_at.to_rfc3339(),
            updated_at: config.updated_at.to_rfc3339(),
        }
    }
}

/// List configurations response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ListConfigsResponse {
    /// Configurations, newest accounting period first.
    pub configs: Vec<ConfigResponse>,
}

/// Creates configuration routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/configs", get(list_configs).post(create_config))
        .route("/configs/:id", get(get_config))
}

/// Register a sheet configuration.
///
/// POST /api/v1/configs
#[utoipa::path(
    post,
    path = "/api/v1/configs",
    tag = "configs",
    request_body = CreateConfigRequest,
    responses(
        (status = 201, description = "Configuration registered", body = ConfigResponse),
        (status = 400, description = "Bad request", body = ApiErrorBody),
        (status = 409, description = "Spreadsheet already configured", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    )
)]
pub(crate) async fn create_config(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateConfigRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.spreadsheet_url.trim().is_empty() {
        return Err(ApiError::bad_request("spreadsheet_url is required"));
    }
    if req.spreadsheet_name.trim().is_empty() {
        return Err(ApiError::bad_request("spreadsheet_name is required"));
    }

    let spreadsheet_id = extract_spreadsheet_id(&req.spreadsheet_url).ok_or_else(|| {
        ApiError::bad_request(
            "could not extract a spreadsheet id from the URL; expected https://docs.google.com/spreadsheets/d/<id>/...",
        )
    })?;

    let sheet_name = req
        .sheet_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SHEET_NAME);
    let range = req
        .range
        .as_deref()
        .map(str::trim)
        .filter(|range| !range.is_empty())
        .unwrap_or(DEFAULT_COLUMN_SPAN);

    let config = SheetConfig::new(
        &ctx.user_id,
        &spreadsheet_id,
        req.spreadsheet_name.trim(),
        sheet_name,
        range,
    )?;
    let table = config.table_ref()?;

    tracing::info!(
        spreadsheet_id = %spreadsheet_id,
        sheet_name = %sheet_name,
        "Registering sheet config"
    );

    // Connectivity test-read before saving: a config that cannot be read
    // would fail every later operation anyway.
    state.engine().read_rows(&table).await.map_err(|e| {
        ApiError::bad_request(format!(
            "failed to read {}: {e}; check the URL, sheet name, and range, and make sure the \
             service account has been granted access",
            table.full_range()
        ))
    })?;

    let config = state.config_store().insert(config).await?;
    Ok((StatusCode::CREATED, Json(ConfigResponse::from(config))))
}

/// List configurations.
///
/// GET /api/v1/configs
#[utoipa::path(
    get,
    path = "/api/v1/configs",
    tag = "configs",
    responses(
        (status = 200, description = "Configurations listed", body = ListConfigsResponse),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    )
)]
pub(crate) async fn list_configs(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let configs = state
        .config_store()
        .list(&ctx.user_id)
        .await?
        .into_iter()
        .map(ConfigResponse::from)
        .collect();

    Ok(Json(ListConfigsResponse { configs }))
}

/// Get a configuration by id.
///
/// GET /api/v1/configs/{id}
#[utoipa::path(
    get,
    path = "/api/v1/configs/{id}",
    tag = "configs",
    params(
        ("id" = String, Path, description = "Configuration id")
    ),
    responses(
        (status = 200, description = "Configuration found", body = ConfigResponse),
        (status = 404, description = "Not found", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    )
)]
pub(crate) async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config = load_config(&state, &id).await?;
    Ok(Json(ConfigResponse::from(config)))
}

/// Loads a configuration or fails with 404.
pub(crate) async fn load_config(state: &AppState, id: &str) -> Result<SheetConfig, ApiError> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("config id is required"));
    }
    state
        .config_store()
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("sheet config not found: {id}")))
}
