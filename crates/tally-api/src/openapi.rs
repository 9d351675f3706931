//! `OpenAPI` (3.x) specification generation for `tally-api`.
//!
//! Served at `/openapi.json`; used to generate the browser client and to
//! detect breaking API changes.

use utoipa::OpenApi;

/// `OpenAPI` documentation for the Tally REST API (`/api/v1/*`).
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tally API",
        description = "Personal-finance transaction recorder backed by Google Sheets"
    ),
    paths(
        crate::routes::configs::create_config,
        crate::routes::configs::list_configs,
        crate::routes::configs::get_config,
        crate::routes::rows::list_rows,
        crate::routes::rows::append_row,
        crate::routes::rows::delete_row,
        crate::routes::rows::delete_rows,
        crate::routes::rows::clone_row,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::routes::configs::CreateConfigRequest,
            crate::routes::configs::ConfigResponse,
            crate::routes::configs::ListConfigsResponse,
            crate::routes::rows::AppendRowRequest,
            crate::routes::rows::AppendRowResponse,
            crate::routes::rows::RowsResponse,
            crate::routes::rows::DeleteRowsRequest,
            crate::routes::rows::DeleteRowsResponse,
            crate::routes::rows::CloneRowResponse,
        )
    ),
    tags(
        (name = "configs", description = "Sheet configuration operations"),
        (name = "rows", description = "Transaction row operations"),
    )
)]
pub struct ApiDoc;

/// Returns the generated `OpenAPI` spec.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Returns the generated `OpenAPI` spec serialized as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails (should not happen).
pub fn openapi_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_serializes() {
        let spec = openapi_json().expect("serialize spec");
        assert!(spec.contains("Tally API"));
        assert!(spec.contains("/api/v1/configs/{id}/rows"));
    }
}
