//! API error types and HTTP response mapping.

use axum::http::header::HeaderName;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use tally_core::Error as CoreError;
use tally_sheets::SheetsError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients).
    pub message: String,
    /// Optional error category (e.g., `upstream`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Optional request ID for correlation.
    pub request_id: Option<String>,
}

/// HTTP API error with stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    error: Option<&'static str>,
    request_id: Option<String>,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Returns an error response for invalid input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Returns an error response for missing resources.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Returns an error response for conflict (already exists).
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    /// Returns an error response for upstream Sheets failures.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new_with_error(StatusCode::BAD_GATEWAY, "UPSTREAM", message, Some("upstream"))
    }

    /// Returns an internal error response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// Returns a 409 Conflict for in-progress idempotent requests with a
    /// Retry-After header.
    #[must_use]
    pub fn conflict_in_progress(retry_after_secs: u64) -> Self {
        Self::conflict("Request already in progress").with_retry_after(retry_after_secs)
    }

    /// Attaches a request ID for correlation.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attaches a Retry-After header value in seconds.
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Returns the human-readable error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the request ID, if one was attached.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self::new_with_error(status, code, message, None)
    }

    fn new_with_error(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        error: Option<&'static str>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            error,
            request_id: None,
            retry_after_secs: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id;
        let retry_after_secs = self.retry_after_secs;
        let mut response = (
            self.status,
            Json(ApiErrorBody {
                code: self.code.to_string(),
                message: self.message,
                error: self.error.map(str::to_string),
                request_id: request_id.clone(),
            }),
        )
            .into_response();

        if let Some(request_id) = request_id {
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("x-request-id"), value);
            }
        }

        if let Some(secs) = retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("retry-after"), value);
            }
        }

        response
    }
}

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidInput(message) => Self::bad_request(message),
            CoreError::ResourceNotFound { resource_type, id } => {
                Self::not_found(format!("{resource_type} not found: {id}"))
            }
            CoreError::AlreadyExists { resource_type, id } => {
                Self::conflict(format!("{resource_type} already exists: {id}"))
            }
            CoreError::Storage { message, .. }
            | CoreError::Serialization { message }
            | CoreError::Internal { message } => Self::internal(message),
        }
    }
}

impl From<SheetsError> for ApiError {
    fn from(value: SheetsError) -> Self {
        match value {
            SheetsError::InvalidInput(message) => Self::bad_request(message),
            SheetsError::SheetNotFound { spreadsheet_id, sheet_name } => Self::not_found(format!(
                "sheet {sheet_name:?} not found in spreadsheet {spreadsheet_id}"
            )),
            SheetsError::RowNotFound { row, sheet_name } => {
                Self::not_found(format!("row {row} not found in sheet {sheet_name:?}"))
            }
            error @ (SheetsError::BatchAborted { .. }
            | SheetsError::Api { .. }
            | SheetsError::Transport { .. }
            | SheetsError::Response { .. }) => Self::bad_gateway(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_in_progress_has_retry_after() {
        let error = ApiError::conflict_in_progress(5);
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert_eq!(error.code(), "CONFLICT");
        assert!(error.message().contains("in progress"));

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let retry_after = response
            .headers()
            .get("retry-after")
            .expect("Retry-After header should be present");
        assert_eq!(retry_after.to_str().unwrap(), "5");
    }

    #[test]
    fn test_regular_conflict_has_no_retry_after() {
        let error = ApiError::conflict("test");
        let response = error.into_response();

        assert!(response.headers().get("retry-after").is_none());
    }

    #[test]
    fn test_sheet_not_found_maps_to_404() {
        let error = ApiError::from(SheetsError::SheetNotFound {
            spreadsheet_id: "spreadsheet-1".to_string(),
            sheet_name: "Nope".to_string(),
        });
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_batch_aborted_maps_to_502_with_saga_detail() {
        let error = ApiError::from(SheetsError::BatchAborted {
            deleted: vec![5, 4],
            unconfirmed: vec![2],
            message: "quota exceeded".to_string(),
        });
        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
        assert!(error.message().contains("[5, 4]"));
        assert!(error.message().contains("[2]"));
    }

    #[test]
    fn test_already_exists_maps_to_conflict() {
        let error = ApiError::from(CoreError::already_exists("sheet config", "spread-1"));
        assert_eq!(error.status(), StatusCode::CONFLICT);
    }
}
