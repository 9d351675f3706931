//! HTTP client for the Google Sheets v4 API.
//!
//! [`SheetsClient`] is the seam between the row mutation engine and the
//! external service: four primitives, no engine policy. The production
//! implementation is [`HttpSheetsClient`]; tests substitute in-memory fakes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, SheetsError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default base URL of the Google Sheets API.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

/// Default GCE/Cloud Run metadata endpoint for access tokens.
const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh cached access tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Identity of one sheet (tab) inside a spreadsheet.
///
/// `sheet_id` is the internal numeric handle dimension deletes are addressed
/// to; `title` is the display name users configure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    /// Internal numeric sheet handle.
    pub sheet_id: i64,
    /// Display name of the sheet.
    pub title: String,
}

/// The four external primitives Tally consumes.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    /// Reads all rows in an A1 range. Rows may be shorter than the declared
    /// column width; an absent range yields no rows.
    async fn get_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>>;

    /// Appends one row after the last data row of the range. Returns the
    /// range that was actually written.
    async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<String>,
    ) -> Result<String>;

    /// Lists all sheets (tabs) of the spreadsheet.
    async fn list_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetInfo>>;

    /// Deletes the zero-based half-open row span `[start, end)` from the
    /// sheet with the given internal handle. Subsequent rows shift upward.
    async fn delete_rows(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        start: u32,
        end: u32,
    ) -> Result<()>;
}

/// How outbound Sheets requests authenticate.
#[derive(Debug, Clone, Default)]
pub enum SheetsAuth {
    /// No authorization header (mock servers, tests).
    #[default]
    None,
    /// A static bearer token configured via environment.
    StaticBearer(String),
    /// Fetch an OAuth2 access token from the GCP metadata server.
    GcpMetadata {
        /// Metadata URL override (primarily tests).
        metadata_url: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// reqwest-backed client for the Google Sheets v4 REST API.
pub struct HttpSheetsClient {
    base_url: String,
    auth: SheetsAuth,
    client: reqwest::Client,
    token_cache: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for HttpSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSheetsClient")
            .field("base_url", &self.base_url)
            .field("auth", &match &self.auth {
                SheetsAuth::None => "none",
                SheetsAuth::StaticBearer(_) => "static_bearer",
                SheetsAuth::GcpMetadata { .. } => "gcp_metadata",
            })
            .finish_non_exhaustive()
    }
}

impl HttpSheetsClient {
    /// Creates a client targeting the given base URL with the given auth.
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: SheetsAuth) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            auth,
            client,
            token_cache: Mutex::new(None),
        }
    }

    /// Creates a client against the public Google Sheets endpoint.
    #[must_use]
    pub fn with_auth(auth: SheetsAuth) -> Self {
        Self::new(DEFAULT_BASE_URL, auth)
    }

    /// Builds a URL under the base, percent-encoding each path segment
    /// (sheet names may contain spaces or non-ASCII characters).
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| SheetsError::Transport {
            message: format!("invalid sheets base url {:?}: {e}", self.base_url),
        })?;
        url.path_segments_mut()
            .map_err(|()| SheetsError::Transport {
                message: format!("sheets base url {:?} cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        match &self.auth {
            SheetsAuth::None => Ok(None),
            SheetsAuth::StaticBearer(token) => Ok(Some(token.clone())),
            SheetsAuth::GcpMetadata { metadata_url } => {
                let mut cache = self.token_cache.lock().await;
                if let Some(cached) = cache.as_ref() {
                    if cached.expires_at > Instant::now() {
                        return Ok(Some(cached.token.clone()));
                    }
                }

                let url = metadata_url
                    .as_deref()
                    .unwrap_or(DEFAULT_METADATA_TOKEN_URL);
                let fetched = fetch_metadata_token(&self.client, url).await?;
                let token = fetched.access_token.clone();
                *cache = Some(CachedToken {
                    token: fetched.access_token,
                    expires_at: Instant::now()
                        + Duration::from_secs(fetched.expires_in)
                            .saturating_sub(TOKEN_REFRESH_MARGIN),
                });
                Ok(Some(token))
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = match self.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| SheetsError::Transport {
            message: format!("sheets request failed: {e}"),
        })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.bytes().await.map_err(|e| SheetsError::Transport {
            message: format!("failed reading sheets error body: {e}"),
        })?;
        let message = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(|message| message.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| String::from_utf8_lossy(&body).to_string());

        Err(SheetsError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| SheetsError::Response {
                message: format!("failed to parse sheets response: {e}"),
            })
    }
}

async fn fetch_metadata_token(client: &reqwest::Client, url: &str) -> Result<MetadataToken> {
    let response = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| SheetsError::Transport {
            message: format!("metadata token request failed: {e}"),
        })?;

    if !response.status().is_success() {
        return Err(SheetsError::Api {
            status: response.status().as_u16(),
            message: "metadata server refused to issue an access token".to_string(),
        });
    }

    response
        .json::<MetadataToken>()
        .await
        .map_err(|e| SheetsError::Response {
            message: format!("invalid metadata token response: {e}"),
        })
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct ValueRangeBody {
    values: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ValueRangeResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Serialize)]
struct BatchUpdateRequest {
    requests: Vec<BatchRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    delete_dimension: DeleteDimension,
}

#[derive(Debug, Serialize)]
struct DeleteDimension {
    range: DimensionRange,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DimensionRange {
    sheet_id: i64,
    dimension: &'static str,
    start_index: u32,
    end_index: u32,
}

/// Renders a cell value from the wire as a string.
///
/// Numbers and booleans show up untyped in `USER_ENTERED` sheets; nulls are
/// blank cells.
fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetsClient for HttpSheetsClient {
    async fn get_range(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        let url = self.url(&["v4", "spreadsheets", spreadsheet_id, "values", range])?;
        let response = self.send(self.client.get(url)).await?;
        let body: ValueRangeResponse = Self::parse(response).await?;
        Ok(body
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_row(
        &self,
        spreadsheet_id: &str,
        range: &str,
        row: Vec<String>,
    ) -> Result<String> {
        let mut url = self.url(&[
            "v4",
            "spreadsheets",
            spreadsheet_id,
            "values",
            &format!("{range}:append"),
        ])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let body = ValueRangeBody { values: vec![row] };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let body: AppendResponse = Self::parse(response).await?;
        Ok(body
            .updates
            .and_then(|updates| updates.updated_range)
            .unwrap_or_default())
    }

    async fn list_sheets(&self, spreadsheet_id: &str) -> Result<Vec<SheetInfo>> {
        let mut url = self.url(&["v4", "spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties");

        let response = self.send(self.client.get(url)).await?;
        let body: SpreadsheetResponse = Self::parse(response).await?;
        Ok(body
            .sheets
            .into_iter()
            .map(|sheet| SheetInfo {
                sheet_id: sheet.properties.sheet_id,
                title: sheet.properties.title,
            })
            .collect())
    }

    async fn delete_rows(
        &self,
        spreadsheet_id: &str,
        sheet_id: i64,
        start: u32,
        end: u32,
    ) -> Result<()> {
        let url = self.url(&[
            "v4",
            "spreadsheets",
            &format!("{spreadsheet_id}:batchUpdate"),
        ])?;

        let body = BatchUpdateRequest {
            requests: vec![BatchRequest {
                delete_dimension: DeleteDimension {
                    range: DimensionRange {
                        sheet_id,
                        dimension: "ROWS",
                        start_index: start,
                        end_index: end,
                    },
                },
            }],
        };

        self.send(self.client.post(url).json(&body)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn client(base_url: String) -> HttpSheetsClient {
        HttpSheetsClient::new(base_url, SheetsAuth::None)
    }

    #[tokio::test]
    async fn get_range_coerces_untyped_cells() {
        let app = Router::new().route(
            "/v4/spreadsheets/:id/values/:range",
            get(|| async {
                Json(json!({
                    "range": "Transactions!A:H",
                    "values": [["2025-09-01", "Lunch", 42.5, true, null]]
                }))
            }),
        );
        let client = client(spawn(app).await);

        let rows = client
            .get_range("spreadsheet-1", "Transactions!A:H")
            .await
            .expect("get range");
        assert_eq!(
            rows,
            vec![vec![
                "2025-09-01".to_string(),
                "Lunch".to_string(),
                "42.5".to_string(),
                "true".to_string(),
                String::new(),
            ]]
        );
    }

    #[tokio::test]
    async fn get_range_without_values_is_empty() {
        let app = Router::new().route(
            "/v4/spreadsheets/:id/values/:range",
            get(|| async { Json(json!({ "range": "Transactions!A:H" })) }),
        );
        let client = client(spawn(app).await);

        let rows = client
            .get_range("spreadsheet-1", "Transactions!A:H")
            .await
            .expect("get range");
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn append_row_sends_user_entered_values() {
        let captured: Arc<StdMutex<Option<serde_json::Value>>> = Arc::default();
        let app = Router::new()
            .route(
                "/v4/spreadsheets/:id/values/:range",
                post(
                    |State(captured): State<Arc<StdMutex<Option<serde_json::Value>>>>,
                     request: axum::extract::Request| async move {
                        let query = request.uri().query().unwrap_or_default().to_string();
                        assert!(query.contains("valueInputOption=USER_ENTERED"), "{query}");
                        let bytes =
                            axum::body::to_bytes(request.into_body(), 64 * 1024).await.unwrap();
                        *captured.lock().unwrap() = Some(serde_json::from_slice(&bytes).unwrap());
                        Json(json!({
                            "updates": { "updatedRange": "Transactions!A7:H7" }
                        }))
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        let client = client(spawn(app).await);

        let updated = client
            .append_row(
                "spreadsheet-1",
                "Transactions!A:H",
                vec!["a".to_string(), "b".to_string()],
            )
            .await
            .expect("append");

        assert_eq!(updated, "Transactions!A7:H7");
        let body = captured.lock().unwrap().clone().expect("captured body");
        assert_eq!(body, json!({ "values": [["a", "b"]] }));
    }

    #[tokio::test]
    async fn list_sheets_parses_properties() {
        let app = Router::new().route(
            "/v4/spreadsheets/:id",
            get(|| async {
                Json(json!({
                    "sheets": [
                        { "properties": { "sheetId": 0, "title": "Transactions" } },
                        { "properties": { "sheetId": 915, "title": "Summary" } }
                    ]
                }))
            }),
        );
        let client = client(spawn(app).await);

        let sheets = client.list_sheets("spreadsheet-1").await.expect("list");
        assert_eq!(
            sheets,
            vec![
                SheetInfo {
                    sheet_id: 0,
                    title: "Transactions".to_string()
                },
                SheetInfo {
                    sheet_id: 915,
                    title: "Summary".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn delete_rows_posts_delete_dimension() {
        let captured: Arc<StdMutex<Option<serde_json::Value>>> = Arc::default();
        let app = Router::new()
            .route(
                "/v4/spreadsheets/:id",
                post(
                    |State(captured): State<Arc<StdMutex<Option<serde_json::Value>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        *captured.lock().unwrap() = Some(body);
                        Json(json!({ "replies": [{}] }))
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        let client = client(spawn(app).await);

        client
            .delete_rows("spreadsheet-1", 915, 3, 4)
            .await
            .expect("delete");

        let body = captured.lock().unwrap().clone().expect("captured body");
        assert_eq!(
            body,
            json!({
                "requests": [{
                    "deleteDimension": {
                        "range": {
                            "sheetId": 915,
                            "dimension": "ROWS",
                            "startIndex": 3,
                            "endIndex": 4
                        }
                    }
                }]
            })
        );
    }

    #[tokio::test]
    async fn api_errors_extract_the_envelope_message() {
        let app = Router::new().route(
            "/v4/spreadsheets/:id/values/:range",
            get(|| async {
                (
                    axum::http::StatusCode::FORBIDDEN,
                    Json(json!({
                        "error": { "code": 403, "message": "The caller does not have permission" }
                    })),
                )
            }),
        );
        let client = client(spawn(app).await);

        let err = client
            .get_range("spreadsheet-1", "Transactions!A:H")
            .await
            .expect_err("forbidden");
        match err {
            SheetsError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "The caller does not have permission");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn static_bearer_token_is_attached() {
        let app = Router::new().route(
            "/v4/spreadsheets/:id/values/:range",
            get(|request: axum::extract::Request| async move {
                let auth = request
                    .headers()
                    .get(axum::http::header::AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth == "Bearer secret-token" {
                    Json(json!({ "values": [] })).into_response()
                } else {
                    (
                        axum::http::StatusCode::UNAUTHORIZED,
                        Json(json!({ "error": { "message": "missing token" } })),
                    )
                        .into_response()
                }
            }),
        );
        let client = HttpSheetsClient::new(
            spawn(app).await,
            SheetsAuth::StaticBearer("secret-token".to_string()),
        );

        client
            .get_range("spreadsheet-1", "Transactions!A:H")
            .await
            .expect("authorized request");
    }

    #[tokio::test]
    async fn metadata_token_is_fetched_once_and_cached() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let metadata = Router::new()
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/token",
                get(
                    |State(fetches): State<Arc<AtomicUsize>>,
                     request: axum::extract::Request| async move {
                        assert_eq!(
                            request
                                .headers()
                                .get("Metadata-Flavor")
                                .and_then(|value| value.to_str().ok()),
                            Some("Google")
                        );
                        fetches.fetch_add(1, Ordering::SeqCst);
                        Json(json!({
                            "access_token": "metadata-token",
                            "expires_in": 3600,
                            "token_type": "Bearer"
                        }))
                    },
                ),
            )
            .with_state(Arc::clone(&fetches));
        let metadata_url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            spawn(metadata).await
        );

        let sheets = Router::new().route(
            "/v4/spreadsheets/:id/values/:range",
            get(|| async { Json(json!({ "values": [] })) }),
        );
        let client = HttpSheetsClient::new(
            spawn(sheets).await,
            SheetsAuth::GcpMetadata {
                metadata_url: Some(metadata_url),
            },
        );

        client
            .get_range("spreadsheet-1", "Transactions!A:H")
            .await
            .expect("first request");
        client
            .get_range("spreadsheet-1", "Transactions!A:H")
            .await
            .expect("second request");

        assert_eq!(fetches.load(Ordering::SeqCst), 1, "token must be cached");
    }
}
