//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use tally_core::error::{Error, Result};
use tally_sheets::client::{SheetsAuth, DEFAULT_BASE_URL};

const MIN_IDEMPOTENCY_TTL_SECS: u64 = 10;
const MAX_IDEMPOTENCY_TTL_SECS: u64 = 3600; // 1 hour max

fn default_idempotency_ttl_secs() -> u64 {
    300 // 5 minutes, matching tally_core::idempotency::DEFAULT_TTL
}

fn default_idempotency_max_entries() -> usize {
    10_000
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_sheets_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Auth mode for outbound Google Sheets calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SheetsAuthMode {
    /// Do not attach authorization headers (mock servers, tests).
    #[default]
    None,
    /// Attach a static bearer token configured via environment.
    StaticBearer,
    /// Fetch an access token from the GCP metadata server.
    GcpMetadata,
}

/// Google Sheets client configuration.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetsApiConfig {
    /// Base URL of the Sheets API (override for tests/mocks).
    #[serde(default = "default_sheets_base_url")]
    pub base_url: String,
    /// Auth mode.
    #[serde(default)]
    pub auth_mode: SheetsAuthMode,
    /// Static bearer token for `static_bearer` mode.
    #[serde(default)]
    pub static_bearer_token: Option<String>,
    /// Metadata URL override for `gcp_metadata` mode (primarily tests).
    #[serde(default)]
    pub metadata_url: Option<String>,
}

impl std::fmt::Debug for SheetsApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsApiConfig")
            .field("base_url", &self.base_url)
            .field("auth_mode", &self.auth_mode)
            .field(
                "static_bearer_token",
                &self.static_bearer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("metadata_url", &self.metadata_url)
            .finish()
    }
}

impl Default for SheetsApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_sheets_base_url(),
            auth_mode: SheetsAuthMode::default(),
            static_bearer_token: None,
            metadata_url: None,
        }
    }
}

impl SheetsApiConfig {
    /// Validates auth settings.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields for the active mode are missing,
    /// or test-only overrides are set outside debug mode.
    pub fn validate(&self, debug: bool) -> Result<()> {
        if self.auth_mode == SheetsAuthMode::StaticBearer
            && self
                .static_bearer_token
                .as_deref()
                .is_none_or(|token| token.trim().is_empty())
        {
            return Err(Error::InvalidInput(
                "TALLY_SHEETS_STATIC_BEARER_TOKEN is required when TALLY_SHEETS_AUTH_MODE=static_bearer"
                    .to_string(),
            ));
        }
        if !debug && self.metadata_url.is_some() {
            return Err(Error::InvalidInput(
                "TALLY_SHEETS_GCP_METADATA_URL is only allowed when TALLY_DEBUG=true".to_string(),
            ));
        }
        if !debug && self.auth_mode == SheetsAuthMode::None {
            return Err(Error::InvalidInput(
                "TALLY_SHEETS_AUTH_MODE must not be 'none' when TALLY_DEBUG=false".to_string(),
            ));
        }
        Ok(())
    }

    /// Converts to the `tally-sheets` auth type.
    #[must_use]
    pub fn to_sheets_auth(&self) -> SheetsAuth {
        match self.auth_mode {
            SheetsAuthMode::None => SheetsAuth::None,
            SheetsAuthMode::StaticBearer => SheetsAuth::StaticBearer(
                self.static_bearer_token.clone().unwrap_or_default(),
            ),
            SheetsAuthMode::GcpMetadata => SheetsAuth::GcpMetadata {
                metadata_url: self.metadata_url.clone(),
            },
        }
    }
}

/// CORS configuration for browser-based access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. Use `["*"]` to allow all origins (development only).
    /// Empty list disables CORS entirely.
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache (seconds).
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Default: disabled (secure-by-default).
            // Set to `["*"]` for local development, or explicit origins for production.
            allowed_origins: Vec::new(),
            max_age_seconds: 3600, // 1 hour
        }
    }
}

/// Configuration for the Tally API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Enable debug mode.
    ///
    /// When enabled:
    /// - The Sheets auth mode may be `none` and the metadata URL may be
    ///   overridden (mock servers)
    /// - An in-memory config store is acceptable
    pub debug: bool,

    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Google Sheets client configuration.
    #[serde(default)]
    pub sheets: SheetsApiConfig,

    /// TTL for cached idempotent responses, in seconds.
    ///
    /// Also the stale timeout for in-flight reservations: a reservation older
    /// than this can be taken over by a new request, so a stuck request
    /// cannot block retries forever.
    ///
    /// Default: 300 (5 minutes).
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    /// Maximum number of idempotency cache entries before lazy eviction.
    #[serde(default = "default_idempotency_max_entries")]
    pub idempotency_max_entries: usize,

    /// Path of the JSON sheet-config store. In-memory when unset (debug only).
    #[serde(default)]
    pub config_store_path: Option<PathBuf>,

    /// User id stamped on configurations (no authentication layer in scope).
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            debug: false,
            cors: CorsConfig::default(),
            sheets: SheetsApiConfig::default(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            idempotency_max_entries: default_idempotency_max_entries(),
            config_store_path: None,
            default_user_id: default_user_id(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `TALLY_HTTP_PORT`
    /// - `TALLY_DEBUG`
    /// - `TALLY_CORS_ALLOWED_ORIGINS` (comma-separated, or `*`)
    /// - `TALLY_CORS_MAX_AGE_SECONDS`
    /// - `TALLY_SHEETS_BASE_URL`
    /// - `TALLY_SHEETS_AUTH_MODE` (`none` | `static_bearer` | `gcp_metadata`)
    /// - `TALLY_SHEETS_STATIC_BEARER_TOKEN`
    /// - `TALLY_SHEETS_GCP_METADATA_URL`
    /// - `TALLY_IDEMPOTENCY_TTL_SECS` (10-3600, default: 300)
    /// - `TALLY_IDEMPOTENCY_MAX_ENTRIES`
    /// - `TALLY_CONFIG_STORE_PATH`
    /// - `TALLY_DEFAULT_USER_ID`
    ///
    /// # Errors
    ///
    /// Returns an error if any environment variable is present but cannot be
    /// parsed, or the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = env_u16("TALLY_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env_bool("TALLY_DEBUG")? {
            config.debug = debug;
        }

        if let Some(origins) = env_string("TALLY_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = parse_cors_allowed_origins(&origins);
        }
        if let Some(max_age) = env_u64("TALLY_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }

        if let Some(base_url) = env_string("TALLY_SHEETS_BASE_URL") {
            config.sheets.base_url = base_url;
        }
        if let Some(mode) = env_string("TALLY_SHEETS_AUTH_MODE") {
            config.sheets.auth_mode = parse_sheets_auth_mode("TALLY_SHEETS_AUTH_MODE", &mode)?;
        }
        if let Some(token) = env_string("TALLY_SHEETS_STATIC_BEARER_TOKEN") {
            config.sheets.static_bearer_token = Some(token);
        }
        if let Some(metadata_url) = env_string("TALLY_SHEETS_GCP_METADATA_URL") {
            config.sheets.metadata_url = Some(metadata_url);
        }

        if let Some(secs) = env_u64("TALLY_IDEMPOTENCY_TTL_SECS")? {
            if secs < MIN_IDEMPOTENCY_TTL_SECS {
                return Err(Error::InvalidInput(format!(
                    "TALLY_IDEMPOTENCY_TTL_SECS must be at least {MIN_IDEMPOTENCY_TTL_SECS} seconds"
                )));
            }
            if secs > MAX_IDEMPOTENCY_TTL_SECS {
                return Err(Error::InvalidInput(format!(
                    "TALLY_IDEMPOTENCY_TTL_SECS must be at most {MAX_IDEMPOTENCY_TTL_SECS} seconds"
                )));
            }
            config.idempotency_ttl_secs = secs;
        }
        if let Some(max_entries) = env_usize("TALLY_IDEMPOTENCY_MAX_ENTRIES")? {
            if max_entries == 0 {
                return Err(Error::InvalidInput(
                    "TALLY_IDEMPOTENCY_MAX_ENTRIES must be greater than 0".to_string(),
                ));
            }
            config.idempotency_max_entries = max_entries;
        }

        if let Some(path) = env_string("TALLY_CONFIG_STORE_PATH") {
            config.config_store_path = Some(PathBuf::from(path));
        }
        if let Some(user_id) = env_string("TALLY_DEFAULT_USER_ID") {
            config.default_user_id = user_id;
        }

        config.sheets.validate(config.debug)?;

        Ok(config)
    }

    /// Returns the idempotency TTL as a `chrono::Duration`.
    #[must_use]
    pub fn idempotency_ttl(&self) -> chrono::Duration {
        let secs = self.idempotency_ttl_secs.min(MAX_IDEMPOTENCY_TTL_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_u16(name: &str) -> Result<Option<u16>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u16>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<u64>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
}

fn env_usize(name: &str) -> Result<Option<usize>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    v.parse::<usize>()
        .map(Some)
        .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    let Some(v) = env_string(name) else {
        return Ok(None);
    };
    parse_bool(name, &v).map(Some)
}

fn parse_sheets_auth_mode(name: &str, value: &str) -> Result<SheetsAuthMode> {
    let mode = value.trim().to_ascii_lowercase();
    match mode.as_str() {
        "none" => Ok(SheetsAuthMode::None),
        "static_bearer" => Ok(SheetsAuthMode::StaticBearer),
        "gcp_metadata" => Ok(SheetsAuthMode::GcpMetadata),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be one of: none, static_bearer, gcp_metadata (got {value})"
        ))),
    }
}

fn parse_cors_allowed_origins(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed == "*" {
        return vec!["*".to_string()];
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.http_port, 8080);
        assert!(!config.debug);
        assert_eq!(config.idempotency_ttl_secs, 300);
        assert_eq!(config.sheets.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_parse_bool_values() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "no").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_parse_sheets_auth_mode() {
        assert_eq!(
            parse_sheets_auth_mode("X", "static_bearer").unwrap(),
            SheetsAuthMode::StaticBearer
        );
        assert_eq!(
            parse_sheets_auth_mode("X", "GCP_METADATA").unwrap(),
            SheetsAuthMode::GcpMetadata
        );
        assert!(parse_sheets_auth_mode("X", "service_account").is_err());
    }

    #[test]
    fn test_parse_cors_allowed_origins() {
        assert!(parse_cors_allowed_origins("").is_empty());
        assert_eq!(parse_cors_allowed_origins("*"), vec!["*"]);
        assert_eq!(
            parse_cors_allowed_origins("https://a.example, https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_static_bearer_requires_token() {
        let sheets = SheetsApiConfig {
            auth_mode: SheetsAuthMode::StaticBearer,
            ..SheetsApiConfig::default()
        };
        assert!(sheets.validate(true).is_err());

        let sheets = SheetsApiConfig {
            auth_mode: SheetsAuthMode::StaticBearer,
            static_bearer_token: Some("token".to_string()),
            ..SheetsApiConfig::default()
        };
        assert!(sheets.validate(true).is_ok());
    }

    #[test]
    fn test_metadata_url_requires_debug() {
        let sheets = SheetsApiConfig {
            auth_mode: SheetsAuthMode::GcpMetadata,
            metadata_url: Some("http://localhost:1".to_string()),
            ..SheetsApiConfig::default()
        };
        assert!(sheets.validate(true).is_ok());
        assert!(sheets.validate(false).is_err());
    }

    #[test]
    fn test_unauthenticated_sheets_requires_debug() {
        let sheets = SheetsApiConfig::default();
        assert!(sheets.validate(true).is_ok());
        assert!(sheets.validate(false).is_err());
    }

    #[test]
    fn test_debug_redacts_static_token() {
        let sheets = SheetsApiConfig {
            auth_mode: SheetsAuthMode::StaticBearer,
            static_bearer_token: Some("secret".to_string()),
            ..SheetsApiConfig::default()
        };
        let rendered = format!("{sheets:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
