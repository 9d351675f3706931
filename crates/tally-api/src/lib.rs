//! # tally-api
//!
//! HTTP composition layer for the Tally transaction recorder.
//!
//! This crate provides the API surface for Tally, handling:
//!
//! - **Routing**: JSON endpoints for sheet configurations and row operations
//! - **Service Wiring**: Composition of the config store, the row mutation
//!   engine, and the idempotency cache
//! - **Observability**: Metrics, tracing, and health checks
//!
//! ## Design Principles
//!
//! This crate is a **thin composition layer** with no domain policy.
//! Row semantics live in `tally-sheets`; shared primitives in `tally-core`.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health                          - Health check
//! GET  /ready                           - Readiness check
//! GET  /metrics                         - Prometheus metrics
//! GET  /openapi.json                    - OpenAPI spec
//! POST /api/v1/configs                  - Register a sheet configuration
//! GET  /api/v1/configs                  - List configurations
//! GET  /api/v1/configs/{id}             - Get one configuration
//! GET  /api/v1/configs/{id}/rows        - Read all rows
//! POST /api/v1/configs/{id}/rows        - Append a transaction row
//! DELETE /api/v1/configs/{id}/rows/{n}  - Delete one row
//! DELETE /api/v1/configs/{id}/rows      - Delete a set of rows
//! POST /api/v1/configs/{id}/rows/{n}/clone - Clone a row
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod openapi;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::RequestContext;
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::server::Server;
}
