//! HTTP route handlers.

pub mod configs;
pub mod rows;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// `/api/v1` routes.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new().merge(configs::routes()).merge(rows::routes())
}
