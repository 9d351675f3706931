//! # tally-core
//!
//! Core primitives for the Tally transaction recorder.
//!
//! This crate provides the foundational types used across all Tally components:
//!
//! - **Idempotency Cache**: In-memory deduplication of retried writes
//! - **Table References**: Spreadsheet/sheet/column-span addressing
//! - **Sheet Configurations**: Persisted records describing target spreadsheets
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and span constructors
//!
//! ## Crate Boundary
//!
//! `tally-core` holds no HTTP or Google Sheets wire knowledge. The Sheets
//! client and row mutation engine live in `tally-sheets`; the HTTP surface
//! lives in `tally-api`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config_store;
pub mod error;
pub mod idempotency;
pub mod observability;
pub mod sheet_config;
pub mod table;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config_store::{ConfigStore, JsonFileStore, MemoryConfigStore};
    pub use crate::error::{Error, Result};
    pub use crate::idempotency::{Begin, IdempotencyCache, Ticket};
    pub use crate::sheet_config::SheetConfig;
    pub use crate::table::{ColumnSpan, RowIndex, TableRef};
}

pub use config_store::{ConfigStore, JsonFileStore, MemoryConfigStore};
pub use error::{Error, Result};
pub use idempotency::{Begin, IdempotencyCache, Ticket};
pub use observability::{init_logging, LogFormat};
pub use sheet_config::SheetConfig;
pub use table::{ColumnSpan, RowIndex, TableRef};
