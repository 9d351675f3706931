//! # tally-sheets
//!
//! Google Sheets integration for the Tally transaction recorder.
//!
//! Two layers:
//!
//! - [`client`] — the [`client::SheetsClient`] trait over the four external
//!   primitives Tally needs (read a range, append a row, list sheets, delete
//!   a row span), plus the reqwest-backed [`client::HttpSheetsClient`]
//!   implementation against the Google Sheets v4 REST API.
//! - [`engine`] — the [`engine::RowMutationEngine`], which turns logical
//!   operations (append, delete-one, delete-many, clone) into a safe
//!   sequence of client calls, preserving 1-based row semantics across
//!   multi-row deletions.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod engine;
pub mod error;

pub use client::{HttpSheetsClient, SheetInfo, SheetsAuth, SheetsClient};
pub use engine::{AppendOutcome, DeleteReport, RowMutationEngine};
pub use error::{Result, SheetsError};
