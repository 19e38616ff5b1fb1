//! # tally-store
//!
//! SQLite persistence for projects and activities. [`Storage`] is the
//! contract the RPC layer talks to; [`SqliteStorage`] implements it and
//! keeps at most one activity running.

pub mod activities;
pub mod database;
pub mod error;
pub mod projects;
pub mod row_helpers;
pub mod schema;
pub mod storage;

pub use database::Database;
pub use error::StoreError;
pub use storage::{SqliteStorage, StartOutcome, StopOutcome, Storage};
