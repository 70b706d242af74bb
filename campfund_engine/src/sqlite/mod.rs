//! SQLite backend for the Campfund ledger.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
