//! # SQLite Database methods
//!
//! This module contains the "low-level" SQLite statements behind the ledger.
//!
//! Every statement is a free function that accepts a `&mut SqliteConnection`. Callers either pass a pooled connection,
//! or open a transaction and pass `&mut tx` to compose several statements into one atomic unit.
//!
//! All timestamps are bound from Rust rather than taken from `CURRENT_TIMESTAMP`, so that every stored timestamp has
//! the same text format and compares correctly.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod campaigns;
pub mod donations;
pub mod holding;
pub mod outbox;
pub mod transactions;

const SQLITE_DB_URL: &str = "sqlite://data/campfund.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn db_url() -> String {
    let result = env::var("CFS_DATABASE_URL").unwrap_or_else(|_| {
        info!("CFS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

/// Concurrent webhook deliveries are normal, so the pool runs in WAL mode and waits on a locked database instead of
/// failing immediately.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
