//! Money that arrived but does not belong to a donation: uncorrelated inbound transfers and outbound withdrawals.
use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{HoldingCredit, HoldingEntry, NewWithdrawal, Withdrawal},
    sqlite::db::transactions::unique_ref_violation,
    traits::LedgerError,
};

pub async fn insert_holding_entry(
    credit: &HoldingCredit,
    conn: &mut SqliteConnection,
) -> Result<HoldingEntry, LedgerError> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO holding_ledger (external_ref, gateway, amount, content, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&credit.external_ref)
    .bind(credit.gateway)
    .bind(credit.amount)
    .bind(&credit.content)
    .bind(credit.reason)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(|e| unique_ref_violation(e, &credit.external_ref))?;
    Ok(entry)
}

pub async fn fetch_holding_entries(conn: &mut SqliteConnection) -> Result<Vec<HoldingEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM holding_ledger ORDER BY id").fetch_all(conn).await?;
    Ok(entries)
}

pub async fn insert_withdrawal(
    withdrawal: &NewWithdrawal,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, LedgerError> {
    let withdrawal = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (external_ref, gateway, amount, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(&withdrawal.external_ref)
    .bind(withdrawal.gateway)
    .bind(withdrawal.amount)
    .bind(&withdrawal.content)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
    .map_err(|e| unique_ref_violation(e, &withdrawal.external_ref))?;
    Ok(withdrawal)
}

pub async fn fetch_withdrawals(conn: &mut SqliteConnection) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let withdrawals = sqlx::query_as("SELECT * FROM withdrawals ORDER BY id").fetch_all(conn).await?;
    Ok(withdrawals)
}
