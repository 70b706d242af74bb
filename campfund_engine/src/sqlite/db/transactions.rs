use chrono::Utc;
use log::trace;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{
        Gateway,
        Money,
        OrderCode,
        PaymentCompleteness,
        PaymentTransaction,
        PrimaryCredit,
        SupplementaryCredit,
    },
    traits::LedgerError,
};

pub async fn fetch_transaction(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM payment_transactions WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

pub async fn fetch_transaction_by_order_code(
    order_code: &OrderCode,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM payment_transactions WHERE order_code = ?")
        .bind(order_code.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

pub async fn fetch_transactions_for_donation(
    donation_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    let txs = sqlx::query_as(
        "SELECT * FROM payment_transactions WHERE donation_id = ? ORDER BY parent_id IS NOT NULL, id",
    )
    .bind(donation_id)
    .fetch_all(conn)
    .await?;
    Ok(txs)
}

/// Inserts the primary (order-code carrying) transaction for a new donation. This is not atomic. Embed the call in a
/// transaction along with the donation insert.
pub async fn insert_primary(
    donation_id: i64,
    order_code: &OrderCode,
    requested: Money,
    gateway: Gateway,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, LedgerError> {
    let now = Utc::now();
    let tx = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (
                donation_id,
                order_code,
                requested_amount,
                gateway,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(donation_id)
    .bind(order_code.as_str())
    .bind(requested)
    .bind(gateway)
    .bind(now)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::DuplicateOrderCode(order_code.clone()),
        _ => LedgerError::from(e),
    })?;
    Ok(tx)
}

/// The single-writer latch. Applies the credit only if no webhook has processed the transaction yet, returning `None`
/// if the latch was already closed.
pub async fn credit_primary(
    credit: &PrimaryCredit,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, LedgerError> {
    let tx = sqlx::query_as(
        r#"
            UPDATE payment_transactions SET
                status = 'SUCCESS',
                received_amount = $1,
                completeness = $2,
                gateway = $3,
                external_ref = $4,
                metadata = $5,
                processed_by_webhook = TRUE,
                updated_at = $6
            WHERE id = $7 AND processed_by_webhook = FALSE
            RETURNING *;
        "#,
    )
    .bind(credit.amount)
    .bind(credit.completeness)
    .bind(credit.gateway)
    .bind(&credit.external_ref)
    .bind(Json(credit.metadata.clone()))
    .bind(Utc::now())
    .bind(credit.transaction_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| unique_ref_violation(e, &credit.external_ref))?;
    Ok(tx)
}

/// Inserts a supplementary row for funds that arrived after the primary transaction was processed. The row inherits the
/// donation of its parent. Its completeness is provisional until [`set_completeness`] is called with the cumulative
/// result.
pub async fn insert_supplementary(
    credit: &SupplementaryCredit,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, LedgerError> {
    let now = Utc::now();
    let tx: Option<PaymentTransaction> = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (
                donation_id,
                parent_id,
                requested_amount,
                received_amount,
                status,
                completeness,
                gateway,
                processed_by_webhook,
                external_ref,
                metadata,
                created_at,
                updated_at
            )
            SELECT donation_id, id, $1, $1, 'SUCCESS', 'PENDING', $2, TRUE, $3, $4, $5, $5
            FROM payment_transactions WHERE id = $6
            RETURNING *;
        "#,
    )
    .bind(credit.amount)
    .bind(credit.gateway)
    .bind(&credit.external_ref)
    .bind(Json(credit.metadata.clone()))
    .bind(now)
    .bind(credit.parent_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| unique_ref_violation(e, &credit.external_ref))?;
    tx.ok_or(LedgerError::TransactionNotFound(credit.parent_id))
}

/// The sum of everything successfully credited against the donation, across the primary and all supplementary rows.
pub async fn total_credited_for_donation(donation_id: i64, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(received_amount), 0) FROM payment_transactions WHERE donation_id = ? AND status = 'SUCCESS'",
    )
    .bind(donation_id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(total))
}

pub async fn set_completeness(
    id: i64,
    completeness: PaymentCompleteness,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, LedgerError> {
    let tx: Option<PaymentTransaction> =
        sqlx::query_as("UPDATE payment_transactions SET completeness = $1 WHERE id = $2 RETURNING *")
            .bind(completeness)
            .bind(id)
            .fetch_optional(conn)
            .await?;
    tx.ok_or(LedgerError::TransactionNotFound(id))
}

pub async fn mark_failed(
    id: i64,
    error_code: &str,
    error_description: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, sqlx::Error> {
    trace!("🗃️ Marking transaction {id} as failed ({error_code})");
    let tx = sqlx::query_as(
        r#"
            UPDATE payment_transactions SET
                status = 'FAILED',
                error_code = $1,
                error_description = $2,
                updated_at = $3
            WHERE id = $4 AND processed_by_webhook = FALSE AND status = 'PENDING'
            RETURNING *;
        "#,
    )
    .bind(error_code)
    .bind(error_description)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

pub(crate) fn unique_ref_violation(e: sqlx::Error, external_ref: &str) -> LedgerError {
    match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            LedgerError::DuplicateExternalRef(external_ref.to_string())
        },
        _ => LedgerError::from(e),
    }
}
