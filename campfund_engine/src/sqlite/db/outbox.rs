use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewOutboxEvent, OutboxEvent, RetryDisposition},
    side_effects::SideEffect,
    traits::LedgerError,
};

/// Writes an outbox row. Call this on the same transaction as the ledger mutation that produced the side effect.
pub async fn insert_event(effect: &SideEffect, conn: &mut SqliteConnection) -> Result<OutboxEvent, LedgerError> {
    let NewOutboxEvent { event_type, payload } = effect.to_new_event()?;
    let now = Utc::now();
    let event: OutboxEvent = sqlx::query_as(
        r#"
            INSERT INTO outbox_events (event_type, payload, next_attempt_at, created_at, updated_at)
            VALUES ($1, $2, $3, $3, $3)
            RETURNING *;
        "#,
    )
    .bind(event_type)
    .bind(Json(payload))
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("📦️ Outbox event #{} ({}) written", event.id, event.event_type);
    Ok(event)
}

pub async fn fetch_event(id: i64, conn: &mut SqliteConnection) -> Result<Option<OutboxEvent>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM outbox_events WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(event)
}

pub async fn fetch_events(conn: &mut SqliteConnection) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM outbox_events ORDER BY id").fetch_all(conn).await?;
    Ok(events)
}

pub async fn fetch_pending(
    limit: u32,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let events = sqlx::query_as(
        r#"
            SELECT * FROM outbox_events
            WHERE status = 'PENDING' AND next_attempt_at <= $1
            ORDER BY created_at, id
            LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(events)
}

pub async fn claim(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE outbox_events SET status = 'PROCESSING', claimed_at = $1, updated_at = $1 WHERE id = $2 AND status = \
         'PENDING'",
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn complete(id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE outbox_events SET status = 'COMPLETED', claimed_at = NULL, updated_at = $1 WHERE id = $2 AND status = \
         'PROCESSING'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fail(
    id: i64,
    error: &str,
    disposition: RetryDisposition,
    conn: &mut SqliteConnection,
) -> Result<Option<OutboxEvent>, sqlx::Error> {
    let now = Utc::now();
    let (status, next_attempt_at) = match disposition {
        RetryDisposition::RetryAt(at) => ("PENDING", at),
        RetryDisposition::DeadLetter => ("FAILED", now),
    };
    let event = sqlx::query_as(
        r#"
            UPDATE outbox_events SET
                status = $1,
                retry_count = retry_count + 1,
                last_error = $2,
                next_attempt_at = $3,
                claimed_at = NULL,
                updated_at = $4
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(error)
    .bind(next_attempt_at)
    .bind(now)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(event)
}

pub async fn release_stale_claims(claimed_before: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE outbox_events SET status = 'PENDING', claimed_at = NULL, updated_at = $1
            WHERE status = 'PROCESSING' AND claimed_at < $2
        "#,
    )
    .bind(Utc::now())
    .bind(claimed_before)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn requeue_failed(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
            UPDATE outbox_events SET status = 'PENDING', retry_count = 0, next_attempt_at = $1, updated_at = $1
            WHERE status = 'FAILED'
        "#,
    )
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
