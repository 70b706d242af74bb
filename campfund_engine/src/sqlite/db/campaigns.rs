use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Campaign, CampaignStatus, Money, NewCampaign},
    traits::LedgerError,
};

pub async fn insert_campaign(campaign: NewCampaign, conn: &mut SqliteConnection) -> Result<Campaign, sqlx::Error> {
    let now = Utc::now();
    let campaign = sqlx::query_as(
        r#"
            INSERT INTO campaigns (
                owner_id,
                title,
                target_amount,
                status,
                start_date,
                end_date,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *;
        "#,
    )
    .bind(campaign.owner_id)
    .bind(campaign.title)
    .bind(campaign.target_amount)
    .bind(campaign.status)
    .bind(campaign.start_date)
    .bind(campaign.end_date)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(campaign)
}

pub async fn fetch_campaign(id: i64, conn: &mut SqliteConnection) -> Result<Option<Campaign>, sqlx::Error> {
    let campaign = sqlx::query_as("SELECT * FROM campaigns WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(campaign)
}

/// Adds exactly `amount` to the running total in a single statement, so concurrent credits never overwrite each other.
pub async fn increment_received(
    id: i64,
    amount: Money,
    donation_count_delta: i64,
    conn: &mut SqliteConnection,
) -> Result<Campaign, LedgerError> {
    trace!("🗃️ Crediting campaign {id} with {amount}");
    let campaign: Option<Campaign> = sqlx::query_as(
        r#"
            UPDATE campaigns SET
                received_amount = received_amount + $1,
                donation_count = donation_count + $2,
                updated_at = $3
            WHERE id = $4
            RETURNING *;
        "#,
    )
    .bind(amount)
    .bind(donation_count_delta)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    campaign.ok_or(LedgerError::CampaignNotFound(id))
}

pub async fn fetch_due_for_activation(
    now: DateTime<Utc>,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<Campaign>, sqlx::Error> {
    let campaigns = sqlx::query_as(
        "SELECT * FROM campaigns WHERE status = 'APPROVED' AND start_date <= $1 ORDER BY start_date, id LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(campaigns)
}

pub async fn fetch_due_for_completion(
    now: DateTime<Utc>,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<Campaign>, sqlx::Error> {
    let campaigns = sqlx::query_as(
        r#"
            SELECT * FROM campaigns
            WHERE status = 'ACTIVE' AND (end_date <= $1 OR received_amount >= target_amount)
            ORDER BY end_date, id
            LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(campaigns)
}

pub async fn fetch_due_for_expiration(
    now: DateTime<Utc>,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<Campaign>, sqlx::Error> {
    let campaigns = sqlx::query_as(
        r#"
            SELECT * FROM campaigns
            WHERE status IN ('PENDING', 'APPROVED') AND end_date <= $1
            ORDER BY end_date, id
            LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(campaigns)
}

/// Compare-and-swap on the status column. Returns `None` if the campaign was not in `from`.
pub async fn update_status(
    id: i64,
    from: CampaignStatus,
    to: CampaignStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Campaign>, sqlx::Error> {
    let campaign = sqlx::query_as(
        "UPDATE campaigns SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *",
    )
    .bind(to)
    .bind(Utc::now())
    .bind(id)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(campaign)
}

/// Touches an ACTIVE campaign row. Inside a transaction this takes the write lock before the row is read, so the
/// returned amounts cannot change until the transaction ends.
pub async fn lock_active(id: i64, conn: &mut SqliteConnection) -> Result<Option<Campaign>, sqlx::Error> {
    let campaign =
        sqlx::query_as("UPDATE campaigns SET updated_at = $1 WHERE id = $2 AND status = 'ACTIVE' RETURNING *")
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(conn)
            .await?;
    Ok(campaign)
}
