use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{Donation, NewDonation};

pub async fn insert_donation(donation: &NewDonation, conn: &mut SqliteConnection) -> Result<Donation, sqlx::Error> {
    let donation = sqlx::query_as(
        r#"
            INSERT INTO donations (
                campaign_id,
                donor_id,
                donor_email,
                amount,
                is_anonymous,
                message,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(donation.campaign_id)
    .bind(&donation.donor_id)
    .bind(&donation.donor_email)
    .bind(donation.amount)
    .bind(donation.is_anonymous)
    .bind(&donation.message)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(donation)
}

pub async fn fetch_donation(id: i64, conn: &mut SqliteConnection) -> Result<Option<Donation>, sqlx::Error> {
    let donation = sqlx::query_as("SELECT * FROM donations WHERE id = ?").bind(id).fetch_optional(conn).await?;
    Ok(donation)
}
