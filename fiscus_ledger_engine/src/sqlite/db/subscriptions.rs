use sqlx::SqliteConnection;

use crate::{db_types::Subscription, traits::ReconciliationError};

pub async fn insert_subscription(
    interval: &str,
    conn: &mut SqliteConnection,
) -> Result<Subscription, ReconciliationError> {
    let sub = sqlx::query_as("INSERT INTO subscriptions (interval) VALUES ($1) RETURNING *")
        .bind(interval)
        .fetch_one(conn)
        .await?;
    Ok(sub)
}

pub async fn fetch_subscription(id: i64, conn: &mut SqliteConnection) -> Result<Option<Subscription>, ReconciliationError> {
    let sub = sqlx::query_as("SELECT * FROM subscriptions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(sub)
}

/// Suspend or reactivate. Conditional on the current state so replays write nothing.
pub async fn set_subscription_active(
    id: i64,
    active: bool,
    conn: &mut SqliteConnection,
) -> Result<bool, ReconciliationError> {
    let result = sqlx::query(
        r#"UPDATE subscriptions
           SET is_active = $1,
               deactivated_at = CASE WHEN $1 THEN NULL ELSE CURRENT_TIMESTAMP END,
               updated_at = CURRENT_TIMESTAMP
           WHERE id = $2 AND is_active != $1"#,
    )
    .bind(active)
    .bind(id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_last_charged(id: i64, conn: &mut SqliteConnection) -> Result<(), ReconciliationError> {
    sqlx::query("UPDATE subscriptions SET last_charged_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP WHERE id = $1")
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
