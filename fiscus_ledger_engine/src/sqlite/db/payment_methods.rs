use sqlx::SqliteConnection;

use crate::{
    db_types::PaymentMethod,
    traits::{NewPaymentMethod, ReconciliationError},
};

/// Upsert on (processor, processor_ref). Concurrent webhooks for the same order race to create
/// this record; the conflict clause makes the loser a harmless touch instead of an error.
pub async fn upsert_payment_method(
    method: NewPaymentMethod,
    conn: &mut SqliteConnection,
) -> Result<PaymentMethod, ReconciliationError> {
    let method = sqlx::query_as(
        r#"
            INSERT INTO payment_methods (processor, processor_ref, collective_id, currency, saved)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (processor, processor_ref)
            DO UPDATE SET saved = excluded.saved, updated_at = CURRENT_TIMESTAMP
            RETURNING *;
        "#,
    )
    .bind(method.processor)
    .bind(method.processor_ref)
    .bind(method.collective_id)
    .bind(method.currency)
    .bind(method.saved)
    .fetch_one(conn)
    .await?;
    Ok(method)
}

pub async fn fetch_payment_method(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentMethod>, ReconciliationError> {
    let method = sqlx::query_as("SELECT * FROM payment_methods WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(method)
}
