use chrono::Utc;
use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{IntentSnapshot, NewOrder, Order, OrderStatus, PaymentIntentStatus, PaymentProcessor},
    traits::ReconciliationError,
};

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, ReconciliationError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                collective_id, from_collective_id, created_by_user_id, subscription_id,
                currency, total_amount, platform_tip_amount, tax_amount, processor
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order.collective_id)
    .bind(order.from_collective_id)
    .bind(order.created_by_user_id)
    .bind(order.subscription_id)
    .bind(order.currency)
    .bind(order.total_amount)
    .bind(order.platform_tip_amount)
    .bind(order.tax_amount)
    .bind(order.processor)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, ReconciliationError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Matches a processor object id against the current intent, the legacy charge id, or any
/// superseded intent in the history. An order may cycle through several intents after failures;
/// the processor can still emit events keyed on the old ones.
pub async fn fetch_order_by_processor_object(
    processor: PaymentProcessor,
    object_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, ReconciliationError> {
    let order = sqlx::query_as(
        r#"SELECT * FROM orders
           WHERE processor = $1
             AND (payment_intent_id = $2 OR charge_id = $2 OR intent_history LIKE '%"' || $2 || '"%')
             AND deleted_at IS NULL
           ORDER BY id LIMIT 1"#,
    )
    .bind(processor)
    .bind(object_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn update_order_status(
    id: i64,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconciliationError> {
    let order = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(id)
    .fetch_one(conn)
    .await?;
    debug!("🧾️ Order #{id} moved to {status}");
    Ok(order)
}

/// Stores the current intent id and status on the order. A different in-flight intent gets
/// snapshotted into the history first, so later events keyed on it still resolve.
pub async fn record_intent(
    order: &Order,
    intent_id: &str,
    status: PaymentIntentStatus,
    processor: Option<PaymentProcessor>,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconciliationError> {
    let mut history = order.intent_history.0.clone();
    if let (Some(current), Some(current_status)) = (&order.payment_intent_id, order.payment_intent_status) {
        if current != intent_id {
            history.push(IntentSnapshot { intent_id: current.clone(), status: current_status, recorded_at: Utc::now() });
        }
    }
    let order = sqlx::query_as(
        r#"UPDATE orders
           SET payment_intent_id = $1, payment_intent_status = $2, intent_history = $3,
               processor = COALESCE($4, processor), updated_at = CURRENT_TIMESTAMP
           WHERE id = $5 RETURNING *"#,
    )
    .bind(intent_id)
    .bind(status)
    .bind(Json(history))
    .bind(processor)
    .bind(order.id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Settles the order: final status, the charge that paid it, and `processed_at`.
pub async fn mark_settled(
    id: i64,
    status: OrderStatus,
    charge_id: &str,
    payment_method_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Order, ReconciliationError> {
    let order = sqlx::query_as(
        r#"UPDATE orders
           SET status = $1, charge_id = $2, payment_intent_status = 'Succeeded',
               payment_method_id = COALESCE($3, payment_method_id),
               processed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
           WHERE id = $4 RETURNING *"#,
    )
    .bind(status)
    .bind(charge_id)
    .bind(payment_method_id)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn set_payment_method(
    order_id: i64,
    payment_method_id: i64,
    conn: &mut SqliteConnection,
) -> Result<(), ReconciliationError> {
    sqlx::query("UPDATE orders SET payment_method_id = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(payment_method_id)
        .bind(order_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Number of live orders by this user currently sitting in Disputed status. Drives the decision
/// to lift a fraud restriction.
pub async fn count_disputed_orders_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, ReconciliationError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE created_by_user_id = $1 AND status = 'Disputed' AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}
