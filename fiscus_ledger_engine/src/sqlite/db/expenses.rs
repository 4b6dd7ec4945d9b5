use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Expense, ExpenseStatus, NewExpense, PaymentProcessor},
    traits::ReconciliationError,
};

pub async fn insert_expense(expense: NewExpense, conn: &mut SqliteConnection) -> Result<Expense, ReconciliationError> {
    let expense = sqlx::query_as(
        r#"
            INSERT INTO expenses (collective_id, payee_collective_id, currency, amount, processor, payout_ref)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(expense.collective_id)
    .bind(expense.payee_collective_id)
    .bind(expense.currency)
    .bind(expense.amount)
    .bind(expense.processor)
    .bind(expense.payout_ref)
    .fetch_one(conn)
    .await?;
    Ok(expense)
}

pub async fn fetch_expense(id: i64, conn: &mut SqliteConnection) -> Result<Option<Expense>, ReconciliationError> {
    let expense = sqlx::query_as("SELECT * FROM expenses WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(expense)
}

pub async fn fetch_expense_by_payout_ref(
    processor: PaymentProcessor,
    payout_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Expense>, ReconciliationError> {
    let expense = sqlx::query_as(
        "SELECT * FROM expenses WHERE processor = $1 AND payout_ref = $2 AND deleted_at IS NULL ORDER BY id LIMIT 1",
    )
    .bind(processor)
    .bind(payout_ref)
    .fetch_optional(conn)
    .await?;
    Ok(expense)
}

pub async fn update_expense_status(
    id: i64,
    status: ExpenseStatus,
    conn: &mut SqliteConnection,
) -> Result<Expense, ReconciliationError> {
    let expense = sqlx::query_as(
        r#"UPDATE expenses
           SET status = $1,
               processed_at = CASE WHEN $1 = 'Paid' THEN CURRENT_TIMESTAMP ELSE processed_at END,
               updated_at = CURRENT_TIMESTAMP
           WHERE id = $2 RETURNING *"#,
    )
    .bind(status)
    .bind(id)
    .fetch_one(conn)
    .await?;
    debug!("🧾️ Expense #{id} moved to {status}");
    Ok(expense)
}
