//! SQL behind the consistency checker.
//!
//! Every scan counts violations among **live** rows only; soft-deleted history is someone else's
//! problem. Fixes are single conditional UPDATEs whose WHERE clause stops matching once applied,
//! which is what makes a second run a no-op even when it races the first.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::traits::{CheckError, CheckStats};

const PRIMARY_KINDS: &str = "('Contribution','Expense','AddedFunds','BalanceTransfer','PrepaidPaymentMethod')";
const SECONDARY_KINDS: &str = "('HostFee','PlatformTip','PaymentProcessorFee')";

pub async fn entries_for_deleted_collectives(conn: &mut SqliteConnection) -> Result<CheckStats, CheckError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM ledger l
           JOIN collectives c ON c.id = l.collective_id
           WHERE l.deleted_at IS NULL AND c.deleted_at IS NOT NULL"#,
    )
    .fetch_one(conn)
    .await?;
    Ok(CheckStats::found(count as u64))
}

pub async fn duplicate_primary_in_group(conn: &mut SqliteConnection) -> Result<CheckStats, CheckError> {
    let q = format!(
        r#"SELECT COUNT(*) FROM (
               SELECT transaction_group FROM ledger
               WHERE deleted_at IS NULL AND kind IN {PRIMARY_KINDS}
               GROUP BY transaction_group, kind
               HAVING COUNT(*) > 2
           )"#
    );
    let count: i64 = sqlx::query_scalar(&q).fetch_one(conn).await?;
    Ok(CheckStats::found(count as u64))
}

pub async fn orphaned_secondary_entries(
    cutover: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<CheckStats, CheckError> {
    let q = format!(
        r#"SELECT COUNT(*) FROM ledger s
           WHERE s.deleted_at IS NULL
             AND s.kind IN {SECONDARY_KINDS}
             AND s.created_at >= $1
             AND NOT EXISTS (
                 SELECT 1 FROM ledger p
                 WHERE p.transaction_group = s.transaction_group
                   AND p.deleted_at IS NULL
                   AND p.kind IN {PRIMARY_KINDS}
             )"#
    );
    let count: i64 = sqlx::query_scalar(&q).bind(cutover).fetch_one(conn).await?;
    Ok(CheckStats::found(count as u64))
}

pub async fn duplicate_entry_uuid(conn: &mut SqliteConnection) -> Result<CheckStats, CheckError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM (
               SELECT uuid FROM ledger WHERE deleted_at IS NULL GROUP BY uuid HAVING COUNT(*) > 1
           )"#,
    )
    .fetch_one(conn)
    .await?;
    Ok(CheckStats::found(count as u64))
}

pub async fn duplicate_one_time_contribution(conn: &mut SqliteConnection) -> Result<CheckStats, CheckError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM (
               SELECT l.order_id FROM ledger l
               JOIN orders o ON o.id = l.order_id
               WHERE l.deleted_at IS NULL
                 AND l.kind = 'Contribution' AND l.entry_type = 'Credit' AND l.is_refund = 0
                 AND o.subscription_id IS NULL
               GROUP BY l.order_id
               HAVING COUNT(*) > 1
           )"#,
    )
    .fetch_one(conn)
    .await?;
    Ok(CheckStats::found(count as u64))
}

pub async fn paid_order_missing_processed_at(fix: bool, conn: &mut SqliteConnection) -> Result<CheckStats, CheckError> {
    const WHERE: &str = "status IN ('Paid','Active') AND processed_at IS NULL AND deleted_at IS NULL";
    let count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {WHERE}")).fetch_one(&mut *conn).await?;
    let mut stats = CheckStats::found(count as u64);
    if fix && count > 0 {
        let result = sqlx::query(&format!("UPDATE orders SET processed_at = updated_at WHERE {WHERE}"))
            .execute(conn)
            .await?;
        stats.fixed = result.rows_affected();
    }
    Ok(stats)
}

pub async fn paid_order_with_only_deleted_entries(
    fix: bool,
    conn: &mut SqliteConnection,
) -> Result<CheckStats, CheckError> {
    const WHERE: &str = r#"status IN ('Paid','Active') AND deleted_at IS NULL
             AND EXISTS (SELECT 1 FROM ledger l WHERE l.order_id = orders.id)
             AND NOT EXISTS (SELECT 1 FROM ledger l WHERE l.order_id = orders.id AND l.deleted_at IS NULL)"#;
    let count: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {WHERE}")).fetch_one(&mut *conn).await?;
    let mut stats = CheckStats::found(count as u64);
    if fix && count > 0 {
        let result = sqlx::query(&format!("UPDATE orders SET deleted_at = CURRENT_TIMESTAMP WHERE {WHERE}"))
            .execute(conn)
            .await?;
        stats.fixed = result.rows_affected();
    }
    Ok(stats)
}

pub async fn payment_method_currency_mismatch(
    fix: bool,
    conn: &mut SqliteConnection,
) -> Result<CheckStats, CheckError> {
    let count: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM payment_methods pm
           JOIN collectives c ON c.id = pm.collective_id
           JOIN collectives h ON h.id = c.host_collective_id
           WHERE pm.currency != h.currency"#,
    )
    .fetch_one(&mut *conn)
    .await?;
    let mut stats = CheckStats::found(count as u64);
    if fix && count > 0 {
        let result = sqlx::query(
            r#"UPDATE payment_methods SET
                   currency = (
                       SELECT h.currency FROM collectives c
                       JOIN collectives h ON h.id = c.host_collective_id
                       WHERE c.id = payment_methods.collective_id
                   ),
                   updated_at = CURRENT_TIMESTAMP
               WHERE EXISTS (
                   SELECT 1 FROM collectives c
                   JOIN collectives h ON h.id = c.host_collective_id
                   WHERE c.id = payment_methods.collective_id AND h.currency != payment_methods.currency
               )"#,
        )
        .execute(conn)
        .await?;
        stats.fixed = result.rows_affected();
    }
    Ok(stats)
}
