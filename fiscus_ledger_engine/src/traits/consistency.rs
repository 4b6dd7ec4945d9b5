use chrono::{DateTime, Utc};
use thiserror::Error;

/// Secondary rows older than this are tolerated without a primary sibling; the early ledger
/// predates the grouping rule and is excluded from the orphan scan rather than "fixed".
pub const SECONDARY_ENTRY_CUTOVER: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Clone, Error)]
pub enum CheckError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CheckError {
    fn from(e: sqlx::Error) -> Self {
        CheckError::DatabaseError(e.to_string())
    }
}

/// What one check found and did. `fixed <= violations`; a check without an auto-fix always
/// reports `fixed == 0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckStats {
    pub violations: u64,
    pub fixed: u64,
}

impl CheckStats {
    pub fn found(violations: u64) -> Self {
        Self { violations, fixed: 0 }
    }

    /// Violations still standing after any fixes.
    pub fn remaining(&self) -> u64 {
        self.violations.saturating_sub(self.fixed)
    }
}

//--------------------------------------  ConsistencyChecks  ---------------------------------------------------------
/// The batch invariant scans. Every check is independent and idempotent: running one twice in a
/// row performs zero additional writes the second time, because every fix carries a conditional
/// `WHERE` that no longer matches once applied. Checks open their own short transactions and must
/// never run inside a live reconciliation scope.
#[allow(async_fn_in_trait)]
pub trait ConsistencyChecks: Clone {
    /// Live ledger rows whose collective has been soft-deleted. No safe auto-fix.
    async fn check_entries_for_deleted_collectives(&self) -> Result<CheckStats, CheckError>;

    /// Transaction groups with more than two live rows of one primary kind. No safe auto-fix.
    async fn check_duplicate_primary_in_group(&self) -> Result<CheckStats, CheckError>;

    /// Post-cutover secondary rows (fees, tips) with no live primary sibling in their group.
    /// Processor-cover and dispute-fee rows are exempt. No safe auto-fix.
    async fn check_orphaned_secondary_entries(&self, cutover: DateTime<Utc>) -> Result<CheckStats, CheckError>;

    /// Entry uuids shared by more than one live row. No safe auto-fix.
    async fn check_duplicate_entry_uuid(&self) -> Result<CheckStats, CheckError>;

    /// More than one live, non-refund Credit Contribution for a subscription-less order.
    /// No safe auto-fix.
    async fn check_duplicate_one_time_contribution(&self) -> Result<CheckStats, CheckError>;

    /// Paid/Active orders with a null `processed_at`. Fix: backfill from `updated_at`.
    async fn check_paid_order_missing_processed_at(&self, fix: bool) -> Result<CheckStats, CheckError>;

    /// Paid/Active orders whose every ledger row is soft-deleted. Fix: soft-delete the order.
    async fn check_paid_order_with_only_deleted_entries(&self, fix: bool) -> Result<CheckStats, CheckError>;

    /// Collective-owned payment methods whose currency differs from the host's. Fix: adopt the
    /// host currency.
    async fn check_payment_method_currency_mismatch(&self, fix: bool) -> Result<CheckStats, CheckError>;
}
