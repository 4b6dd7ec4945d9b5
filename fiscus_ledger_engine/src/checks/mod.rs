//! The consistency check runner.
//!
//! Wraps the backend's [`ConsistencyChecks`] scans in a named, timed batch run for the operator
//! CLI. Checks run sequentially; a database error aborts the batch, a check that merely finds
//! violations does not.
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::*;

use crate::traits::{CheckError, CheckStats, ConsistencyChecks, SECONDARY_ENTRY_CUTOVER};

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub stats: CheckStats,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn total_violations(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.violations).sum()
    }

    pub fn total_fixed(&self) -> u64 {
        self.outcomes.iter().map(|o| o.stats.fixed).sum()
    }

    /// True when nothing is left standing after fixes.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.stats.remaining() == 0)
    }
}

fn cutover() -> DateTime<Utc> {
    // The constant is compile-time vetted by the test below.
    SECONDARY_ENTRY_CUTOVER.parse().unwrap_or_else(|_| Utc::now())
}

/// Runs every check in sequence. With `fix` set, the checks that have a safe auto-fix apply it;
/// the fixes are conditional updates, so a second run always reports zero additional fixes.
pub async fn run_all_checks<B: ConsistencyChecks>(db: &B, fix: bool) -> Result<CheckReport, CheckError> {
    let mut report = CheckReport::default();
    run_check(&mut report, "entries_for_deleted_collectives", db.check_entries_for_deleted_collectives()).await?;
    run_check(&mut report, "duplicate_primary_in_group", db.check_duplicate_primary_in_group()).await?;
    run_check(&mut report, "orphaned_secondary_entries", db.check_orphaned_secondary_entries(cutover())).await?;
    run_check(&mut report, "duplicate_entry_uuid", db.check_duplicate_entry_uuid()).await?;
    run_check(&mut report, "duplicate_one_time_contribution", db.check_duplicate_one_time_contribution()).await?;
    run_check(&mut report, "paid_order_missing_processed_at", db.check_paid_order_missing_processed_at(fix)).await?;
    run_check(&mut report, "paid_order_with_only_deleted_entries", db.check_paid_order_with_only_deleted_entries(fix))
        .await?;
    run_check(&mut report, "payment_method_currency_mismatch", db.check_payment_method_currency_mismatch(fix)).await?;
    info!(
        "🔎️ Check run complete: {} violations, {} fixed, across {} checks",
        report.total_violations(),
        report.total_fixed(),
        report.outcomes.len()
    );
    Ok(report)
}

async fn run_check(
    report: &mut CheckReport,
    name: &'static str,
    fut: impl std::future::Future<Output = Result<CheckStats, CheckError>>,
) -> Result<(), CheckError> {
    let started = Instant::now();
    let stats = fut.await?;
    let elapsed_ms = started.elapsed().as_millis();
    if stats.violations == 0 {
        debug!("🔎️ {name}: ok ({elapsed_ms} ms)");
    } else {
        warn!(
            "🔎️ {name}: {} violations, {} fixed, {} remaining ({elapsed_ms} ms)",
            stats.violations,
            stats.fixed,
            stats.remaining()
        );
    }
    report.outcomes.push(CheckOutcome { name, stats, elapsed_ms });
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cutover_constant_parses() {
        let ts: DateTime<Utc> = SECONDARY_ENTRY_CUTOVER.parse().unwrap();
        assert_eq!(ts.timestamp(), 1_704_067_200);
    }

    #[test]
    fn report_totals() {
        let report = CheckReport {
            outcomes: vec![
                CheckOutcome { name: "a", stats: CheckStats { violations: 3, fixed: 3 }, elapsed_ms: 1 },
                CheckOutcome { name: "b", stats: CheckStats::found(2), elapsed_ms: 1 },
            ],
        };
        assert_eq!(report.total_violations(), 5);
        assert_eq!(report.total_fixed(), 3);
        assert!(!report.is_clean());
    }
}
