//! Direct ledger writes for operator-initiated movements.
//!
//! The reconciliation flow owns everything driven by processor events; this API is for the rest:
//! money added to a collective outside any processor, transfers between collectives on the same
//! host, operator-issued refunds and corrections.
use std::fmt::Debug;

use fiscus_common::{CurrencyCode, MinorUnits};
use log::*;

use crate::{
    db_types::{DoubleEntry, LedgerEntry, LedgerEntryKind, NewLedgerEntry, Provenance, RefundKind, TransactionGroup},
    traits::{LedgerDatabase, LedgerError, RefundOutcome},
};

pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B>
where B: LedgerDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Books funds arriving at a collective outside of any payment processor, e.g. a cheque the
    /// host deposited on the collective's behalf.
    pub async fn record_added_funds(
        &self,
        collective_id: i64,
        from_collective_id: i64,
        host_collective_id: i64,
        amount: MinorUnits,
        currency: CurrencyCode,
        note: &str,
        created_by: i64,
    ) -> Result<DoubleEntry, LedgerError> {
        let provenance = Provenance::Manual { note: note.to_string(), created_by };
        let entry = NewLedgerEntry::credit(
            LedgerEntryKind::AddedFunds,
            TransactionGroup::new(),
            collective_id,
            from_collective_id,
            host_collective_id,
            amount,
            currency,
            provenance,
        );
        let pair = self.db.create_double_entry(entry).await?;
        info!("📒️ Added funds: {amount} credited to collective {collective_id}");
        Ok(pair)
    }

    /// Moves balance between two collectives on the same host. The caller is responsible for
    /// checking the source balance first; the ledger itself does not forbid negative balances.
    pub async fn record_balance_transfer(
        &self,
        from_collective_id: i64,
        to_collective_id: i64,
        host_collective_id: i64,
        amount: MinorUnits,
        currency: CurrencyCode,
        note: &str,
        created_by: i64,
    ) -> Result<DoubleEntry, LedgerError> {
        let provenance = Provenance::Manual { note: note.to_string(), created_by };
        let mut entry = NewLedgerEntry::credit(
            LedgerEntryKind::BalanceTransfer,
            TransactionGroup::new(),
            to_collective_id,
            from_collective_id,
            host_collective_id,
            amount,
            currency,
            provenance,
        );
        entry.is_internal = true;
        let pair = self.db.create_double_entry(entry).await?;
        info!("📒️ Balance transfer: {amount} from collective {from_collective_id} to {to_collective_id}");
        Ok(pair)
    }

    /// Reverses a settled contribution at operator request. `refunded_processor_fee` is whatever
    /// portion of the processor fee the processor returned; any shortfall is covered by the host
    /// with a `PaymentProcessorCover` pair.
    pub async fn issue_refund(
        &self,
        original_id: i64,
        refunded_processor_fee: MinorUnits,
    ) -> Result<RefundOutcome, LedgerError> {
        let outcome = self.db.create_refund_pair(original_id, refunded_processor_fee, RefundKind::Refund, None).await?;
        info!("📒️ Refund issued against ledger entry {original_id}");
        Ok(outcome)
    }

    /// Soft-deletes every live row in a group. Only for rows that should never have existed;
    /// genuine reversals go through [`Self::issue_refund`].
    pub async fn void_group(&self, group: &TransactionGroup) -> Result<u64, LedgerError> {
        let n = self.db.soft_delete_group(group).await?;
        warn!("📒️ Voided {n} ledger rows in group {group}");
        Ok(n)
    }

    pub async fn entries_for_group(&self, group: &TransactionGroup) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db.entries_for_group(group).await
    }

    pub async fn balance(&self, collective_id: i64) -> Result<MinorUnits, LedgerError> {
        self.db.collective_balance(collective_id).await
    }
}
