use fiscus_common::MinorUnits;
use log::debug;
use sqlx::{types::Json, SqliteConnection};
use uuid::Uuid;

use crate::{
    db_types::{
        DoubleEntry,
        EntryType,
        LedgerEntry,
        NewLedgerEntry,
        PaymentProcessor,
        Provenance,
        RefundKind,
        TransactionGroup,
    },
    traits::{InvalidEntry, LedgerError, RefundOutcome, NET_AMOUNT_TOLERANCE},
};

/// Recomputes the net amount a leg must carry. Fee and tax columns hold the same non-positive
/// values on both legs, so the Credit leg adds them to the host-currency principal and the Debit
/// leg subtracts them, keeping the two nets exact mirrors. Both validation and refund derivation
/// go through here so the two can never disagree.
pub fn expected_net(
    entry_type: EntryType,
    amount_in_host_currency: MinorUnits,
    platform_fee: MinorUnits,
    host_fee: MinorUnits,
    processor_fee: MinorUnits,
    tax: MinorUnits,
    fx_rate: f64,
) -> Result<MinorUnits, InvalidEntry> {
    let fees = platform_fee + host_fee + processor_fee;
    let net_in_host = match entry_type {
        EntryType::Credit => amount_in_host_currency + fees,
        EntryType::Debit => amount_in_host_currency - fees,
    };
    let net = net_in_host.convert(1.0 / fx_rate).map_err(|_| InvalidEntry::BadFxRate(fx_rate))?;
    Ok(match entry_type {
        EntryType::Credit => net + tax,
        EntryType::Debit => net - tax,
    })
}

/// Payload validation for one leg. Fatal on failure; a payload that fails here can never be made
/// consistent by retrying.
pub fn validate(entry: &NewLedgerEntry) -> Result<(), InvalidEntry> {
    if !entry.host_currency_fx_rate.is_finite() {
        return Err(InvalidEntry::BadFxRate(entry.host_currency_fx_rate));
    }
    if entry.currency == entry.host_currency {
        if (entry.host_currency_fx_rate - 1.0).abs() > f64::EPSILON {
            return Err(InvalidEntry::FxRateMustBeUnity(entry.host_currency_fx_rate));
        }
        if entry.amount != entry.amount_in_host_currency {
            return Err(InvalidEntry::AmountMismatch {
                amount: entry.amount,
                amount_in_host_currency: entry.amount_in_host_currency,
            });
        }
    } else if entry.host_currency_fx_rate <= 0.0 {
        return Err(InvalidEntry::MissingFxRate {
            currency: entry.currency.to_string(),
            host_currency: entry.host_currency.to_string(),
        });
    }
    if entry.kind.is_primary() && entry.amount.is_zero() {
        return Err(InvalidEntry::ZeroAmount(entry.kind.to_string()));
    }
    if entry.order_id.is_some() && entry.expense_id.is_some() {
        return Err(InvalidEntry::ConflictingReference);
    }
    match entry.kind {
        crate::db_types::LedgerEntryKind::Contribution if entry.order_id.is_none() => {
            return Err(InvalidEntry::MissingReference(entry.kind.to_string()));
        },
        crate::db_types::LedgerEntryKind::Expense if entry.expense_id.is_none() => {
            return Err(InvalidEntry::MissingReference(entry.kind.to_string()));
        },
        _ => {},
    }
    // Fee sign discipline: every leg stores fees and tax as outflows (<= 0), Debit legs included.
    // Processors that report positive fees get normalized upstream; anything that reaches this
    // point with a positive fee is a bug.
    let fees = [
        ("platform_fee_in_host_currency", entry.platform_fee_in_host_currency),
        ("host_fee_in_host_currency", entry.host_fee_in_host_currency),
        ("payment_processor_fee_in_host_currency", entry.payment_processor_fee_in_host_currency),
        ("tax_amount", entry.tax_amount),
    ];
    for (field, value) in fees {
        if value.is_positive() {
            return Err(InvalidEntry::FeeSign { field, entry_type: entry.entry_type.to_string(), value });
        }
    }
    let expected = expected_net(
        entry.entry_type,
        entry.amount_in_host_currency,
        entry.platform_fee_in_host_currency,
        entry.host_fee_in_host_currency,
        entry.payment_processor_fee_in_host_currency,
        entry.tax_amount,
        entry.host_currency_fx_rate,
    )?;
    let drift = (expected - entry.net_amount_in_collective_currency).abs();
    if drift.value() > NET_AMOUNT_TOLERANCE {
        return Err(InvalidEntry::NetAmountDrift { expected, actual: entry.net_amount_in_collective_currency });
    }
    Ok(())
}

/// Inserts one validated leg. Unique-index violations on the (processor, charge_id) replay guard
/// surface as [`LedgerError::ChargeAlreadyRecorded`].
pub async fn insert_entry(entry: NewLedgerEntry, conn: &mut SqliteConnection) -> Result<LedgerEntry, LedgerError> {
    let uuid = Uuid::new_v4().to_string();
    let processor = entry.processor;
    let charge_id = entry.charge_id.clone();
    let row = sqlx::query_as(
        r#"
            INSERT INTO ledger (
                uuid, entry_type, kind, transaction_group,
                collective_id, from_collective_id, host_collective_id,
                order_id, expense_id,
                amount, currency, host_currency, host_currency_fx_rate,
                amount_in_host_currency, net_amount_in_collective_currency,
                platform_fee_in_host_currency, host_fee_in_host_currency,
                payment_processor_fee_in_host_currency, tax_amount,
                processor, charge_id,
                is_refund, refund_entry_id, is_internal, provenance
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                      $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING *;
        "#,
    )
    .bind(uuid)
    .bind(entry.entry_type)
    .bind(entry.kind)
    .bind(entry.transaction_group)
    .bind(entry.collective_id)
    .bind(entry.from_collective_id)
    .bind(entry.host_collective_id)
    .bind(entry.order_id)
    .bind(entry.expense_id)
    .bind(entry.amount)
    .bind(entry.currency)
    .bind(entry.host_currency)
    .bind(entry.host_currency_fx_rate)
    .bind(entry.amount_in_host_currency)
    .bind(entry.net_amount_in_collective_currency)
    .bind(entry.platform_fee_in_host_currency)
    .bind(entry.host_fee_in_host_currency)
    .bind(entry.payment_processor_fee_in_host_currency)
    .bind(entry.tax_amount)
    .bind(entry.processor)
    .bind(entry.charge_id)
    .bind(entry.is_refund)
    .bind(entry.refund_entry_id)
    .bind(entry.is_internal)
    .bind(Json(entry.provenance))
    .fetch_one(conn)
    .await
    .map_err(|e| match (&e, processor, charge_id) {
        (sqlx::Error::Database(err), Some(processor), Some(charge_id)) if err.is_unique_violation() => {
            LedgerError::ChargeAlreadyRecorded { processor, charge_id }
        },
        _ => LedgerError::from(e),
    })?;
    Ok(row)
}

/// Validates the Credit leg, derives its Debit mirror and writes both. Callers are responsible
/// for running this inside a transaction; both legs travel through the same connection.
pub async fn create_double_entry(
    entry: NewLedgerEntry,
    conn: &mut SqliteConnection,
) -> Result<DoubleEntry, LedgerError> {
    validate(&entry)?;
    let counterpart = entry.counterpart();
    let credit = insert_entry(entry, &mut *conn).await?;
    let debit = insert_entry(counterpart, &mut *conn).await?;
    debug!(
        "📒️ Double entry {} written for group {} ({} / {})",
        credit.kind, credit.transaction_group, credit.amount, debit.amount
    );
    Ok(DoubleEntry { credit, debit })
}

pub async fn create_single_entry(
    entry: NewLedgerEntry,
    conn: &mut SqliteConnection,
) -> Result<LedgerEntry, LedgerError> {
    validate(&entry)?;
    let row = insert_entry(entry, conn).await?;
    debug!("📒️ Single {} leg written for group {}", row.kind, row.transaction_group);
    Ok(row)
}

pub async fn fetch_entry(id: i64, conn: &mut SqliteConnection) -> Result<Option<LedgerEntry>, LedgerError> {
    let entry = sqlx::query_as("SELECT * FROM ledger WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(entry)
}

pub async fn entries_for_group(
    group: &TransactionGroup,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let entries = sqlx::query_as("SELECT * FROM ledger WHERE transaction_group = $1 ORDER BY id")
        .bind(group.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// The live primary pair recorded for an expense payout, if any. Used to make payout replays a
/// no-op that hands back the original legs.
pub async fn entries_for_expense(
    expense_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let entries = sqlx::query_as(
        "SELECT * FROM ledger WHERE expense_id = $1 AND kind = 'Expense' AND is_refund = 0 AND deleted_at IS NULL ORDER BY id",
    )
    .bind(expense_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

/// Fast-path replay probe. The partial unique index remains the authoritative guard; this query
/// only spares the engine a doomed insert on the common redelivery path.
pub async fn charge_recorded(
    processor: PaymentProcessor,
    charge_id: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, LedgerError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ledger WHERE processor = $1 AND charge_id = $2 AND is_refund = 0 AND deleted_at IS NULL",
    )
    .bind(processor)
    .bind(charge_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

pub async fn collective_balance(collective_id: i64, conn: &mut SqliteConnection) -> Result<MinorUnits, LedgerError> {
    let total: Option<i64> = sqlx::query_scalar(
        "SELECT SUM(net_amount_in_collective_currency) FROM ledger WHERE collective_id = $1 AND deleted_at IS NULL",
    )
    .bind(collective_id)
    .fetch_one(conn)
    .await?;
    Ok(MinorUnits::from(total.unwrap_or(0)))
}

/// Soft-deletes every live row of the group in one statement, so the two legs of a pair can
/// never part ways.
pub async fn soft_delete_group(group: &TransactionGroup, conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    let result =
        sqlx::query("UPDATE ledger SET deleted_at = CURRENT_TIMESTAMP WHERE transaction_group = $1 AND deleted_at IS NULL")
            .bind(group.as_str())
            .execute(conn)
            .await?;
    Ok(result.rows_affected())
}

pub async fn set_group_disputed(
    group: &TransactionGroup,
    disputed: bool,
    conn: &mut SqliteConnection,
) -> Result<u64, LedgerError> {
    let result = sqlx::query("UPDATE ledger SET is_disputed = $1 WHERE transaction_group = $2 AND deleted_at IS NULL")
        .bind(disputed)
        .bind(group.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_group_in_review(
    group: &TransactionGroup,
    in_review: bool,
    conn: &mut SqliteConnection,
) -> Result<u64, LedgerError> {
    let result = sqlx::query("UPDATE ledger SET is_in_review = $1 WHERE transaction_group = $2 AND deleted_at IS NULL")
        .bind(in_review)
        .bind(group.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// The live primary Credit leg that anchors the group a charge settled into.
pub async fn primary_credit_for_charge(
    processor: PaymentProcessor,
    charge_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<LedgerEntry>, LedgerError> {
    let entry = sqlx::query_as(
        r#"SELECT * FROM ledger
           WHERE processor = $1 AND charge_id = $2 AND entry_type = 'Credit' AND is_refund = 0
             AND deleted_at IS NULL
           ORDER BY id LIMIT 1"#,
    )
    .bind(processor)
    .bind(charge_id)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

/// Reverses the primary pair anchored by `original_id` into a fresh group.
///
/// The refund Debit leg sits on the receiving collective and carries the returned fee amounts as
/// non-positive values, like any other leg; its Credit mirror returns the funds to the
/// contributor. When the processor keeps (part of) its fee, a
/// host-funded `PaymentProcessorCover` pair tops the collective back up. Both originals get
/// `refund_entry_id` links and stay un-deleted.
pub async fn create_refund_pair(
    original_id: i64,
    refunded_processor_fee: MinorUnits,
    kind: RefundKind,
    group_override: Option<TransactionGroup>,
    conn: &mut SqliteConnection,
) -> Result<RefundOutcome, LedgerError> {
    let original = fetch_entry(original_id, &mut *conn).await?.ok_or(LedgerError::EntryNotFound(original_id))?;
    if original.refund_entry_id.is_some() {
        return Err(LedgerError::AlreadyRefunded(original_id));
    }
    if original.entry_type != EntryType::Credit || !original.kind.is_primary() || original.deleted_at.is_some() {
        return Err(LedgerError::NoPrimaryEntry(original.transaction_group.clone()));
    }
    let siblings = entries_for_group(&original.transaction_group, &mut *conn).await?;
    let original_debit = siblings
        .iter()
        .find(|e| {
            e.id != original.id
                && e.kind == original.kind
                && e.entry_type == EntryType::Debit
                && !e.is_refund
                && e.deleted_at.is_none()
        })
        .cloned();

    let group = group_override.unwrap_or_default();
    // The original processor fee is <= 0 on the Credit leg. `returned` is what the processor
    // gave back; `uncovered` is what the host must make up.
    let refundable = -original.payment_processor_fee_in_host_currency;
    let returned = if refunded_processor_fee.abs() > refundable { refundable } else { refunded_processor_fee.abs() };
    let uncovered = refundable - returned;

    let provenance = Provenance::Refund { refunded_entry_id: original.id, kind };
    let mut refund_debit = NewLedgerEntry {
        entry_type: EntryType::Debit,
        kind: original.kind,
        transaction_group: group.clone(),
        collective_id: original.collective_id,
        from_collective_id: original.from_collective_id,
        host_collective_id: original.host_collective_id,
        order_id: original.order_id,
        expense_id: original.expense_id,
        amount: -original.amount,
        currency: original.currency.clone(),
        host_currency: original.host_currency.clone(),
        host_currency_fx_rate: original.host_currency_fx_rate,
        amount_in_host_currency: -original.amount_in_host_currency,
        net_amount_in_collective_currency: MinorUnits::ZERO,
        platform_fee_in_host_currency: original.platform_fee_in_host_currency,
        host_fee_in_host_currency: original.host_fee_in_host_currency,
        payment_processor_fee_in_host_currency: -returned,
        tax_amount: original.tax_amount,
        processor: original.processor,
        charge_id: original.charge_id.clone(),
        is_refund: true,
        refund_entry_id: Some(original.id),
        is_internal: original.is_internal,
        provenance: provenance.clone(),
    };
    refund_debit.net_amount_in_collective_currency = expected_net(
        refund_debit.entry_type,
        refund_debit.amount_in_host_currency,
        refund_debit.platform_fee_in_host_currency,
        refund_debit.host_fee_in_host_currency,
        refund_debit.payment_processor_fee_in_host_currency,
        refund_debit.tax_amount,
        refund_debit.host_currency_fx_rate,
    )
    .map_err(LedgerError::InvalidEntry)?;
    let mut refund_credit = refund_debit.counterpart();
    refund_credit.refund_entry_id = original_debit.as_ref().map(|e| e.id);

    validate(&refund_debit)?;
    validate(&refund_credit)?;
    let debit_row = insert_entry(refund_debit, &mut *conn).await?;
    let credit_row = insert_entry(refund_credit, &mut *conn).await?;

    // Link the originals to their reversal legs. The refund is the only writer of these fields,
    // and the guard above makes a second refund fail before it gets here.
    sqlx::query("UPDATE ledger SET refund_entry_id = $1 WHERE id = $2 AND refund_entry_id IS NULL")
        .bind(debit_row.id)
        .bind(original.id)
        .execute(&mut *conn)
        .await?;
    if let Some(orig_debit) = &original_debit {
        sqlx::query("UPDATE ledger SET refund_entry_id = $1 WHERE id = $2 AND refund_entry_id IS NULL")
            .bind(credit_row.id)
            .bind(orig_debit.id)
            .execute(&mut *conn)
            .await?;
    }

    let cover = if uncovered.is_positive() {
        let mut entry = NewLedgerEntry::credit(
            crate::db_types::LedgerEntryKind::PaymentProcessorCover,
            group.clone(),
            original.collective_id,
            original.host_collective_id,
            original.host_collective_id,
            uncovered,
            original.host_currency.clone(),
            provenance,
        );
        entry.order_id = original.order_id;
        entry.expense_id = original.expense_id;
        entry.is_internal = true;
        Some(create_double_entry(entry, &mut *conn).await?)
    } else {
        None
    };

    debug!(
        "📒️ Refund written for entry #{original_id} into group {group}; processor returned {returned}, host covered \
         {uncovered}"
    );
    Ok(RefundOutcome { refund: DoubleEntry { credit: credit_row, debit: debit_row }, cover })
}
