//! [`Ledger`]: the core state machine (C7) — genesis, transaction
//! application, coinbase application, and the query surface over both.
//!
//! This crate picks the in-place mutability surface (§5): state-changing
//! operations take `&mut self` and mutate on success, leaving the receiver
//! byte-for-byte unchanged on failure (P5). [`Ledger::fork`] clones the
//! ledger for callers that want branching.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};

use crate::error::{DomainError, ValidationError};
use crate::history::{memory::MemoryHistory, CreatedBy, HistoryRepository, OutputHistory, OutputStatus};
use crate::id::{Amount, OutputId, TxId};
use crate::output::Output;
use crate::transaction::{check_distinct_outputs, CoinbaseTx, Tx};
use crate::unspent_set::UnspentSet;

/// The UTXO-style ledger state machine, generic over its backing
/// [`HistoryRepository`] so hosts can swap [`MemoryHistory`] for an
/// externally-backed store without touching the engine.
#[derive(Debug, Clone)]
pub struct Ledger<H: HistoryRepository = MemoryHistory> {
    unspent: UnspentSet,
    applied_tx_ids: IndexSet<TxId>,
    total_fees: Amount,
    total_minted: Amount,
    history: H,
}

impl Ledger<MemoryHistory> {
    /// An empty ledger with no genesis yet, backed by the in-memory
    /// history implementation.
    pub fn empty() -> Self {
        Self::with_history(MemoryHistory::new())
    }

    /// `empty().add_genesis(outputs)`.
    pub fn with_genesis(outputs: Vec<Output>) -> Result<Self, DomainError> {
        let mut ledger = Self::empty();
        ledger.add_genesis(outputs)?;
        Ok(ledger)
    }
}

impl<H: HistoryRepository> Ledger<H> {
    /// An empty ledger backed by a caller-supplied history implementation.
    pub fn with_history(history: H) -> Self {
        Self {
            unspent: UnspentSet::empty(),
            applied_tx_ids: IndexSet::new(),
            total_fees: Amount::ZERO,
            total_minted: Amount::ZERO,
            history,
        }
    }

    /// Reconstitute a running ledger from a previously persisted unspent
    /// snapshot and a backing store. `applied_tx_ids` membership for ids
    /// not created by this process (i.e. not yet seen via `apply`/
    /// `apply_coinbase` on this handle) is answered lazily by consulting
    /// `history` (`is_tx_applied`), rather than eagerly materialized here.
    pub fn from_unspent_set(
        unspent: UnspentSet,
        history: H,
        total_fees: Amount,
        total_minted: Amount,
    ) -> Self {
        Self {
            unspent,
            applied_tx_ids: IndexSet::new(),
            total_fees,
            total_minted,
            history,
        }
    }

    // ==========================================================================
    // Genesis
    // ==========================================================================

    pub fn add_genesis(&mut self, outputs: Vec<Output>) -> Result<(), DomainError> {
        let span = tracing::debug_span!("ledger.add_genesis", count = outputs.len());
        let _enter = span.enter();

        if self.unspent.count() != 0 || !self.applied_tx_ids.is_empty() {
            return Err(DomainError::GenesisNotAllowed);
        }
        check_distinct_outputs(&outputs)?;

        let mut next_unspent = self.unspent.clone();
        for output in &outputs {
            next_unspent = next_unspent.add(output.clone());
        }
        self.history.save_genesis(&outputs)?;
        self.unspent = next_unspent;

        tracing::info!(count = outputs.len(), "genesis applied");
        Ok(())
    }

    // ==========================================================================
    // Transaction application
    // ==========================================================================

    pub fn apply(&mut self, tx: &Tx) -> Result<(), DomainError> {
        let span = tracing::debug_span!("ledger.apply", tx_id = %tx.id);
        let _enter = span.enter();

        let (fee, next_total_fees, spent) = self.validate_tx(tx)?;

        let mut next_unspent = self.unspent.clone();
        for id in &tx.spends {
            next_unspent = next_unspent.remove(id);
        }
        for output in &tx.outputs {
            next_unspent = next_unspent.add(output.clone());
        }
        let mut spent_outputs = IndexMap::with_capacity(spent.len());
        for (id, output) in &spent {
            spent_outputs.insert(id.clone(), output.into());
        }
        self.history.save_transaction(tx, fee, &spent_outputs)?;

        // Every fallible step (validation, the store write) has already
        // succeeded; only infallible assignments remain, so the ledger can
        // no longer end up partially committed (P5).
        self.unspent = next_unspent;
        self.applied_tx_ids.insert(tx.id.clone());
        self.total_fees = next_total_fees;

        tracing::info!(tx_id = %tx.id, fee = fee.get(), "transaction applied");
        Ok(())
    }

    /// Non-mutating dry run of [`Self::apply`]'s validation pipeline.
    /// Shares `validate_tx` with `apply` so the two can never drift.
    pub fn can_apply(&self, tx: &Tx) -> Result<(), DomainError> {
        self.validate_tx(tx).map(|_| ())
    }

    /// Steps 1-5 of §4.7's `apply` contract. Returns the fee, the ledger's
    /// prospective `total_fees` after this application (computed here, not
    /// in `apply`, so an overflow is reported as a `DomainError` before any
    /// state is touched), and the resolved `Output` for each spend (in
    /// `tx.spends` order) so the caller can commit without looking them up
    /// a second time.
    fn validate_tx(&self, tx: &Tx) -> Result<(Amount, Amount, Vec<(OutputId, Output)>), DomainError> {
        if self.is_tx_applied(&tx.id) {
            return Err(DomainError::DuplicateTx(tx.id.clone()));
        }

        let own_output_ids: HashSet<&OutputId> = tx.outputs.iter().map(|o| &o.id).collect();
        for id in &tx.spends {
            if own_output_ids.contains(id) {
                return Err(DomainError::DuplicateOutputId(id.clone()));
            }
        }

        for output in &tx.outputs {
            if self.output_exists(&output.id)? {
                return Err(DomainError::DuplicateOutputId(output.id.clone()));
            }
        }

        let mut spent = Vec::with_capacity(tx.spends.len());
        for id in &tx.spends {
            let output = self
                .unspent
                .get(id)
                .ok_or_else(|| DomainError::OutputAlreadySpent(id.clone()))?;
            spent.push((id.clone(), output.clone()));
        }

        for (index, (_, output)) in spent.iter().enumerate() {
            if let Err(err) = output.lock.validate(tx, index) {
                tracing::warn!(tx_id = %tx.id, input_index = index, error = %err, "authorization failed");
                return Err(err);
            }
        }

        let in_sum = Amount::sum(spent.iter().map(|(_, o)| o.amount)).ok_or_else(|| {
            DomainError::Validation(ValidationError::InvalidAmount("input sum overflow".into()))
        })?;
        let out_sum = tx.total_output_amount().ok_or_else(|| {
            DomainError::Validation(ValidationError::InvalidAmount("output sum overflow".into()))
        })?;
        if out_sum.get() > in_sum.get() {
            return Err(DomainError::InsufficientSpends {
                in_sum: in_sum.get(),
                out_sum: out_sum.get(),
            });
        }
        let fee = in_sum.checked_sub(out_sum).expect("checked above");
        let next_total_fees = self.total_fees.checked_add(fee).ok_or_else(|| {
            DomainError::Validation(ValidationError::InvalidAmount("total fees overflow".into()))
        })?;

        Ok((fee, next_total_fees, spent))
    }

    // ==========================================================================
    // Coinbase application
    // ==========================================================================

    pub fn apply_coinbase(&mut self, coinbase: &CoinbaseTx) -> Result<(), DomainError> {
        let span = tracing::debug_span!("ledger.apply_coinbase", tx_id = %coinbase.id);
        let _enter = span.enter();

        let (minted, next_total_minted) = self.validate_coinbase(coinbase)?;

        let mut next_unspent = self.unspent.clone();
        for output in &coinbase.outputs {
            next_unspent = next_unspent.add(output.clone());
        }
        self.history.save_coinbase(coinbase)?;

        // Every fallible step has already succeeded; only infallible
        // assignments remain (P5).
        self.unspent = next_unspent;
        self.applied_tx_ids.insert(coinbase.id.clone());
        self.total_minted = next_total_minted;

        tracing::info!(tx_id = %coinbase.id, minted = minted.get(), "coinbase applied");
        Ok(())
    }

    pub fn can_apply_coinbase(&self, coinbase: &CoinbaseTx) -> Result<(), DomainError> {
        self.validate_coinbase(coinbase).map(|_| ())
    }

    /// Returns the coinbase's minted amount and the ledger's prospective
    /// `total_minted` after this application, computed here so an overflow
    /// surfaces as a `DomainError` before any state is touched.
    fn validate_coinbase(&self, coinbase: &CoinbaseTx) -> Result<(Amount, Amount), DomainError> {
        if self.is_tx_applied(&coinbase.id) {
            return Err(DomainError::DuplicateTx(coinbase.id.clone()));
        }
        for output in &coinbase.outputs {
            if self.output_exists(&output.id)? {
                return Err(DomainError::DuplicateOutputId(output.id.clone()));
            }
        }
        let minted = coinbase.total_output_amount().ok_or_else(|| {
            DomainError::Validation(ValidationError::InvalidAmount("coinbase sum overflow".into()))
        })?;
        let next_total_minted = self.total_minted.checked_add(minted).ok_or_else(|| {
            DomainError::Validation(ValidationError::InvalidAmount("total minted overflow".into()))
        })?;
        Ok((minted, next_total_minted))
    }

    // ==========================================================================
    // Query surface
    // ==========================================================================

    pub fn unspent(&self) -> &UnspentSet {
        &self.unspent
    }

    pub fn unspent_by_owner(&self, name: &str) -> Vec<Output> {
        self.unspent.owned_by(name)
    }

    pub fn total_unspent_amount(&self) -> Amount {
        self.unspent.total_amount()
    }

    pub fn total_unspent_by_owner(&self, name: &str) -> Amount {
        self.unspent.total_amount_owned_by(name)
    }

    /// `true` if `id` has already been applied on this ledger handle, or
    /// (for a handle reconstituted via [`Self::from_unspent_set`]) if the
    /// backing history already carries a fee or coinbase record for it.
    pub fn is_tx_applied(&self, id: &TxId) -> bool {
        self.applied_tx_ids.contains(id)
            || self.history.find_fee_for_tx(id).ok().flatten().is_some()
            || self.history.is_coinbase(id).unwrap_or(false)
    }

    pub fn is_coinbase(&self, id: &TxId) -> Result<bool, DomainError> {
        self.history.is_coinbase(id)
    }

    pub fn coinbase_amount(&self, id: &TxId) -> Result<Option<Amount>, DomainError> {
        self.history.find_coinbase_amount(id)
    }

    pub fn total_fees_collected(&self) -> Amount {
        self.total_fees
    }

    pub fn fee_for_tx(&self, id: &TxId) -> Result<Option<Amount>, DomainError> {
        self.history.find_fee_for_tx(id)
    }

    /// May be empty in store-backed mode if the backend cannot perform a
    /// full scan; see [`HistoryRepository::find_all_tx_fees`].
    pub fn all_tx_fees(&self) -> Result<IndexMap<TxId, Amount>, DomainError> {
        self.history.find_all_tx_fees()
    }

    pub fn total_minted(&self) -> Amount {
        self.total_minted
    }

    pub fn output_created_by(&self, id: &OutputId) -> Result<Option<CreatedBy>, DomainError> {
        self.history.find_output_created_by(id)
    }

    pub fn output_spent_by(&self, id: &OutputId) -> Result<Option<TxId>, DomainError> {
        self.history.find_output_spent_by(id)
    }

    pub fn get_output(&self, id: &OutputId) -> Result<Option<Output>, DomainError> {
        if let Some(output) = self.unspent.get(id) {
            return Ok(Some(output.clone()));
        }
        self.history.find_spent_output(id)
    }

    /// `true` if `id` refers to an output anywhere in history — unspent or
    /// spent. Every output ever created has a `createdBy` record, so this
    /// needs only one history lookup beyond the unspent-set check.
    pub fn output_exists(&self, id: &OutputId) -> Result<bool, DomainError> {
        if self.unspent.contains(id) {
            return Ok(true);
        }
        Ok(self.history.find_output_created_by(id)?.is_some())
    }

    pub fn output_history(&self, id: &OutputId) -> Result<Option<OutputHistory>, DomainError> {
        let Some(created_by) = self.history.find_output_created_by(id)? else {
            return Ok(None);
        };
        if let Some(output) = self.unspent.get(id) {
            return Ok(Some(OutputHistory {
                id: id.clone(),
                amount: output.amount,
                lock: output.lock.clone(),
                created_by: Some(created_by),
                spent_by: None,
                status: OutputStatus::Unspent,
            }));
        }
        let spent_by = self.history.find_output_spent_by(id)?;
        let spent_output = self.history.find_spent_output(id)?;
        Ok(spent_output.map(|output| OutputHistory {
            id: id.clone(),
            amount: output.amount,
            lock: output.lock,
            created_by: Some(created_by),
            spent_by,
            status: OutputStatus::Spent,
        }))
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Mark `id` as applied without touching any other state. Used only by
    /// [`crate::serialize`] when restoring `applied_tx_ids` from a §4.8
    /// snapshot's `applied_txs` list.
    pub(crate) fn mark_applied(&mut self, id: TxId) {
        self.applied_tx_ids.insert(id);
    }
}

impl<H: HistoryRepository + Clone> Ledger<H> {
    /// Branch the ledger: a cheap clone for the [`UnspentSet`] (copy-on-fork),
    /// `O(appliedTxIds)` for the rest.
    pub fn fork(&self) -> Self {
        self.clone()
    }
}
