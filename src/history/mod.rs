//! [`HistoryRepository`]: the provenance/fee/coinbase port (C6).
//!
//! Two implementations ship with this crate: [`memory::MemoryHistory`] (an
//! in-memory, always-O(1), always-fully-enumerable implementation) and
//! [`external::ExternalHistory`] (delegates to an injected
//! [`external::HistoryStore`] key/value surface, for hosts that want
//! provenance to live outside process memory).

pub mod external;
pub mod memory;

use indexmap::IndexMap;

use crate::error::DomainError;
use crate::id::{Amount, OutputId, TxId};
use crate::lock::Lock;
use crate::output::Output;
use crate::transaction::{CoinbaseTx, Tx};

/// Who created an output: the genesis batch, or a specific applied
/// transaction (`Tx` or `CoinbaseTx` — both share the tx id namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedBy {
    Genesis,
    Tx(TxId),
}

impl CreatedBy {
    pub fn tx_id(&self) -> Option<&TxId> {
        match self {
            CreatedBy::Genesis => None,
            CreatedBy::Tx(id) => Some(id),
        }
    }
}

/// The `{amount, lock}` snapshot recorded for an output at the moment it
/// is spent, so history can answer queries about it after it leaves the
/// [`crate::unspent_set::UnspentSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentOutputData {
    pub amount: Amount,
    pub lock: Lock,
}

impl From<&Output> for SpentOutputData {
    fn from(output: &Output) -> Self {
        SpentOutputData {
            amount: output.amount,
            lock: output.lock.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Unspent,
    Spent,
}

/// The full provenance record for one output id: `findOutputHistory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputHistory {
    pub id: OutputId,
    pub amount: Amount,
    pub lock: Lock,
    pub created_by: Option<CreatedBy>,
    pub spent_by: Option<TxId>,
    pub status: OutputStatus,
}

/// Port for provenance and fee/coinbase facts (§4.6). Every write method
/// is called by the [`crate::ledger::Ledger`] only after all validation for
/// the enclosing operation has passed, so implementations may assume the
/// facts they are given are consistent.
pub trait HistoryRepository {
    fn save_genesis(&mut self, outputs: &[Output]) -> Result<(), DomainError>;

    fn save_transaction(
        &mut self,
        tx: &Tx,
        fee: Amount,
        spent_outputs: &IndexMap<OutputId, SpentOutputData>,
    ) -> Result<(), DomainError>;

    fn save_coinbase(&mut self, coinbase: &CoinbaseTx) -> Result<(), DomainError>;

    fn find_output_created_by(&self, id: &OutputId) -> Result<Option<CreatedBy>, DomainError>;

    fn find_output_spent_by(&self, id: &OutputId) -> Result<Option<TxId>, DomainError>;

    fn find_spent_output(&self, id: &OutputId) -> Result<Option<Output>, DomainError>;

    fn find_fee_for_tx(&self, tx_id: &TxId) -> Result<Option<Amount>, DomainError>;

    /// May return an empty mapping when the backend can't perform an
    /// efficient full scan (§4.6 Open Question resolution; see DESIGN.md).
    fn find_all_tx_fees(&self) -> Result<IndexMap<TxId, Amount>, DomainError>;

    fn is_coinbase(&self, tx_id: &TxId) -> Result<bool, DomainError>;

    fn find_coinbase_amount(&self, tx_id: &TxId) -> Result<Option<Amount>, DomainError>;

    /// Every output id ever created, with its provenance. Used by
    /// [`crate::serialize`] to assemble a full snapshot. Same "may be
    /// empty if no efficient scan exists" caveat as [`Self::find_all_tx_fees`].
    fn all_created_by(&self) -> Result<IndexMap<OutputId, CreatedBy>, DomainError>;

    fn all_spent_by(&self) -> Result<IndexMap<OutputId, TxId>, DomainError>;

    fn all_spent_outputs(&self) -> Result<IndexMap<OutputId, SpentOutputData>, DomainError>;

    fn all_coinbase_amounts(&self) -> Result<IndexMap<TxId, Amount>, DomainError>;
}
