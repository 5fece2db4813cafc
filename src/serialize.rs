//! Serialization of ledger state (§4.8): a lossless round-trip between a
//! [`Ledger`] and a [`LedgerSnapshot`] data tree, plus JSON helpers layered
//! on top of it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, ValidationError};
use crate::history::memory::MemoryHistory;
use crate::history::{CreatedBy, HistoryRepository};
use crate::id::{Amount, OutputId, TxId};
use crate::ledger::Ledger;
use crate::lock::{lock_from_value, lock_to_value};
use crate::output::Output;
use crate::unspent_set::UnspentSet;

/// Schema version written by this crate. Inspected (and currently required
/// to match) on `from_array`/`from_json`.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const GENESIS_MARKER: &str = "genesis";

/// A `{amount, lock}` pair, as it appears under `unspent` and
/// `spent_outputs` in [`LedgerSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotOutput {
    pub amount: u64,
    pub lock: serde_json::Value,
}

/// The data tree described by §4.8: a lossless, versioned projection of a
/// [`Ledger`]'s full state (unspent outputs plus every provenance/fee fact
/// its history holds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    pub unspent: IndexMap<String, SnapshotOutput>,
    pub applied_txs: Vec<String>,
    pub tx_fees: IndexMap<String, u64>,
    pub coinbase_amounts: IndexMap<String, u64>,
    pub created_by: IndexMap<String, String>,
    pub spent_by: IndexMap<String, String>,
    pub spent_outputs: IndexMap<String, SnapshotOutput>,
}

impl<H: HistoryRepository> Ledger<H> {
    /// Project this ledger into the §4.8 data tree.
    pub fn to_array(&self) -> Result<LedgerSnapshot, DomainError> {
        let mut unspent = IndexMap::new();
        for (id, output) in self.unspent().iter() {
            unspent.insert(
                id.into_string(),
                SnapshotOutput {
                    amount: output.amount.get(),
                    lock: lock_to_value(&output.lock),
                },
            );
        }

        let applied_txs = self
            .all_tx_fees()?
            .keys()
            .map(|id| id.as_str().to_string())
            .chain(
                self.history()
                    .all_coinbase_amounts()?
                    .keys()
                    .map(|id| id.as_str().to_string()),
            )
            .collect();

        let tx_fees = self
            .all_tx_fees()?
            .into_iter()
            .map(|(id, fee)| (id.into_string(), fee.get()))
            .collect();

        let coinbase_amounts = self
            .history()
            .all_coinbase_amounts()?
            .into_iter()
            .map(|(id, amount)| (id.into_string(), amount.get()))
            .collect();

        let created_by = self
            .history()
            .all_created_by()?
            .into_iter()
            .map(|(id, created_by)| {
                let value = match created_by {
                    CreatedBy::Genesis => GENESIS_MARKER.to_string(),
                    CreatedBy::Tx(tx_id) => tx_id.into_string(),
                };
                (id.into_string(), value)
            })
            .collect();

        let spent_by = self
            .history()
            .all_spent_by()?
            .into_iter()
            .map(|(id, tx_id)| (id.into_string(), tx_id.into_string()))
            .collect();

        let spent_outputs = self
            .history()
            .all_spent_outputs()?
            .into_iter()
            .map(|(id, data)| {
                (
                    id.into_string(),
                    SnapshotOutput {
                        amount: data.amount.get(),
                        lock: lock_to_value(&data.lock),
                    },
                )
            })
            .collect();

        Ok(LedgerSnapshot {
            version: CURRENT_SNAPSHOT_VERSION,
            unspent,
            applied_txs,
            tx_fees,
            coinbase_amounts,
            created_by,
            spent_by,
            spent_outputs,
        })
    }

    /// `to_array`, then `serde_json::to_string`.
    pub fn to_json(&self) -> Result<String, DomainError> {
        let snapshot = self.to_array()?;
        serde_json::to_string(&snapshot)
            .map_err(|e| DomainError::Persistence(format!("serialize snapshot: {e}")))
    }
}

impl Ledger<MemoryHistory> {
    /// Reconstruct a ledger from a §4.8 data tree, backed by
    /// [`MemoryHistory`]. `unknown-lock-type` (or any other malformed
    /// field) is raised before any state is reconstructed, so a bad
    /// snapshot never leaves a partially-restored ledger around.
    pub fn from_array(snapshot: LedgerSnapshot) -> Result<Self, DomainError> {
        if snapshot.version != CURRENT_SNAPSHOT_VERSION {
            return Err(DomainError::Validation(ValidationError::InvalidLockData(format!(
                "unsupported snapshot version {}",
                snapshot.version
            ))));
        }

        // Decode everything before touching any mutable state (validation
        // first, commit second — same discipline as `Ledger::apply`).
        let mut unspent_outputs = Vec::with_capacity(snapshot.unspent.len());
        for (id, entry) in &snapshot.unspent {
            unspent_outputs.push(Output {
                id: OutputId::new(id.clone())?,
                amount: Amount::new(entry.amount),
                lock: lock_from_value(&entry.lock)?,
            });
        }

        let created_by = snapshot
            .created_by
            .iter()
            .map(|(id, value)| {
                let created_by = if value == GENESIS_MARKER {
                    CreatedBy::Genesis
                } else {
                    CreatedBy::Tx(TxId::new(value.clone())?)
                };
                Ok::<_, DomainError>((OutputId::new(id.clone())?, created_by))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let spent_by = snapshot
            .spent_by
            .iter()
            .map(|(id, tx_id)| Ok::<_, DomainError>((OutputId::new(id.clone())?, TxId::new(tx_id.clone())?)))
            .collect::<Result<Vec<_>, _>>()?;

        let spent_outputs = snapshot
            .spent_outputs
            .iter()
            .map(|(id, entry)| {
                Ok::<_, DomainError>((
                    OutputId::new(id.clone())?,
                    crate::history::SpentOutputData {
                        amount: Amount::new(entry.amount),
                        lock: lock_from_value(&entry.lock)?,
                    },
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tx_fees = snapshot
            .tx_fees
            .iter()
            .map(|(id, fee)| Ok::<_, DomainError>((TxId::new(id.clone())?, Amount::new(*fee))))
            .collect::<Result<Vec<_>, _>>()?;

        let coinbase_amounts = snapshot
            .coinbase_amounts
            .iter()
            .map(|(id, amount)| Ok::<_, DomainError>((TxId::new(id.clone())?, Amount::new(*amount))))
            .collect::<Result<Vec<_>, _>>()?;

        // Every id parsed successfully; now commit.
        let mut history = MemoryHistory::new();
        history.restore(created_by, spent_by, spent_outputs, tx_fees, coinbase_amounts);

        let mut unspent = UnspentSet::empty();
        for output in unspent_outputs {
            unspent = unspent.add(output);
        }

        let total_fees = Amount::sum(history.find_all_tx_fees()?.values().copied()).unwrap_or(Amount::ZERO);
        let total_minted =
            Amount::sum(history.all_coinbase_amounts()?.values().copied()).unwrap_or(Amount::ZERO);

        let mut ledger = Ledger::from_unspent_set(unspent, history, total_fees, total_minted);
        for tx_id in snapshot.applied_txs {
            ledger.mark_applied(TxId::new(tx_id)?);
        }
        Ok(ledger)
    }

    /// `serde_json::from_str`, then `from_array`.
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let snapshot: LedgerSnapshot = serde_json::from_str(json)
            .map_err(|e| DomainError::Persistence(format!("deserialize snapshot: {e}")))?;
        Self::from_array(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Lock;
    use crate::output::Output;
    use crate::transaction::Tx;

    #[test]
    fn round_trip_preserves_unspent_and_provenance() {
        let mut ledger = Ledger::with_genesis(vec![Output::open(
            Amount::new(500),
            Some(OutputId::new("bill").unwrap()),
        )
        .unwrap()])
        .unwrap();

        let tx = Tx::new(
            vec![OutputId::new("bill").unwrap()],
            vec![
                Output::open(Amount::new(100), Some(OutputId::new("pay").unwrap())).unwrap(),
                Output::open(Amount::new(400), Some(OutputId::new("change").unwrap())).unwrap(),
            ],
            None,
            vec![],
        )
        .unwrap();
        ledger.apply(&tx).unwrap();

        let snapshot = ledger.to_array().unwrap();
        let restored = Ledger::from_array(snapshot).unwrap();

        assert_eq!(restored.total_unspent_amount(), ledger.total_unspent_amount());
        assert_eq!(
            restored.output_spent_by(&OutputId::new("bill").unwrap()).unwrap(),
            Some(tx.id.clone())
        );
        assert_eq!(
            restored.output_created_by(&OutputId::new("pay").unwrap()).unwrap(),
            Some(CreatedBy::Tx(tx.id))
        );
        assert!(restored.is_tx_applied(&restored.all_tx_fees().unwrap().keys().next().unwrap().clone()));
    }

    #[test]
    fn unknown_lock_type_is_rejected_before_any_state_is_restored() {
        let snapshot = LedgerSnapshot {
            version: CURRENT_SNAPSHOT_VERSION,
            unspent: {
                let mut m = IndexMap::new();
                m.insert(
                    "a".to_string(),
                    SnapshotOutput {
                        amount: 10,
                        lock: serde_json::json!({"type": "mystery"}),
                    },
                );
                m
            },
            applied_txs: vec![],
            tx_fees: IndexMap::new(),
            coinbase_amounts: IndexMap::new(),
            created_by: IndexMap::new(),
            spent_by: IndexMap::new(),
            spent_outputs: IndexMap::new(),
        };
        let err = Ledger::from_array(snapshot).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::UnknownLockType(_))
        ));
    }

    #[test]
    fn lock_encoding_matches_spec_tags() {
        assert_eq!(lock_to_value(&Lock::Open)["type"], "none");
        assert_eq!(
            lock_to_value(&Lock::NamedOwner { name: "alice".into() })["type"],
            "owner"
        );
    }
}
