//! [`ExternalHistory`]: a [`super::HistoryRepository`] that delegates every
//! save/find to an injected [`HistoryStore`] key/value surface, so a host
//! can keep provenance outside process memory while the ledger itself
//! still only holds the live [`crate::unspent_set::UnspentSet`] resident.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{Amount, OutputId, TxId};
use crate::lock::{lock_from_value, lock_to_value};
use crate::output::Output;
use crate::transaction::{CoinbaseTx, Tx};

use super::{CreatedBy, HistoryRepository, SpentOutputData};

const CREATED_BY_PREFIX: &str = "created_by:";
const SPENT_BY_PREFIX: &str = "spent_by:";
const SPENT_OUTPUT_PREFIX: &str = "spent_output:";
const TX_FEE_PREFIX: &str = "tx_fee:";
const COINBASE_AMOUNT_PREFIX: &str = "coinbase_amount:";

/// Minimal key/value port a host-provided backend must implement to back
/// [`ExternalHistory`]. Deliberately narrow (`get`/`put`/`scan_prefix`) so
/// an embedded store, a networked store, or a SQL-row-per-key table can all
/// implement it without this crate depending on a concrete backend crate.
pub trait HistoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError>;
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), DomainError>;
    /// Every `(key, value)` pair whose key starts with `prefix`. May return
    /// an empty vector if the backend cannot perform an efficient scan —
    /// see [`super::HistoryRepository::find_all_tx_fees`].
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, DomainError>;
}

/// A [`HistoryRepository`] backed by any [`HistoryStore`].
#[derive(Debug, Clone)]
pub struct ExternalHistory<S> {
    store: S,
}

impl<S: HistoryStore> ExternalHistory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn put_json<T: Serialize>(&mut self, key: String, value: &T) -> Result<(), DomainError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| DomainError::Persistence(format!("encode {key}: {e}")))?;
        self.store.put(&key, bytes)
    }

    fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>, DomainError> {
        match self.store.get(key)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| DomainError::Persistence(format!("decode {key}: {e}"))),
        }
    }

    fn scan_json<T: for<'de> Deserialize<'de>>(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, DomainError> {
        self.store
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, bytes)| {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| DomainError::Persistence(format!("decode {key}: {e}")))?;
                Ok((key[prefix.len()..].to_string(), value))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCreatedBy {
    genesis: bool,
    tx_id: Option<String>,
}

impl From<&CreatedBy> for StoredCreatedBy {
    fn from(value: &CreatedBy) -> Self {
        match value {
            CreatedBy::Genesis => StoredCreatedBy {
                genesis: true,
                tx_id: None,
            },
            CreatedBy::Tx(id) => StoredCreatedBy {
                genesis: false,
                tx_id: Some(id.as_str().to_string()),
            },
        }
    }
}

impl TryFrom<StoredCreatedBy> for CreatedBy {
    type Error = DomainError;

    fn try_from(value: StoredCreatedBy) -> Result<Self, DomainError> {
        if value.genesis {
            Ok(CreatedBy::Genesis)
        } else {
            let tx_id = value
                .tx_id
                .ok_or_else(|| DomainError::Persistence("created_by record missing tx_id".into()))?;
            Ok(CreatedBy::Tx(TxId::new(tx_id)?))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredOutput {
    amount: u64,
    lock: serde_json::Value,
}

impl StoredOutput {
    fn encode(amount: Amount, lock: &crate::lock::Lock) -> Self {
        StoredOutput {
            amount: amount.get(),
            lock: lock_to_value(lock),
        }
    }

    fn decode_spent_data(self) -> Result<SpentOutputData, DomainError> {
        Ok(SpentOutputData {
            amount: Amount::new(self.amount),
            lock: lock_from_value(&self.lock)?,
        })
    }
}

impl<S: HistoryStore> HistoryRepository for ExternalHistory<S> {
    fn save_genesis(&mut self, outputs: &[Output]) -> Result<(), DomainError> {
        for output in outputs {
            self.put_json(
                format!("{CREATED_BY_PREFIX}{}", output.id.as_str()),
                &StoredCreatedBy {
                    genesis: true,
                    tx_id: None,
                },
            )?;
        }
        Ok(())
    }

    fn save_transaction(
        &mut self,
        tx: &Tx,
        fee: Amount,
        spent_outputs: &IndexMap<OutputId, SpentOutputData>,
    ) -> Result<(), DomainError> {
        for id in &tx.spends {
            self.put_json(
                format!("{SPENT_BY_PREFIX}{}", id.as_str()),
                &tx.id.as_str().to_string(),
            )?;
            if let Some(data) = spent_outputs.get(id) {
                self.put_json(
                    format!("{SPENT_OUTPUT_PREFIX}{}", id.as_str()),
                    &StoredOutput::encode(data.amount, &data.lock),
                )?;
            }
        }
        for output in &tx.outputs {
            self.put_json(
                format!("{CREATED_BY_PREFIX}{}", output.id.as_str()),
                &StoredCreatedBy {
                    genesis: false,
                    tx_id: Some(tx.id.as_str().to_string()),
                },
            )?;
        }
        self.put_json(format!("{TX_FEE_PREFIX}{}", tx.id.as_str()), &fee.get())?;
        Ok(())
    }

    fn save_coinbase(&mut self, coinbase: &CoinbaseTx) -> Result<(), DomainError> {
        for output in &coinbase.outputs {
            self.put_json(
                format!("{CREATED_BY_PREFIX}{}", output.id.as_str()),
                &StoredCreatedBy {
                    genesis: false,
                    tx_id: Some(coinbase.id.as_str().to_string()),
                },
            )?;
        }
        let amount = Output::total_amount(&coinbase.outputs).unwrap_or(Amount::ZERO);
        self.put_json(
            format!("{COINBASE_AMOUNT_PREFIX}{}", coinbase.id.as_str()),
            &amount.get(),
        )?;
        Ok(())
    }

    fn find_output_created_by(&self, id: &OutputId) -> Result<Option<CreatedBy>, DomainError> {
        let stored: Option<StoredCreatedBy> =
            self.get_json(&format!("{CREATED_BY_PREFIX}{}", id.as_str()))?;
        stored.map(CreatedBy::try_from).transpose()
    }

    fn find_output_spent_by(&self, id: &OutputId) -> Result<Option<TxId>, DomainError> {
        let stored: Option<String> = self.get_json(&format!("{SPENT_BY_PREFIX}{}", id.as_str()))?;
        stored.map(TxId::new).transpose()
    }

    fn find_spent_output(&self, id: &OutputId) -> Result<Option<Output>, DomainError> {
        let stored: Option<StoredOutput> =
            self.get_json(&format!("{SPENT_OUTPUT_PREFIX}{}", id.as_str()))?;
        stored
            .map(|s| {
                Ok(Output {
                    id: id.clone(),
                    amount: Amount::new(s.amount),
                    lock: lock_from_value(&s.lock)?,
                })
            })
            .transpose()
    }

    fn find_fee_for_tx(&self, tx_id: &TxId) -> Result<Option<Amount>, DomainError> {
        let stored: Option<u64> = self.get_json(&format!("{TX_FEE_PREFIX}{}", tx_id.as_str()))?;
        Ok(stored.map(Amount::new))
    }

    fn find_all_tx_fees(&self) -> Result<IndexMap<TxId, Amount>, DomainError> {
        self.scan_json::<u64>(TX_FEE_PREFIX)?
            .into_iter()
            .map(|(id, fee)| Ok((TxId::new(id)?, Amount::new(fee))))
            .collect()
    }

    fn is_coinbase(&self, tx_id: &TxId) -> Result<bool, DomainError> {
        Ok(self
            .store
            .get(&format!("{COINBASE_AMOUNT_PREFIX}{}", tx_id.as_str()))?
            .is_some())
    }

    fn find_coinbase_amount(&self, tx_id: &TxId) -> Result<Option<Amount>, DomainError> {
        let stored: Option<u64> =
            self.get_json(&format!("{COINBASE_AMOUNT_PREFIX}{}", tx_id.as_str()))?;
        Ok(stored.map(Amount::new))
    }

    fn all_created_by(&self) -> Result<IndexMap<OutputId, CreatedBy>, DomainError> {
        self.scan_json::<StoredCreatedBy>(CREATED_BY_PREFIX)?
            .into_iter()
            .map(|(id, stored)| Ok((OutputId::new(id)?, CreatedBy::try_from(stored)?)))
            .collect()
    }

    fn all_spent_by(&self) -> Result<IndexMap<OutputId, TxId>, DomainError> {
        self.scan_json::<String>(SPENT_BY_PREFIX)?
            .into_iter()
            .map(|(id, tx_id)| Ok((OutputId::new(id)?, TxId::new(tx_id)?)))
            .collect()
    }

    fn all_spent_outputs(&self) -> Result<IndexMap<OutputId, SpentOutputData>, DomainError> {
        self.scan_json::<StoredOutput>(SPENT_OUTPUT_PREFIX)?
            .into_iter()
            .map(|(id, stored)| Ok((OutputId::new(id)?, stored.decode_spent_data()?)))
            .collect()
    }

    fn all_coinbase_amounts(&self) -> Result<IndexMap<TxId, Amount>, DomainError> {
        self.scan_json::<u64>(COINBASE_AMOUNT_PREFIX)?
            .into_iter()
            .map(|(id, amount)| Ok((TxId::new(id)?, Amount::new(amount))))
            .collect()
    }
}

/// Reference [`HistoryStore`] backed by a plain `HashMap`. Used in this
/// crate's own tests and as a template for a host-provided backend (e.g.
/// a thin wrapper over a SQL `key`/`value` table or an embedded KV store).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: HashMap<String, Vec<u8>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DomainError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), DomainError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, DomainError> {
        Ok(self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::OutputId;

    fn oid(s: &str) -> OutputId {
        OutputId::new(s).unwrap()
    }

    #[test]
    fn genesis_round_trips_through_store() {
        let mut history = ExternalHistory::new(InMemoryStore::new());
        let output = Output::open(Amount::new(10), Some(oid("a"))).unwrap();
        history.save_genesis(&[output]).unwrap();
        assert_eq!(history.find_output_created_by(&oid("a")).unwrap(), Some(CreatedBy::Genesis));
    }

    #[test]
    fn transaction_round_trips_spend_creation_and_fee() {
        let mut history = ExternalHistory::new(InMemoryStore::new());
        let tx_id = TxId::new("t1").unwrap();
        let spent = oid("a");
        let created = Output::open(Amount::new(5), Some(oid("b"))).unwrap();
        let tx = Tx::with_id(
            Some(tx_id.clone()),
            vec![spent.clone()],
            vec![created.clone()],
            None,
            vec![],
        )
        .unwrap();
        let mut spent_outputs = IndexMap::new();
        spent_outputs.insert(
            spent.clone(),
            SpentOutputData {
                amount: Amount::new(15),
                lock: crate::lock::Lock::Open,
            },
        );
        history.save_transaction(&tx, Amount::new(10), &spent_outputs).unwrap();

        assert_eq!(history.find_output_spent_by(&spent).unwrap(), Some(tx_id.clone()));
        assert_eq!(history.find_spent_output(&spent).unwrap().unwrap().amount, Amount::new(15));
        assert_eq!(history.find_fee_for_tx(&tx_id).unwrap(), Some(Amount::new(10)));
    }

    #[test]
    fn reference_in_memory_store_supports_full_scan() {
        let mut history = ExternalHistory::new(InMemoryStore::new());
        for i in 0..3u64 {
            let tx = Tx::with_id(
                Some(TxId::new(format!("t{i}")).unwrap()),
                vec![oid(&format!("in{i}"))],
                vec![Output::open(Amount::new(1), Some(oid(&format!("out{i}")))).unwrap()],
                None,
                vec![],
            )
            .unwrap();
            history.save_transaction(&tx, Amount::new(i), &IndexMap::new()).unwrap();
        }
        assert_eq!(history.find_all_tx_fees().unwrap().len(), 3);
    }

    #[test]
    fn coinbase_is_tracked_through_store() {
        let mut history = ExternalHistory::new(InMemoryStore::new());
        let cb_id = TxId::new("b1").unwrap();
        let coinbase = CoinbaseTx::with_id(
            Some(cb_id.clone()),
            vec![Output::open(Amount::new(50), Some(oid("reward"))).unwrap()],
        )
        .unwrap();
        history.save_coinbase(&coinbase).unwrap();
        assert!(history.is_coinbase(&cb_id).unwrap());
        assert_eq!(history.find_coinbase_amount(&cb_id).unwrap(), Some(Amount::new(50)));
    }
}
