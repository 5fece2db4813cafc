//! [`MemoryHistory`]: the in-memory [`super::HistoryRepository`]
//! implementation — four dictionaries plus a coinbase-amount map, all
//! O(1) expected and always fully enumerable (§4.6).

use indexmap::IndexMap;

use crate::error::DomainError;
use crate::id::{Amount, OutputId, TxId};
use crate::output::Output;
use crate::transaction::{CoinbaseTx, Tx};

use super::{CreatedBy, HistoryRepository, SpentOutputData};

#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    created_by: IndexMap<OutputId, CreatedBy>,
    spent_by: IndexMap<OutputId, TxId>,
    spent_outputs: IndexMap<OutputId, SpentOutputData>,
    tx_fees: IndexMap<TxId, Amount>,
    coinbase_amounts: IndexMap<TxId, Amount>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild this history's five dictionaries wholesale from decoded
    /// snapshot data. Used only by [`crate::serialize`] to restore a
    /// ledger from a §4.8 data tree.
    pub(crate) fn restore(
        &mut self,
        created_by: Vec<(OutputId, CreatedBy)>,
        spent_by: Vec<(OutputId, TxId)>,
        spent_outputs: Vec<(OutputId, SpentOutputData)>,
        tx_fees: Vec<(TxId, Amount)>,
        coinbase_amounts: Vec<(TxId, Amount)>,
    ) {
        self.created_by = created_by.into_iter().collect();
        self.spent_by = spent_by.into_iter().collect();
        self.spent_outputs = spent_outputs.into_iter().collect();
        self.tx_fees = tx_fees.into_iter().collect();
        self.coinbase_amounts = coinbase_amounts.into_iter().collect();
    }
}

impl HistoryRepository for MemoryHistory {
    fn save_genesis(&mut self, outputs: &[Output]) -> Result<(), DomainError> {
        for output in outputs {
            self.created_by.insert(output.id.clone(), CreatedBy::Genesis);
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
            self.spent_by.insert(id.clone(), tx.id.clone());
            if let Some(data) = spent_outputs.get(id) {
                self.spent_outputs.insert(id.clone(), data.clone());
            }
        }
        for output in &tx.outputs {
            self.created_by.insert(output.id.clone(), CreatedBy::Tx(tx.id.clone()));
        }
        self.tx_fees.insert(tx.id.clone(), fee);
        Ok(())
    }

    fn save_coinbase(&mut self, coinbase: &CoinbaseTx) -> Result<(), DomainError> {
        for output in &coinbase.outputs {
            self.created_by
                .insert(output.id.clone(), CreatedBy::Tx(coinbase.id.clone()));
        }
        let amount = Output::total_amount(&coinbase.outputs).unwrap_or(Amount::ZERO);
        self.coinbase_amounts.insert(coinbase.id.clone(), amount);
        Ok(())
    }

    fn find_output_created_by(&self, id: &OutputId) -> Result<Option<CreatedBy>, DomainError> {
        Ok(self.created_by.get(id).cloned())
    }

    fn find_output_spent_by(&self, id: &OutputId) -> Result<Option<TxId>, DomainError> {
        Ok(self.spent_by.get(id).cloned())
    }

    fn find_spent_output(&self, id: &OutputId) -> Result<Option<Output>, DomainError> {
        Ok(self.spent_outputs.get(id).map(|data| Output {
            id: id.clone(),
            amount: data.amount,
            lock: data.lock.clone(),
        }))
    }

    fn find_fee_for_tx(&self, tx_id: &TxId) -> Result<Option<Amount>, DomainError> {
        Ok(self.tx_fees.get(tx_id).copied())
    }

    fn find_all_tx_fees(&self) -> Result<IndexMap<TxId, Amount>, DomainError> {
        Ok(self.tx_fees.clone())
    }

    fn is_coinbase(&self, tx_id: &TxId) -> Result<bool, DomainError> {
        Ok(self.coinbase_amounts.contains_key(tx_id))
    }

    fn find_coinbase_amount(&self, tx_id: &TxId) -> Result<Option<Amount>, DomainError> {
        Ok(self.coinbase_amounts.get(tx_id).copied())
    }

    fn all_created_by(&self) -> Result<IndexMap<OutputId, CreatedBy>, DomainError> {
        Ok(self.created_by.clone())
    }

    fn all_spent_by(&self) -> Result<IndexMap<OutputId, TxId>, DomainError> {
        Ok(self.spent_by.clone())
    }

    fn all_spent_outputs(&self) -> Result<IndexMap<OutputId, SpentOutputData>, DomainError> {
        Ok(self.spent_outputs.clone())
    }

    fn all_coinbase_amounts(&self) -> Result<IndexMap<TxId, Amount>, DomainError> {
        Ok(self.coinbase_amounts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::OutputId;
    use crate::lock::Lock;

    fn oid(s: &str) -> OutputId {
        OutputId::new(s).unwrap()
    }

    #[test]
    fn genesis_outputs_are_recorded_as_genesis() {
        let mut history = MemoryHistory::new();
        let output = Output::open(Amount::new(10), Some(oid("a"))).unwrap();
        history.save_genesis(&[output]).unwrap();
        assert_eq!(history.find_output_created_by(&oid("a")).unwrap(), Some(CreatedBy::Genesis));
    }

    #[test]
    fn transaction_records_spend_and_creation_and_fee() {
        let mut history = MemoryHistory::new();
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
                lock: Lock::Open,
            },
        );
        history.save_transaction(&tx, Amount::new(10), &spent_outputs).unwrap();

        assert_eq!(history.find_output_spent_by(&spent).unwrap(), Some(tx_id.clone()));
        assert_eq!(
            history.find_spent_output(&spent).unwrap().unwrap().amount,
            Amount::new(15)
        );
        assert_eq!(history.find_output_created_by(&created.id).unwrap(), Some(CreatedBy::Tx(tx_id.clone())));
        assert_eq!(history.find_fee_for_tx(&tx_id).unwrap(), Some(Amount::new(10)));
    }

    #[test]
    fn coinbase_is_tracked_with_its_total_amount() {
        let mut history = MemoryHistory::new();
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

    #[test]
    fn find_all_tx_fees_enumerates_everything() {
        let mut history = MemoryHistory::new();
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
}
