//! [`Tx`] (a spend) and [`CoinbaseTx`] (a mint): the two records that can be
//! applied to a [`crate::ledger::Ledger`].

use std::collections::HashSet;

use crate::error::{DomainError, ValidationError};
use crate::id::{derive_coinbase_id, derive_tx_id, Amount, OutputId, TxId};
use crate::output::Output;

/// A transaction consuming one or more existing outputs and creating one
/// or more new outputs. `signed_by`/`proofs` are authorization context
/// supplied by the caller and never influence [`Tx::id`] (P7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub id: TxId,
    pub spends: Vec<OutputId>,
    pub outputs: Vec<Output>,
    pub signed_by: Option<String>,
    pub proofs: Vec<Vec<u8>>,
}

impl Tx {
    /// Construct a transaction, deriving its id from `spends`/`outputs`.
    pub fn new(
        spends: Vec<OutputId>,
        outputs: Vec<Output>,
        signed_by: Option<String>,
        proofs: Vec<Vec<u8>>,
    ) -> Result<Tx, DomainError> {
        Self::with_id(None, spends, outputs, signed_by, proofs)
    }

    /// Construct a transaction with a caller-supplied id. Structural
    /// validity (non-empty, pairwise-distinct spends/outputs) is still
    /// enforced; the id itself is taken as given. `signed_by`, when
    /// present, must be non-empty (spec.md §3: `signedBy: optional
    /// non-empty string`).
    pub fn with_id(
        id: Option<TxId>,
        spends: Vec<OutputId>,
        outputs: Vec<Output>,
        signed_by: Option<String>,
        proofs: Vec<Vec<u8>>,
    ) -> Result<Tx, DomainError> {
        check_distinct_spends(&spends)?;
        check_distinct_outputs(&outputs)?;
        if let Some(signed_by) = &signed_by {
            if signed_by.trim().is_empty() {
                return Err(ValidationError::InvalidId("signed_by must be non-empty".into()).into());
            }
        }

        let id = id.unwrap_or_else(|| derive_tx_id(&spends, &outputs));
        Ok(Tx {
            id,
            spends,
            outputs,
            signed_by,
            proofs,
        })
    }

    pub fn builder() -> TxBuilder {
        TxBuilder::default()
    }

    /// Sum of this transaction's output amounts. `None` on overflow.
    pub fn total_output_amount(&self) -> Option<Amount> {
        Output::total_amount(&self.outputs)
    }

    /// The ids this transaction spends, for host code that wants to
    /// pre-check availability before calling [`crate::ledger::Ledger::apply`].
    pub fn total_input_ids(&self) -> impl Iterator<Item = &OutputId> {
        self.spends.iter()
    }

    #[cfg(test)]
    pub(crate) fn for_lock_tests(signed_by: Option<String>, proofs: Vec<Vec<u8>>) -> Tx {
        Tx {
            id: TxId::new("t").unwrap(),
            spends: vec![OutputId::new("s").unwrap()],
            outputs: vec![Output::open(Amount::new(1), None).unwrap()],
            signed_by,
            proofs,
        }
    }
}

/// Incremental builder for [`Tx`], mirroring the corpus's builder-pattern
/// convenience for multi-field, partly-optional construction.
#[derive(Debug, Default)]
pub struct TxBuilder {
    id: Option<TxId>,
    spends: Vec<OutputId>,
    outputs: Vec<Output>,
    signed_by: Option<String>,
    proofs: Vec<Vec<u8>>,
}

impl TxBuilder {
    pub fn id(mut self, id: TxId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn spend(mut self, id: OutputId) -> Self {
        self.spends.push(id);
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn signed_by(mut self, name: impl Into<String>) -> Self {
        self.signed_by = Some(name.into());
        self
    }

    pub fn proof(mut self, proof: Vec<u8>) -> Self {
        self.proofs.push(proof);
        self
    }

    pub fn build(self) -> Result<Tx, DomainError> {
        Tx::with_id(self.id, self.spends, self.outputs, self.signed_by, self.proofs)
    }
}

/// A minting record that creates outputs ex nihilo. Has no spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseTx {
    pub id: TxId,
    pub outputs: Vec<Output>,
}

impl CoinbaseTx {
    pub fn new(outputs: Vec<Output>) -> Result<CoinbaseTx, DomainError> {
        Self::with_id(None, outputs)
    }

    pub fn with_id(id: Option<TxId>, outputs: Vec<Output>) -> Result<CoinbaseTx, DomainError> {
        check_distinct_outputs(&outputs)?;
        let id = id.unwrap_or_else(|| derive_coinbase_id(&outputs));
        Ok(CoinbaseTx { id, outputs })
    }

    pub fn builder() -> CoinbaseBuilder {
        CoinbaseBuilder::default()
    }

    pub fn total_output_amount(&self) -> Option<Amount> {
        Output::total_amount(&self.outputs)
    }
}

#[derive(Debug, Default)]
pub struct CoinbaseBuilder {
    id: Option<TxId>,
    outputs: Vec<Output>,
}

impl CoinbaseBuilder {
    pub fn id(mut self, id: TxId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn build(self) -> Result<CoinbaseTx, DomainError> {
        CoinbaseTx::with_id(self.id, self.outputs)
    }
}

pub(crate) fn check_distinct_spends(spends: &[OutputId]) -> Result<(), DomainError> {
    if spends.is_empty() {
        return Err(crate::error::ValidationError::InvalidId(
            "transaction must spend at least one output".into(),
        )
        .into());
    }
    let mut seen = HashSet::with_capacity(spends.len());
    for id in spends {
        if !seen.insert(id) {
            return Err(DomainError::DuplicateSpendId(id.clone()));
        }
    }
    Ok(())
}

pub(crate) fn check_distinct_outputs(outputs: &[Output]) -> Result<(), DomainError> {
    if outputs.is_empty() {
        return Err(crate::error::ValidationError::InvalidId(
            "transaction must create at least one output".into(),
        )
        .into());
    }
    let mut seen = HashSet::with_capacity(outputs.len());
    for output in outputs {
        if !seen.insert(&output.id) {
            return Err(DomainError::DuplicateOutputId(output.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out(amount: u64) -> Output {
        Output::open(Amount::new(amount), None).unwrap()
    }

    #[test]
    fn rejects_empty_spends() {
        let err = Tx::new(vec![], vec![out(10)], None, vec![]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(crate::error::ValidationError::InvalidId(_))
        ));
    }

    #[test]
    fn rejects_empty_signed_by() {
        let spend = OutputId::new("a").unwrap();
        let err = Tx::new(vec![spend], vec![out(10)], Some(String::new()), vec![]).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(crate::error::ValidationError::InvalidId(_))
        ));
    }

    #[test]
    fn rejects_duplicate_spends() {
        let id = OutputId::new("a").unwrap();
        let err = Tx::new(vec![id.clone(), id], vec![out(10)], None, vec![]).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSpendId(_)));
    }

    #[test]
    fn rejects_duplicate_output_ids() {
        let shared = OutputId::new("shared").unwrap();
        let outputs = vec![
            Output::open(Amount::new(1), Some(shared.clone())).unwrap(),
            Output::open(Amount::new(2), Some(shared)).unwrap(),
        ];
        let err = Tx::new(vec![OutputId::new("a").unwrap()], outputs, None, vec![]).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateOutputId(_)));
    }

    #[test]
    fn builder_produces_same_tx_as_constructor() {
        let spend = OutputId::new("a").unwrap();
        let output = out(5);
        let via_new = Tx::new(vec![spend.clone()], vec![output.clone()], None, vec![]).unwrap();
        let via_builder = Tx::builder().spend(spend).output(output).build().unwrap();
        assert_eq!(via_new.id, via_builder.id);
    }

    #[test]
    fn coinbase_rejects_empty_outputs() {
        assert!(CoinbaseTx::new(vec![]).is_err());
    }

    #[test]
    fn total_input_ids_matches_spends() {
        let spend = OutputId::new("a").unwrap();
        let tx = Tx::new(vec![spend.clone()], vec![out(5)], None, vec![]).unwrap();
        assert_eq!(tx.total_input_ids().collect::<Vec<_>>(), vec![&spend]);
    }
}
