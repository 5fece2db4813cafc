//! [`Output`]: a value chunk, the atom the ledger moves around.

use crate::error::{DomainError, ValidationError};
use crate::id::{derive_random_output_id, Amount, CanonicalEncode, OutputId};
use crate::lock::Lock;

/// A discrete, immutable chunk of value: an id, a positive amount, and the
/// lock that authorizes spending it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub id: OutputId,
    pub amount: Amount,
    pub lock: Lock,
}

impl Output {
    /// Base factory: every other factory is a thin wrapper over this one.
    /// Generates a random id when `id` is omitted (§4.1/§9). Rejects a
    /// `Lock::NamedOwner` whose `name` is empty (spec.md §3:
    /// `NamedOwner{name: non-empty string}`) regardless of which factory
    /// the lock arrived through, since `Lock`'s fields are public and a
    /// caller may build one directly instead of going through `owned_by`.
    pub fn locked_with(lock: Lock, amount: Amount, id: Option<OutputId>) -> Result<Output, DomainError> {
        if amount.get() == 0 {
            return Err(ValidationError::InvalidAmount("output amount must be positive".into()).into());
        }
        if let Lock::NamedOwner { name } = &lock {
            if name.trim().is_empty() {
                return Err(ValidationError::InvalidLockData("owner name must be non-empty".into()).into());
            }
        }
        let id = id.unwrap_or_else(derive_random_output_id);
        Ok(Output { id, amount, lock })
    }

    /// An output anyone can spend.
    pub fn open(amount: Amount, id: Option<OutputId>) -> Result<Output, DomainError> {
        Self::locked_with(Lock::Open, amount, id)
    }

    /// An output spendable only by a transaction carrying `signed_by == name`.
    /// `name` must be non-empty (spec.md §3: `NamedOwner{name: non-empty string}`).
    pub fn owned_by(name: impl Into<String>, amount: Amount, id: Option<OutputId>) -> Result<Output, DomainError> {
        Self::locked_with(Lock::NamedOwner { name: name.into() }, amount, id)
    }

    /// An output spendable with a detached ed25519 signature over the
    /// consuming transaction's id, verified against `pubkey_b64`.
    pub fn signed_by(pubkey_b64: impl Into<String>, amount: Amount, id: Option<OutputId>) -> Result<Output, DomainError> {
        Self::locked_with(
            Lock::PublicKey {
                key: pubkey_b64.into(),
            },
            amount,
            id,
        )
    }

    /// Total amount of a slice of outputs. `None` on overflow.
    pub fn total_amount(outputs: &[Output]) -> Option<Amount> {
        Amount::sum(outputs.iter().map(|o| o.amount))
    }
}

impl CanonicalEncode for Output {
    fn encode_canonical(&self, buf: &mut Vec<u8>) {
        crate::id::encode_str_into(buf, self.id.as_str());
        crate::id::encode_amount_into(buf, self.amount);
        self.lock.encode_canonical(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_amount_is_rejected() {
        assert!(Output::open(Amount::new(0), None).is_err());
    }

    #[test]
    fn omitted_id_generates_random_id() {
        let a = Output::open(Amount::new(10), None).unwrap();
        let b = Output::open(Amount::new(10), None).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn supplied_id_is_used_as_is() {
        let id = OutputId::new("bill").unwrap();
        let output = Output::open(Amount::new(500), Some(id.clone())).unwrap();
        assert_eq!(output.id, id);
    }

    #[test]
    fn owned_by_sets_named_owner_lock() {
        let output = Output::owned_by("alice", Amount::new(10), None).unwrap();
        assert_eq!(
            output.lock,
            Lock::NamedOwner {
                name: "alice".into()
            }
        );
    }

    #[test]
    fn owned_by_rejects_empty_name() {
        assert!(Output::owned_by("", Amount::new(10), None).is_err());
        assert!(Output::owned_by("   ", Amount::new(10), None).is_err());
    }

    #[test]
    fn locked_with_rejects_empty_owner_name_built_directly() {
        let lock = Lock::NamedOwner { name: String::new() };
        assert!(Output::locked_with(lock, Amount::new(10), None).is_err());
    }
}
