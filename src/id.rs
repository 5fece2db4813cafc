//! Identifiers and amounts: [`OutputId`], [`TxId`], [`Amount`], plus the
//! content-addressed id derivations used by [`crate::transaction`].
//!
//! Ids are opaque, validated strings rather than raw hash bytes so hosts
//! can supply human-readable ids ("bill", "change") as well as derived
//! hex ids — both shapes satisfy the same character-class contract.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{DomainError, ValidationError};
use crate::output::Output;

/// Largest amount representable by an [`Amount`].
pub const MAX_AMOUNT: u64 = u64::MAX;

const MAX_ID_LEN: usize = 64;

fn validate_id_str(value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(ValidationError::InvalidId(value.to_string()).into());
    }
    if value.chars().count() > MAX_ID_LEN {
        return Err(ValidationError::InvalidId(value.to_string()).into());
    }
    let allowed = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !allowed {
        return Err(ValidationError::InvalidId(value.to_string()).into());
    }
    Ok(())
}

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                validate_id_str(&value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = DomainError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = DomainError;
            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;
            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(OutputId);
opaque_id!(TxId);

/// A non-negative whole amount of indivisible value units.
///
/// Wrapped rather than a bare `u64` so arithmetic goes through
/// `checked_add`/`checked_sub` at every call site that matters for the
/// conservation invariant (I3), instead of silently wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn new(value: u64) -> Self {
        Amount(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn sum<I: IntoIterator<Item = Amount>>(amounts: I) -> Option<Amount> {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(value)
    }
}

// ==============================================================================
// Canonical encoding (content addressing)
// ==============================================================================

/// Appends a length-prefixed UTF-8 string to `buf`: a `u32` little-endian
/// length followed by the raw bytes. Used so concatenated fields can't be
/// ambiguously re-split (e.g. `"ab" + "c"` vs `"a" + "bc"`).
pub(crate) fn encode_str_into(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

pub(crate) fn encode_amount_into(buf: &mut Vec<u8>, amount: Amount) {
    buf.extend_from_slice(&amount.0.to_le_bytes());
}

/// Implemented by every value that participates in content-addressed id
/// derivation, so `derive_tx_id`/`derive_coinbase_id` stay agnostic of the
/// exact field layout of [`Output`]/[`crate::lock::Lock`].
pub(crate) trait CanonicalEncode {
    fn encode_canonical(&self, buf: &mut Vec<u8>);
}

fn hash_to_hex32(buf: &[u8]) -> String {
    let digest = Sha256::digest(buf);
    hex::encode(&digest[..16])
}

/// Derive a transaction id from its spends and outputs. `signed_by` and
/// `proofs` are authorization context and never influence the id.
pub fn derive_tx_id(spends: &[OutputId], outputs: &[Output]) -> TxId {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"tx1");
    buf.extend_from_slice(&(spends.len() as u32).to_le_bytes());
    for id in spends {
        encode_str_into(&mut buf, id.as_str());
    }
    buf.extend_from_slice(&(outputs.len() as u32).to_le_bytes());
    for output in outputs {
        output.encode_canonical(&mut buf);
    }
    // A hex digest always satisfies the id character class, so this
    // cannot fail validation.
    TxId::new(hash_to_hex32(&buf)).expect("derived tx id is always valid")
}

/// Derive a coinbase id from its outputs. Uses a distinct domain separator
/// from [`derive_tx_id`] so a `Tx` and a `CoinbaseTx` built from the same
/// outputs never collide (P7).
pub fn derive_coinbase_id(outputs: &[Output]) -> TxId {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"cb1");
    buf.extend_from_slice(&(outputs.len() as u32).to_le_bytes());
    for output in outputs {
        output.encode_canonical(&mut buf);
    }
    TxId::new(hash_to_hex32(&buf)).expect("derived coinbase id is always valid")
}

/// Generate a fresh random output id from a cryptographically strong
/// source, formatted as 32 lowercase hex characters — the same shape as a
/// derived id, so callers can't tell the two apart by inspection.
pub fn derive_random_output_id() -> OutputId {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    OutputId::new(hex::encode(bytes)).expect("random output id is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::Lock;

    #[test]
    fn rejects_empty_and_whitespace_ids() {
        assert!(OutputId::new("").is_err());
        assert!(OutputId::new("   ").is_err());
    }

    #[test]
    fn rejects_overlong_ids() {
        let long = "a".repeat(65);
        assert!(OutputId::new(long).is_err());
        let max = "a".repeat(64);
        assert!(OutputId::new(max).is_ok());
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(OutputId::new("has space").is_err());
        assert!(OutputId::new("has.dot").is_err());
        assert!(OutputId::new("ok_id-123").is_ok());
    }

    #[test]
    fn tx_id_is_content_addressed_and_ignores_auth_context() {
        let spends = vec![OutputId::new("a").unwrap()];
        let outputs = vec![Output::open(Amount::new(10), None).unwrap()];
        let id1 = derive_tx_id(&spends, &outputs);
        let id2 = derive_tx_id(&spends, &outputs);
        assert_eq!(id1, id2);
        assert_eq!(id1.as_str().len(), 32);
    }

    #[test]
    fn tx_and_coinbase_ids_differ_for_same_outputs() {
        let outputs = vec![Output::open(Amount::new(10), None).unwrap()];
        let tx_id = derive_tx_id(&[], &outputs);
        let cb_id = derive_coinbase_id(&outputs);
        assert_ne!(tx_id, cb_id);
    }

    #[test]
    fn tx_id_changes_when_lock_changes() {
        let outputs_a = vec![Output::locked_with(Lock::Open, Amount::new(10), None).unwrap()];
        let outputs_b = vec![Output::locked_with(
            Lock::NamedOwner {
                name: "alice".into(),
            },
            Amount::new(10),
            None,
        )
        .unwrap()];
        assert_ne!(derive_tx_id(&[], &outputs_a), derive_tx_id(&[], &outputs_b));
    }

    #[test]
    fn random_ids_are_unique() {
        let a = derive_random_output_id();
        let b = derive_random_output_id();
        assert_ne!(a, b);
    }
}
