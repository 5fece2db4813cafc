//! Authorization predicates attached to outputs.
//!
//! [`Lock`] is a closed, tagged sum type (§9 of the design notes: a closed
//! sum type rather than an open trait hierarchy, so the built-in variants
//! stay exhaustively matchable) with one escape hatch, [`Lock::Custom`],
//! whose payload is a boxed [`CustomLock`] trait object produced by a
//! registered deserializer (see [`registry`]).

pub mod registry;

use base64::Engine;
use ed25519_dalek::{Signature, VerifyingKey};
use serde_json::{Map, Value};

use crate::error::{AuthorizationError, DomainError, ValidationError};
use crate::id::{encode_str_into, CanonicalEncode};
use crate::transaction::Tx;

/// A user-defined lock variant. Implementations encode arbitrary
/// authorization predicates; failures should be reported as
/// [`AuthorizationError::CustomDenied`].
pub trait CustomLock: std::fmt::Debug + Send + Sync {
    /// The type tag this lock serializes under.
    fn tag(&self) -> &str;

    /// Validate a spend of the output this lock guards.
    fn validate(&self, tx: &Tx, input_index: usize) -> Result<(), DomainError>;

    /// The lock-data fields (everything but `type`) to serialize.
    fn data_fields(&self) -> Map<String, Value>;

    fn clone_box(&self) -> Box<dyn CustomLock>;

    fn eq_box(&self, other: &dyn CustomLock) -> bool;
}

impl Clone for Box<dyn CustomLock> {
    fn clone(&self) -> Self {
        self.as_ref().clone_box()
    }
}

impl PartialEq for Box<dyn CustomLock> {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref().eq_box(other.as_ref())
    }
}

impl Eq for Box<dyn CustomLock> {}

/// An authorization predicate attached to an [`crate::output::Output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lock {
    /// Authorizes any spender.
    Open,
    /// Requires the spending transaction to carry `signed_by == name`.
    NamedOwner { name: String },
    /// Requires a detached ed25519 signature of the tx id at the matching
    /// input index, verifying against `key` (base64 of 32 raw bytes).
    PublicKey { key: String },
    /// A user-registered variant; see [`registry`].
    Custom(Box<dyn CustomLock>),
}

const RESERVED_TAG_NONE: &str = "none";
const RESERVED_TAG_OWNER: &str = "owner";
const RESERVED_TAG_PUBKEY: &str = "pubkey";

impl Lock {
    /// Validate this lock against a spend of `tx` at `input_index`.
    /// Lock validations run in input order (the `Ledger` is responsible
    /// for calling this once per spend, in order).
    pub fn validate(&self, tx: &Tx, input_index: usize) -> Result<(), DomainError> {
        match self {
            Lock::Open => Ok(()),
            Lock::NamedOwner { name } => match &tx.signed_by {
                Some(signed_by) if signed_by == name => Ok(()),
                signed_by => Err(AuthorizationError::NotOwner {
                    lock_name: name.clone(),
                    signed_by: signed_by.clone(),
                }
                .into()),
            },
            Lock::PublicKey { key } => validate_public_key_lock(key, tx, input_index),
            Lock::Custom(custom) => custom.validate(tx, input_index),
        }
    }

    /// The type tag used by the serialization format (§4.8).
    pub fn tag(&self) -> &str {
        match self {
            Lock::Open => RESERVED_TAG_NONE,
            Lock::NamedOwner { .. } => RESERVED_TAG_OWNER,
            Lock::PublicKey { .. } => RESERVED_TAG_PUBKEY,
            Lock::Custom(custom) => custom.tag(),
        }
    }
}

impl CanonicalEncode for Lock {
    fn encode_canonical(&self, buf: &mut Vec<u8>) {
        encode_str_into(buf, self.tag());
        match self {
            Lock::Open => {}
            Lock::NamedOwner { name } => encode_str_into(buf, name),
            Lock::PublicKey { key } => encode_str_into(buf, key),
            Lock::Custom(custom) => {
                for (field, value) in custom.data_fields() {
                    encode_str_into(buf, &field);
                    encode_str_into(buf, &value.to_string());
                }
            }
        }
    }
}

fn validate_public_key_lock(key_b64: &str, tx: &Tx, input_index: usize) -> Result<(), DomainError> {
    let proof = tx
        .proofs
        .get(input_index)
        .ok_or(AuthorizationError::MissingProof { input_index })?;

    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(key_b64)
        .map_err(|_| AuthorizationError::InvalidSignature { input_index })?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| AuthorizationError::InvalidSignature { input_index })?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| AuthorizationError::InvalidSignature { input_index })?;

    let sig_bytes: [u8; 64] = proof
        .as_slice()
        .try_into()
        .map_err(|_| AuthorizationError::InvalidSignature { input_index })?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify_strict(tx.id.as_str().as_bytes(), &signature)
        .map_err(|_| AuthorizationError::InvalidSignature { input_index }.into())
}

// ==============================================================================
// Serialization (§4.8 lock encoding)
// ==============================================================================

/// Encode a lock as the `{type, ...}` object described in §4.8.
pub fn lock_to_value(lock: &Lock) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(lock.tag().to_string()));
    match lock {
        Lock::Open => {}
        Lock::NamedOwner { name } => {
            map.insert("name".to_string(), Value::String(name.clone()));
        }
        Lock::PublicKey { key } => {
            map.insert("key".to_string(), Value::String(key.clone()));
        }
        Lock::Custom(custom) => {
            for (field, value) in custom.data_fields() {
                map.insert(field, value);
            }
        }
    }
    Value::Object(map)
}

/// Decode a lock from the `{type, ...}` object described in §4.8.
/// A registered deserializer for `type` always takes precedence, even for
/// the reserved built-in tags.
pub fn lock_from_value(value: &Value) -> Result<Lock, DomainError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ValidationError::InvalidLockData("lock data must be an object".into()))?;
    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::InvalidLockData("missing `type` field".into()))?;

    if let Some(deserializer) = registry::get(tag) {
        let mut data = obj.clone();
        data.remove("type");
        return deserializer(&data).map(Lock::Custom);
    }

    match tag {
        RESERVED_TAG_NONE => Ok(Lock::Open),
        RESERVED_TAG_OWNER => {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::InvalidLockData("missing `name` field".into()))?;
            if name.trim().is_empty() {
                return Err(ValidationError::InvalidLockData("owner name must be non-empty".into()).into());
            }
            Ok(Lock::NamedOwner {
                name: name.to_string(),
            })
        }
        RESERVED_TAG_PUBKEY => {
            let key = obj
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::InvalidLockData("missing `key` field".into()))?;
            Ok(Lock::PublicKey {
                key: key.to_string(),
            })
        }
        other => Err(ValidationError::UnknownLockType(other.to_string()).into()),
    }
}
