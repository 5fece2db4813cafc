//! Error types for the ledger core.

use crate::id::{OutputId, TxId};

// ==============================================================================
// Authorization Errors
// ==============================================================================

/// Failures raised while validating a [`crate::lock::Lock`] against a spend.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("output `{lock_name}` is owned by a different signer (signed_by={signed_by:?})")]
    NotOwner {
        lock_name: String,
        signed_by: Option<String>,
    },

    #[error("missing proof at input index {input_index}")]
    MissingProof { input_index: usize },

    #[error("invalid signature at input index {input_index}")]
    InvalidSignature { input_index: usize },

    #[error("custom lock denied the spend: {0}")]
    CustomDenied(String),
}

// ==============================================================================
// Validation Errors
// ==============================================================================

/// Failures raised at construction boundaries (ids, amounts, lock data).
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid id `{0}`")]
    InvalidId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid lock data: {0}")]
    InvalidLockData(String),

    #[error("unknown lock type `{0}`")]
    UnknownLockType(String),
}

// ==============================================================================
// Domain Errors
// ==============================================================================

/// Top-level error type for the ledger core. Every operational failure a
/// caller can observe surfaces through one of these variants.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("output id already exists: {0}")]
    DuplicateOutputId(OutputId),

    #[error("duplicate spend id within a single transaction: {0}")]
    DuplicateSpendId(OutputId),

    #[error("transaction already applied: {0}")]
    DuplicateTx(TxId),

    #[error("output already spent (or never existed): {0}")]
    OutputAlreadySpent(OutputId),

    #[error("insufficient spends: in={in_sum}, out={out_sum}")]
    InsufficientSpends { in_sum: u64, out_sum: u64 },

    #[error("genesis is only allowed on an empty ledger")]
    GenesisNotAllowed,

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl DomainError {
    /// A stable numeric code, suitable for serialization over a wire
    /// protocol where callers may not share this crate's type.
    pub fn code(&self) -> u32 {
        match self {
            DomainError::DuplicateOutputId(_) => 1,
            DomainError::DuplicateSpendId(_) => 2,
            DomainError::DuplicateTx(_) => 3,
            DomainError::OutputAlreadySpent(_) => 4,
            DomainError::InsufficientSpends { .. } => 5,
            DomainError::GenesisNotAllowed => 6,
            DomainError::Authorization(AuthorizationError::NotOwner { .. }) => 7,
            DomainError::Authorization(AuthorizationError::MissingProof { .. }) => 8,
            DomainError::Authorization(AuthorizationError::InvalidSignature { .. }) => 9,
            DomainError::Authorization(AuthorizationError::CustomDenied(_)) => 10,
            DomainError::Validation(ValidationError::InvalidId(_)) => 11,
            DomainError::Validation(ValidationError::InvalidAmount(_)) => 12,
            DomainError::Validation(ValidationError::InvalidLockData(_)) => 13,
            DomainError::Validation(ValidationError::UnknownLockType(_)) => 14,
            DomainError::Persistence(_) => 15,
        }
    }
}
