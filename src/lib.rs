//! An in-process unspent-output (UTXO-style) bookkeeping engine.
//!
//! This crate tracks discrete, immutable chunks of value ("outputs"),
//! consumes them through transactions that create new outputs, and
//! preserves full provenance (who created each output, which transaction
//! spent it). It is meant as a reusable component inside host applications
//! — virtual-currency systems, loyalty/points programs, internal
//! accounting, event-sourced workflows, audit trails — rather than a
//! standalone service: no networking, no SQL driver, no CLI.
//!
//! Start at [`ledger::Ledger`]: [`ledger::Ledger::with_genesis`] creates a
//! ledger seeded with initial outputs, [`ledger::Ledger::apply`] spends
//! outputs and creates new ones, and [`ledger::Ledger::apply_coinbase`]
//! mints outputs ex nihilo. [`output::Output`] and [`lock::Lock`] build the
//! values being moved around; [`history`] supplies the provenance port
//! that the ledger writes through.

pub mod error;
pub mod history;
pub mod id;
pub mod ledger;
pub mod lock;
pub mod output;
pub mod serialize;
pub mod transaction;
pub mod unspent_set;

pub use error::{AuthorizationError, DomainError, ValidationError};
pub use history::memory::MemoryHistory;
pub use history::{CreatedBy, HistoryRepository, OutputHistory, OutputStatus, SpentOutputData};
pub use id::{derive_coinbase_id, derive_random_output_id, derive_tx_id, Amount, OutputId, TxId, MAX_AMOUNT};
pub use ledger::Ledger;
pub use lock::Lock;
pub use output::Output;
pub use serialize::LedgerSnapshot;
pub use transaction::{CoinbaseTx, Tx};
pub use unspent_set::UnspentSet;
