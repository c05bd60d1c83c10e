//! Transaction submission subsystem.
//!
//! # Data Flow
//! ```text
//! contract call (SolCall + value)
//!     → transaction.rs (sender from the wallet session, build request)
//!     → wallet provider (sign, broadcast → tx hash)
//!     → transaction.rs (poll receipt until confirmed / reverted / timeout)
//!     → TransactionResult or a distinct RegistryError
//! ```
//!
//! # Constraints
//! - Never submits while the session is disconnected
//! - No hidden retries
//! - Timeout means "outcome unknown", reported with the hash

pub mod transaction;
pub mod types;

pub use transaction::TransactionSubmitter;
pub use types::{
    PendingTransaction, RegistryError, RegistryResult, TransactionResult, TxReceipt, TxStatus,
};
