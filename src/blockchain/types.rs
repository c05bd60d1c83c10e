//! Transaction types and the registry error taxonomy.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wallet::provider::ProviderError;

/// Errors surfaced by the wallet session, submitter and registrar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No wallet provider is present.
    #[error("Wallet provider unavailable")]
    ProviderUnavailable,

    /// The user dismissed a wallet prompt. Nothing was broadcast.
    #[error("Request rejected by user")]
    UserRejected,

    /// Operation requires a connected wallet session.
    #[error("Wallet not connected")]
    NotConnected,

    /// The provider refused or failed a chain switch.
    #[error("Network switch failed: {0}")]
    NetworkSwitchFailed(String),

    /// Sender cannot cover value plus gas.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Contract execution reverted. The reason is passed through verbatim.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// No receipt within the wait window. The outcome is unknown.
    #[error("No receipt for {tx_hash} within the wait window; outcome unknown")]
    Timeout { tx_hash: TxHash },

    /// Rejected before any transaction was built.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reveal attempted before the minimum delay elapsed.
    #[error("Reveal too early: {remaining_secs} seconds remaining")]
    TooEarly { remaining_secs: u64 },

    /// Reveal data does not hash to the locally stored commitment.
    #[error("Reveal data does not match the stored commitment")]
    CommitmentMismatch,

    /// A confirmed commitment is awaiting reveal.
    #[error("A commitment is already pending reveal")]
    CommitmentPending,

    /// Session is on a different chain than the configured network.
    #[error("Wrong network: expected chain {expected}, got {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    /// Any other provider or RPC failure.
    #[error("Provider error: {0}")]
    Provider(String),
}

impl RegistryError {
    /// Whether the same request may be retried without changing its input.
    ///
    /// `Timeout` is not retryable: the first transaction may still be mined.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::UserRejected
                | RegistryError::NotConnected
                | RegistryError::ProviderUnavailable
                | RegistryError::NetworkSwitchFailed(_)
                | RegistryError::TooEarly { .. }
                | RegistryError::WrongNetwork { .. }
                | RegistryError::Provider(_)
        )
    }
}

impl From<ProviderError> for RegistryError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UserRejected => RegistryError::UserRejected,
            ProviderError::Disconnected => RegistryError::ProviderUnavailable,
            ProviderError::InsufficientFunds(detail) => RegistryError::InsufficientFunds(detail),
            ProviderError::Reverted(reason) => RegistryError::Reverted(reason),
            other => RegistryError::Provider(other.to_string()),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Lifecycle of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Broadcast, no receipt observed yet.
    Pending,
    /// Included in a block with the required depth.
    Confirmed,
    /// Included in a block but execution reverted.
    Failed,
}

/// A broadcast transaction tracked until its receipt arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: TxHash,
    /// Seconds since epoch when the transaction was broadcast.
    pub submitted_at: u64,
    pub confirmations: u64,
    pub status: TxStatus,
}

impl PendingTransaction {
    pub fn new(hash: TxHash, submitted_at: u64) -> Self {
        Self {
            hash,
            submitted_at,
            confirmations: 0,
            status: TxStatus::Pending,
        }
    }

    pub fn is_final(&self) -> bool {
        self.status != TxStatus::Pending
    }
}

/// Receipt as reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    /// Decoded revert reason for failed receipts, when available.
    pub revert_reason: Option<String>,
}

/// Normalized result of a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_mapping() {
        assert_eq!(
            RegistryError::from(ProviderError::UserRejected),
            RegistryError::UserRejected
        );
        assert_eq!(
            RegistryError::from(ProviderError::Reverted("too early".into())),
            RegistryError::Reverted("too early".into())
        );
        assert_eq!(
            RegistryError::from(ProviderError::Disconnected),
            RegistryError::ProviderUnavailable
        );
        assert!(matches!(
            RegistryError::from(ProviderError::UnrecognizedChain(5)),
            RegistryError::Provider(_)
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(RegistryError::UserRejected.is_retryable());
        assert!(!RegistryError::Reverted("commitment mismatch".into()).is_retryable());
        assert!(!RegistryError::Timeout { tx_hash: TxHash::ZERO }.is_retryable());
        assert!(!RegistryError::InsufficientFunds("need more".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::TooEarly { remaining_secs: 3590 };
        assert_eq!(err.to_string(), "Reveal too early: 3590 seconds remaining");

        let err = RegistryError::WrongNetwork {
            expected: 11155111,
            actual: 1,
        };
        assert!(err.to_string().contains("11155111"));
    }

    #[test]
    fn test_pending_transaction_lifecycle() {
        let mut tx = PendingTransaction::new(TxHash::ZERO, 100);
        assert!(!tx.is_final());
        tx.status = TxStatus::Confirmed;
        assert!(tx.is_final());
    }
}
