//! The wallet provider boundary.
//!
//! Everything the registration core needs from a wallet: account access,
//! chain identity and switching, balance reads, broadcast, receipts and
//! change notifications. Provider errors are classified by their stable
//! EIP-1193 / JSON-RPC code, never by message text.

use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::blockchain::types::TxReceipt;
use crate::network::NetworkProfile;

/// EIP-1193: user rejected the request.
pub const CODE_USER_REJECTED: i64 = 4001;
/// EIP-1193: provider is disconnected from all chains.
pub const CODE_DISCONNECTED: i64 = 4900;
/// EIP-1193: provider is not connected to the requested chain.
pub const CODE_CHAIN_DISCONNECTED: i64 = 4901;
/// Chain has not been added to the wallet.
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;
/// JSON-RPC execution reverted.
pub const CODE_EXECUTION_REVERTED: i64 = 3;

/// Errors reported by a wallet provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("user rejected the request")]
    UserRejected,

    #[error("provider disconnected")]
    Disconnected,

    #[error("unrecognized chain {0}")]
    UnrecognizedChain(u64),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ProviderError {
    /// Classify a raw provider error code.
    ///
    /// `chain_id` is the chain a switch was requested for, if any.
    pub fn from_code(code: i64, message: impl Into<String>, chain_id: Option<u64>) -> Self {
        let message = message.into();
        match code {
            CODE_USER_REJECTED => ProviderError::UserRejected,
            CODE_DISCONNECTED | CODE_CHAIN_DISCONNECTED => ProviderError::Disconnected,
            CODE_UNRECOGNIZED_CHAIN => ProviderError::UnrecognizedChain(chain_id.unwrap_or_default()),
            CODE_EXECUTION_REVERTED => ProviderError::Reverted(message),
            _ => ProviderError::Rpc { code, message },
        }
    }

    /// The stable code for this error.
    pub fn code(&self) -> i64 {
        match self {
            ProviderError::UserRejected => CODE_USER_REJECTED,
            ProviderError::Disconnected => CODE_DISCONNECTED,
            ProviderError::UnrecognizedChain(_) => CODE_UNRECOGNIZED_CHAIN,
            ProviderError::Reverted(_) => CODE_EXECUTION_REVERTED,
            ProviderError::InsufficientFunds(_) => -32000,
            ProviderError::Rpc { code, .. } => *code,
        }
    }
}

/// Notifications pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Exposed accounts changed. Empty means the wallet disconnected us.
    AccountsChanged(Vec<Address>),
    /// Active chain changed.
    ChainChanged(u64),
    /// Provider lost its connection.
    Disconnected,
}

/// An injected wallet (browser extension, local key, test double).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt for account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    /// Currently active chain.
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Ask the wallet to make `chain_id` active.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    /// Teach the wallet a chain it does not know.
    async fn add_chain(&self, profile: &NetworkProfile) -> Result<(), ProviderError>;

    /// Native balance in base units.
    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError>;

    /// Latest block number.
    async fn block_number(&self) -> Result<u64, ProviderError>;

    /// Sign and broadcast. Returns as soon as the hash is known.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ProviderError>;

    /// Receipt for a transaction, `None` while it is still pending.
    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ProviderError>;

    /// Subscribe to account and chain change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_classify() {
        assert_eq!(
            ProviderError::from_code(4001, "User denied", None),
            ProviderError::UserRejected
        );
        assert_eq!(
            ProviderError::from_code(4902, "Unrecognized chain ID", Some(80002)),
            ProviderError::UnrecognizedChain(80002)
        );
        assert_eq!(
            ProviderError::from_code(4900, "disconnected", None),
            ProviderError::Disconnected
        );
        assert_eq!(
            ProviderError::from_code(3, "too early", None),
            ProviderError::Reverted("too early".into())
        );
        assert!(matches!(
            ProviderError::from_code(-32603, "internal", None),
            ProviderError::Rpc { code: -32603, .. }
        ));
    }

    #[test]
    fn test_message_does_not_drive_classification() {
        let err = ProviderError::from_code(-32000, "User rejected the request", None);
        assert_eq!(err.code(), -32000);
        assert!(matches!(err, ProviderError::Rpc { .. }));
    }
}
