//! Local-key wallet provider.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//!
//! Account access is never prompted, so `request_accounts` always exposes
//! the signer's address. Chain switching moves between profiles the wallet
//! has been taught with `add_chain`.

use alloy::eips::BlockId;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::decode_revert_reason;
use alloy::transports::{TransportError, TransportResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::blockchain::types::TxReceipt;
use crate::network::NetworkProfile;
use crate::wallet::provider::{ProviderError, ProviderEvent, WalletProvider};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "REGISTRY_WALLET_PRIVATE_KEY";

/// EIP-1193: requested account is not authorized.
const CODE_UNAUTHORIZED: i64 = 4100;
const CODE_INTERNAL: i64 = -32603;

/// How long a broadcast request is kept for revert-reason replay.
const SENT_RETENTION: Duration = Duration::from_secs(3600);

type DynProvider = Arc<dyn Provider + Send + Sync>;

struct ActiveChain {
    chain_id: u64,
    provider: DynProvider,
}

/// Wallet provider signing with a local private key over JSON-RPC.
pub struct LocalWalletProvider {
    signer: PrivateKeySigner,
    chains: Mutex<HashMap<u64, NetworkProfile>>,
    active: RwLock<ActiveChain>,
    /// Requests we broadcast, kept for revert-reason replay until their
    /// receipt is read or they age out.
    sent: DashMap<TxHash, (Instant, TransactionRequest)>,
    events: broadcast::Sender<ProviderEvent>,
    rpc_timeout: Duration,
}

impl LocalWalletProvider {
    /// Create a provider from a hex-encoded private key (with or without 0x).
    pub fn from_private_key(
        private_key_hex: &str,
        profile: &NetworkProfile,
        rpc_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex.parse().map_err(|e| ProviderError::Rpc {
            code: CODE_UNAUTHORIZED,
            message: format!("Invalid private key format: {}", e),
        })?;

        let provider = connect(&signer, profile)?;
        let (events, _) = broadcast::channel(16);

        tracing::info!(
            address = %signer.address(),
            chain_id = profile.chain_id,
            "Local wallet initialized"
        );

        Ok(Self {
            signer,
            chains: Mutex::new(HashMap::from([(profile.chain_id, profile.clone())])),
            active: RwLock::new(ActiveChain {
                chain_id: profile.chain_id,
                provider,
            }),
            sent: DashMap::new(),
            events,
            rpc_timeout,
        })
    }

    /// Load the key from `REGISTRY_WALLET_PRIVATE_KEY`.
    pub fn from_env(profile: &NetworkProfile, rpc_timeout: Duration) -> Result<Self, ProviderError> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| ProviderError::Rpc {
            code: CODE_UNAUTHORIZED,
            message: format!("Environment variable {} not set", PRIVATE_KEY_ENV_VAR),
        })?;
        Self::from_private_key(&private_key, profile, rpc_timeout)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn active(&self) -> (u64, DynProvider) {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        (active.chain_id, active.provider.clone())
    }

    async fn rpc<T, F>(&self, fut: F) -> Result<T, ProviderError>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        match timeout(self.rpc_timeout, fut).await {
            Ok(result) => result.map_err(map_transport_error),
            Err(_) => Err(ProviderError::Rpc {
                code: CODE_INTERNAL,
                message: format!("RPC timeout after {} seconds", self.rpc_timeout.as_secs()),
            }),
        }
    }

    fn track_sent(&self, hash: TxHash, request: TransactionRequest) {
        self.prune_sent(SENT_RETENTION);
        self.sent.insert(hash, (Instant::now(), request));
    }

    fn take_sent(&self, hash: &TxHash) -> Option<TransactionRequest> {
        self.sent.remove(hash).map(|(_, (_, request))| request)
    }

    /// Drop requests whose receipt was never read within `retention`.
    fn prune_sent(&self, retention: Duration) {
        self.sent.retain(|_, (sent_at, _)| sent_at.elapsed() < retention);
    }

    /// Re-execute a failed transaction at its block to recover the reason.
    async fn replay_revert_reason(&self, hash: TxHash, block_number: u64) -> Option<String> {
        let request = self.take_sent(&hash)?;
        let (_, provider) = self.active();
        let call = provider.call(request).block(BlockId::number(block_number));
        match self.rpc(call).await {
            Err(ProviderError::Reverted(reason)) => Some(reason),
            Err(e) => {
                tracing::debug!(tx_hash = %hash, error = %e, "Revert replay failed");
                None
            }
            Ok(_) => None,
        }
    }
}

fn connect(signer: &PrivateKeySigner, profile: &NetworkProfile) -> Result<DynProvider, ProviderError> {
    let url: url::Url = profile.rpc_url.parse().map_err(|e| ProviderError::Rpc {
        code: CODE_INTERNAL,
        message: format!("Invalid RPC URL '{}': {}", profile.rpc_url, e),
    })?;
    let wallet = EthereumWallet::from(signer.clone());
    Ok(Arc::new(ProviderBuilder::new().wallet(wallet).connect_http(url)) as DynProvider)
}

/// Classify a JSON-RPC failure.
///
/// Nodes report insufficient funds as a generic -32000 server error, so that
/// one case is recognised by its message.
fn map_transport_error(e: TransportError) -> ProviderError {
    let Some(payload) = e.as_error_resp() else {
        if e.is_transport_error() {
            return ProviderError::Disconnected;
        }
        return ProviderError::Rpc {
            code: CODE_INTERNAL,
            message: e.to_string(),
        };
    };

    if let Some(reason) = payload
        .as_revert_data()
        .and_then(|data| decode_revert_reason(&data))
    {
        return ProviderError::Reverted(reason);
    }
    if payload.code == -32000 && payload.message.contains("insufficient funds") {
        return ProviderError::InsufficientFunds(payload.message.to_string());
    }
    ProviderError::from_code(payload.code, payload.message.to_string(), None)
}

#[async_trait]
impl WalletProvider for LocalWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        Ok(vec![self.signer.address()])
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.active().0)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        if self.active().0 == chain_id {
            return Ok(());
        }

        let profile = self
            .chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&chain_id)
            .cloned()
            .ok_or(ProviderError::UnrecognizedChain(chain_id))?;

        let provider = connect(&self.signer, &profile)?;
        let actual = self.rpc(provider.get_chain_id()).await?;
        if actual != chain_id {
            return Err(ProviderError::Rpc {
                code: CODE_INTERNAL,
                message: format!("RPC for chain {} reports chain {}", chain_id, actual),
            });
        }

        *self.active.write().unwrap_or_else(|e| e.into_inner()) = ActiveChain { chain_id, provider };
        tracing::info!(chain_id = chain_id, rpc_url = %profile.rpc_url, "Local wallet switched chain");
        let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, profile: &NetworkProfile) -> Result<(), ProviderError> {
        url::Url::parse(&profile.rpc_url).map_err(|e| ProviderError::Rpc {
            code: CODE_INTERNAL,
            message: format!("Invalid RPC URL '{}': {}", profile.rpc_url, e),
        })?;
        self.chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(profile.chain_id, profile.clone());
        Ok(())
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        let (_, provider) = self.active();
        self.rpc(provider.get_balance(address)).await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let (_, provider) = self.active();
        self.rpc(provider.get_block_number()).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ProviderError> {
        if tx.from.is_some_and(|from| from != self.signer.address()) {
            return Err(ProviderError::Rpc {
                code: CODE_UNAUTHORIZED,
                message: "transaction sender is not the local signer".to_string(),
            });
        }

        let (_, provider) = self.active();
        let value = tx.value.unwrap_or_default();
        if !value.is_zero() {
            let balance = self.rpc(provider.get_balance(self.signer.address())).await?;
            if balance < value {
                return Err(ProviderError::InsufficientFunds(format!(
                    "balance {} below value {}",
                    balance, value
                )));
            }
        }

        let pending = self.rpc(provider.send_transaction(tx.clone())).await?;
        let hash = *pending.tx_hash();
        self.track_sent(hash, tx);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ProviderError> {
        let (_, provider) = self.active();
        let Some(receipt) = self.rpc(provider.get_transaction_receipt(hash)).await? else {
            return Ok(None);
        };

        let block_number = receipt.block_number.unwrap_or_default();
        let success = receipt.status();
        let revert_reason = if success {
            self.take_sent(&hash);
            None
        } else {
            self.replay_revert_reason(hash, block_number).await
        };

        Ok(Some(TxReceipt {
            transaction_hash: hash,
            block_number,
            success,
            revert_reason,
        }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for LocalWalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletProvider")
            .field("address", &self.signer.address())
            .field("chain_id", &self.active().0)
            .finish()
    }
}
