//! Transaction submission and confirmation monitoring.
//!
//! # Responsibilities
//! - Build contract calls from the active wallet session
//! - Broadcast through the wallet provider
//! - Wait for a receipt with the required confirmation depth
//!
//! # Design Decisions
//! - Each call broadcasts exactly once. Retrying is the caller's decision,
//!   since a resubmission may duplicate a real-world effect.
//! - Dropping a [`TransactionSubmitter::confirm`] future only stops local
//!   waiting; the transaction may still be mined.
//! - Submissions through one submitter are serialized, so transactions from
//!   the session's account are broadcast in nonce order.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, timeout};

use crate::blockchain::types::{
    PendingTransaction, RegistryError, RegistryResult, TransactionResult, TxReceipt, TxStatus,
};
use crate::clock::{Clock, SystemClock};
use crate::config::TransactionConfig;
use crate::observability::metrics;
use crate::wallet::provider::WalletProvider;
use crate::wallet::session::WalletSession;

/// Fallback when a failed receipt carries no decodable reason.
const UNKNOWN_REVERT_REASON: &str = "execution reverted";

/// Submits contract calls for one wallet session.
pub struct TransactionSubmitter {
    session: Arc<WalletSession>,
    config: TransactionConfig,
    clock: Arc<dyn Clock>,
    in_flight: tokio::sync::Mutex<()>,
    last: Mutex<Option<PendingTransaction>>,
}

impl TransactionSubmitter {
    pub fn new(session: Arc<WalletSession>, config: TransactionConfig) -> Self {
        Self {
            session,
            config,
            clock: Arc::new(SystemClock),
            in_flight: tokio::sync::Mutex::new(()),
            last: Mutex::new(None),
        }
    }

    /// Use `clock` for submission timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &WalletSession {
        &self.session
    }

    /// Most recently broadcast transaction and its last observed status.
    pub fn last_transaction(&self) -> Option<PendingTransaction> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Call `call` on `contract`, sending `value`, and wait for confirmation.
    pub async fn submit<C: SolCall>(
        &self,
        contract: Address,
        call: &C,
        value: U256,
    ) -> RegistryResult<TransactionResult> {
        tracing::debug!(
            contract = %contract,
            function = C::SIGNATURE,
            value = %value,
            "Submitting contract call"
        );
        self.submit_calldata(contract, Bytes::from(call.abi_encode()), value)
            .await
    }

    /// Broadcast raw calldata and wait for confirmation.
    pub async fn submit_calldata(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> RegistryResult<TransactionResult> {
        let _guard = self.in_flight.lock().await;
        let pending = self.broadcast_unguarded(to, data, value).await?;
        self.confirm(&pending).await
    }

    /// Broadcast without waiting for a receipt.
    ///
    /// Callers that broadcast again before confirming are responsible for
    /// nonce ordering.
    pub async fn broadcast(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> RegistryResult<PendingTransaction> {
        let _guard = self.in_flight.lock().await;
        self.broadcast_unguarded(to, data, value).await
    }

    /// Resolve the sender and provider, failing before any network call.
    fn sender(&self) -> RegistryResult<(Address, u64, Arc<dyn WalletProvider>)> {
        let state = self.session.state();
        let from = match (state.is_connected(), state.address) {
            (true, Some(address)) => address,
            _ => return Err(RegistryError::NotConnected),
        };

        let expected = self.session.profile().chain_id;
        if let Some(actual) = state.chain_id {
            if actual != expected {
                return Err(RegistryError::WrongNetwork { expected, actual });
            }
        }

        Ok((from, expected, self.session.provider()?))
    }

    async fn broadcast_unguarded(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> RegistryResult<PendingTransaction> {
        let (from, chain_id, provider) = match self.sender() {
            Ok(sender) => sender,
            Err(e) => {
                metrics::record_transaction(metrics::error_label(&e));
                return Err(e);
            }
        };

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value)
            .with_input(data)
            .with_chain_id(chain_id);

        let hash = match provider.send_transaction(tx).await {
            Ok(hash) => hash,
            Err(e) => {
                let err = RegistryError::from(e);
                tracing::warn!(error = %err, to = %to, "Transaction not broadcast");
                metrics::record_transaction(metrics::error_label(&err));
                return Err(err);
            }
        };

        let pending = PendingTransaction::new(hash, self.clock.now_secs());
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(pending.clone());

        tracing::info!(
            tx_hash = %hash,
            from = %from,
            to = %to,
            value = %value,
            "Transaction broadcast"
        );
        Ok(pending)
    }

    /// Wait until `pending` is confirmed, reverted, or the wait window ends.
    pub async fn confirm(&self, pending: &PendingTransaction) -> RegistryResult<TransactionResult> {
        let provider = self.session.provider()?;
        let hash = pending.hash;
        let required = self.config.confirmation_blocks.max(1);

        let result = timeout(self.config.receipt_timeout(), async {
            let mut ticker = interval(self.config.poll_interval());

            loop {
                ticker.tick().await;

                let receipt = match provider.transaction_receipt(hash).await {
                    Ok(Some(receipt)) => receipt,
                    Ok(None) => {
                        tracing::debug!(tx_hash = %hash, "Transaction pending");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(tx_hash = %hash, error = %e, "Receipt query failed, still waiting");
                        continue;
                    }
                };

                if !receipt.success {
                    self.record(hash, TxStatus::Failed, 1);
                    let reason = receipt
                        .revert_reason
                        .unwrap_or_else(|| UNKNOWN_REVERT_REASON.to_string());
                    return Err(RegistryError::Reverted(reason));
                }

                let current_block = provider
                    .block_number()
                    .await
                    .unwrap_or(receipt.block_number);
                let confirmations = current_block.saturating_sub(receipt.block_number) + 1;

                if confirmations >= required {
                    self.record(hash, TxStatus::Confirmed, confirmations);
                    return Ok(TransactionResult {
                        hash,
                        block_number: receipt.block_number,
                        success: true,
                    });
                }

                self.record(hash, TxStatus::Pending, confirmations);
                tracing::debug!(
                    tx_hash = %hash,
                    confirmations = confirmations,
                    required = required,
                    "Waiting for confirmations"
                );
            }
        })
        .await;

        match result {
            Ok(Ok(confirmed)) => {
                tracing::info!(
                    tx_hash = %hash,
                    block_number = confirmed.block_number,
                    "Transaction confirmed"
                );
                metrics::record_transaction("confirmed");
                Ok(confirmed)
            }
            Ok(Err(e)) => {
                tracing::warn!(tx_hash = %hash, error = %e, "Transaction failed");
                metrics::record_transaction(metrics::error_label(&e));
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    tx_hash = %hash,
                    timeout_secs = self.config.receipt_timeout_secs,
                    "No receipt within wait window"
                );
                metrics::record_transaction("timeout");
                Err(RegistryError::Timeout { tx_hash: hash })
            }
        }
    }

    /// One-shot status check, e.g. after a [`RegistryError::Timeout`].
    pub async fn status(&self, hash: TxHash) -> RegistryResult<TxStatus> {
        Ok(self.lookup(hash).await?.0)
    }

    /// Status plus the receipt, when one exists.
    pub async fn lookup(&self, hash: TxHash) -> RegistryResult<(TxStatus, Option<TxReceipt>)> {
        let provider = self.session.provider()?;
        let Some(receipt) = provider.transaction_receipt(hash).await? else {
            return Ok((TxStatus::Pending, None));
        };
        if !receipt.success {
            return Ok((TxStatus::Failed, Some(receipt)));
        }

        let current_block = provider.block_number().await?;
        let confirmations = current_block.saturating_sub(receipt.block_number) + 1;
        let status = if confirmations >= self.config.confirmation_blocks.max(1) {
            TxStatus::Confirmed
        } else {
            TxStatus::Pending
        };
        Ok((status, Some(receipt)))
    }

    fn record(&self, hash: TxHash, status: TxStatus, confirmations: u64) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = last.as_mut().filter(|tx| tx.hash == hash) {
            tx.status = status;
            tx.confirmations = confirmations;
        }
    }
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("chain_id", &self.session.profile().chain_id)
            .field("receipt_timeout_secs", &self.config.receipt_timeout_secs)
            .field("confirmation_blocks", &self.config.confirmation_blocks)
            .finish()
    }
}
