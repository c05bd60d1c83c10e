//! In-memory wallet provider.
//!
//! Simulates accounts, chains, balances and instant block production, plus
//! the registry contract's commit/reveal rules. Used by tests and for UI
//! work without a live wallet.

use alloy::primitives::{address, keccak256, Address, TxHash, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::blockchain::types::TxReceipt;
use crate::clock::{Clock, SystemClock};
use crate::network::{AddChainParams, NetworkProfile};
use crate::registration::commitment::compute_commit_hash;
use crate::registration::contract::{commitRegistrationCall, revealRegistrationCall};
use crate::wallet::provider::{ProviderError, ProviderEvent, WalletProvider};

/// Anvil's first development account.
pub const MOCK_ACCOUNT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// Registry contract behaviour enforced by the mock chain.
#[derive(Debug, Default)]
struct MockRegistry {
    address: Address,
    minimum_delay_secs: u64,
    stake: U256,
    commitments: HashMap<Address, (B256, u64)>,
    registered: HashMap<Address, String>,
}

impl MockRegistry {
    fn execute(&mut self, from: Address, value: U256, input: &[u8], now: u64) -> Result<(), String> {
        if let Ok(call) = commitRegistrationCall::abi_decode(input) {
            self.commitments.insert(from, (call.commitHash, now));
            return Ok(());
        }

        let call = revealRegistrationCall::abi_decode(input)
            .map_err(|_| "unknown function selector".to_string())?;

        let (stored, committed_at) = self
            .commitments
            .get(&from)
            .copied()
            .ok_or_else(|| "no commitment found".to_string())?;
        if now < committed_at.saturating_add(self.minimum_delay_secs) {
            return Err("too early".to_string());
        }
        if value < self.stake {
            return Err("insufficient stake".to_string());
        }

        let nonce: u64 = call
            .nonce
            .try_into()
            .map_err(|_| "commitment hash mismatch".to_string())?;
        let computed = compute_commit_hash(&call.name, &call.country, &call.specialties, nonce, from);
        if computed != stored {
            return Err("commitment hash mismatch".to_string());
        }

        self.commitments.remove(&from);
        self.registered.insert(from, call.name);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MockState {
    accounts: Vec<Address>,
    balances: HashMap<Address, U256>,
    chain_id: u64,
    known_chains: HashSet<u64>,
    added_chains: Vec<AddChainParams>,
    switch_requests: Vec<u64>,
    block_number: u64,
    tx_count: u64,
    sent: Vec<TransactionRequest>,
    receipts: HashMap<TxHash, TxReceipt>,
    withhold_receipts: bool,
    reject_next_request: bool,
    account_delay: Option<Duration>,
    next_send_error: Option<ProviderError>,
    next_switch_error: Option<ProviderError>,
    registry: Option<MockRegistry>,
}

/// Scriptable wallet provider backed by an in-memory chain.
pub struct MockWalletProvider {
    state: Mutex<MockState>,
    events: broadcast::Sender<ProviderEvent>,
    clock: Arc<dyn Clock>,
}

impl MockWalletProvider {
    /// A wallet on `chain_id` with no accounts.
    pub fn new(chain_id: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        let state = MockState {
            chain_id,
            known_chains: HashSet::from([chain_id]),
            ..MockState::default()
        };
        Self {
            state: Mutex::new(state),
            events,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for contract timing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Expose an account with a starting balance.
    pub fn with_account(self, account: Address, balance: U256) -> Self {
        {
            let mut state = self.lock();
            state.accounts.push(account);
            state.balances.insert(account, balance);
        }
        self
    }

    /// Mark a chain as already known to the wallet.
    pub fn with_known_chain(self, chain_id: u64) -> Self {
        self.lock().known_chains.insert(chain_id);
        self
    }

    /// Deploy the registry contract at `contract`.
    pub fn with_registry(self, contract: Address, minimum_delay_secs: u64, stake: U256) -> Self {
        self.lock().registry = Some(MockRegistry {
            address: contract,
            minimum_delay_secs,
            stake,
            ..MockRegistry::default()
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The next prompt (accounts or transaction) is dismissed by the user.
    pub fn reject_next_request(&self) {
        self.lock().reject_next_request = true;
    }

    /// Keep the user "thinking" for `delay` before answering account requests.
    pub fn delay_account_requests(&self, delay: Duration) {
        self.lock().account_delay = Some(delay);
    }

    pub fn fail_next_send(&self, error: ProviderError) {
        self.lock().next_send_error = Some(error);
    }

    pub fn fail_next_switch(&self, error: ProviderError) {
        self.lock().next_switch_error = Some(error);
    }

    /// Stop producing receipts, leaving transactions pending forever.
    pub fn withhold_receipts(&self, withhold: bool) {
        self.lock().withhold_receipts = withhold;
    }

    pub fn set_balance(&self, account: Address, balance: U256) {
        self.lock().balances.insert(account, balance);
    }

    /// Push an event to subscribers, updating the mock's own view first.
    pub fn emit(&self, event: ProviderEvent) {
        {
            let mut state = self.lock();
            match &event {
                ProviderEvent::AccountsChanged(accounts) => state.accounts = accounts.clone(),
                ProviderEvent::ChainChanged(id) => {
                    state.chain_id = *id;
                    state.known_chains.insert(*id);
                }
                ProviderEvent::Disconnected => state.accounts.clear(),
            }
        }
        let _ = self.events.send(event);
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.lock().sent.clone()
    }

    pub fn added_chains(&self) -> Vec<AddChainParams> {
        self.lock().added_chains.clone()
    }

    pub fn switch_requests(&self) -> Vec<u64> {
        self.lock().switch_requests.clone()
    }

    /// Commitment hash the mock contract holds for `account`.
    pub fn onchain_commitment(&self, account: Address) -> Option<B256> {
        self.lock()
            .registry
            .as_ref()
            .and_then(|r| r.commitments.get(&account).map(|(hash, _)| *hash))
    }

    /// Institution name registered by `account`, if any.
    pub fn registered_name(&self, account: Address) -> Option<String> {
        self.lock()
            .registry
            .as_ref()
            .and_then(|r| r.registered.get(&account).cloned())
    }
}

#[async_trait]
impl WalletProvider for MockWalletProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let delay = self.lock().account_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if std::mem::take(&mut state.reject_next_request) {
            return Err(ProviderError::UserRejected);
        }
        Ok(state.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.lock().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        let changed = {
            let mut state = self.lock();
            state.switch_requests.push(chain_id);
            if let Some(error) = state.next_switch_error.take() {
                return Err(error);
            }
            if !state.known_chains.contains(&chain_id) {
                return Err(ProviderError::UnrecognizedChain(chain_id));
            }
            let changed = state.chain_id != chain_id;
            state.chain_id = chain_id;
            changed
        };
        if changed {
            let _ = self.events.send(ProviderEvent::ChainChanged(chain_id));
        }
        Ok(())
    }

    async fn add_chain(&self, profile: &NetworkProfile) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.known_chains.insert(profile.chain_id);
        state.added_chains.push(profile.add_chain_params());
        Ok(())
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        Ok(self.lock().balances.get(&address).copied().unwrap_or_default())
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        Ok(self.lock().block_number)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, ProviderError> {
        let now = self.clock.now_secs();
        let mut state = self.lock();

        if std::mem::take(&mut state.reject_next_request) {
            return Err(ProviderError::UserRejected);
        }
        if let Some(error) = state.next_send_error.take() {
            return Err(error);
        }

        let from = tx.from.ok_or_else(|| ProviderError::Rpc {
            code: -32602,
            message: "missing from".to_string(),
        })?;
        let value = tx.value.unwrap_or_default();
        let balance = state.balances.get(&from).copied().unwrap_or_default();
        if balance < value {
            return Err(ProviderError::InsufficientFunds(format!(
                "balance {} below value {}",
                balance, value
            )));
        }

        let hash = keccak256([from.as_slice(), &state.tx_count.to_be_bytes()[..]].concat());
        state.tx_count += 1;
        state.block_number += 1;
        let block_number = state.block_number;

        let to = tx.to.and_then(|kind| kind.to().copied());
        let input = tx.input.input().cloned().unwrap_or_default();
        let outcome = match state.registry.as_mut() {
            Some(registry) if Some(registry.address) == to => {
                registry.execute(from, value, &input, now)
            }
            _ => Ok(()),
        };

        if outcome.is_ok() {
            state.balances.insert(from, balance - value);
        }

        let receipt = TxReceipt {
            transaction_hash: hash,
            block_number,
            success: outcome.is_ok(),
            revert_reason: outcome.err(),
        };
        state.receipts.insert(hash, receipt);
        state.sent.push(tx);

        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TxReceipt>, ProviderError> {
        let state = self.lock();
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::registration::commitment::RegistrationData;
    use crate::registration::contract::{commit_call, reveal_call};
    use alloy::network::TransactionBuilder;
    use alloy::primitives::Bytes;

    const REGISTRY: Address = address!("00000000000000000000000000000000000000aa");

    fn request(input: Vec<u8>, value: U256) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(MOCK_ACCOUNT)
            .with_to(REGISTRY)
            .with_value(value)
            .with_input(Bytes::from(input))
    }

    #[tokio::test]
    async fn test_contract_enforces_delay_and_hash() {
        let clock = ManualClock::new(0);
        let stake = U256::from(2_000_000_000_000_000u64);
        let mock = MockWalletProvider::new(31337)
            .with_clock(Arc::new(clock.clone()))
            .with_account(MOCK_ACCOUNT, U256::from(10u64) * stake)
            .with_registry(REGISTRY, 3600, stake);

        let data = RegistrationData::new("General", "Ghana", vec!["Surgery".to_string()], 7);
        let commit = commit_call(data.commit_hash(MOCK_ACCOUNT)).abi_encode();
        let hash = mock.send_transaction(request(commit, U256::ZERO)).await.unwrap();
        assert!(mock.transaction_receipt(hash).await.unwrap().unwrap().success);

        let reveal = reveal_call(&data).abi_encode();
        let hash = mock.send_transaction(request(reveal.clone(), stake)).await.unwrap();
        let receipt = mock.transaction_receipt(hash).await.unwrap().unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.revert_reason.as_deref(), Some("too early"));

        clock.advance(3600);
        let mut wrong = data.clone();
        wrong.nonce = 8;
        let hash = mock
            .send_transaction(request(reveal_call(&wrong).abi_encode(), stake))
            .await
            .unwrap();
        let receipt = mock.transaction_receipt(hash).await.unwrap().unwrap();
        assert_eq!(receipt.revert_reason.as_deref(), Some("commitment hash mismatch"));

        let hash = mock.send_transaction(request(reveal, stake)).await.unwrap();
        assert!(mock.transaction_receipt(hash).await.unwrap().unwrap().success);
        assert_eq!(mock.registered_name(MOCK_ACCOUNT).as_deref(), Some("General"));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected_before_broadcast() {
        let mock = MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, U256::from(1u64));
        let err = mock
            .send_transaction(request(Vec::new(), U256::from(2u64)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InsufficientFunds(_)));
        assert!(mock.sent_transactions().is_empty());
    }
}
