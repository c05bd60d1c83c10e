//! Commit-reveal registration protocol.
//!
//! # State Machine
//! ```text
//! Uncommitted ──commit──▶ Committed ──delay──▶ RevealEligible ──reveal──▶ Revealed
//!      ▲                      │                       │
//!      └── commit fails       └──── commitment revert ┴──▶ Failed
//! ```
//!
//! State is tracked per sender address. `Committed` and `RevealEligible`
//! are derived from the stored commitment and the clock; nothing runs in the
//! background.
//!
//! # Design Decisions
//! - Input validation and the delay check happen before any transaction is
//!   built, so they cost no gas.
//! - The local hash comparison is an early sanity check. The contract
//!   recomputes and decides.
//! - A reveal revert that names a missing or mismatched commitment ends the
//!   attempt. Any other reveal failure keeps the commitment for a retry.
//! - A reveal that times out is remembered by hash. It is settled against
//!   its receipt before anything is broadcast again, so a mined reveal is
//!   never followed by a second one.
//! - Commitments are bound to the chain and contract they were made on.

use alloy::primitives::{Address, TxHash, B256, U256};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::blockchain::transaction::TransactionSubmitter;
use crate::blockchain::types::{RegistryError, RegistryResult, TxStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::observability::metrics;
use crate::registration::commitment::{RegistrationCommitment, RegistrationData};
use crate::registration::contract::{commit_call, reveal_call};
use crate::registration::store::CommitmentStore;

/// Revert reasons that mean the stored commitment can never be revealed.
const COMMITMENT_REVERT_MARKERS: &[&str] = &[
    "mismatch",
    "no commitment",
    "commitment not found",
    "invalid commitment",
];

/// Where a sender's registration attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegistrationState {
    Uncommitted,
    Committed,
    RevealEligible,
    Revealed,
    Failed,
}

/// Result of a confirmed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub commit_hash: B256,
    pub tx_hash: TxHash,
    pub committed_at: u64,
    pub reveal_eligible_at: u64,
}

/// Result of a confirmed reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

#[derive(Debug, Clone)]
enum Outcome {
    /// Reveal broadcast but not confirmed within the receipt timeout.
    RevealPending(TxHash),
    Revealed(TxHash),
    Failed(String),
}

/// Drives commit and reveal for the session's account.
pub struct CommitRevealRegistrar {
    submitter: Arc<TransactionSubmitter>,
    contract: Address,
    minimum_delay: Duration,
    stake: U256,
    store: CommitmentStore,
    clock: Arc<dyn Clock>,
    outcomes: Mutex<HashMap<Address, Outcome>>,
}

impl CommitRevealRegistrar {
    pub fn new(
        submitter: Arc<TransactionSubmitter>,
        contract: Address,
        minimum_delay: Duration,
        stake: U256,
    ) -> Self {
        Self {
            submitter,
            contract,
            minimum_delay,
            stake,
            store: CommitmentStore::in_memory(),
            clock: Arc::new(SystemClock),
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    /// Build from loaded configuration, opening the commitment store at
    /// `registration.store_path` when set.
    pub fn from_config(
        submitter: Arc<TransactionSubmitter>,
        config: &RegistryConfig,
    ) -> RegistryResult<Self> {
        let contract = config
            .contract
            .parsed_address()
            .map_err(RegistryError::InvalidInput)?;
        let stake = config
            .registration
            .stake_wei(config.network.native_currency.decimals)
            .map_err(RegistryError::InvalidInput)?;

        let registrar = Self::new(submitter, contract, config.registration.minimum_delay(), stake);
        match &config.registration.store_path {
            Some(path) => {
                let store = CommitmentStore::load_from_file(path).map_err(|e| {
                    RegistryError::InvalidInput(format!("commitment store '{}': {}", path, e))
                })?;
                Ok(registrar.with_store(store))
            }
            None => Ok(registrar),
        }
    }

    pub fn with_store(mut self, store: CommitmentStore) -> Self {
        self.store = store;
        self
    }

    /// Use `clock` for commit timestamps and the delay check.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn stake(&self) -> U256 {
        self.stake
    }

    pub fn minimum_delay(&self) -> Duration {
        self.minimum_delay
    }

    pub fn store(&self) -> &CommitmentStore {
        &self.store
    }

    /// Submit the commitment for `data`. No stake is sent.
    pub async fn commit(&self, data: &RegistrationData) -> RegistryResult<CommitReceipt> {
        let result = self.commit_inner(data).await;
        if let Err(e) = &result {
            metrics::record_registration("commit", metrics::error_label(e));
        }
        result
    }

    async fn commit_inner(&self, data: &RegistrationData) -> RegistryResult<CommitReceipt> {
        data.validate()?;
        let sender = self.sender()?;

        match self.state_for(sender) {
            RegistrationState::Committed | RegistrationState::RevealEligible => {
                return Err(RegistryError::CommitmentPending);
            }
            RegistrationState::Revealed => {
                return Err(RegistryError::InvalidInput(
                    "registration already revealed; reset before starting another".to_string(),
                ));
            }
            RegistrationState::Uncommitted | RegistrationState::Failed => {}
        }
        self.outcomes().remove(&sender);

        let commit_hash = data.commit_hash(sender);
        tracing::info!(
            sender = %sender,
            commit_hash = %commit_hash,
            contract = %self.contract,
            "Submitting registration commitment"
        );

        let result = self
            .submitter
            .submit(self.contract, &commit_call(commit_hash), U256::ZERO)
            .await?;

        let committed_at = self.clock.now_secs();
        let commitment = RegistrationCommitment::new(
            data,
            sender,
            result.hash,
            committed_at,
            self.minimum_delay.as_secs(),
        )
        .for_deployment(self.chain_id(), self.contract);
        let receipt = CommitReceipt {
            commit_hash,
            tx_hash: result.hash,
            committed_at,
            reveal_eligible_at: commitment.reveal_earliest_at,
        };
        self.store.insert(commitment);

        metrics::record_registration("commit", "confirmed");
        tracing::info!(
            sender = %sender,
            tx_hash = %result.hash,
            block = result.block_number,
            reveal_eligible_at = receipt.reveal_eligible_at,
            "Registration committed"
        );
        Ok(receipt)
    }

    /// Reveal `data` with the stake.
    ///
    /// `data` must be exactly what was committed, specialty order included.
    /// Without a locally stored commitment the client-side checks are skipped
    /// and the contract decides.
    pub async fn reveal(&self, data: &RegistrationData) -> RegistryResult<RevealReceipt> {
        let result = self.reveal_inner(data).await;
        if let Err(e) = &result {
            metrics::record_registration("reveal", metrics::error_label(e));
        }
        result
    }

    async fn reveal_inner(&self, data: &RegistrationData) -> RegistryResult<RevealReceipt> {
        data.validate()?;
        let sender = self.sender()?;

        if let Some(Outcome::Revealed(tx)) = self.outcomes().get(&sender) {
            return Err(RegistryError::InvalidInput(format!(
                "registration already revealed in {}",
                tx
            )));
        }
        if let Some(hash) = self.pending_reveal_for(sender) {
            if let Some(receipt) = self.settle_pending_reveal(sender, hash).await? {
                return Ok(receipt);
            }
        }

        match self.stored(sender) {
            Some(commitment) => {
                if !commitment.matches(data) {
                    tracing::warn!(
                        sender = %sender,
                        expected = %commitment.commit_hash,
                        "Reveal data does not match stored commitment"
                    );
                    return Err(RegistryError::CommitmentMismatch);
                }
                let now = self.clock.now_secs();
                if !commitment.is_reveal_eligible(now) {
                    return Err(RegistryError::TooEarly {
                        remaining_secs: commitment.remaining_secs(now),
                    });
                }
            }
            None => {
                tracing::warn!(sender = %sender, "No local commitment, revealing unchecked");
            }
        }

        tracing::info!(
            sender = %sender,
            contract = %self.contract,
            stake = %self.stake,
            "Submitting registration reveal"
        );

        let result = match self
            .submitter
            .submit(self.contract, &reveal_call(data), self.stake)
            .await
        {
            Ok(result) => result,
            Err(RegistryError::Reverted(reason)) if is_commitment_revert(&reason) => {
                self.fail_attempt(sender, &reason);
                return Err(RegistryError::Reverted(reason));
            }
            Err(RegistryError::Timeout { tx_hash }) => {
                self.mark_reveal_pending(sender, Some(tx_hash));
                tracing::warn!(
                    sender = %sender,
                    tx_hash = %tx_hash,
                    "Reveal unconfirmed, will settle it before any new broadcast"
                );
                return Err(RegistryError::Timeout { tx_hash });
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            institution = %data.institution_name,
            country = %data.country,
            specialties = ?data.specialties,
            "Revealed registration"
        );
        Ok(self.finish_reveal(sender, result.hash, result.block_number))
    }

    /// Resolve a reveal that timed out earlier.
    ///
    /// `Ok(Some(_))` when it confirmed, `Ok(None)` when it failed in a way
    /// that leaves the commitment revealable. Still unmined gives `Timeout`
    /// with the same hash.
    async fn settle_pending_reveal(
        &self,
        sender: Address,
        hash: TxHash,
    ) -> RegistryResult<Option<RevealReceipt>> {
        let (status, receipt) = self.submitter.lookup(hash).await?;
        match status {
            TxStatus::Pending => Err(RegistryError::Timeout { tx_hash: hash }),
            TxStatus::Confirmed => {
                let block_number = receipt.map(|r| r.block_number).unwrap_or_default();
                Ok(Some(self.finish_reveal(sender, hash, block_number)))
            }
            TxStatus::Failed => {
                self.mark_reveal_pending(sender, None);
                let reason = receipt
                    .and_then(|r| r.revert_reason)
                    .unwrap_or_else(|| "execution reverted".to_string());
                if is_commitment_revert(&reason) {
                    self.fail_attempt(sender, &reason);
                    return Err(RegistryError::Reverted(reason));
                }
                tracing::warn!(
                    sender = %sender,
                    tx_hash = %hash,
                    reason = %reason,
                    "Pending reveal reverted, commitment kept"
                );
                Ok(None)
            }
        }
    }

    fn finish_reveal(&self, sender: Address, hash: TxHash, block_number: u64) -> RevealReceipt {
        self.forget_commitment(sender);
        self.outcomes().insert(sender, Outcome::Revealed(hash));

        metrics::record_registration("reveal", "confirmed");
        tracing::info!(
            sender = %sender,
            tx_hash = %hash,
            block = block_number,
            "Registration revealed"
        );
        RevealReceipt {
            tx_hash: hash,
            block_number,
        }
    }

    fn fail_attempt(&self, sender: Address, reason: &str) {
        self.forget_commitment(sender);
        self.outcomes()
            .insert(sender, Outcome::Failed(reason.to_string()));
        tracing::warn!(sender = %sender, reason = %reason, "Commitment rejected by contract");
    }

    /// Settle an unconfirmed reveal for the current account, if any, and
    /// return the resulting state. Never broadcasts.
    pub async fn check_pending(&self) -> RegistryResult<RegistrationState> {
        let Some(sender) = self.current_sender() else {
            return Ok(RegistrationState::Uncommitted);
        };
        if let Some(hash) = self.pending_reveal_for(sender) {
            match self.settle_pending_reveal(sender, hash).await {
                Ok(_) | Err(RegistryError::Timeout { .. }) | Err(RegistryError::Reverted(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.state_for(sender))
    }

    /// Hash of the current account's reveal still awaiting confirmation.
    pub fn pending_reveal(&self) -> Option<TxHash> {
        self.pending_reveal_for(self.current_sender()?)
    }

    fn pending_reveal_for(&self, sender: Address) -> Option<TxHash> {
        match self.outcomes().get(&sender) {
            Some(Outcome::RevealPending(hash)) => return Some(*hash),
            Some(_) => return None,
            None => {}
        }
        self.stored(sender).and_then(|c| c.reveal_tx)
    }

    /// Remember (or clear) an unconfirmed reveal, on the stored commitment
    /// too so it survives a restart.
    fn mark_reveal_pending(&self, sender: Address, hash: Option<TxHash>) {
        match hash {
            Some(hash) => {
                self.outcomes().insert(sender, Outcome::RevealPending(hash));
            }
            None => {
                self.outcomes().remove(&sender);
            }
        }
        if let Some(mut commitment) = self.stored(sender) {
            if commitment.reveal_tx != hash {
                commitment.reveal_tx = hash;
                self.store.insert(commitment);
            }
        }
    }

    /// State for the session's current account.
    pub fn state(&self) -> RegistrationState {
        match self.current_sender() {
            Some(sender) => self.state_for(sender),
            None => RegistrationState::Uncommitted,
        }
    }

    /// A pending reveal reports the commitment's state until it settles.
    pub fn state_for(&self, sender: Address) -> RegistrationState {
        match self.outcomes().get(&sender) {
            Some(Outcome::Revealed(_)) => return RegistrationState::Revealed,
            Some(Outcome::Failed(_)) => return RegistrationState::Failed,
            Some(Outcome::RevealPending(_)) | None => {}
        }
        match self.stored(sender) {
            Some(c) if c.is_reveal_eligible(self.clock.now_secs()) => {
                RegistrationState::RevealEligible
            }
            Some(_) => RegistrationState::Committed,
            None => RegistrationState::Uncommitted,
        }
    }

    /// Revert reason that ended the current account's last attempt.
    pub fn failure_reason(&self) -> Option<String> {
        let sender = self.current_sender()?;
        match self.outcomes().get(&sender) {
            Some(Outcome::Failed(reason)) => Some(reason.clone()),
            _ => None,
        }
    }

    /// The current account's stored commitment.
    pub fn commitment(&self) -> Option<RegistrationCommitment> {
        self.stored(self.current_sender()?)
    }

    /// Time until reveal is allowed. Zero once eligible, `None` without a
    /// commitment.
    pub fn time_remaining(&self) -> Option<Duration> {
        let commitment = self.commitment()?;
        Some(Duration::from_secs(
            commitment.remaining_secs(self.clock.now_secs()),
        ))
    }

    /// Seconds since epoch at which reveal becomes allowed.
    pub fn reveal_eligible_at(&self) -> Option<u64> {
        self.commitment().map(|c| c.reveal_earliest_at)
    }

    /// Forget the current account's commitment and outcome.
    ///
    /// Does not touch the chain. A commitment already recorded by the
    /// contract stays there, as does a reveal already broadcast.
    pub fn reset(&self) {
        let Some(sender) = self.current_sender() else {
            return;
        };
        self.outcomes().remove(&sender);
        if self.forget_commitment(sender) {
            tracing::info!(sender = %sender, "Local commitment discarded");
        }
    }

    fn chain_id(&self) -> u64 {
        self.submitter.session().profile().chain_id
    }

    /// Stored commitment for `sender` on this chain and contract. Entries
    /// made against another deployment are ignored.
    fn stored(&self, sender: Address) -> Option<RegistrationCommitment> {
        self.store
            .get(&sender)
            .filter(|c| c.is_for(self.chain_id(), self.contract))
    }

    fn forget_commitment(&self, sender: Address) -> bool {
        if self.stored(sender).is_none() {
            return false;
        }
        self.store.remove(&sender).is_some()
    }

    fn current_sender(&self) -> Option<Address> {
        self.submitter.session().state().address
    }

    fn sender(&self) -> RegistryResult<Address> {
        self.current_sender().ok_or(RegistryError::NotConnected)
    }

    fn outcomes(&self) -> std::sync::MutexGuard<'_, HashMap<Address, Outcome>> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn is_commitment_revert(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    COMMITMENT_REVERT_MARKERS
        .iter()
        .any(|marker| reason.contains(marker))
}

impl std::fmt::Debug for CommitRevealRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitRevealRegistrar")
            .field("contract", &self.contract)
            .field("minimum_delay", &self.minimum_delay)
            .field("stake", &self.stake)
            .field("store", &self.store)
            .finish()
    }
}
