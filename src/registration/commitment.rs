//! Commitment hashing and the locally cached commitment record.
//!
//! The commitment binds the registration plaintext and the sender:
//!
//! ```text
//! keccak256(abi.encode(name, country, specialties, uint256(nonce), sender))
//! ```
//!
//! Specialty order is part of the hash. Re-entering the same specialties in a
//! different order produces a different commitment.

use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use alloy::sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::blockchain::types::{RegistryError, RegistryResult};

/// Plaintext registration fields, supplied at commit and again at reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationData {
    pub institution_name: String,
    pub country: String,
    pub specialties: Vec<String>,
    pub nonce: u64,
}

impl RegistrationData {
    pub fn new(
        institution_name: impl Into<String>,
        country: impl Into<String>,
        specialties: Vec<String>,
        nonce: u64,
    ) -> Self {
        Self {
            institution_name: institution_name.into(),
            country: country.into(),
            specialties,
            nonce,
        }
    }

    /// Reject blank fields. Values are never trimmed or reordered, since the
    /// hash is taken over exactly what the caller supplied.
    pub fn validate(&self) -> RegistryResult<()> {
        if self.institution_name.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "institution name must not be empty".to_string(),
            ));
        }
        if self.country.trim().is_empty() {
            return Err(RegistryError::InvalidInput(
                "country must not be empty".to_string(),
            ));
        }
        if self.specialties.is_empty() {
            return Err(RegistryError::InvalidInput(
                "at least one specialty is required".to_string(),
            ));
        }
        if let Some(i) = self.specialties.iter().position(|s| s.trim().is_empty()) {
            return Err(RegistryError::InvalidInput(format!(
                "specialty {} must not be empty",
                i + 1
            )));
        }
        Ok(())
    }

    /// Commitment hash for this data submitted by `sender`.
    pub fn commit_hash(&self, sender: Address) -> B256 {
        compute_commit_hash(
            &self.institution_name,
            &self.country,
            &self.specialties,
            self.nonce,
            sender,
        )
    }
}

/// `keccak256(abi.encode(name, country, specialties, uint256(nonce), sender))`.
pub fn compute_commit_hash(
    institution_name: &str,
    country: &str,
    specialties: &[String],
    nonce: u64,
    sender: Address,
) -> B256 {
    let encoded = (
        institution_name.to_string(),
        country.to_string(),
        specialties.to_vec(),
        U256::from(nonce),
        sender,
    )
        .abi_encode_params();
    keccak256(encoded)
}

/// Fresh random protocol nonce.
pub fn generate_nonce() -> u64 {
    fastrand::u64(..)
}

/// Client-side record of a confirmed commitment.
///
/// The contract holds the authoritative copy. This one drives the reveal step
/// and may be lost, in which case the user re-enters the same fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationCommitment {
    pub institution_name: String,
    pub country: String,
    pub specialties: Vec<String>,
    pub nonce: u64,
    pub sender: Address,
    pub commit_hash: B256,
    /// Chain the commitment was made on. Zero when unknown.
    #[serde(default)]
    pub chain_id: u64,
    /// Registry contract holding the commitment.
    #[serde(default)]
    pub contract: Address,
    pub commit_tx: TxHash,
    /// Seconds since epoch when the commit confirmation was observed.
    pub committed_at: u64,
    /// Earliest time a reveal is accepted.
    pub reveal_earliest_at: u64,
    /// Reveal broadcast but not yet seen confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_tx: Option<TxHash>,
}

impl RegistrationCommitment {
    pub fn new(
        data: &RegistrationData,
        sender: Address,
        commit_tx: TxHash,
        committed_at: u64,
        minimum_delay_secs: u64,
    ) -> Self {
        Self {
            institution_name: data.institution_name.clone(),
            country: data.country.clone(),
            specialties: data.specialties.clone(),
            nonce: data.nonce,
            sender,
            commit_hash: data.commit_hash(sender),
            chain_id: 0,
            contract: Address::ZERO,
            commit_tx,
            committed_at,
            reveal_earliest_at: committed_at.saturating_add(minimum_delay_secs),
            reveal_tx: None,
        }
    }

    /// Record where the commitment lives.
    pub fn for_deployment(mut self, chain_id: u64, contract: Address) -> Self {
        self.chain_id = chain_id;
        self.contract = contract;
        self
    }

    /// Whether this commitment was made on `chain_id` against `contract`.
    pub fn is_for(&self, chain_id: u64, contract: Address) -> bool {
        self.chain_id == chain_id && self.contract == contract
    }

    /// Whether `data` re-supplied at reveal hashes to this commitment.
    pub fn matches(&self, data: &RegistrationData) -> bool {
        data.commit_hash(self.sender) == self.commit_hash
    }

    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.reveal_earliest_at.saturating_sub(now)
    }

    pub fn is_reveal_eligible(&self, now: u64) -> bool {
        now >= self.reveal_earliest_at
    }

    pub fn data(&self) -> RegistrationData {
        RegistrationData {
            institution_name: self.institution_name.clone(),
            country: self.country.clone(),
            specialties: self.specialties.clone(),
            nonce: self.nonce,
        }
    }
}
