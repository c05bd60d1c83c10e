//! Shared fixtures for integration tests.

#![allow(dead_code)]

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, U256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use institution_registry::clock::ManualClock;
use institution_registry::config::TransactionConfig;
use institution_registry::network::NetworkProfile;
use institution_registry::registration::{CommitRevealRegistrar, CommitmentStore, RegistrationData};
use institution_registry::wallet::mock::{MockWalletProvider, MOCK_ACCOUNT};
use institution_registry::{TransactionSubmitter, WalletSession};

pub const START: u64 = 1_700_000_000;
pub const DELAY_SECS: u64 = 3_600;

pub fn contract() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn stake() -> U256 {
    parse_ether("0.002").unwrap()
}

pub fn mayo_clinic() -> RegistrationData {
    RegistrationData::new(
        "Mayo Clinic Rochester",
        "United States",
        vec![
            "Emergency Medicine".to_string(),
            "Cardiology".to_string(),
            "Oncology".to_string(),
        ],
        483921,
    )
}

/// A connected session on a mock local chain with the registry deployed.
pub struct Harness {
    pub wallet: Arc<MockWalletProvider>,
    pub clock: ManualClock,
    pub session: Arc<WalletSession>,
    pub submitter: Arc<TransactionSubmitter>,
}

impl Harness {
    pub async fn connected() -> Self {
        let harness = Self::disconnected();
        harness.session.connect().await.unwrap();
        harness
    }

    pub fn disconnected() -> Self {
        let clock = ManualClock::new(START);
        let wallet = Arc::new(
            MockWalletProvider::new(NetworkProfile::local().chain_id)
                .with_clock(Arc::new(clock.clone()))
                .with_account(MOCK_ACCOUNT, parse_ether("1").unwrap())
                .with_registry(contract(), DELAY_SECS, stake()),
        );
        let session = Arc::new(WalletSession::new(wallet.clone(), NetworkProfile::local()));
        let submitter = Arc::new(
            TransactionSubmitter::new(session.clone(), fast_transactions())
                .with_clock(Arc::new(clock.clone())),
        );
        Self {
            wallet,
            clock,
            session,
            submitter,
        }
    }

    pub fn registrar(&self, store: CommitmentStore) -> CommitRevealRegistrar {
        CommitRevealRegistrar::new(
            self.submitter.clone(),
            contract(),
            Duration::from_secs(DELAY_SECS),
            stake(),
        )
        .with_store(store)
        .with_clock(Arc::new(self.clock.clone()))
    }
}

pub fn fast_transactions() -> TransactionConfig {
    TransactionConfig {
        receipt_timeout_secs: 1,
        poll_interval_ms: 10,
        confirmation_blocks: 1,
    }
}

/// Unique scratch file path, removed by the caller.
pub fn temp_store_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "registry-it-{}-{}-{}.json",
        name,
        std::process::id(),
        fastrand::u32(..)
    ))
}
