mod common;

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use common::{contract, mayo_clinic, temp_store_path, Harness, DELAY_SECS, START};
use institution_registry::config::parse_config;
use institution_registry::registration::{CommitRevealRegistrar, CommitmentStore};
use institution_registry::wallet::mock::MOCK_ACCOUNT;
use institution_registry::wallet::{ProviderEvent, WalletState};
use institution_registry::{RegistrationState, RegistryError};

async fn wait_for<F>(rx: &mut watch::Receiver<WalletState>, f: F) -> WalletState
where
    F: Fn(&WalletState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let state = rx.borrow_and_update().clone();
            if f(&state) {
                return state;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("state change not observed")
}

#[tokio::test]
async fn test_mayo_clinic_registration() {
    let harness = Harness::connected().await;
    let registrar = harness.registrar(CommitmentStore::in_memory());

    let commit = registrar.commit(&mayo_clinic()).await.unwrap();
    let stored = registrar.commitment().unwrap();
    assert_eq!(stored.commit_hash, commit.commit_hash);
    assert_eq!(stored.committed_at, START);
    assert_eq!(
        harness.wallet.onchain_commitment(MOCK_ACCOUNT),
        Some(commit.commit_hash)
    );

    harness.clock.advance(10);
    assert!(matches!(
        registrar.reveal(&mayo_clinic()).await,
        Err(RegistryError::TooEarly { .. })
    ));
    assert_eq!(registrar.state(), RegistrationState::Committed);

    harness.clock.advance(DELAY_SECS);
    let reveal = registrar.reveal(&mayo_clinic()).await.unwrap();
    assert_ne!(reveal.tx_hash, commit.tx_hash);
    assert_eq!(registrar.state(), RegistrationState::Revealed);
    assert_eq!(
        harness.wallet.registered_name(MOCK_ACCOUNT).as_deref(),
        Some("Mayo Clinic Rochester")
    );
}

#[tokio::test]
async fn test_commitment_survives_restart() {
    let path = temp_store_path("restart");
    let harness = Harness::connected().await;

    {
        let registrar = harness.registrar(CommitmentStore::load_from_file(&path).unwrap());
        registrar.commit(&mayo_clinic()).await.unwrap();
    }

    harness.clock.advance(DELAY_SECS);
    let restored = harness.registrar(CommitmentStore::load_from_file(&path).unwrap());
    assert_eq!(restored.state(), RegistrationState::RevealEligible);
    assert_eq!(restored.reveal_eligible_at(), Some(START + DELAY_SECS));

    restored.reveal(&mayo_clinic()).await.unwrap();
    assert!(CommitmentStore::load_from_file(&path).unwrap().is_empty());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_pending_reveal_survives_restart() {
    let path = temp_store_path("pending-reveal");
    let harness = Harness::connected().await;

    let tx_hash = {
        let registrar = harness.registrar(CommitmentStore::load_from_file(&path).unwrap());
        registrar.commit(&mayo_clinic()).await.unwrap();
        harness.clock.advance(DELAY_SECS);
        harness.wallet.withhold_receipts(true);
        match registrar.reveal(&mayo_clinic()).await {
            Err(RegistryError::Timeout { tx_hash }) => tx_hash,
            other => panic!("expected timeout, got {:?}", other),
        }
    };

    let restored = harness.registrar(CommitmentStore::load_from_file(&path).unwrap());
    assert_eq!(restored.pending_reveal(), Some(tx_hash));

    harness.wallet.withhold_receipts(false);
    assert_eq!(
        restored.check_pending().await.unwrap(),
        RegistrationState::Revealed
    );
    assert_eq!(harness.wallet.sent_transactions().len(), 2);
    assert!(CommitmentStore::load_from_file(&path).unwrap().is_empty());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_nothing_submitted_while_disconnected() {
    let harness = Harness::disconnected();
    let registrar = harness.registrar(CommitmentStore::in_memory());

    assert_eq!(
        registrar.commit(&mayo_clinic()).await.unwrap_err(),
        RegistryError::NotConnected
    );
    assert_eq!(
        registrar.reveal(&mayo_clinic()).await.unwrap_err(),
        RegistryError::NotConnected
    );
    assert!(harness.wallet.sent_transactions().is_empty());
    assert_eq!(registrar.state(), RegistrationState::Uncommitted);
}

#[tokio::test]
async fn test_state_follows_active_account() {
    let harness = Harness::connected().await;
    let registrar = harness.registrar(CommitmentStore::in_memory());
    registrar.commit(&mayo_clinic()).await.unwrap();

    let other = Address::repeat_byte(0x77);
    let mut rx = harness.session.subscribe();

    harness.wallet.emit(ProviderEvent::AccountsChanged(vec![other]));
    wait_for(&mut rx, |s| s.address == Some(other)).await;
    assert_eq!(registrar.state(), RegistrationState::Uncommitted);
    assert!(registrar.commitment().is_none());

    harness.wallet.emit(ProviderEvent::AccountsChanged(vec![MOCK_ACCOUNT]));
    wait_for(&mut rx, |s| s.address == Some(MOCK_ACCOUNT)).await;
    assert_eq!(registrar.state(), RegistrationState::Committed);
    assert_eq!(registrar.state_for(other), RegistrationState::Uncommitted);
}

#[tokio::test]
async fn test_chain_change_blocks_reveal() {
    let harness = Harness::connected().await;
    let registrar = harness.registrar(CommitmentStore::in_memory());
    registrar.commit(&mayo_clinic()).await.unwrap();
    harness.clock.advance(DELAY_SECS);

    let mut rx = harness.session.subscribe();
    harness.wallet.emit(ProviderEvent::ChainChanged(1));
    wait_for(&mut rx, |s| s.chain_id == Some(1)).await;

    assert_eq!(
        registrar.reveal(&mayo_clinic()).await.unwrap_err(),
        RegistryError::WrongNetwork {
            expected: 31_337,
            actual: 1
        }
    );
    assert_eq!(harness.wallet.sent_transactions().len(), 1);

    harness.session.switch_network(harness.session.profile()).await.unwrap();
    wait_for(&mut rx, |s| s.chain_id == Some(31_337)).await;
    registrar.reveal(&mayo_clinic()).await.unwrap();
}

#[tokio::test]
async fn test_registrar_from_config() {
    let path = temp_store_path("config");
    let toml = format!(
        r#"
        [network]
        chain_id = 31337
        name = "Localhost"
        rpc_url = "http://localhost:8545"

        [contract]
        address = "{contract}"

        [registration]
        minimum_delay_secs = {delay}
        stake = "0.002"
        store_path = "{path}"
        "#,
        contract = contract(),
        delay = DELAY_SECS,
        path = path.display(),
    );
    let config = parse_config(&toml).unwrap();

    let harness = Harness::connected().await;
    let registrar = CommitRevealRegistrar::from_config(harness.submitter.clone(), &config)
        .unwrap()
        .with_clock(Arc::new(harness.clock.clone()));

    assert_eq!(registrar.contract(), contract());
    assert_eq!(registrar.stake(), common::stake());
    assert_eq!(registrar.minimum_delay(), Duration::from_secs(DELAY_SECS));

    registrar.commit(&mayo_clinic()).await.unwrap();
    assert!(path.exists());

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_connect_then_disconnect_resets_everything() {
    let harness = Harness::connected().await;
    assert!(harness.session.state().is_connected());

    harness.session.disconnect();
    assert_eq!(harness.session.state(), WalletState::default());
    assert_eq!(harness.session.get_balance().await.unwrap(), "0.0000");
}
