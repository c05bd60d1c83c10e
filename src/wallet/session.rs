//! Wallet connection state.
//!
//! `WalletSession` is the only writer of [`WalletState`]. Readers take a
//! snapshot with [`WalletSession::state`] or follow changes through
//! [`WalletSession::subscribe`].

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::blockchain::types::{RegistryError, RegistryResult};
use crate::network::NetworkProfile;
use crate::observability::metrics;
use crate::wallet::provider::{ProviderError, ProviderEvent, WalletProvider};

/// Fractional digits shown for balances.
pub const BALANCE_DISPLAY_DIGITS: usize = 4;

/// Balance reported when no account is connected.
pub const ZERO_BALANCE: &str = "0.0000";

/// Connection axis of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of the wallet connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletState {
    pub status: ConnectionStatus,
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    /// Native balance, truncated for display.
    pub balance: String,
}

impl WalletState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Connected address as lowercase 0x-prefixed hex.
    pub fn address_hex(&self) -> Option<String> {
        self.address.map(|a| format!("{:#x}", a))
    }
}

impl Default for WalletState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            address: None,
            chain_id: None,
            balance: ZERO_BALANCE.to_string(),
        }
    }
}

/// Format a base-unit amount with `decimals`, truncating to `digits`
/// fractional digits. Never rounds up.
pub fn format_balance(amount: U256, decimals: u8, digits: usize) -> String {
    let base = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / base;
    if digits == 0 {
        return whole.to_string();
    }

    let fraction = format!(
        "{:0>width$}",
        (amount % base).to_string(),
        width = decimals as usize
    );
    let mut shown: String = fraction.chars().take(digits).collect();
    while shown.len() < digits {
        shown.push('0');
    }
    format!("{}.{}", whole, shown)
}

/// Owned wallet session, shared by reference with the submitter.
pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    profile: NetworkProfile,
    state: Arc<watch::Sender<WalletState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl WalletSession {
    /// Create a disconnected session backed by `provider`.
    pub fn new(provider: Arc<dyn WalletProvider>, profile: NetworkProfile) -> Self {
        Self::build(Some(provider), profile)
    }

    /// Create a session for an environment with no wallet installed.
    pub fn without_provider(profile: NetworkProfile) -> Self {
        Self::build(None, profile)
    }

    fn build(provider: Option<Arc<dyn WalletProvider>>, profile: NetworkProfile) -> Self {
        let (tx, _) = watch::channel(WalletState::default());
        Self {
            provider,
            profile,
            state: Arc::new(tx),
            listener: Mutex::new(None),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> WalletState {
        self.state.borrow().clone()
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<WalletState> {
        self.state.subscribe()
    }

    /// Network this session targets.
    pub fn profile(&self) -> &NetworkProfile {
        &self.profile
    }

    pub(crate) fn provider(&self) -> RegistryResult<Arc<dyn WalletProvider>> {
        self.provider.clone().ok_or(RegistryError::ProviderUnavailable)
    }

    /// Request account access and start following provider events.
    ///
    /// Fails with [`RegistryError::NotConnected`] if [`disconnect`] runs
    /// before the provider answers.
    ///
    /// [`disconnect`]: WalletSession::disconnect
    pub async fn connect(&self) -> RegistryResult<WalletState> {
        let provider = self.provider()?;

        let current = self.state();
        if current.is_connected() {
            return Ok(current);
        }

        self.state
            .send_modify(|s| s.status = ConnectionStatus::Connecting);

        let accounts = match provider.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                self.state.send_replace(WalletState::default());
                tracing::warn!(error = %e, "Account access request failed");
                return Err(e.into());
            }
        };

        let Some(address) = accounts.first().copied() else {
            self.state.send_replace(WalletState::default());
            return Err(RegistryError::UserRejected);
        };

        let chain_id = match provider.chain_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read chain ID on connect");
                None
            }
        };

        let decimals = self.profile.native_currency.decimals;
        let balance = match provider.get_balance(address).await {
            Ok(wei) => format_balance(wei, decimals, BALANCE_DISPLAY_DIGITS),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read balance on connect");
                ZERO_BALANCE.to_string()
            }
        };

        let events = provider.subscribe();
        let state = WalletState {
            status: ConnectionStatus::Connected,
            address: Some(address),
            chain_id,
            balance,
        };
        // A disconnect while we awaited the provider wins.
        let committed = self.state.send_if_modified(|s| {
            if s.status != ConnectionStatus::Connecting {
                return false;
            }
            *s = state.clone();
            true
        });
        if !committed {
            tracing::info!(address = %address, "Connect abandoned after disconnect");
            return Err(RegistryError::NotConnected);
        }

        let handle = tokio::spawn(follow_events(events, self.state.clone()));
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        tracing::info!(
            address = %address,
            chain_id = ?chain_id,
            "Wallet connected"
        );
        metrics::record_wallet_event("connected");

        Ok(state)
    }

    /// Return to the initial disconnected state. Idempotent.
    pub fn disconnect(&self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }

        if reset_state(&self.state) {
            tracing::info!("Wallet disconnected");
            metrics::record_wallet_event("disconnected");
        }
    }

    /// Make `target` the active chain, adding it to the wallet if unknown.
    ///
    /// Already on `target`: resolves without contacting the provider. On
    /// failure the recorded chain is left as it was.
    pub async fn switch_network(&self, target: &NetworkProfile) -> RegistryResult<()> {
        let provider = self.provider()?;

        let current = match self.state().chain_id {
            Some(id) => Some(id),
            None => provider.chain_id().await.ok(),
        };
        if current == Some(target.chain_id) {
            tracing::debug!(chain_id = target.chain_id, "Already on requested network");
            return Ok(());
        }

        match provider.switch_chain(target.chain_id).await {
            Ok(()) => {}
            Err(ProviderError::UnrecognizedChain(_)) => {
                tracing::info!(
                    chain_id = target.chain_id,
                    name = %target.name,
                    "Chain unknown to wallet, adding it"
                );
                provider.add_chain(target).await.map_err(|e| {
                    RegistryError::NetworkSwitchFailed(format!("add chain failed: {}", e))
                })?;
                provider
                    .switch_chain(target.chain_id)
                    .await
                    .map_err(|e| RegistryError::NetworkSwitchFailed(e.to_string()))?;
            }
            Err(e) => return Err(RegistryError::NetworkSwitchFailed(e.to_string())),
        }

        let actual = match provider.chain_id().await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Chain switched but could not confirm active chain");
                return Ok(());
            }
        };
        set_chain(&self.state, actual);

        if actual != target.chain_id {
            return Err(RegistryError::NetworkSwitchFailed(format!(
                "wallet reports chain {} after switching to {}",
                actual, target.chain_id
            )));
        }

        tracing::info!(chain_id = actual, "Network switched");
        Ok(())
    }

    /// Native balance of the connected account, truncated for display.
    ///
    /// Disconnected sessions report [`ZERO_BALANCE`].
    pub async fn get_balance(&self) -> RegistryResult<String> {
        let snapshot = self.state();
        let address = match (snapshot.is_connected(), snapshot.address) {
            (true, Some(address)) => address,
            _ => return Ok(ZERO_BALANCE.to_string()),
        };

        let provider = self.provider()?;
        let wei = provider.get_balance(address).await?;
        let balance = format_balance(
            wei,
            self.profile.native_currency.decimals,
            BALANCE_DISPLAY_DIGITS,
        );

        self.state.send_if_modified(|s| {
            if s.is_connected() && s.address == Some(address) && s.balance != balance {
                s.balance = balance.clone();
                true
            } else {
                false
            }
        });

        Ok(balance)
    }
}

impl Drop for WalletSession {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSession")
            .field("has_provider", &self.provider.is_some())
            .field("chain_id", &self.profile.chain_id)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

fn reset_state(state: &watch::Sender<WalletState>) -> bool {
    state.send_if_modified(|s| {
        if *s == WalletState::default() {
            false
        } else {
            *s = WalletState::default();
            true
        }
    })
}

fn set_chain(state: &watch::Sender<WalletState>, chain_id: u64) {
    state.send_if_modified(|s| {
        if s.is_connected() && s.chain_id != Some(chain_id) {
            s.chain_id = Some(chain_id);
            true
        } else {
            false
        }
    });
}

/// Apply provider events until the provider disconnects us.
async fn follow_events(
    mut events: broadcast::Receiver<ProviderEvent>,
    state: Arc<watch::Sender<WalletState>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped = skipped, "Wallet event listener lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !apply_event(&state, event) {
            break;
        }
    }
}

/// Returns false once the session has been ended by the provider.
fn apply_event(state: &watch::Sender<WalletState>, event: ProviderEvent) -> bool {
    match event {
        ProviderEvent::AccountsChanged(accounts) => match accounts.first().copied() {
            None => {
                reset_state(state);
                tracing::info!("Wallet exposed no accounts, session ended by provider");
                metrics::record_wallet_event("accounts_cleared");
                false
            }
            Some(address) => {
                let changed = state.send_if_modified(|s| {
                    if s.address == Some(address) {
                        return false;
                    }
                    s.address = Some(address);
                    s.balance = ZERO_BALANCE.to_string();
                    true
                });
                if changed {
                    tracing::info!(address = %address, "Active account changed");
                    metrics::record_wallet_event("account_changed");
                }
                true
            }
        },
        ProviderEvent::ChainChanged(chain_id) => {
            set_chain(state, chain_id);
            tracing::info!(chain_id = chain_id, "Active chain changed");
            metrics::record_wallet_event("chain_changed");
            true
        }
        ProviderEvent::Disconnected => {
            reset_state(state);
            tracing::info!("Wallet provider disconnected");
            metrics::record_wallet_event("provider_disconnected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::mock::{MockWalletProvider, MOCK_ACCOUNT};
    use std::time::Duration;

    fn one_ether() -> U256 {
        U256::from(1_000_000_000_000_000_000u128)
    }

    fn session_with(mock: Arc<MockWalletProvider>) -> WalletSession {
        WalletSession::new(mock, NetworkProfile::local())
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<WalletState>, f: F) -> WalletState
    where
        F: Fn(&WalletState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let state = rx.borrow_and_update().clone();
                if f(&state) {
                    return state;
                }
                rx.changed().await.expect("session dropped");
            }
        })
        .await
        .expect("state never reached")
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_wins() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        mock.delay_account_requests(Duration::from_millis(100));
        let session = Arc::new(session_with(mock));
        let mut rx = session.subscribe();

        let connecting = tokio::spawn({
            let session = session.clone();
            async move { session.connect().await }
        });
        wait_for(&mut rx, |s| s.status == ConnectionStatus::Connecting).await;
        session.disconnect();

        let result = connecting.await.unwrap();
        assert_eq!(result.unwrap_err(), RegistryError::NotConnected);
        assert_eq!(session.state(), WalletState::default());
    }

    #[test]
    fn test_format_balance_truncates() {
        let wei = U256::from(1_234_567_890_000_000_000u128);
        assert_eq!(format_balance(wei, 18, 4), "1.2345");
        assert_eq!(format_balance(U256::from(1u64), 18, 4), "0.0000");
        assert_eq!(format_balance(U256::ZERO, 18, 4), ZERO_BALANCE);
        assert_eq!(format_balance(U256::from(1500u64), 3, 1), "1.5");
        assert_eq!(format_balance(U256::from(42u64), 0, 4), "42.0000");
        assert_eq!(format_balance(U256::from(42u64), 0, 0), "42");
    }

    #[tokio::test]
    async fn test_connect_populates_state() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock);

        let state = session.connect().await.unwrap();
        assert!(state.is_connected());
        assert_eq!(state.address, Some(MOCK_ACCOUNT));
        assert_eq!(state.chain_id, Some(31337));
        assert_eq!(state.balance, "1.0000");
        assert_eq!(
            state.address_hex().unwrap(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[tokio::test]
    async fn test_connect_without_provider() {
        let session = WalletSession::without_provider(NetworkProfile::local());
        assert_eq!(
            session.connect().await.unwrap_err(),
            RegistryError::ProviderUnavailable
        );
        assert_eq!(session.state(), WalletState::default());
    }

    #[tokio::test]
    async fn test_connect_rejected_by_user() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        mock.reject_next_request();
        let session = session_with(mock);

        assert_eq!(session.connect().await.unwrap_err(), RegistryError::UserRejected);
        assert_eq!(session.state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_restores_initial_state() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock);

        session.connect().await.unwrap();
        session.disconnect();
        assert_eq!(session.state(), WalletState::default());

        let mut rx = session.subscribe();
        rx.borrow_and_update();
        session.disconnect();
        assert!(!rx.has_changed().unwrap());
        assert_eq!(session.state(), WalletState::default());
    }

    #[tokio::test]
    async fn test_chain_changed_event_keeps_connection() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        let mut rx = session.subscribe();
        mock.emit(ProviderEvent::ChainChanged(11_155_111));

        let state = wait_for(&mut rx, |s| s.chain_id == Some(11_155_111)).await;
        assert!(state.is_connected());
        assert_eq!(state.address, Some(MOCK_ACCOUNT));
    }

    #[tokio::test]
    async fn test_empty_accounts_event_disconnects() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        let mut rx = session.subscribe();
        mock.emit(ProviderEvent::AccountsChanged(Vec::new()));

        let state = wait_for(&mut rx, |s| !s.is_connected()).await;
        assert_eq!(state, WalletState::default());
    }

    #[tokio::test]
    async fn test_account_switch_resets_balance() {
        let other = Address::repeat_byte(0x11);
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        let mut rx = session.subscribe();
        mock.emit(ProviderEvent::AccountsChanged(vec![other]));

        let state = wait_for(&mut rx, |s| s.address == Some(other)).await;
        assert!(state.is_connected());
        assert_eq!(state.balance, ZERO_BALANCE);
    }

    #[tokio::test]
    async fn test_switch_to_active_chain_is_noop() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        session.switch_network(&NetworkProfile::local()).await.unwrap();
        assert!(mock.switch_requests().is_empty());
        assert_eq!(session.state().chain_id, Some(31337));
    }

    #[tokio::test]
    async fn test_switch_adds_unknown_chain_then_retries() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        let target = NetworkProfile::sepolia();
        session.switch_network(&target).await.unwrap();

        assert_eq!(mock.switch_requests(), vec![11_155_111, 11_155_111]);
        let added = mock.added_chains();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].chain_id, "0xaa36a7");
        assert_eq!(session.state().chain_id, Some(11_155_111));
    }

    #[tokio::test]
    async fn test_switch_failure_leaves_chain_unchanged() {
        let mock = Arc::new(
            MockWalletProvider::new(31337)
                .with_account(MOCK_ACCOUNT, one_ether())
                .with_known_chain(11_155_111),
        );
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        mock.fail_next_switch(ProviderError::UserRejected);
        let err = session
            .switch_network(&NetworkProfile::sepolia())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::NetworkSwitchFailed(_)));
        assert_eq!(session.state().chain_id, Some(31337));
        assert!(mock.added_chains().is_empty());
    }

    #[tokio::test]
    async fn test_balance_when_disconnected_is_zero_sentinel() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock);
        assert_eq!(session.get_balance().await.unwrap(), ZERO_BALANCE);
    }

    #[tokio::test]
    async fn test_balance_refresh_updates_state() {
        let mock = Arc::new(MockWalletProvider::new(31337).with_account(MOCK_ACCOUNT, one_ether()));
        let session = session_with(mock.clone());
        session.connect().await.unwrap();

        mock.set_balance(MOCK_ACCOUNT, U256::from(2_500_000_000_000_000_000u128));
        assert_eq!(session.get_balance().await.unwrap(), "2.5000");
        assert_eq!(session.state().balance, "2.5000");
    }
}
