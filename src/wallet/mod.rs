//! Wallet access.
//!
//! # Data Flow
//! ```text
//! WalletProvider (local key over JSON-RPC, or in-memory mock)
//!     → request/response calls and ProviderEvent broadcasts
//!     → session.rs (sole writer of WalletState)
//!     → watch subscribers, TransactionSubmitter, registrar
//! ```

pub mod local;
pub mod mock;
pub mod provider;
pub mod session;

pub use local::LocalWalletProvider;
pub use mock::MockWalletProvider;
pub use provider::{ProviderError, ProviderEvent, WalletProvider};
pub use session::{format_balance, ConnectionStatus, WalletSession, WalletState};
