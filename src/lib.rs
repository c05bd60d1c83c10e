//! Institution registry client library.
//!
//! Wallet session management, transaction submission and the two-phase
//! commit-reveal registration protocol against an on-chain registry.

pub mod blockchain;
pub mod clock;
pub mod config;
pub mod network;
pub mod observability;
pub mod registration;
pub mod wallet;

pub use blockchain::{RegistryError, RegistryResult, TransactionSubmitter};
pub use config::RegistryConfig;
pub use network::NetworkProfile;
pub use registration::{CommitRevealRegistrar, RegistrationData, RegistrationState};
pub use wallet::{WalletProvider, WalletSession};
