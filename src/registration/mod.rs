//! Commit-reveal registration.
//!
//! # Data Flow
//! ```text
//! RegistrationData (name, country, specialties, nonce)
//!     → commitment.rs (validate, keccak256 bound to sender)
//!     → contract.rs (commitRegistration calldata)
//!     → registrar.rs via TransactionSubmitter (confirmed commit)
//!     → store.rs (RegistrationCommitment, optionally on disk)
//!     ... minimum delay ...
//!     → registrar.rs (local checks, revealRegistration with stake)
//! ```
//!
//! # Constraints
//! - Commit must be confirmed before reveal is attempted
//! - The reveal must carry exactly the committed plaintext

pub mod commitment;
pub mod contract;
pub mod registrar;
pub mod store;

pub use commitment::{compute_commit_hash, generate_nonce, RegistrationCommitment, RegistrationData};
pub use registrar::{CommitReceipt, CommitRevealRegistrar, RegistrationState, RevealReceipt};
pub use store::CommitmentStore;
