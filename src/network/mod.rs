//! Target network description.
//!
//! # Data Flow
//! ```text
//! config file [network] section
//!     → profile.rs (NetworkProfile, immutable after load)
//!     → wallet session (connect / switch network / add chain)
//!     → explorer links for confirmed transactions
//! ```

pub mod profile;

pub use profile::{AddChainParams, NativeCurrency, NetworkProfile};
