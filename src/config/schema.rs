//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! registration core. All types derive Serde traits for deserialization
//! from config files.

use alloy::primitives::utils::parse_units;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::network::NetworkProfile;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Target chain.
    pub network: NetworkProfile,

    /// Registry contract location.
    pub contract: ContractConfig,

    /// Commit-reveal protocol parameters.
    pub registration: RegistrationConfig,

    /// Broadcast and confirmation settings.
    pub transactions: TransactionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry contract configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContractConfig {
    /// Address of the registry contract.
    pub address: String,
}

impl ContractConfig {
    pub fn parsed_address(&self) -> Result<Address, String> {
        self.address
            .parse()
            .map_err(|e| format!("Invalid contract address '{}': {}", self.address, e))
    }
}

/// Commit-reveal protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Minimum seconds between a confirmed commit and its reveal.
    pub minimum_delay_secs: u64,

    /// Stake sent with the reveal, in whole native units (e.g. "0.002").
    pub stake: String,

    /// Where to persist pending commitments. In-memory only when unset.
    pub store_path: Option<String>,
}

impl RegistrationConfig {
    pub fn minimum_delay(&self) -> Duration {
        Duration::from_secs(self.minimum_delay_secs)
    }

    /// Stake in the smallest unit of a currency with `decimals` places.
    pub fn stake_wei(&self, decimals: u8) -> Result<U256, String> {
        if self.stake.trim_start().starts_with('-') {
            return Err(format!("Invalid stake '{}': must not be negative", self.stake));
        }
        parse_units(&self.stake, decimals)
            .map(|units| units.get_absolute())
            .map_err(|e| format!("Invalid stake '{}': {}", self.stake, e))
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            minimum_delay_secs: 3600,
            stake: "0.002".to_string(),
            store_path: None,
        }
    }
}

/// Broadcast and confirmation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Give up waiting for a receipt after this many seconds.
    pub receipt_timeout_secs: u64,

    /// Receipt polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Blocks required (including the inclusion block) before a transaction
    /// counts as confirmed.
    pub confirmation_blocks: u64,
}

impl TransactionConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            receipt_timeout_secs: 120,
            poll_interval_ms: 2000,
            confirmation_blocks: 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
