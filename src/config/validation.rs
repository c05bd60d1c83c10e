//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, URLs and amounts parse
//! - Validate value ranges (timeouts > 0, decimals sane)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RegistryConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::RegistryConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Largest decimals value any EVM wallet accepts for a native currency.
const MAX_DECIMALS: u8 = 36;

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &RegistryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let network = &config.network;

    if network.chain_id == 0 {
        errors.push(ValidationError::new("network.chain_id", "must be non-zero"));
    }
    if network.name.trim().is_empty() {
        errors.push(ValidationError::new("network.name", "must not be empty"));
    }
    if let Err(e) = url::Url::parse(&network.rpc_url) {
        errors.push(ValidationError::new(
            "network.rpc_url",
            format!("invalid URL '{}': {}", network.rpc_url, e),
        ));
    }
    if !network.explorer_url.is_empty() {
        if let Err(e) = url::Url::parse(&network.explorer_url) {
            errors.push(ValidationError::new(
                "network.explorer_url",
                format!("invalid URL '{}': {}", network.explorer_url, e),
            ));
        }
    }
    if network.native_currency.symbol.trim().is_empty() {
        errors.push(ValidationError::new(
            "network.native_currency.symbol",
            "must not be empty",
        ));
    }
    if network.native_currency.decimals > MAX_DECIMALS {
        errors.push(ValidationError::new(
            "network.native_currency.decimals",
            format!("must be at most {}", MAX_DECIMALS),
        ));
    }

    if let Err(e) = config.contract.parsed_address() {
        errors.push(ValidationError::new("contract.address", e));
    }

    let decimals = config.network.native_currency.decimals;
    if let Err(e) = config.registration.stake_wei(decimals) {
        errors.push(ValidationError::new("registration.stake", e));
    }

    let tx = &config.transactions;
    if tx.receipt_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "transactions.receipt_timeout_secs",
            "must be greater than 0",
        ));
    }
    if tx.poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "transactions.poll_interval_ms",
            "must be greater than 0",
        ));
    }
    if tx.confirmation_blocks == 0 {
        errors.push(ValidationError::new(
            "transactions.confirmation_blocks",
            "must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
