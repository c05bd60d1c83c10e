//! Metrics collection.
//!
//! # Metrics
//! - `registry_transactions_total` (counter): submissions by outcome
//! - `registry_registration_total` (counter): commit/reveal attempts by phase, outcome
//! - `registry_wallet_events_total` (counter): session transitions by event
//!
//! # Design Decisions
//! - Emitted through the `metrics` facade; the embedding application installs
//!   the recorder/exporter, the library never does

use metrics::counter;

use crate::blockchain::types::RegistryError;

/// Record a transaction submission outcome.
pub fn record_transaction(outcome: &'static str) {
    counter!("registry_transactions_total", "outcome" => outcome).increment(1);
}

/// Record a commit or reveal attempt.
pub fn record_registration(phase: &'static str, outcome: &'static str) {
    counter!("registry_registration_total", "phase" => phase, "outcome" => outcome).increment(1);
}

/// Record a wallet session transition.
pub fn record_wallet_event(event: &'static str) {
    counter!("registry_wallet_events_total", "event" => event).increment(1);
}

/// Metric label for an error.
pub fn error_label(error: &RegistryError) -> &'static str {
    match error {
        RegistryError::ProviderUnavailable => "provider_unavailable",
        RegistryError::UserRejected => "user_rejected",
        RegistryError::NotConnected => "not_connected",
        RegistryError::NetworkSwitchFailed(_) => "network_switch_failed",
        RegistryError::InsufficientFunds(_) => "insufficient_funds",
        RegistryError::Reverted(_) => "reverted",
        RegistryError::Timeout { .. } => "timeout",
        RegistryError::InvalidInput(_) => "invalid_input",
        RegistryError::TooEarly { .. } => "too_early",
        RegistryError::CommitmentMismatch => "commitment_mismatch",
        RegistryError::CommitmentPending => "commitment_pending",
        RegistryError::WrongNetwork { .. } => "wrong_network",
        RegistryError::Provider(_) => "provider_error",
    }
}
