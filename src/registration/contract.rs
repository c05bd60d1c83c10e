//! Registry contract ABI.

use alloy::primitives::{B256, U256};
use alloy::sol;

use crate::registration::commitment::RegistrationData;

sol! {
    /// Institution registry using commit-reveal registration.
    #[derive(Debug, PartialEq, Eq)]
    interface IInstitutionRegistry {
        /// Record a commitment hash for the sender. No stake.
        function commitRegistration(bytes32 commitHash) external;

        /// Reveal the committed data. Requires the registration stake.
        function revealRegistration(
            string name,
            string country,
            string[] specialties,
            uint256 nonce
        ) external payable;
    }
}

pub use IInstitutionRegistry::{commitRegistrationCall, revealRegistrationCall};

/// Build the commit call for a hash.
pub fn commit_call(commit_hash: B256) -> commitRegistrationCall {
    commitRegistrationCall {
        commitHash: commit_hash,
    }
}

/// Build the reveal call carrying the plaintext registration.
pub fn reveal_call(data: &RegistrationData) -> revealRegistrationCall {
    revealRegistrationCall {
        name: data.institution_name.clone(),
        country: data.country.clone(),
        specialties: data.specialties.clone(),
        nonce: U256::from(data.nonce),
    }
}
