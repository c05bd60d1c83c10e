//! Static chain profiles.

use alloy::primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};

/// Native currency of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Description of the chain the registry lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkProfile {
    /// EIP-155 chain ID.
    pub chain_id: u64,

    /// Human-readable network name.
    pub name: String,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Native currency metadata.
    pub native_currency: NativeCurrency,

    /// Block explorer base URL (empty when the chain has none).
    pub explorer_url: String,
}

impl NetworkProfile {
    /// Ethereum Sepolia testnet.
    pub fn sepolia() -> Self {
        Self {
            chain_id: 11_155_111,
            name: "Sepolia".to_string(),
            rpc_url: "https://rpc.sepolia.org".to_string(),
            native_currency: NativeCurrency {
                name: "Sepolia Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            explorer_url: "https://sepolia.etherscan.io".to_string(),
        }
    }

    /// Local Anvil / Hardhat node.
    pub fn local() -> Self {
        Self {
            chain_id: 31_337,
            name: "Localhost".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            explorer_url: String::new(),
        }
    }

    /// Chain ID as a 0x-prefixed hex quantity, the form wallets expect.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Explorer link for a transaction.
    pub fn tx_url(&self, hash: &TxHash) -> Option<String> {
        self.explorer_link("tx", &format!("{:#x}", hash))
    }

    /// Explorer link for an account.
    pub fn address_url(&self, address: &Address) -> Option<String> {
        self.explorer_link("address", &format!("{:#x}", address))
    }

    fn explorer_link(&self, kind: &str, id: &str) -> Option<String> {
        if self.explorer_url.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}/{}",
            self.explorer_url.trim_end_matches('/'),
            kind,
            id
        ))
    }

    /// Parameters for a `wallet_addEthereumChain` request (EIP-3085).
    pub fn add_chain_params(&self) -> AddChainParams {
        AddChainParams {
            chain_id: self.chain_id_hex(),
            chain_name: self.name.clone(),
            native_currency: self.native_currency.clone(),
            rpc_urls: vec![self.rpc_url.clone()],
            block_explorer_urls: if self.explorer_url.is_empty() {
                Vec::new()
            } else {
                vec![self.explorer_url.clone()]
            },
        }
    }
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self::sepolia()
    }
}

/// EIP-3085 chain description sent when the wallet does not know a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: NativeCurrency,
    pub rpc_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub block_explorer_urls: Vec<String>,
}
