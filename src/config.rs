//! Client configuration: the target contract and the network the wallet
//! should be on.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::types::{Address, ChainId};

/// Default collection cap reported as `totalSupply`.
pub const DEFAULT_MAX_SUPPLY: u64 = 5000;

/// Default interval between `eth_getTransactionReceipt` polls.
const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Native currency descriptor used by `wallet_addEthereumChain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// The network the application expects the wallet to be connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredNetwork {
    pub chain_id: ChainId,
    pub display_name: String,
    pub rpc_endpoints: Vec<String>,
    pub native_currency: NativeCurrency,
    pub explorer_url: String,
}

impl Default for DesiredNetwork {
    fn default() -> Self {
        Self {
            chain_id: 11_155_111,
            display_name: "Sepolia".to_string(),
            rpc_endpoints: vec!["https://rpc.sepolia.org".to_string()],
            native_currency: NativeCurrency {
                name: "Sepolia Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            explorer_url: "https://sepolia.etherscan.io".to_string(),
        }
    }
}

impl DesiredNetwork {
    /// Load a network descriptor from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read network config {}", path.display()))?;
        let network: DesiredNetwork = serde_json::from_slice(&raw)
            .with_context(|| format!("invalid network config {}", path.display()))?;
        if network.rpc_endpoints.is_empty() {
            anyhow::bail!("network config must list at least one RPC endpoint");
        }
        Ok(network)
    }

    /// `chainId` parameter for `wallet_switchEthereumChain`.
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }

    /// Parameter object for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> serde_json::Value {
        serde_json::json!({
            "chainId": self.chain_id_hex(),
            "chainName": self.display_name,
            "rpcUrls": self.rpc_endpoints,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "blockExplorerUrls": [self.explorer_url],
        })
    }
}

/// Static configuration injected into every component.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of the deployed mint contract.
    pub contract_address: Address,
    pub network: DesiredNetwork,
    pub max_supply: u64,
    pub receipt_poll_interval: Duration,
}

impl ClientConfig {
    pub fn new(contract_address: Address, network: DesiredNetwork) -> Self {
        Self {
            contract_address,
            network,
            max_supply: DEFAULT_MAX_SUPPLY,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        }
    }
}
