//! Chain and deployment descriptors.
//!
//! Defines the network the portal targets, the deployed staking contract, and the
//! payload used to register the network with a wallet.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

/// EVM chain id of the pSAGA chainlet as exposed to wallets (`0x2a`).
pub const PSAGA_CHAIN_ID: u64 = 42;

/// Address of the deployed staking contract on the pSAGA chainlet.
pub const PSAGA_CONTRACT_ADDRESS: &str = "0xDe69BC0b9e42a25a629bc13314da8Dcf87453Cd5";

/// Game world opened once the user holds a stake.
pub const GAME_WORLD_URL: &str =
    "https://horizon.meta.com/worlds/631234523404686/?snapshot_id=1594378804596639";

const PSAGA_NETWORK_ID: &str = "oracle_2743084370893000-1";
const PSAGA_CHAIN_NAME: &str = "pSAGA Chainlet";
const PSAGA_RPC_ENDPOINT: &str = "https://oracle-2743084370893000-1.jsonrpc.sagarpc.io";
const PSAGA_EXPLORER_URL: &str = "https://oracle-2743084370893000-1.sagaexplorer.io";

/// Native currency of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub symbol: String,
    pub minimal_denom: String,
    pub decimals: u32,
}

/// Static descriptor of the target network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Numeric chain id wallets switch to.
    pub chain_id: u64,
    /// Human readable network identifier used by the chainlet operator.
    pub network_id: String,
    pub chain_name: String,
    pub rpc_endpoint: Url,
    pub currency: NativeCurrency,
    pub explorer_url: Url,
}

impl ChainConfig {
    /// The pSAGA chainlet.
    pub fn psaga() -> Self {
        Self {
            chain_id: PSAGA_CHAIN_ID,
            network_id: PSAGA_NETWORK_ID.to_string(),
            chain_name: PSAGA_CHAIN_NAME.to_string(),
            rpc_endpoint: parse_static(PSAGA_RPC_ENDPOINT),
            currency: NativeCurrency {
                symbol: "pSAGA".to_string(),
                minimal_denom: "upsaga".to_string(),
                decimals: 6,
            },
            explorer_url: parse_static(PSAGA_EXPLORER_URL),
        }
    }

    /// Chain id formatted the way wallets expect it (`0x`-prefixed, lowercase, no padding).
    pub fn hex_chain_id(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Number of decimals of the native currency.
    pub fn decimals(&self) -> u32 {
        self.currency.decimals
    }

    /// Payload for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> AddChainParams {
        AddChainParams {
            chain_id: self.hex_chain_id(),
            chain_name: self.chain_name.clone(),
            native_currency: AddChainCurrency {
                name: self.currency.symbol.clone(),
                symbol: self.currency.symbol.clone(),
                decimals: self.currency.decimals,
            },
            rpc_urls: vec![self.rpc_endpoint.to_string()],
            block_explorer_urls: vec![self.explorer_url.to_string()],
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::psaga()
    }
}

/// `wallet_addEthereumChain` parameter object (EIP-3085).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub native_currency: AddChainCurrency,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddChainCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

/// Where the staking contract lives and where stakers are sent afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub chain: ChainConfig,
    pub contract: Address,
    pub game_url: Url,
}

impl Deployment {
    pub fn psaga() -> Self {
        Self {
            chain: ChainConfig::psaga(),
            contract: parse_static(PSAGA_CONTRACT_ADDRESS),
            game_url: parse_static(GAME_WORLD_URL),
        }
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::psaga()
    }
}

// Only used for the built-in constants above.
fn parse_static<T: FromStr>(value: &str) -> T {
    value
        .parse()
        .unwrap_or_else(|_| panic!("invalid built-in constant: {value}"))
}
