use crate::amount::format_amount;
use crate::chain::ChainConfig;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Native token balance of the connected account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub raw: U256,
    pub formatted: String,
    pub decimals: u32,
}

impl TokenBalance {
    pub fn native(chain: &ChainConfig, raw: U256) -> Self {
        Self {
            symbol: chain.currency.symbol.clone(),
            raw,
            formatted: format_amount(raw, chain.decimals()),
            decimals: chain.decimals(),
        }
    }
}

/// Wallet connection state as seen by the portal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSession {
    pub connected: bool,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub balance: Option<TokenBalance>,
}

impl WalletSession {
    /// Connected account, if any.
    pub fn active_account(&self) -> Option<Address> {
        if self.connected {
            self.account
        } else {
            None
        }
    }

    /// Whether the wallet is on `chain`.
    pub fn on_chain(&self, chain: &ChainConfig) -> bool {
        self.chain_id == Some(chain.chain_id)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
