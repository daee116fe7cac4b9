//! Wallet session management.
//!
//! Wallet round-trips are exposed as owned futures ([`Session::handshake`],
//! [`Session::restore`], [`Session::balance_lookup`]) so a caller can run them without holding
//! the session. Their results are applied synchronously.

use crate::{
    wallet::{Wallet, WalletError, WalletEvent, WalletEvents},
    Error, Result,
};
use chainlet_types::{ChainConfig, TokenBalance, WalletSession};
use ethers::types::Address;
use std::future::Future;
use tracing::{debug, info, warn};

/// What a wallet notification did to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionChange {
    /// Nothing observable changed.
    Unchanged,
    /// The wallet stopped exposing accounts.
    Disconnected,
    /// A different account is now active. Its balance is not loaded yet.
    AccountChanged(Address),
    /// The chain changed. The session was cleared and should be rebuilt with
    /// [`Session::restore`].
    Reloaded,
}

/// Wallet state read by [`Session::handshake`] or [`Session::restore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handshake {
    pub account: Address,
    pub chain_id: Option<u64>,
    pub balance: Option<TokenBalance>,
}

/// Owns the wallet handle and the [`WalletSession`] derived from it.
///
/// `wallet` is `None` when no provider is reachable; every request then fails with
/// [`Error::ProviderUnavailable`].
pub struct Session<W: Wallet> {
    wallet: Option<W>,
    chain: ChainConfig,
    state: WalletSession,
}

fn unavailable() -> Error {
    Error::ProviderUnavailable("no wallet provider configured".into())
}

impl<W: Wallet> Session<W> {
    pub fn new(wallet: Option<W>, chain: ChainConfig) -> Self {
        Self {
            wallet,
            chain,
            state: WalletSession::default(),
        }
    }

    pub fn state(&self) -> &WalletSession {
        &self.state
    }

    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn has_wallet(&self) -> bool {
        self.wallet.is_some()
    }

    /// Subscribe to wallet notifications, if a wallet is present.
    pub fn subscribe(&self) -> Option<WalletEvents> {
        self.wallet.as_ref().map(|wallet| wallet.subscribe())
    }

    /// Request account access, move the wallet onto the configured chain and load the balance.
    ///
    /// May prompt the user. Nothing is applied until [`Session::establish`].
    pub fn handshake(&self) -> impl Future<Output = Result<Handshake>> + Send + 'static {
        let wallet = self.wallet.clone();
        let chain = self.chain.clone();
        async move {
            let wallet = wallet.ok_or_else(unavailable)?;
            let accounts = wallet.request_accounts().await.map_err(|err| {
                if err.is_user_rejection() {
                    Error::UserRejected(err.message().to_string())
                } else if let WalletError::Transport(reason) = err {
                    Error::ProviderUnavailable(reason)
                } else {
                    Error::Wallet(err)
                }
            })?;
            let Some(account) = accounts.first().copied() else {
                return Err(Error::UserRejected("wallet returned no accounts".into()));
            };
            ensure_chain(&wallet, &chain).await?;

            let chain_id = match wallet.chain_id().await {
                Ok(chain_id) => chain_id,
                Err(err) => {
                    warn!(error = %err, "failed to read chain id after switch");
                    chain.chain_id
                }
            };
            let balance = load_balance(&wallet, &chain, account).await;
            Ok(Handshake {
                account,
                chain_id: Some(chain_id),
                balance,
            })
        }
    }

    /// Pick up an account the wallet already exposes, without prompting or switching chains.
    ///
    /// Resolves to `None` when the wallet exposes no account.
    pub fn restore(&self) -> impl Future<Output = Result<Option<Handshake>>> + Send + 'static {
        let wallet = self.wallet.clone();
        let chain = self.chain.clone();
        let known_chain = self.state.chain_id;
        async move {
            let wallet = wallet.ok_or_else(unavailable)?;
            let accounts = wallet.accounts().await.map_err(Error::Wallet)?;
            let Some(account) = accounts.first().copied() else {
                return Ok(None);
            };
            let chain_id = match wallet.chain_id().await {
                Ok(chain_id) => Some(chain_id),
                Err(err) => {
                    warn!(error = %err, "failed to read chain id");
                    known_chain
                }
            };
            let balance = load_balance(&wallet, &chain, account).await;
            Ok(Some(Handshake {
                account,
                chain_id,
                balance,
            }))
        }
    }

    /// Adopt `handshake` as the connected session.
    pub fn establish(&mut self, handshake: Handshake) -> Address {
        let account = handshake.account;
        self.state = WalletSession {
            connected: true,
            account: Some(account),
            chain_id: handshake.chain_id,
            balance: handshake.balance,
        };
        info!(?account, chain_id = ?self.state.chain_id, "wallet connected");
        account
    }

    /// [`Session::handshake`] followed by [`Session::establish`].
    pub async fn connect(&mut self) -> Result<Address> {
        let handshake = self.handshake().await?;
        Ok(self.establish(handshake))
    }

    /// Forget the local session. The wallet itself is left untouched.
    pub fn disconnect(&mut self) {
        if self.state.connected {
            info!(account = ?self.state.account, "wallet disconnected");
        }
        self.state.clear();
    }

    /// Read the native balance of the connected account.
    pub fn balance_lookup(
        &self,
    ) -> impl Future<Output = Result<(Address, TokenBalance)>> + Send + 'static {
        let wallet = self.wallet.clone();
        let chain = self.chain.clone();
        let account = self.state.active_account();
        async move {
            let account = account.ok_or(Error::NotConnected)?;
            let raw = wallet
                .ok_or_else(unavailable)?
                .balance(account)
                .await
                .map_err(|err| Error::ReadFailed(err.to_string()))?;
            Ok((account, TokenBalance::native(&chain, raw)))
        }
    }

    /// Store a balance read for `account`. Returns `false` if that account is no longer active.
    pub fn set_balance(&mut self, account: Address, balance: TokenBalance) -> bool {
        if self.state.active_account() != Some(account) {
            debug!(?account, "dropping balance for inactive account");
            return false;
        }
        debug!(?account, balance = %balance.formatted, "balance refreshed");
        self.state.balance = Some(balance);
        true
    }

    /// Re-read and store the native balance of the connected account.
    pub async fn refresh_balance(&mut self) -> Result<TokenBalance> {
        let (account, balance) = self.balance_lookup().await?;
        self.set_balance(account, balance.clone());
        Ok(balance)
    }

    /// Apply a wallet notification.
    pub fn handle_event(&mut self, event: WalletEvent) -> SessionChange {
        match event {
            WalletEvent::AccountsChanged(accounts) => {
                let Some(account) = accounts.first().copied() else {
                    let was_connected = self.state.connected;
                    self.disconnect();
                    return if was_connected {
                        SessionChange::Disconnected
                    } else {
                        SessionChange::Unchanged
                    };
                };
                if self.state.connected && self.state.account == Some(account) {
                    return SessionChange::Unchanged;
                }
                info!(?account, "wallet account changed");
                self.state.connected = true;
                self.state.account = Some(account);
                self.state.balance = None;
                SessionChange::AccountChanged(account)
            }
            WalletEvent::ChainChanged(chain_id) => {
                info!(chain_id, "wallet chain changed, reloading session");
                self.state.clear();
                self.state.chain_id = Some(chain_id);
                SessionChange::Reloaded
            }
        }
    }
}

async fn ensure_chain<W: Wallet>(wallet: &W, chain: &ChainConfig) -> Result<()> {
    let err = match wallet.switch_chain(chain).await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    if err.is_user_rejection() {
        return Err(Error::UserRejected(err.message().to_string()));
    }
    if !err.is_unrecognized_chain() {
        return Err(Error::ChainMismatch {
            expected: chain.chain_id,
            reason: err.to_string(),
        });
    }

    info!(chain_id = chain.chain_id, "wallet does not know chain, registering");
    wallet
        .add_chain(chain)
        .await
        .map_err(|err| Error::ChainRegistrationFailed {
            chain_id: chain.chain_id,
            reason: err.to_string(),
        })?;
    wallet.switch_chain(chain).await.map_err(|err| {
        if err.is_user_rejection() {
            Error::UserRejected(err.message().to_string())
        } else {
            Error::ChainMismatch {
                expected: chain.chain_id,
                reason: err.to_string(),
            }
        }
    })
}

/// A failed balance read is logged and leaves the balance unknown.
async fn load_balance<W: Wallet>(
    wallet: &W,
    chain: &ChainConfig,
    account: Address,
) -> Option<TokenBalance> {
    match wallet.balance(account).await {
        Ok(raw) => Some(TokenBalance::native(chain, raw)),
        Err(err) => {
            warn!(error = %err, "failed to load balance");
            None
        }
    }
}
