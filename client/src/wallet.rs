//! Wallet provider access.
//!
//! A [`Wallet`] is anything that answers the EIP-1193 requests the portal needs. [`Eip1193`]
//! speaks them over JSON-RPC through an `ethers` [`Provider`], which works against any wallet
//! exposing a local RPC endpoint.

use crate::defaults::DEFAULT_EVENT_CHANNEL_CAPACITY;
use chainlet_types::ChainConfig;
use ethers::providers::{JsonRpcClient, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{Address, U256};
use futures::Stream;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// EIP-1193: the user rejected the request.
pub const USER_REJECTED_REQUEST: i64 = 4001;

/// EIP-1193: the wallet does not know the requested chain.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

/// Error returned by a wallet request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("wallet unreachable: {0}")]
    Transport(String),
}

impl WalletError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            Self::Transport(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Rpc { message, .. } => message,
            Self::Transport(message) => message,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(USER_REJECTED_REQUEST)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code() == Some(UNRECOGNIZED_CHAIN)
    }
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        match err.as_error_response() {
            Some(response) => Self::Rpc {
                code: response.code,
                message: response.message.clone(),
            },
            None => Self::Transport(err.to_string()),
        }
    }
}

/// Notification emitted by a wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    /// `accountsChanged`; an empty list means the wallet disconnected us.
    AccountsChanged(Vec<Address>),
    /// `chainChanged`.
    ChainChanged(u64),
}

/// Subscription to [`WalletEvent`]s.
///
/// Dropping the subscription stops whatever task feeds it.
pub struct WalletEvents {
    receiver: mpsc::Receiver<WalletEvent>,
    _handle: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for WalletEvents {
    fn drop(&mut self) {
        if let Some(handle) = &self._handle {
            handle.abort();
        }
    }
}

impl WalletEvents {
    pub(crate) fn new(
        receiver: mpsc::Receiver<WalletEvent>,
        handle: Option<tokio::task::JoinHandle<()>>,
    ) -> Self {
        Self {
            receiver,
            _handle: handle,
        }
    }

    /// Receive the next event.
    pub async fn next(&mut self) -> Option<WalletEvent> {
        self.receiver.recv().await
    }
}

impl Stream for WalletEvents {
    type Item = WalletEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Requests the portal issues against a wallet.
///
/// Handles are cheap to clone so requests can run off the portal's event loop.
pub trait Wallet: Clone + Send + Sync + 'static {
    /// `eth_requestAccounts`: may prompt the user.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    /// `eth_accounts`: never prompts.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, WalletError>> + Send;

    /// `eth_chainId`.
    fn chain_id(&self) -> impl Future<Output = Result<u64, WalletError>> + Send;

    /// `wallet_switchEthereumChain`.
    fn switch_chain(
        &self,
        chain: &ChainConfig,
    ) -> impl Future<Output = Result<(), WalletError>> + Send;

    /// `wallet_addEthereumChain`.
    fn add_chain(&self, chain: &ChainConfig)
        -> impl Future<Output = Result<(), WalletError>> + Send;

    /// `eth_getBalance` at the latest block.
    fn balance(&self, account: Address) -> impl Future<Output = Result<U256, WalletError>> + Send;

    /// Start receiving account and chain notifications.
    fn subscribe(&self) -> WalletEvents;
}

/// Wallet reached over JSON-RPC.
///
/// Plain JSON-RPC has no push channel, so [`Wallet::subscribe`] spawns a watcher that samples
/// `eth_accounts` and `eth_chainId` and reports changes.
#[derive(Clone, Debug)]
pub struct Eip1193<P> {
    provider: Provider<P>,
    watch_interval: Duration,
}

impl<P: JsonRpcClient + Clone + 'static> Eip1193<P> {
    pub fn new(provider: Provider<P>, watch_interval: Duration) -> Self {
        Self {
            provider,
            watch_interval,
        }
    }

    pub fn provider(&self) -> &Provider<P> {
        &self.provider
    }

    async fn watch(self, sender: mpsc::Sender<WalletEvent>) {
        let mut ticker = interval(self.watch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_accounts: Option<Vec<Address>> = None;
        let mut last_chain: Option<u64> = None;
        loop {
            ticker.tick().await;

            match self.accounts().await {
                Ok(accounts) => {
                    if let Some(event) = account_change(&last_accounts, &accounts) {
                        if sender.send(event).await.is_err() {
                            break; // Subscriber dropped
                        }
                    }
                    last_accounts = Some(accounts);
                }
                Err(err) => debug!(error = %err, "wallet account watch failed"),
            }

            match self.chain_id().await {
                Ok(chain_id) => {
                    if let Some(event) = chain_change(last_chain, chain_id) {
                        if sender.send(event).await.is_err() {
                            break;
                        }
                    }
                    last_chain = Some(chain_id);
                }
                Err(err) => debug!(error = %err, "wallet chain watch failed"),
            }
        }
    }
}

/// First observation establishes a baseline and is not reported.
fn account_change(last: &Option<Vec<Address>>, current: &[Address]) -> Option<WalletEvent> {
    match last {
        Some(last) if last.as_slice() != current => {
            Some(WalletEvent::AccountsChanged(current.to_vec()))
        }
        _ => None,
    }
}

fn chain_change(last: Option<u64>, current: u64) -> Option<WalletEvent> {
    match last {
        Some(last) if last != current => Some(WalletEvent::ChainChanged(current)),
        _ => None,
    }
}

impl<P: JsonRpcClient + Clone + 'static> Wallet for Eip1193<P> {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(self.provider.request("eth_requestAccounts", ()).await?)
    }

    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        Ok(self.provider.request("eth_accounts", ()).await?)
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        let chain_id = self.provider.get_chainid().await?;
        Ok(chain_id.low_u64())
    }

    async fn switch_chain(&self, chain: &ChainConfig) -> Result<(), WalletError> {
        let params = [json!({ "chainId": chain.hex_chain_id() })];
        let _: serde_json::Value = self
            .provider
            .request("wallet_switchEthereumChain", params)
            .await?;
        Ok(())
    }

    async fn add_chain(&self, chain: &ChainConfig) -> Result<(), WalletError> {
        let params = [chain.add_chain_params()];
        info!(chain_id = %params[0].chain_id, name = %params[0].chain_name, "registering chain with wallet");
        let _: serde_json::Value = self
            .provider
            .request("wallet_addEthereumChain", params)
            .await?;
        Ok(())
    }

    async fn balance(&self, account: Address) -> Result<U256, WalletError> {
        Ok(self.provider.get_balance(account, None).await?)
    }

    fn subscribe(&self) -> WalletEvents {
        let (sender, receiver) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let watcher = self.clone();
        let handle = tokio::spawn(watcher.watch(sender));
        WalletEvents::new(receiver, Some(handle))
    }
}
