//! In-memory wallet and contract for tests.

use crate::{
    contract::StakingContract,
    defaults::DEFAULT_EVENT_CHANNEL_CAPACITY,
    staking::TxFailure,
    wallet::{
        Wallet, WalletError, WalletEvent, WalletEvents, UNRECOGNIZED_CHAIN, USER_REJECTED_REQUEST,
    },
    Error, Result,
};
use chainlet_types::{ChainConfig, StakeSnapshot};
use ethers::types::{Address, TxHash, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Semaphore};

#[derive(Default)]
struct WalletState {
    accounts: Vec<Address>,
    // Whether this site was granted account access.
    authorized: bool,
    chain_id: u64,
    known_chains: HashSet<u64>,
    reject_accounts: bool,
    reject_switch: bool,
    fail_add_chain: bool,
    balance: U256,
    requests: Vec<&'static str>,
    subscribers: Vec<mpsc::Sender<WalletEvent>>,
    prompt: Option<Arc<Semaphore>>,
}

/// Wallet that already knows the pSAGA chain and approves every request unless told otherwise.
///
/// Accounts are only exposed through `eth_accounts` once access was granted, either by
/// `eth_requestAccounts` or up front with [`MockWallet::authorized`].
#[derive(Clone)]
pub struct MockWallet {
    state: Arc<Mutex<WalletState>>,
}

impl MockWallet {
    pub fn new(accounts: Vec<Address>) -> Self {
        let chain_id = ChainConfig::psaga().chain_id;
        Self {
            state: Arc::new(Mutex::new(WalletState {
                accounts,
                chain_id,
                known_chains: HashSet::from([chain_id]),
                ..Default::default()
            })),
        }
    }

    /// Wallet that granted this site access in an earlier session.
    pub fn authorized(accounts: Vec<Address>) -> Self {
        let wallet = Self::new(accounts);
        wallet.with(|state| state.authorized = true);
        wallet
    }

    fn with<T>(&self, f: impl FnOnce(&mut WalletState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Put the wallet on mainnet with no knowledge of any other chain.
    pub fn forget_chains(&self) {
        self.with(|state| {
            state.known_chains = HashSet::from([1]);
            state.chain_id = 1;
        });
    }

    pub fn reject_accounts(&self, reject: bool) {
        self.with(|state| state.reject_accounts = reject);
    }

    pub fn reject_switch(&self, reject: bool) {
        self.with(|state| state.reject_switch = reject);
    }

    pub fn fail_add_chain(&self, fail: bool) {
        self.with(|state| state.fail_add_chain = fail);
    }

    pub fn set_balance(&self, balance: U256) {
        self.with(|state| state.balance = balance);
    }

    /// Leave `eth_requestAccounts` pending, as an unanswered wallet prompt would, until
    /// [`MockWallet::answer`] is called.
    pub fn hold_prompt(&self) {
        self.with(|state| state.prompt = Some(Arc::new(Semaphore::new(0))));
    }

    pub fn answer(&self) {
        self.with(|state| {
            if let Some(prompt) = state.prompt.take() {
                prompt.add_permits(Semaphore::MAX_PERMITS / 2);
            }
        });
    }

    /// Methods called so far, in order.
    pub fn requests(&self) -> Vec<&'static str> {
        self.with(|state| state.requests.clone())
    }

    /// Change wallet state and notify subscribers, as a user acting in the wallet would.
    pub fn emit(&self, event: WalletEvent) {
        self.with(|state| {
            match &event {
                WalletEvent::AccountsChanged(accounts) => {
                    state.accounts = accounts.clone();
                    state.authorized = !accounts.is_empty();
                }
                WalletEvent::ChainChanged(chain_id) => state.chain_id = *chain_id,
            }
            state
                .subscribers
                .retain(|subscriber| subscriber.try_send(event.clone()).is_ok());
        });
    }

    fn record(&self, method: &'static str) {
        self.with(|state| state.requests.push(method));
    }
}

impl Wallet for MockWallet {
    async fn request_accounts(&self) -> std::result::Result<Vec<Address>, WalletError> {
        self.record("eth_requestAccounts");
        let prompt = self.with(|state| state.prompt.clone());
        if let Some(prompt) = prompt {
            let _permit = prompt.acquire().await;
        }
        self.with(|state| {
            if state.reject_accounts {
                return Err(WalletError::rpc(
                    USER_REJECTED_REQUEST,
                    "User rejected the request.",
                ));
            }
            state.authorized = true;
            Ok(state.accounts.clone())
        })
    }

    async fn accounts(&self) -> std::result::Result<Vec<Address>, WalletError> {
        self.record("eth_accounts");
        Ok(self.with(|state| {
            if state.authorized {
                state.accounts.clone()
            } else {
                Vec::new()
            }
        }))
    }

    async fn chain_id(&self) -> std::result::Result<u64, WalletError> {
        self.record("eth_chainId");
        Ok(self.with(|state| state.chain_id))
    }

    async fn switch_chain(&self, chain: &ChainConfig) -> std::result::Result<(), WalletError> {
        self.record("wallet_switchEthereumChain");
        self.with(|state| {
            if state.reject_switch {
                return Err(WalletError::rpc(
                    USER_REJECTED_REQUEST,
                    "User rejected the request.",
                ));
            }
            if !state.known_chains.contains(&chain.chain_id) {
                return Err(WalletError::rpc(
                    UNRECOGNIZED_CHAIN,
                    format!("Unrecognized chain ID \"{}\".", chain.hex_chain_id()),
                ));
            }
            state.chain_id = chain.chain_id;
            Ok(())
        })
    }

    async fn add_chain(&self, chain: &ChainConfig) -> std::result::Result<(), WalletError> {
        self.record("wallet_addEthereumChain");
        self.with(|state| {
            if state.fail_add_chain {
                return Err(WalletError::rpc(-32603, "Internal JSON-RPC error."));
            }
            state.known_chains.insert(chain.chain_id);
            Ok(())
        })
    }

    async fn balance(&self, _account: Address) -> std::result::Result<U256, WalletError> {
        self.record("eth_getBalance");
        Ok(self.with(|state| state.balance))
    }

    fn subscribe(&self) -> WalletEvents {
        let (sender, receiver) = mpsc::channel(DEFAULT_EVENT_CHANNEL_CAPACITY);
        self.with(|state| state.subscribers.push(sender));
        WalletEvents::new(receiver, None)
    }
}

#[derive(Default)]
struct ContractState {
    stakes: HashMap<Address, U256>,
    total_staked: U256,
    winner: Address,
    calls: usize,
    reads: usize,
    fail_reads: bool,
    fail_next_write: Option<String>,
    gate: Option<Arc<Semaphore>>,
}

/// Staking contract with the deployed contract's bookkeeping, including its reset defect:
/// `setWinner` zeroes `totalStaked` but leaves every `stakes` entry in place.
#[derive(Clone, Default)]
pub struct MockStaking {
    state: Arc<Mutex<ContractState>>,
}

impl MockStaking {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut ContractState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Overwrite the raw contract state.
    pub fn set_state(&self, account: Address, snapshot: StakeSnapshot) {
        self.with(|state| {
            state.stakes.insert(account, snapshot.user_stake_raw);
            state.total_staked = snapshot.total_staked_raw;
            state.winner = snapshot.winner_address;
        });
    }

    /// Contract calls (reads and writes) made so far.
    pub fn calls(&self) -> usize {
        self.with(|state| state.calls)
    }

    /// Snapshot reads made so far.
    pub fn reads(&self) -> usize {
        self.with(|state| state.reads)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.with(|state| state.fail_reads = fail);
    }

    /// Make the next write fail with `reason`.
    pub fn fail_next_write(&self, reason: &str) {
        self.with(|state| state.fail_next_write = Some(reason.to_string()));
    }

    /// Hold every write until [`MockStaking::release`] is called.
    pub fn pause(&self) {
        self.with(|state| state.gate = Some(Arc::new(Semaphore::new(0))));
    }

    pub fn release(&self) {
        self.with(|state| {
            if let Some(gate) = state.gate.take() {
                gate.add_permits(Semaphore::MAX_PERMITS / 2);
            }
        });
    }

    async fn write(&self, apply: impl FnOnce(&mut ContractState) -> Result<()>) -> Result<TxHash> {
        let gate = self.with(|state| {
            state.calls += 1;
            state.gate.clone()
        });
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        self.with(|state| {
            if let Some(reason) = state.fail_next_write.take() {
                return Err(Error::TransactionFailed(TxFailure::new(reason)));
            }
            apply(state)?;
            Ok(TxHash::from_low_u64_be(state.calls as u64))
        })
    }
}

impl StakingContract for MockStaking {
    async fn read_snapshot(&self, account: Address) -> Result<StakeSnapshot> {
        self.with(|state| {
            state.calls += 1;
            state.reads += 1;
            if state.fail_reads {
                return Err(Error::ReadFailed("connection refused".into()));
            }
            Ok(StakeSnapshot {
                user_stake_raw: state.stakes.get(&account).copied().unwrap_or_default(),
                total_staked_raw: state.total_staked,
                winner_address: state.winner,
            })
        })
    }

    async fn send_stake(&self, from: Address, amount: U256) -> Result<TxHash> {
        self.write(|state| {
            *state.stakes.entry(from).or_default() += amount;
            state.total_staked += amount;
            Ok(())
        })
        .await
    }

    async fn send_unstake(&self, from: Address) -> Result<TxHash> {
        self.write(|state| {
            let stake = state.stakes.insert(from, U256::zero()).unwrap_or_default();
            if stake.is_zero() {
                return Err(Error::TransactionFailed(TxFailure::new(
                    "execution reverted: No stake to withdraw",
                )));
            }
            state.total_staked = state.total_staked.saturating_sub(stake);
            Ok(())
        })
        .await
    }

    async fn send_set_winner(&self, _from: Address, winner: Address) -> Result<TxHash> {
        self.write(|state| {
            state.winner = winner;
            state.total_staked = U256::zero();
            Ok(())
        })
        .await
    }
}
