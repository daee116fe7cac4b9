//! Client side of the chainlet staking portal.
//!
//! [`session::Session`] wraps a [`wallet::Wallet`], [`staking::Staking`] wraps the deployed
//! contract, and [`portal::Actor`] ties both together behind a [`portal::Mailbox`], polling the
//! contract while a wallet is connected and publishing [`portal::Update`]s for a front end to
//! render.

pub mod config;
pub mod contract;
pub mod defaults;
pub mod notice;
pub mod panel;
pub mod portal;
pub mod session;
pub mod staking;
pub mod wallet;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

pub use contract::{GameContract, SplitContract, StakingContract};
pub use panel::Action;
pub use portal::{Actor, Mailbox, Update};
pub use session::Session;
pub use staking::{FailureKind, Staking, TxFailure};
pub use wallet::{Eip1193, Wallet, WalletError, WalletEvent};

use chainlet_types::AmountError;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no wallet provider available: {0}")]
    ProviderUnavailable(String),
    #[error("request rejected in wallet: {0}")]
    UserRejected(String),
    #[error("wallet could not switch to chain {expected:#x}: {reason}")]
    ChainMismatch { expected: u64, reason: String },
    #[error("failed to register chain {chain_id:#x} with wallet: {reason}")]
    ChainRegistrationFailed { chain_id: u64, reason: String },
    #[error("wallet error: {0}")]
    Wallet(WalletError),
    #[error("contract read failed: {0}")]
    ReadFailed(String),
    #[error("transaction failed: {0}")]
    TransactionFailed(TxFailure),
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),
    #[error("no stake")]
    NoStake,
    #[error("no winner set")]
    NoWinner,
    #[error("wallet not connected")]
    NotConnected,
    #[error("{0} already in progress")]
    Busy(Action),
    #[error("portal mailbox closed")]
    MailboxClosed,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
