//! Transient notifications shown alongside the panel.

use crate::{panel::Action, Error};
use chainlet_types::AmountError;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

/// A toast-style message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: Level,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Level::Info, title, body)
    }

    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Level::Success, title, body)
    }

    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Level::Error, title, body)
    }

    fn new(level: Level, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            body: body.into(),
        }
    }

    /// Notice for a transaction handed to the wallet.
    pub fn submitted(action: Action) -> Self {
        match action {
            Action::Stake => Self::info(
                "Transaction Submitted",
                "Your stake transaction is being processed",
            ),
            Action::Unstake => Self::info(
                "Transaction Submitted",
                "Your unstake transaction is being processed",
            ),
            Action::SetWinner => Self::info(
                "Transaction Submitted",
                "Setting winner transaction is being processed",
            ),
            Action::NewRound => {
                Self::info("Resetting Game", "Resetting winner to start a new session...")
            }
            Action::Connect => Self::info("Connecting", "Approve the request in your wallet"),
            Action::EnterGame => Self::info("Entering Game World", "Redirecting to Horizon Meta..."),
        }
    }

    /// Notice for a mined transaction. `detail` carries the formatted amount for stakes.
    pub fn confirmed(action: Action, detail: &str) -> Self {
        match action {
            Action::Stake => Self::success("Stake Successful", format!("Successfully staked {detail}")),
            Action::Unstake => Self::success("Unstake Successful", "Your stake has been withdrawn"),
            Action::SetWinner => Self::success("Winner Set", "You have been set as the winner!"),
            Action::NewRound => Self::success("New Session Started", "Ready for new staking round!"),
            Action::Connect => Self::success("Connected", format!("Connected as {detail}")),
            Action::EnterGame => Self::success("Entering Game World", detail.to_string()),
        }
    }

    /// Notice for an error raised while performing `action`.
    pub fn failed(action: Action, err: &Error) -> Self {
        match err {
            Error::NotConnected => Self::error("Not Connected", "Please connect your wallet first"),
            Error::InvalidAmount(AmountError::Zero | AmountError::Negative | AmountError::Empty) => {
                Self::error("Invalid Amount", "Please enter a valid stake amount")
            }
            Error::InvalidAmount(err) => Self::error("Invalid Amount", err.to_string()),
            Error::NoStake if action == Action::EnterGame => Self::error(
                "No Stake",
                "You need to stake pSAGA tokens before entering the game",
            ),
            Error::NoStake => Self::error("No Stake", "You have no stake to withdraw"),
            Error::NoWinner => Self::error("No Winner", "There is no winner to reset yet"),
            Error::Busy(busy) => Self::error("Please Wait", format!("{busy} already in progress")),
            Error::TransactionFailed(failure) => {
                let body = match action {
                    Action::Unstake => failure.user_message().to_string(),
                    _ => failure.reason.clone(),
                };
                Self::error(failure_title(action), body)
            }
            err => Self::error(failure_title(action), err.to_string()),
        }
    }
}

fn failure_title(action: Action) -> &'static str {
    match action {
        Action::Connect => "Connection Error",
        Action::Stake => "Staking Failed",
        Action::Unstake => "Unstake Failed",
        Action::SetWinner => "Set Winner Failed",
        Action::NewRound => "Failed to Start New Session",
        Action::EnterGame => "Cannot Enter Game",
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            Level::Info => "info",
            Level::Success => "ok",
            Level::Error => "error",
        };
        write!(f, "[{tag}] {}: {}", self.title, self.body)
    }
}
