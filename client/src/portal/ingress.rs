use super::PortalState;
use crate::{Error, Result};
use ethers::types::Address;
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};
use tracing::warn;

pub enum Message {
    Connect,
    Disconnect,
    SetStakeInput(String),
    /// Stake the current input, or `amount` if given.
    Stake {
        amount: Option<String>,
    },
    Unstake,
    /// `None` declares the connected account.
    SetWinner(Option<Address>),
    StartNewRound,
    EnterGame,
    RefreshBalance,
    Refresh,
    State {
        response: oneshot::Sender<PortalState>,
    },
}

/// Handle for sending commands to the portal [`super::Actor`].
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    async fn send(&mut self, message: Message, name: &'static str) {
        if self.sender.send(message).await.is_err() {
            warn!(command = name, "portal mailbox closed; command dropped");
        }
    }

    pub async fn connect(&mut self) {
        self.send(Message::Connect, "connect").await;
    }

    pub async fn disconnect(&mut self) {
        self.send(Message::Disconnect, "disconnect").await;
    }

    /// Edit the stake amount field. Invalid amounts are kept, reported and never staked.
    pub async fn set_stake_input(&mut self, input: impl Into<String>) {
        self.send(Message::SetStakeInput(input.into()), "set_stake_input")
            .await;
    }

    pub async fn stake(&mut self) {
        self.send(Message::Stake { amount: None }, "stake").await;
    }

    /// Enter `amount` and stake it. Nothing is staked if `amount` is invalid.
    pub async fn stake_amount(&mut self, amount: impl Into<String>) {
        let amount = Some(amount.into());
        self.send(Message::Stake { amount }, "stake").await;
    }

    pub async fn unstake(&mut self) {
        self.send(Message::Unstake, "unstake").await;
    }

    pub async fn set_winner(&mut self, winner: Option<Address>) {
        self.send(Message::SetWinner(winner), "set_winner").await;
    }

    pub async fn start_new_round(&mut self) {
        self.send(Message::StartNewRound, "start_new_round").await;
    }

    pub async fn enter_game(&mut self) {
        self.send(Message::EnterGame, "enter_game").await;
    }

    pub async fn refresh_balance(&mut self) {
        self.send(Message::RefreshBalance, "refresh_balance").await;
    }

    /// Poll the contract now instead of waiting for the next tick.
    pub async fn refresh(&mut self) {
        self.send(Message::Refresh, "refresh").await;
    }

    pub async fn state(&mut self) -> Result<PortalState> {
        let (response, receiver) = oneshot::channel();
        self.sender
            .send(Message::State { response })
            .await
            .map_err(|_| Error::MailboxClosed)?;
        receiver.await.map_err(|_| Error::MailboxClosed)
    }
}
