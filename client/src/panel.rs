//! View model for the wallet and staking panels.
//!
//! [`PanelView::render`] is a pure function of the wallet session, the reconciled stake view
//! and a handful of transient UI flags. Front ends draw whatever it returns and never decide
//! enablement themselves.

use chainlet_types::{
    amount::shorten_address, format_amount, parse_stake_amount, ChainConfig,
    EffectiveStakeView, WalletSession,
};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::Serialize;
use std::fmt;

/// User-triggered operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Connect,
    Stake,
    Unstake,
    SetWinner,
    NewRound,
    EnterGame,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Connect,
        Action::Stake,
        Action::Unstake,
        Action::SetWinner,
        Action::NewRound,
        Action::EnterGame,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Connect => "connect",
            Action::Stake => "stake",
            Action::Unstake => "unstake",
            Action::SetWinner => "set winner",
            Action::NewRound => "new round",
            Action::EnterGame => "enter game",
        })
    }
}

/// Transient UI state: which actions are in flight and the last connection error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UiFlags {
    busy: [bool; Action::ALL.len()],
    pub error: Option<String>,
}

impl UiFlags {
    pub fn is_busy(&self, action: Action) -> bool {
        self.busy[action.index()]
    }

    pub fn set(&mut self, action: Action, busy: bool) {
        self.busy[action.index()] = busy;
    }

    /// Clear every busy flag.
    pub fn reset(&mut self) {
        self.busy = Default::default();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Connected,
    Error,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
            ConnectionStatus::Disconnected => "Disconnected",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonState {
    pub visible: bool,
    pub enabled: bool,
    pub busy: bool,
    pub label: &'static str,
}

impl ButtonState {
    fn new(enabled: bool, busy: bool, idle: &'static str, working: &'static str) -> Self {
        Self {
            visible: true,
            enabled,
            busy,
            label: if busy { working } else { idle },
        }
    }

    fn hidden(mut self) -> Self {
        self.visible = false;
        self.enabled = false;
        self
    }
}

const ENTRY_LOCKED: &str = "Stake tokens to unlock game entry";
const ENTRY_UNLOCKED: &str = "Click to enter the game with your current stake";
const WINNER_SELF: &str = "You are the Winner!";

/// Everything a front end needs to draw both panels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub status: ConnectionStatus,
    pub chain_name: String,
    pub account: Option<Address>,
    pub account_short: Option<String>,
    /// Connected, but the wallet is on another chain.
    pub wrong_chain: bool,
    pub balance: Option<String>,
    pub user_stake: String,
    pub total_staked: String,
    pub winner: Option<String>,
    pub stake_input: String,
    pub connect: ButtonState,
    pub stake: ButtonState,
    pub unstake: ButtonState,
    pub set_winner: ButtonState,
    pub new_round: ButtonState,
    pub enter_game: ButtonState,
    pub entry_hint: &'static str,
    pub error: Option<String>,
}

impl PanelView {
    pub fn render(
        session: &WalletSession,
        view: &EffectiveStakeView,
        flags: &UiFlags,
        stake_input: &str,
        chain: &ChainConfig,
    ) -> Self {
        let decimals = chain.decimals();
        let symbol = &chain.currency.symbol;
        let amount = |raw: U256| format!("{} {symbol}", format_amount(raw, decimals));

        let connected = session.connected;
        let account = session.active_account();
        let has_stake = view.has_stake();
        let input_valid = parse_stake_amount(stake_input, decimals).is_ok();
        let busy = |action| flags.is_busy(action);

        let status = if connected {
            ConnectionStatus::Connected
        } else if flags.error.is_some() {
            ConnectionStatus::Error
        } else {
            ConnectionStatus::Disconnected
        };

        let connect_label = if connected {
            "Connected"
        } else {
            "Connect Wallet"
        };
        let connect = ButtonState::new(
            !connected && !busy(Action::Connect),
            busy(Action::Connect),
            connect_label,
            "Connecting...",
        );
        let stake = ButtonState::new(
            connected && !busy(Action::Stake) && input_valid,
            busy(Action::Stake),
            "Stake Tokens",
            "Staking...",
        );
        let unstake = ButtonState::new(
            connected && has_stake && !busy(Action::Unstake),
            busy(Action::Unstake),
            "Unstake",
            "Unstaking...",
        );
        let set_winner = ButtonState::new(
            connected && !busy(Action::SetWinner),
            busy(Action::SetWinner),
            "Set Me as Winner",
            "Setting Winner...",
        );
        let mut new_round = ButtonState::new(
            connected && !busy(Action::NewRound),
            busy(Action::NewRound),
            "Start New Staking Session",
            "Starting New Session...",
        );
        if view.winner.is_none() {
            new_round = new_round.hidden();
        }
        let enter_game = ButtonState::new(
            connected && has_stake && !busy(Action::EnterGame),
            busy(Action::EnterGame),
            "ENTER THE GAME",
            "Entering...",
        );

        let winner = view.winner.map(|winner| {
            if view.is_winner(account) {
                WINNER_SELF.to_string()
            } else {
                to_checksum(&winner, None)
            }
        });

        Self {
            status,
            chain_name: chain.chain_name.clone(),
            account,
            account_short: account.as_ref().map(shorten_address),
            wrong_chain: connected && !session.on_chain(chain),
            balance: session
                .balance
                .as_ref()
                .map(|balance| format!("{} {}", balance.formatted, balance.symbol)),
            user_stake: amount(view.user_stake),
            total_staked: amount(view.total_staked),
            winner,
            stake_input: stake_input.to_string(),
            connect,
            stake,
            unstake,
            set_winner,
            new_round,
            enter_game,
            entry_hint: if has_stake {
                ENTRY_UNLOCKED
            } else {
                ENTRY_LOCKED
            },
            error: flags.error.clone(),
        }
    }
}

fn write_button(f: &mut fmt::Formatter<'_>, key: &str, button: &ButtonState) -> fmt::Result {
    if !button.visible {
        return Ok(());
    }
    let state = if button.enabled { "enabled" } else { "disabled" };
    writeln!(f, "  [{key}] {} ({state})", button.label)
}

impl fmt::Display for PanelView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} | {}", self.chain_name, self.status)?;
        if let Some(account) = &self.account_short {
            write!(f, "  account: {account}")?;
            if let Some(balance) = &self.balance {
                write!(f, " ({balance})")?;
            }
            writeln!(f)?;
        }
        if self.wrong_chain {
            writeln!(f, "  wallet is on the wrong network")?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "  error: {error}")?;
        }
        writeln!(f, "  your stake: {}", self.user_stake)?;
        writeln!(f, "  total staked: {}", self.total_staked)?;
        if let Some(winner) = &self.winner {
            writeln!(f, "  current winner: {winner}")?;
        }
        writeln!(f, "  stake amount: {}", self.stake_input)?;
        write_button(f, "connect", &self.connect)?;
        write_button(f, "stake", &self.stake)?;
        write_button(f, "unstake", &self.unstake)?;
        write_button(f, "winner", &self.set_winner)?;
        write_button(f, "reset", &self.new_round)?;
        write_button(f, "enter", &self.enter_game)?;
        write!(f, "  {}", self.entry_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlet_types::{reconcile, StakeSnapshot, TokenBalance};

    fn account() -> Address {
        Address::from_low_u64_be(0xa11ce)
    }

    fn connected() -> WalletSession {
        let chain = ChainConfig::psaga();
        WalletSession {
            connected: true,
            account: Some(account()),
            chain_id: Some(chain.chain_id),
            balance: Some(TokenBalance::native(&chain, U256::from(7_250_000u64))),
        }
    }

    fn staked(user: u64, total: u64, winner: Address) -> EffectiveStakeView {
        reconcile(&StakeSnapshot {
            user_stake_raw: U256::from(user),
            total_staked_raw: U256::from(total),
            winner_address: winner,
        })
    }

    fn render(session: &WalletSession, view: &EffectiveStakeView, input: &str) -> PanelView {
        PanelView::render(session, view, &UiFlags::default(), input, &ChainConfig::psaga())
    }

    #[test]
    fn disconnected_only_allows_connect() {
        let panel = render(
            &WalletSession::default(),
            &EffectiveStakeView::default(),
            "1",
        );
        assert_eq!(panel.status, ConnectionStatus::Disconnected);
        assert!(panel.connect.enabled);
        assert_eq!(panel.connect.label, "Connect Wallet");
        assert!(!panel.stake.enabled);
        assert!(!panel.unstake.enabled);
        assert!(!panel.set_winner.enabled);
        assert!(!panel.enter_game.enabled);
        assert!(!panel.new_round.visible);
        assert_eq!(panel.account, None);
    }

    #[test]
    fn stake_requires_positive_input() {
        let session = connected();
        let view = EffectiveStakeView::default();
        assert!(!render(&session, &view, "0").stake.enabled);
        assert!(!render(&session, &view, "-1").stake.enabled);
        assert!(!render(&session, &view, "").stake.enabled);
        assert!(!render(&session, &view, "abc").stake.enabled);
        assert!(render(&session, &view, "0.5").stake.enabled);
    }

    #[test]
    fn unstake_and_enter_follow_effective_stake() {
        let session = connected();
        let panel = render(&session, &staked(1_000_000, 1_000_000, Address::zero()), "0");
        assert!(panel.unstake.enabled);
        assert!(panel.enter_game.enabled);
        assert_eq!(panel.entry_hint, ENTRY_UNLOCKED);
        assert_eq!(panel.user_stake, "1 pSAGA");

        // Stale stake after a finished round is masked.
        let panel = render(&session, &staked(1_000_000, 0, Address::zero()), "0");
        assert!(!panel.unstake.enabled);
        assert!(!panel.enter_game.enabled);
        assert_eq!(panel.entry_hint, ENTRY_LOCKED);
        assert_eq!(panel.user_stake, "0 pSAGA");
    }

    #[test]
    fn busy_actions_are_disabled() {
        let session = connected();
        let view = staked(1_000_000, 2_000_000, Address::zero());
        let mut flags = UiFlags::default();
        flags.set(Action::Stake, true);
        flags.set(Action::Unstake, true);
        let panel = PanelView::render(&session, &view, &flags, "1", &ChainConfig::psaga());
        assert!(!panel.stake.enabled);
        assert_eq!(panel.stake.label, "Staking...");
        assert!(!panel.unstake.enabled);
        assert!(panel.enter_game.enabled);

        flags.reset();
        assert!(!flags.is_busy(Action::Stake));
    }

    #[test]
    fn winner_labels() {
        let session = connected();
        let panel = render(&session, &staked(0, 0, account()), "0");
        assert_eq!(panel.winner.as_deref(), Some(WINNER_SELF));
        assert!(panel.new_round.visible);
        assert!(panel.new_round.enabled);

        let other = Address::from_low_u64_be(0xb0b);
        let panel = render(&session, &staked(0, 0, other), "0");
        assert_eq!(panel.winner, Some(to_checksum(&other, None)));
    }

    #[test]
    fn connection_error_status() {
        let flags = UiFlags {
            error: Some("User rejected the request.".into()),
            ..Default::default()
        };
        let panel = PanelView::render(
            &WalletSession::default(),
            &EffectiveStakeView::default(),
            &flags,
            "0",
            &ChainConfig::psaga(),
        );
        assert_eq!(panel.status, ConnectionStatus::Error);
        assert!(panel.to_string().contains("error: User rejected the request."));
    }

    #[test]
    fn reports_wrong_chain_and_balance() {
        let mut session = connected();
        let panel = render(&session, &EffectiveStakeView::default(), "0");
        assert!(!panel.wrong_chain);
        assert_eq!(panel.balance.as_deref(), Some("7.25 pSAGA"));
        assert_eq!(panel.account_short, Some(shorten_address(&account())));

        session.chain_id = Some(1);
        assert!(render(&session, &EffectiveStakeView::default(), "0").wrong_chain);
    }
}
