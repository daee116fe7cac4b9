//! The staking portal: one actor owning the wallet session, contract polling and every
//! user action, driven through a [`Mailbox`] and reporting through [`Update`]s.

mod actor;
mod ingress;

use crate::{notice::Notice, panel::PanelView};
pub use actor::Actor;
use chainlet_types::{Deployment, EffectiveStakeView, WalletSession};
pub use ingress::{Mailbox, Message};
use std::time::Duration;
use url::Url;

pub struct Config {
    pub deployment: Deployment,
    /// Contract poll period while connected.
    pub poll_interval: Duration,
    /// Pause between the "entering" notice and the redirect.
    pub enter_game_delay: Duration,
    pub mailbox_size: usize,
}

/// Output of the portal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Fresh view model; replaces the previous one.
    Panel(PanelView),
    Notice(Notice),
    /// Send the user to the game world.
    Redirect(Url),
}

/// Point-in-time copy of the portal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalState {
    pub session: WalletSession,
    pub view: EffectiveStakeView,
    pub panel: PanelView,
}
