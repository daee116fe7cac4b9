//! Staking state as read from the contract, and the view the portal is allowed to render.
//!
//! The contract resets `totalStaked` to zero whenever `setWinner` is called (including a
//! reset to the zero address) but never clears the per-address `stakes` entries. A zero
//! total is therefore the observable signature of a completed distribution round, and any
//! individual stake still reported at that point has already been paid out or burned.
//! [`reconcile`] masks those stale entries.

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Raw values read from the contract in one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeSnapshot {
    /// `stakes(account)`.
    pub user_stake_raw: U256,
    /// `totalStaked()`.
    pub total_staked_raw: U256,
    /// `winner()`; the zero address means no winner.
    pub winner_address: Address,
}

/// Reconciled staking state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveStakeView {
    pub user_stake: U256,
    pub total_staked: U256,
    pub winner: Option<Address>,
}

impl EffectiveStakeView {
    /// Whether the user holds a stake they could withdraw or enter the game with.
    pub fn has_stake(&self) -> bool {
        !self.user_stake.is_zero()
    }

    /// Whether `account` is the declared winner.
    pub fn is_winner(&self, account: Option<Address>) -> bool {
        matches!((self.winner, account), (Some(winner), Some(account)) if winner == account)
    }
}

impl From<StakeSnapshot> for EffectiveStakeView {
    fn from(snapshot: StakeSnapshot) -> Self {
        reconcile(&snapshot)
    }
}

/// Derive the renderable view from a snapshot.
///
/// Stateless: the same snapshot always yields the same view.
pub fn reconcile(snapshot: &StakeSnapshot) -> EffectiveStakeView {
    let user_stake = if snapshot.total_staked_raw.is_zero() {
        U256::zero()
    } else {
        snapshot.user_stake_raw
    };
    let winner = (!snapshot.winner_address.is_zero()).then_some(snapshot.winner_address);
    EffectiveStakeView {
        user_stake,
        total_staked: snapshot.total_staked_raw,
        winner,
    }
}
