//! Guarded staking operations on top of a [`StakingContract`].

use crate::{contract::StakingContract, Error, Result};
use chainlet_types::{AmountError, EffectiveStakeView, StakeSnapshot};
use ethers::types::{Address, TxHash, U256};
use std::fmt;
use tracing::{debug, warn};

/// Coarse reason a transaction did not go through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Rejected,
    InsufficientFunds,
    Reverted,
    Other,
}

/// A failed transaction and the provider's reason for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxFailure {
    pub kind: FailureKind,
    /// Provider message, verbatim.
    pub reason: String,
}

impl TxFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let lower = reason.to_lowercase();
        let kind = if lower.contains("user rejected") || lower.contains("user denied") {
            FailureKind::Rejected
        } else if lower.contains("insufficient funds") {
            FailureKind::InsufficientFunds
        } else if lower.contains("execution reverted") {
            FailureKind::Reverted
        } else {
            FailureKind::Other
        };
        Self { kind, reason }
    }

    /// Short explanation suitable for a notification, falling back to the raw reason.
    pub fn user_message(&self) -> &str {
        match self.kind {
            FailureKind::Rejected => "Transaction was rejected by user",
            FailureKind::InsufficientFunds => "Insufficient funds for gas",
            FailureKind::Reverted => "Transaction reverted by contract",
            FailureKind::Other => &self.reason,
        }
    }
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Staking operations with the checks that must pass before anything reaches the wallet.
#[derive(Clone)]
pub struct Staking<C: StakingContract> {
    contract: C,
}

impl<C: StakingContract> Staking<C> {
    pub fn new(contract: C) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &C {
        &self.contract
    }

    /// Read the raw staking state for `account`. No retries.
    pub async fn get_stake_snapshot(&self, account: Address) -> Result<StakeSnapshot> {
        self.contract.read_snapshot(account).await
    }

    /// Stake `amount` raw units from `from`.
    pub async fn submit_stake(&self, from: Address, amount: U256) -> Result<TxHash> {
        if amount.is_zero() {
            return Err(Error::InvalidAmount(AmountError::Zero));
        }
        debug!(?from, %amount, "submitting stake");
        self.contract
            .send_stake(from, amount)
            .await
            .inspect_err(|err| warn!(error = %err, "stake failed"))
    }

    /// Withdraw the whole stake of `from`.
    ///
    /// `view` must be the latest reconciled view: a stake masked by a finished round is not
    /// withdrawable and is refused here.
    pub async fn submit_unstake(&self, from: Address, view: &EffectiveStakeView) -> Result<TxHash> {
        if !view.has_stake() {
            return Err(Error::NoStake);
        }
        debug!(?from, stake = %view.user_stake, "submitting unstake");
        self.contract
            .send_unstake(from)
            .await
            .inspect_err(|err| warn!(error = %err, "unstake failed"))
    }

    /// Declare `winner`; the zero address starts a new round.
    pub async fn submit_set_winner(&self, from: Address, winner: Address) -> Result<TxHash> {
        debug!(?from, ?winner, "submitting winner");
        self.contract
            .send_set_winner(from, winner)
            .await
            .inspect_err(|err| warn!(error = %err, "set winner failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockStaking;
    use chainlet_types::{parse_stake_amount, reconcile};

    fn staker() -> Address {
        Address::from_low_u64_be(0x57a)
    }

    #[test]
    fn classifies_provider_reasons() {
        assert_eq!(
            TxFailure::new("MetaMask Tx Signature: User denied transaction signature.").kind,
            FailureKind::Rejected
        );
        assert_eq!(
            TxFailure::new("user rejected transaction").kind,
            FailureKind::Rejected
        );
        assert_eq!(
            TxFailure::new("(code: -32000, message: insufficient funds for gas * price + value)")
                .kind,
            FailureKind::InsufficientFunds
        );
        assert_eq!(
            TxFailure::new("Execution reverted: No stake").kind,
            FailureKind::Reverted
        );
        let other = TxFailure::new("nonce too low");
        assert_eq!(other.kind, FailureKind::Other);
        assert_eq!(other.user_message(), "nonce too low");
        assert_eq!(other.to_string(), "nonce too low");
    }

    #[tokio::test]
    async fn zero_and_negative_stakes_never_reach_the_contract() {
        let contract = MockStaking::new();
        let staking = Staking::new(contract.clone());

        assert_eq!(parse_stake_amount("0", 6), Err(AmountError::Zero));
        assert_eq!(parse_stake_amount("-1", 6), Err(AmountError::Negative));
        assert!(matches!(
            staking.submit_stake(staker(), U256::zero()).await,
            Err(Error::InvalidAmount(AmountError::Zero))
        ));
        assert_eq!(contract.calls(), 0);
    }

    #[tokio::test]
    async fn stake_then_unstake() {
        let contract = MockStaking::new();
        let staking = Staking::new(contract.clone());
        let amount = U256::from(1_000_000u64);

        staking.submit_stake(staker(), amount).await.unwrap();
        let view = reconcile(&staking.get_stake_snapshot(staker()).await.unwrap());
        assert_eq!(view.user_stake, amount);

        staking.submit_unstake(staker(), &view).await.unwrap();
        let view = reconcile(&staking.get_stake_snapshot(staker()).await.unwrap());
        assert!(!view.has_stake());
    }

    #[tokio::test]
    async fn unstake_without_effective_stake_never_reaches_the_contract() {
        let contract = MockStaking::new();
        let staking = Staking::new(contract.clone());
        let amount = U256::from(3_000_000u64);
        staking.submit_stake(staker(), amount).await.unwrap();
        staking
            .submit_set_winner(staker(), Address::zero())
            .await
            .unwrap();
        let calls = contract.calls();

        // The contract still reports the stake, but the round is over.
        let snapshot = staking.get_stake_snapshot(staker()).await.unwrap();
        assert_eq!(snapshot.user_stake_raw, amount);
        let view = reconcile(&snapshot);
        assert!(matches!(
            staking.submit_unstake(staker(), &view).await,
            Err(Error::NoStake)
        ));
        assert_eq!(contract.calls(), calls + 1);
    }

    #[tokio::test]
    async fn contract_failures_are_propagated() {
        let contract = MockStaking::new();
        contract.fail_next_write("user rejected transaction");
        let staking = Staking::new(contract);
        match staking.submit_stake(staker(), U256::one()).await {
            Err(Error::TransactionFailed(failure)) => {
                assert_eq!(failure.kind, FailureKind::Rejected)
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
