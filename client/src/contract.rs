//! Binding to the deployed staking contract.

use crate::{staking::TxFailure, Error, Result};
use chainlet_types::StakeSnapshot;
use ethers::abi::Detokenize;
use ethers::contract::{abigen, ContractCall};
use ethers::providers::Middleware;
use ethers::types::{Address, TransactionReceipt, TxHash, U256};
use std::future::Future;
use tracing::{debug, info};

abigen!(
    GameContract,
    r#"[
        function stake() external payable
        function unstake() external
        function setWinner(address _winner) external
        function stakes(address) external view returns (uint256)
        function totalStaked() external view returns (uint256)
        function winner() external view returns (address)
    ]"#
);

/// Calls the portal makes against the staking contract.
///
/// Writes resolve once the transaction is mined with a successful status.
pub trait StakingContract: Clone + Send + Sync + 'static {
    /// Read `winner`, `totalStaked` and `stakes(account)`.
    fn read_snapshot(&self, account: Address)
        -> impl Future<Output = Result<StakeSnapshot>> + Send;

    /// `stake()` with `amount` attached.
    fn send_stake(&self, from: Address, amount: U256)
        -> impl Future<Output = Result<TxHash>> + Send;

    /// `unstake()`.
    fn send_unstake(&self, from: Address) -> impl Future<Output = Result<TxHash>> + Send;

    /// `setWinner(winner)`.
    fn send_set_winner(
        &self,
        from: Address,
        winner: Address,
    ) -> impl Future<Output = Result<TxHash>> + Send;
}

impl<M: Middleware + 'static> StakingContract for GameContract<M> {
    async fn read_snapshot(&self, account: Address) -> Result<StakeSnapshot> {
        let winner_address = self.winner().call().await.map_err(read_failed)?;
        let total_staked_raw = self.total_staked().call().await.map_err(read_failed)?;
        let user_stake_raw = self.stakes(account).call().await.map_err(read_failed)?;
        debug!(
            ?account,
            %user_stake_raw,
            %total_staked_raw,
            ?winner_address,
            "read stake snapshot"
        );
        Ok(StakeSnapshot {
            user_stake_raw,
            total_staked_raw,
            winner_address,
        })
    }

    async fn send_stake(&self, from: Address, amount: U256) -> Result<TxHash> {
        confirm(self.stake().from(from).value(amount)).await
    }

    async fn send_unstake(&self, from: Address) -> Result<TxHash> {
        confirm(self.unstake().from(from)).await
    }

    async fn send_set_winner(&self, from: Address, winner: Address) -> Result<TxHash> {
        confirm(self.set_winner(winner).from(from)).await
    }
}

/// Routes reads and writes to different endpoints.
///
/// Reads go to the chain's own RPC so they do not depend on which network the wallet is
/// on; writes go through the wallet, which signs them.
#[derive(Clone, Debug)]
pub struct SplitContract<R, S> {
    reader: R,
    writer: S,
}

impl<R: StakingContract, S: StakingContract> SplitContract<R, S> {
    pub fn new(reader: R, writer: S) -> Self {
        Self { reader, writer }
    }
}

impl<R: StakingContract, S: StakingContract> StakingContract for SplitContract<R, S> {
    fn read_snapshot(
        &self,
        account: Address,
    ) -> impl Future<Output = Result<StakeSnapshot>> + Send {
        self.reader.read_snapshot(account)
    }

    fn send_stake(
        &self,
        from: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash>> + Send {
        self.writer.send_stake(from, amount)
    }

    fn send_unstake(&self, from: Address) -> impl Future<Output = Result<TxHash>> + Send {
        self.writer.send_unstake(from)
    }

    fn send_set_winner(
        &self,
        from: Address,
        winner: Address,
    ) -> impl Future<Output = Result<TxHash>> + Send {
        self.writer.send_set_winner(from, winner)
    }
}

fn read_failed(err: impl std::fmt::Display) -> Error {
    Error::ReadFailed(err.to_string())
}

fn tx_failed(err: impl std::fmt::Display) -> Error {
    Error::TransactionFailed(TxFailure::new(err.to_string()))
}

/// Send `call` and wait for it to be mined.
async fn confirm<M: Middleware + 'static, D: Detokenize>(call: ContractCall<M, D>) -> Result<TxHash> {
    let pending = call.send().await.map_err(tx_failed)?;
    let hash = *pending;
    info!(?hash, "transaction submitted");
    let receipt = pending.await.map_err(tx_failed)?;
    check_receipt(hash, receipt)
}

/// A missing receipt means the transaction was dropped from the pool.
fn check_receipt(hash: TxHash, receipt: Option<TransactionReceipt>) -> Result<TxHash> {
    let Some(receipt) = receipt else {
        return Err(tx_failed(format!("transaction {hash:?} dropped")));
    };
    if receipt.status == Some(0u64.into()) {
        return Err(tx_failed(format!("transaction {hash:?} execution reverted")));
    }
    info!(?hash, block = ?receipt.block_number, "transaction confirmed");
    Ok(receipt.transaction_hash)
}
