//! Common types for the chainlet staking portal.
//!
//! Everything here is plain data plus the staking reconciler; no I/O.

pub mod amount;
pub mod chain;
pub mod session;
pub mod stake;

pub use amount::{format_amount, parse_amount, parse_stake_amount, AmountError};
pub use chain::{ChainConfig, Deployment, NativeCurrency};
pub use session::{TokenBalance, WalletSession};
pub use stake::{reconcile, EffectiveStakeView, StakeSnapshot};
