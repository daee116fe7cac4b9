//! Defaults for tunables in [`crate::config::Config`].

/// Contract poll period while a wallet is connected.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// How often the wallet watcher samples `eth_accounts` / `eth_chainId`.
pub const DEFAULT_WALLET_WATCH_INTERVAL_MS: u64 = 1_000;

/// Pause between the "entering" notice and the redirect.
pub const DEFAULT_ENTER_GAME_DELAY_MS: u64 = 1_500;

/// Number of pending commands the portal mailbox holds before senders wait.
pub const DEFAULT_MAILBOX_SIZE: usize = 64;

/// Capacity of the wallet event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_LOG_LEVEL: &str = "info";
