//! Terminal front end for the staking portal.
//!
//! Talks to an EIP-1193 wallet exposed over JSON-RPC and reads one command per line from stdin.

use anyhow::{Context, Result};
use chainlet_client::{
    config::Config,
    portal::{Mailbox, Update},
    Actor, Eip1193, GameContract, Session, SplitContract, Staking,
};
use clap::Parser;
use ethers::providers::{Http, Provider};
use ethers::types::Address;
use futures::{channel::mpsc, StreamExt};
use std::{path::PathBuf, str::FromStr, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const WALLET_URL_ENV: &str = "CHAINLET_WALLET_URL";

const HELP: &str = "\
commands:
  connect              connect the wallet and switch to the chainlet
  disconnect           forget the session
  amount <value>       set the stake amount
  stake [value]        stake the current (or given) amount
  unstake              withdraw your stake
  winner [address]     declare a winner (default: yourself)
  reset                start a new staking round
  enter                enter the game world
  balance              refresh the wallet balance
  refresh              poll the contract now
  status               print the panel
  json                 print the panel as JSON
  help                 show this message
  quit                 exit";

#[derive(Parser, Debug)]
#[command(author, version, about = "Stake on the chainlet game contract from a terminal")]
struct Args {
    /// Path to a YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wallet JSON-RPC endpoint (overrides config and CHAINLET_WALLET_URL)
    #[arg(long)]
    wallet_url: Option<String>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Connect,
    Disconnect,
    Amount(String),
    Stake(Option<String>),
    Unstake,
    Winner(Option<Address>),
    Reset,
    Enter,
    Balance,
    Refresh,
    Status,
    Json,
    Help,
    Quit,
}

/// `Ok(None)` for a blank line.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let argument = words.next().map(str::to_string);
    if words.next().is_some() {
        return Err(format!("too many arguments for {name}"));
    }
    let command = match (name.to_ascii_lowercase().as_str(), argument) {
        ("connect", None) => Command::Connect,
        ("disconnect", None) => Command::Disconnect,
        ("amount", Some(value)) => Command::Amount(value),
        ("amount", None) => return Err("usage: amount <value>".to_string()),
        ("stake", value) => Command::Stake(value),
        ("unstake", None) => Command::Unstake,
        ("winner", None) => Command::Winner(None),
        ("winner", Some(address)) => Command::Winner(Some(
            Address::from_str(&address).map_err(|_| format!("invalid address: {address}"))?,
        )),
        ("reset", None) => Command::Reset,
        ("enter", None) => Command::Enter,
        ("balance", None) => Command::Balance,
        ("refresh", None) => Command::Refresh,
        ("status", None) => Command::Status,
        ("json", None) => Command::Json,
        ("help", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        (name, _) => return Err(format!("unknown command: {name} (try help)")),
    };
    Ok(Some(command))
}

/// Returns `false` once the user asked to quit.
async fn dispatch(mailbox: &mut Mailbox, command: Command) -> Result<bool> {
    match command {
        Command::Connect => mailbox.connect().await,
        Command::Disconnect => mailbox.disconnect().await,
        Command::Amount(value) => mailbox.set_stake_input(value).await,
        Command::Stake(Some(value)) => mailbox.stake_amount(value).await,
        Command::Stake(None) => mailbox.stake().await,
        Command::Unstake => mailbox.unstake().await,
        Command::Winner(address) => mailbox.set_winner(address).await,
        Command::Reset => mailbox.start_new_round().await,
        Command::Enter => mailbox.enter_game().await,
        Command::Balance => mailbox.refresh_balance().await,
        Command::Refresh => mailbox.refresh().await,
        Command::Status => {
            let state = mailbox.state().await?;
            println!("{}", state.panel);
        }
        Command::Json => {
            let state = mailbox.state().await?;
            println!("{}", serde_json::to_string_pretty(&state.panel)?);
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

async fn print_updates(mut updates: mpsc::UnboundedReceiver<Update>) {
    let mut last = None;
    while let Some(update) = updates.next().await {
        match update {
            Update::Panel(panel) => {
                if last.as_ref() != Some(&panel) {
                    println!("{panel}");
                    last = Some(panel);
                }
            }
            Update::Notice(notice) => println!("{notice}"),
            Update::Redirect(url) => println!("open {url} to enter the game"),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(url) = args
        .wallet_url
        .clone()
        .or_else(|| std::env::var(WALLET_URL_ENV).ok())
    {
        config.wallet_url = Some(url);
    }
    if let Some(level) = args.log_level.clone() {
        config.log_level = level;
    }
    let config = config.validate().context("invalid config")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let deployment = &config.deployment;
    let chain_rpc = Provider::<Http>::try_from(deployment.chain.rpc_endpoint.as_str())
        .context("invalid chain rpc endpoint")?;
    let (writer, wallet) = match &config.wallet_url {
        Some(url) => {
            let provider = Provider::<Http>::try_from(url.as_str())
                .with_context(|| format!("invalid wallet url {url}"))?;
            let wallet = Eip1193::new(provider.clone(), config.wallet_watch_interval);
            (provider, Some(wallet))
        }
        None => {
            warn!(
                "no wallet configured (use --wallet-url or {WALLET_URL_ENV}); reading from {}",
                deployment.chain.rpc_endpoint
            );
            (chain_rpc.clone(), None)
        }
    };
    info!(
        chain = %deployment.chain.chain_name,
        chain_id = deployment.chain.chain_id,
        contract = ?deployment.contract,
        "starting staking panel"
    );

    let session = Session::new(wallet, deployment.chain.clone());
    let contract = SplitContract::new(
        GameContract::new(deployment.contract, Arc::new(chain_rpc)),
        GameContract::new(deployment.contract, Arc::new(writer)),
    );
    let (actor, mut mailbox, updates) =
        Actor::new(config.portal(), session, Staking::new(contract));
    let portal = actor.start();
    let printer = tokio::spawn(print_updates(updates));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        match parse_command(&line) {
            Ok(Some(command)) => {
                if !dispatch(&mut mailbox, command).await? {
                    break;
                }
            }
            Ok(None) => {}
            Err(err) => println!("{err}"),
        }
    }

    drop(mailbox);
    portal.await.context("portal task failed")?;
    printer.await.context("printer task failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("connect"), Ok(Some(Command::Connect)));
        assert_eq!(parse_command("STAKE"), Ok(Some(Command::Stake(None))));
        assert_eq!(
            parse_command("stake 1.5"),
            Ok(Some(Command::Stake(Some("1.5".to_string()))))
        );
        assert_eq!(
            parse_command("amount 0.25"),
            Ok(Some(Command::Amount("0.25".to_string())))
        );
        // Amounts are passed through untouched; the portal validates them.
        assert_eq!(
            parse_command("stake -1"),
            Ok(Some(Command::Stake(Some("-1".to_string()))))
        );
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn parses_winner_addresses() {
        assert_eq!(parse_command("winner"), Ok(Some(Command::Winner(None))));
        let address = "0xDe69BC0b9e42a25a629bc13314da8Dcf87453Cd5";
        assert_eq!(
            parse_command(&format!("winner {address}")),
            Ok(Some(Command::Winner(Some(address.parse().unwrap()))))
        );
        assert!(parse_command("winner 0x123").is_err());
    }

    #[test]
    fn rejects_unknown_or_malformed_commands() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("amount").is_err());
        assert!(parse_command("connect now").is_err());
        assert!(parse_command("stake 1 2").is_err());
    }
}
