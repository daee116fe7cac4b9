use super::{
    ingress::{Mailbox, Message},
    Config, PortalState, Update,
};
use crate::{
    contract::StakingContract,
    notice::Notice,
    panel::{Action, PanelView, UiFlags},
    session::{Handshake, Session, SessionChange},
    staking::Staking,
    wallet::{Wallet, WalletEvent, WalletEvents},
    Error, Result,
};
use chainlet_types::{
    amount::{shorten_address, validate_input},
    format_amount, parse_stake_amount, reconcile, EffectiveStakeView, StakeSnapshot, TokenBalance,
};
use ethers::types::{Address, TxHash, U256};
use futures::{
    channel::mpsc,
    future::{BoxFuture, FutureExt},
    stream::FuturesUnordered,
    StreamExt,
};
use std::future::Future;
use tokio::{
    task::JoinHandle,
    time::{interval, sleep, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

const INITIAL_STAKE_INPUT: &str = "0";

/// Result of work started by the actor and finished in the background.
enum Completion {
    Connect {
        epoch: u64,
        result: Result<Handshake>,
    },
    Restore {
        epoch: u64,
        result: Result<Option<Handshake>>,
    },
    Balance {
        epoch: u64,
        result: Result<(Address, TokenBalance)>,
    },
    Poll {
        epoch: u64,
        result: Result<StakeSnapshot>,
    },
    Transaction {
        epoch: u64,
        action: Action,
        detail: String,
        result: Result<TxHash>,
    },
    Redirect {
        epoch: u64,
    },
}

impl Completion {
    fn epoch(&self) -> u64 {
        match self {
            Self::Connect { epoch, .. }
            | Self::Restore { epoch, .. }
            | Self::Balance { epoch, .. }
            | Self::Poll { epoch, .. }
            | Self::Transaction { epoch, .. }
            | Self::Redirect { epoch } => *epoch,
        }
    }
}

pub struct Actor<W: Wallet, C: StakingContract> {
    config: Config,
    session: Session<W>,
    staking: Staking<C>,
    mailbox: mpsc::Receiver<Message>,
    updates: mpsc::UnboundedSender<Update>,

    view: EffectiveStakeView,
    flags: UiFlags,
    stake_input: String,

    // Bumped whenever the connected account goes away or changes. Completions carry the
    // epoch they were started in and are dropped if it no longer matches.
    epoch: u64,
    poller: Option<Interval>,
    polling: bool,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl<W: Wallet, C: StakingContract> Actor<W, C> {
    pub fn new(
        config: Config,
        session: Session<W>,
        staking: Staking<C>,
    ) -> (Self, Mailbox, mpsc::UnboundedReceiver<Update>) {
        let (sender, mailbox) = mpsc::channel(config.mailbox_size);
        let (updates, receiver) = mpsc::unbounded();
        (
            Self {
                config,
                session,
                staking,
                mailbox,
                updates,
                view: EffectiveStakeView::default(),
                flags: UiFlags::default(),
                stake_input: INITIAL_STAKE_INPUT.to_string(),
                epoch: 0,
                poller: None,
                polling: false,
                in_flight: FuturesUnordered::new(),
            },
            Mailbox::new(sender),
            receiver,
        )
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut events = self.session.subscribe();
        if events.is_none() {
            warn!("no wallet provider; connect will fail until one is configured");
        }
        self.restore();
        self.publish();

        loop {
            tokio::select! {
                biased;

                Some(completion) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.handle_completion(completion);
                }
                event = next_event(&mut events), if events.is_some() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            warn!("wallet event stream closed");
                            events = None;
                        }
                    }
                }
                _ = tick(&mut self.poller), if self.poller.is_some() => {
                    self.poll();
                }
                message = self.mailbox.next() => {
                    let Some(message) = message else {
                        debug!("mailbox closed, shutting down portal");
                        break;
                    };
                    self.handle_message(message);
                }
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Connect => self.connect(),
            Message::Disconnect => {
                self.session.disconnect();
                self.restart();
            }
            Message::SetStakeInput(input) => {
                self.edit_stake_input(input);
            }
            Message::Stake { amount } => {
                let valid = amount.map_or(true, |amount| self.edit_stake_input(amount));
                if valid {
                    self.stake();
                }
            }
            Message::Unstake => self.unstake(),
            Message::SetWinner(winner) => self.set_winner(Action::SetWinner, winner),
            Message::StartNewRound => self.set_winner(Action::NewRound, Some(Address::zero())),
            Message::EnterGame => self.enter_game(),
            Message::RefreshBalance => self.refresh_balance(),
            Message::Refresh => self.poll(),
            Message::State { response } => {
                let state = PortalState {
                    session: self.session.state().clone(),
                    view: self.view,
                    panel: self.render(),
                };
                let _ = response.send(state);
                return;
            }
        }
        self.publish();
    }

    /// Store an edit of the amount field and report it if it is not a valid amount.
    ///
    /// Invalid text is kept as typed, so it can never be staked as some other amount.
    fn edit_stake_input(&mut self, input: String) -> bool {
        let input = input.trim().to_string();
        let checked = validate_input(&input, self.config.deployment.chain.decimals());
        self.stake_input = input;
        match checked {
            Ok(()) => true,
            Err(err) => {
                self.fail(Action::Stake, &Error::InvalidAmount(err));
                false
            }
        }
    }

    fn connect(&mut self) {
        if self.session.state().connected {
            debug!("already connected");
            return;
        }
        if self.flags.is_busy(Action::Connect) {
            return self.fail(Action::Connect, &Error::Busy(Action::Connect));
        }
        self.flags.set(Action::Connect, true);
        self.flags.error = None;
        self.notify(Notice::submitted(Action::Connect));

        let epoch = self.epoch;
        let handshake = self.session.handshake();
        self.in_flight.push(
            async move {
                let result = handshake.await;
                Completion::Connect { epoch, result }
            }
            .boxed(),
        );
    }

    /// Adopt an account the wallet already exposes, if any.
    fn restore(&mut self) {
        if !self.session.has_wallet() {
            return;
        }
        let epoch = self.epoch;
        let restore = self.session.restore();
        self.in_flight.push(
            async move {
                let result = restore.await;
                Completion::Restore { epoch, result }
            }
            .boxed(),
        );
    }

    fn refresh_balance(&mut self) {
        let epoch = self.epoch;
        let lookup = self.session.balance_lookup();
        self.in_flight.push(
            async move {
                let result = lookup.await;
                Completion::Balance { epoch, result }
            }
            .boxed(),
        );
    }

    fn handle_event(&mut self, event: WalletEvent) {
        match self.session.handle_event(event) {
            SessionChange::Unchanged => return,
            SessionChange::Disconnected => self.restart(),
            SessionChange::AccountChanged(_) => {
                self.restart();
                self.refresh_balance();
            }
            SessionChange::Reloaded => {
                self.restart();
                self.restore();
            }
        }
        self.publish();
    }

    /// Start a new epoch from a blank view, polling if a wallet is connected.
    fn restart(&mut self) {
        self.epoch += 1;
        self.view = EffectiveStakeView::default();
        self.flags.reset();
        self.polling = false;
        self.poller = self.session.state().active_account().map(|_| {
            let mut poller = interval(self.config.poll_interval);
            poller.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poller
        });
        if self.session.state().connected {
            self.flags.error = None;
        }
        debug!(epoch = self.epoch, polling = self.poller.is_some(), "portal epoch started");
    }

    fn poll(&mut self) {
        if self.polling {
            debug!("poll already in flight");
            return;
        }
        let Some(account) = self.session.state().active_account() else {
            return;
        };
        self.polling = true;
        let epoch = self.epoch;
        let staking = self.staking.clone();
        self.in_flight.push(
            async move {
                let result = staking.get_stake_snapshot(account).await;
                Completion::Poll { epoch, result }
            }
            .boxed(),
        );
    }

    /// Check that `action` may start and return the account to act as.
    fn begin(&self, action: Action) -> Result<Address> {
        let account = self
            .session
            .state()
            .active_account()
            .ok_or(Error::NotConnected)?;
        if self.flags.is_busy(action) {
            return Err(Error::Busy(action));
        }
        Ok(account)
    }

    fn stake(&mut self) {
        let decimals = self.config.deployment.chain.decimals();
        let prepared = self.begin(Action::Stake).and_then(|from| {
            let amount = parse_stake_amount(&self.stake_input, decimals)?;
            Ok((from, amount))
        });
        let (from, amount) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return self.fail(Action::Stake, &err),
        };
        let detail = self.amount(amount);
        let staking = self.staking.clone();
        self.submit(Action::Stake, detail, async move {
            staking.submit_stake(from, amount).await
        });
    }

    fn unstake(&mut self) {
        let from = match self.begin(Action::Unstake) {
            Ok(from) => from,
            Err(err) => return self.fail(Action::Unstake, &err),
        };
        if !self.view.has_stake() {
            return self.fail(Action::Unstake, &Error::NoStake);
        }
        let view = self.view;
        let staking = self.staking.clone();
        self.submit(Action::Unstake, String::new(), async move {
            staking.submit_unstake(from, &view).await
        });
    }

    fn set_winner(&mut self, action: Action, winner: Option<Address>) {
        let from = match self.begin(action) {
            Ok(from) => from,
            Err(err) => return self.fail(action, &err),
        };
        if action == Action::NewRound && self.view.winner.is_none() {
            return self.fail(action, &Error::NoWinner);
        }
        let winner = winner.unwrap_or(from);
        let staking = self.staking.clone();
        self.submit(action, String::new(), async move {
            staking.submit_set_winner(from, winner).await
        });
    }

    fn enter_game(&mut self) {
        if let Err(err) = self.begin(Action::EnterGame) {
            return self.fail(Action::EnterGame, &err);
        }
        if !self.view.has_stake() {
            return self.fail(Action::EnterGame, &Error::NoStake);
        }
        self.notify(Notice::submitted(Action::EnterGame));
        self.schedule_redirect();
    }

    fn schedule_redirect(&mut self) {
        self.flags.set(Action::EnterGame, true);
        let epoch = self.epoch;
        let delay = self.config.enter_game_delay;
        self.in_flight.push(
            async move {
                sleep(delay).await;
                Completion::Redirect { epoch }
            }
            .boxed(),
        );
    }

    fn submit<F>(&mut self, action: Action, detail: String, transaction: F)
    where
        F: Future<Output = Result<TxHash>> + Send + 'static,
    {
        self.flags.set(action, true);
        self.notify(Notice::submitted(action));
        let epoch = self.epoch;
        self.in_flight.push(
            async move {
                let result = transaction.await;
                Completion::Transaction {
                    epoch,
                    action,
                    detail,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn handle_completion(&mut self, completion: Completion) {
        let epoch = completion.epoch();
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "discarding stale completion");
            return;
        }
        match completion {
            Completion::Connect { result, .. } => {
                self.flags.set(Action::Connect, false);
                match result {
                    Ok(handshake) => {
                        let account = self.session.establish(handshake);
                        self.restart();
                        self.notify(Notice::confirmed(
                            Action::Connect,
                            &shorten_address(&account),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "connect failed");
                        self.flags.error = Some(err.to_string());
                        self.fail(Action::Connect, &err);
                    }
                }
            }
            Completion::Restore { result, .. } => {
                if self.flags.is_busy(Action::Connect) {
                    debug!("connect in progress, ignoring restored session");
                    return;
                }
                match result {
                    Ok(Some(handshake)) => {
                        let account = self.session.establish(handshake);
                        info!(?account, "restored wallet session");
                        self.restart();
                    }
                    Ok(None) => {
                        debug!("wallet exposes no account");
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to restore wallet session");
                        return;
                    }
                }
            }
            Completion::Balance { result, .. } => match result {
                Ok((account, balance)) => {
                    if !self.session.set_balance(account, balance) {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "balance refresh failed");
                    return;
                }
            },
            Completion::Poll { result, .. } => {
                self.polling = false;
                match result {
                    Ok(snapshot) => {
                        self.view = reconcile(&snapshot);
                        debug!(
                            user_stake = %self.view.user_stake,
                            total_staked = %self.view.total_staked,
                            winner = ?self.view.winner,
                            "stake view updated"
                        );
                    }
                    Err(err) => {
                        warn!(error = %err, "poll failed, keeping previous view");
                        return;
                    }
                }
            }
            Completion::Transaction {
                action,
                detail,
                result,
                ..
            } => {
                self.flags.set(action, false);
                match result {
                    Ok(hash) => {
                        info!(%action, ?hash, "transaction confirmed");
                        self.notify(Notice::confirmed(action, &detail));
                        if action == Action::Stake {
                            self.stake_input = INITIAL_STAKE_INPUT.to_string();
                            self.schedule_redirect();
                        }
                        self.refresh_balance();
                        self.poll();
                    }
                    Err(err) => self.fail(action, &err),
                }
            }
            Completion::Redirect { .. } => {
                self.flags.set(Action::EnterGame, false);
                let url = self.config.deployment.game_url.clone();
                info!(%url, "entering game world");
                self.send(Update::Redirect(url));
            }
        }
        self.publish();
    }

    fn amount(&self, raw: U256) -> String {
        let chain = &self.config.deployment.chain;
        format!(
            "{} {}",
            format_amount(raw, chain.decimals()),
            chain.currency.symbol
        )
    }

    fn fail(&mut self, action: Action, err: &Error) {
        debug!(%action, error = %err, "action failed");
        self.notify(Notice::failed(action, err));
    }

    fn notify(&mut self, notice: Notice) {
        self.send(Update::Notice(notice));
    }

    fn render(&self) -> PanelView {
        PanelView::render(
            self.session.state(),
            &self.view,
            &self.flags,
            &self.stake_input,
            &self.config.deployment.chain,
        )
    }

    fn publish(&mut self) {
        let panel = self.render();
        self.send(Update::Panel(panel));
    }

    fn send(&mut self, update: Update) {
        if self.updates.unbounded_send(update).is_err() {
            debug!("update receiver dropped");
        }
    }
}

async fn next_event(events: &mut Option<WalletEvents>) -> Option<WalletEvent> {
    match events {
        Some(events) => events.next().await,
        None => std::future::pending().await,
    }
}

async fn tick(poller: &mut Option<Interval>) {
    match poller {
        Some(poller) => {
            poller.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mocks::{MockStaking, MockWallet},
        notice::Level,
        panel::ConnectionStatus,
    };
    use chainlet_types::{ChainConfig, Deployment};
    use std::time::Duration;
    use tokio::time::timeout;

    const POLL: Duration = Duration::from_secs(10);

    fn account() -> Address {
        Address::from_low_u64_be(0xa11ce)
    }

    struct Harness {
        mailbox: Mailbox,
        updates: mpsc::UnboundedReceiver<Update>,
        wallet: MockWallet,
        contract: MockStaking,
        _handle: JoinHandle<()>,
    }

    fn setup() -> Harness {
        setup_with(MockWallet::new(vec![account()]))
    }

    fn setup_with(wallet: MockWallet) -> Harness {
        let contract = MockStaking::new();
        let config = Config {
            deployment: Deployment::psaga(),
            poll_interval: POLL,
            enter_game_delay: Duration::from_millis(1_500),
            mailbox_size: 16,
        };
        let session = Session::new(Some(wallet.clone()), ChainConfig::psaga());
        let (actor, mailbox, updates) =
            Actor::new(config, session, Staking::new(contract.clone()));
        Harness {
            mailbox,
            updates,
            wallet,
            contract,
            _handle: actor.start(),
        }
    }

    async fn wait_for<T>(
        updates: &mut mpsc::UnboundedReceiver<Update>,
        mut matcher: impl FnMut(&Update) -> Option<T>,
    ) -> T {
        timeout(Duration::from_secs(120), async {
            loop {
                let update = updates.next().await.expect("portal stopped");
                if let Some(value) = matcher(&update) {
                    return value;
                }
            }
        })
        .await
        .expect("timed out waiting for update")
    }

    async fn wait_for_notice(updates: &mut mpsc::UnboundedReceiver<Update>, title: &str) -> Notice {
        wait_for(updates, |update| match update {
            Update::Notice(notice) if notice.title == title => Some(notice.clone()),
            _ => None,
        })
        .await
    }

    async fn wait_for_panel(
        updates: &mut mpsc::UnboundedReceiver<Update>,
        mut matcher: impl FnMut(&PanelView) -> bool,
    ) -> PanelView {
        wait_for(updates, |update| match update {
            Update::Panel(panel) if matcher(panel) => Some(panel.clone()),
            _ => None,
        })
        .await
    }

    /// Drain whatever the actor has produced once every task is idle.
    async fn settle(updates: &mut mpsc::UnboundedReceiver<Update>) -> Vec<Update> {
        sleep(Duration::from_millis(1)).await;
        let mut drained = Vec::new();
        while let Ok(Some(update)) = updates.try_next() {
            drained.push(update);
        }
        drained
    }

    fn stake(contract: &MockStaking, user: u64, total: u64, winner: Address) {
        contract.set_state(
            account(),
            StakeSnapshot {
                user_stake_raw: U256::from(user),
                total_staked_raw: U256::from(total),
                winner_address: winner,
            },
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_polls_immediately_then_periodically() {
        let mut h = setup();
        stake(&h.contract, 2_000_000, 5_000_000, Address::zero());

        h.mailbox.connect().await;
        let panel = wait_for_panel(&mut h.updates, |panel| panel.user_stake == "2 pSAGA").await;
        assert_eq!(panel.status, ConnectionStatus::Connected);
        assert_eq!(panel.total_staked, "5 pSAGA");
        assert!(panel.unstake.enabled);
        assert_eq!(h.contract.reads(), 1);

        sleep(POLL * 3 + POLL / 2).await;
        settle(&mut h.updates).await;
        assert_eq!(h.contract.reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn no_polling_while_disconnected() {
        let mut h = setup();
        sleep(POLL * 3).await;
        assert_eq!(h.contract.reads(), 0);

        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| {
            panel.status == ConnectionStatus::Connected
        })
        .await;
        settle(&mut h.updates).await;
        h.mailbox.disconnect().await;
        let panel = wait_for_panel(&mut h.updates, |panel| {
            panel.status == ConnectionStatus::Disconnected
        })
        .await;
        assert_eq!(panel.user_stake, "0 pSAGA");
        let reads = h.contract.reads();
        sleep(POLL * 3).await;
        assert_eq!(h.contract.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stake_is_masked_after_round_reset() {
        let mut h = setup();
        stake(&h.contract, 3_000_000, 0, Address::zero());

        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;
        settle(&mut h.updates).await;
        let state = h.mailbox.state().await.unwrap();
        assert_eq!(state.view.user_stake, U256::zero());
        assert!(!state.panel.unstake.enabled);
        assert!(!state.panel.enter_game.enabled);

        h.mailbox.unstake().await;
        let notice = wait_for_notice(&mut h.updates, "No Stake").await;
        assert_eq!(notice.level, Level::Error);
        assert_eq!(h.contract.calls(), h.contract.reads());
    }

    #[tokio::test(start_paused = true)]
    async fn stake_flow_confirms_and_redirects() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;

        h.mailbox.set_stake_input("1.5").await;
        h.mailbox.stake().await;
        wait_for_notice(&mut h.updates, "Transaction Submitted").await;
        let notice = wait_for_notice(&mut h.updates, "Stake Successful").await;
        assert_eq!(notice.body, "Successfully staked 1.5 pSAGA");

        let panel = wait_for_panel(&mut h.updates, |panel| panel.user_stake == "1.5 pSAGA").await;
        assert_eq!(panel.stake_input, "0");
        assert!(panel.enter_game.busy);

        let url = wait_for(&mut h.updates, |update| match update {
            Update::Redirect(url) => Some(url.clone()),
            _ => None,
        })
        .await;
        assert_eq!(url, Deployment::psaga().game_url);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_amounts_never_reach_the_contract() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;
        settle(&mut h.updates).await;
        let calls = h.contract.calls();

        h.mailbox.set_stake_input("0").await;
        h.mailbox.stake().await;
        wait_for_notice(&mut h.updates, "Invalid Amount").await;

        for input in ["-1", "1e3", "1.2.3"] {
            h.mailbox.set_stake_input(input).await;
            let notice = wait_for_notice(&mut h.updates, "Invalid Amount").await;
            assert_eq!(notice.level, Level::Error);
            h.mailbox.stake().await;
            wait_for_notice(&mut h.updates, "Invalid Amount").await;

            let state = h.mailbox.state().await.unwrap();
            assert_eq!(state.panel.stake_input, input);
            assert!(!state.panel.stake.enabled);
        }
        settle(&mut h.updates).await;
        assert_eq!(h.contract.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_amount_aborts_its_stake() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;
        settle(&mut h.updates).await;
        let calls = h.contract.calls();

        h.mailbox.set_stake_input("5").await;
        h.mailbox.stake_amount("0.1234567").await;
        let notice = wait_for_notice(&mut h.updates, "Invalid Amount").await;
        assert_eq!(notice.body, "amount has more than 6 decimal places");

        // The earlier amount is not staked in its place.
        h.mailbox.stake().await;
        wait_for_notice(&mut h.updates, "Invalid Amount").await;
        let late = settle(&mut h.updates).await;
        assert!(late.iter().all(|update| !matches!(
            update,
            Update::Notice(notice) if notice.title == "Transaction Submitted"
        )));
        assert_eq!(h.contract.calls(), calls);

        h.mailbox.stake_amount("0.25").await;
        let notice = wait_for_notice(&mut h.updates, "Stake Successful").await;
        assert_eq!(notice.body, "Successfully staked 0.25 pSAGA");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_submission_is_rejected_while_busy() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;

        h.contract.pause();
        h.mailbox.set_stake_input("1").await;
        h.mailbox.stake().await;
        wait_for_panel(&mut h.updates, |panel| panel.stake.busy).await;
        h.mailbox.stake().await;
        let notice = wait_for_notice(&mut h.updates, "Please Wait").await;
        assert_eq!(notice.body, "stake already in progress");

        h.contract.release();
        wait_for_notice(&mut h.updates, "Stake Successful").await;
        let panel = wait_for_panel(&mut h.updates, |panel| !panel.stake.busy).await;
        assert!(!panel.stake.busy);
    }

    #[tokio::test(start_paused = true)]
    async fn results_from_a_previous_connection_are_discarded() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;

        h.contract.pause();
        h.mailbox.set_stake_input("1").await;
        h.mailbox.stake().await;
        wait_for_panel(&mut h.updates, |panel| panel.stake.busy).await;
        h.mailbox.disconnect().await;
        wait_for_panel(&mut h.updates, |panel| {
            panel.status == ConnectionStatus::Disconnected
        })
        .await;

        h.contract.release();
        let late = settle(&mut h.updates).await;
        assert!(late.iter().all(|update| !matches!(
            update,
            Update::Notice(notice) if notice.title == "Stake Successful"
        )));
        assert!(late
            .iter()
            .all(|update| !matches!(update, Update::Redirect(_))));

        // The transaction itself still went through.
        let snapshot = h.contract.read_snapshot(account()).await.unwrap();
        assert_eq!(snapshot.user_stake_raw, U256::from(1_000_000u64));
    }

    #[tokio::test(start_paused = true)]
    async fn new_round_resets_winner_and_masks_stakes() {
        let mut h = setup();
        stake(&h.contract, 4_000_000, 4_000_000, account());
        h.mailbox.connect().await;
        let panel = wait_for_panel(&mut h.updates, |panel| panel.winner.is_some()).await;
        assert_eq!(panel.winner.as_deref(), Some("You are the Winner!"));
        assert!(panel.new_round.visible);

        h.mailbox.start_new_round().await;
        wait_for_notice(&mut h.updates, "Resetting Game").await;
        wait_for_notice(&mut h.updates, "New Session Started").await;
        let panel = wait_for_panel(&mut h.updates, |panel| panel.winner.is_none()).await;
        assert_eq!(panel.user_stake, "0 pSAGA");
        assert_eq!(panel.total_staked, "0 pSAGA");
        assert!(!panel.new_round.visible);
        assert!(!panel.enter_game.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn new_round_needs_a_winner() {
        let mut h = setup();
        stake(&h.contract, 1_000_000, 1_000_000, Address::zero());
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.user_stake == "1 pSAGA").await;
        settle(&mut h.updates).await;
        let calls = h.contract.calls();

        h.mailbox.start_new_round().await;
        let notice = wait_for_notice(&mut h.updates, "No Winner").await;
        assert_eq!(notice.level, Level::Error);
        settle(&mut h.updates).await;
        assert_eq!(h.contract.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_game_requires_stake_then_redirects() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;
        h.mailbox.enter_game().await;
        wait_for_notice(&mut h.updates, "No Stake").await;

        stake(&h.contract, 1_000_000, 1_000_000, Address::zero());
        h.mailbox.refresh().await;
        wait_for_panel(&mut h.updates, |panel| panel.enter_game.enabled).await;
        h.mailbox.enter_game().await;
        wait_for_notice(&mut h.updates, "Entering Game World").await;
        let url = wait_for(&mut h.updates, |update| match update {
            Update::Redirect(url) => Some(url.clone()),
            _ => None,
        })
        .await;
        assert_eq!(url.host_str(), Some("horizon.meta.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_poll_keeps_previous_view() {
        let mut h = setup();
        stake(&h.contract, 1_000_000, 1_000_000, Address::zero());
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.user_stake == "1 pSAGA").await;

        h.contract.fail_reads(true);
        sleep(POLL + POLL / 2).await;
        settle(&mut h.updates).await;
        let state = h.mailbox.state().await.unwrap();
        assert_eq!(state.panel.user_stake, "1 pSAGA");
        assert!(h.contract.reads() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn wallet_notifications_restart_the_session() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;

        let other = Address::from_low_u64_be(0xb0b);
        h.wallet.emit(WalletEvent::AccountsChanged(vec![other]));
        wait_for_panel(&mut h.updates, |panel| panel.account == Some(other)).await;

        h.wallet.emit(WalletEvent::AccountsChanged(vec![]));
        let panel = wait_for_panel(&mut h.updates, |panel| {
            panel.status == ConnectionStatus::Disconnected
        })
        .await;
        assert!(panel.connect.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_connect_shows_error_status() {
        let mut h = setup();
        h.wallet.reject_accounts(true);
        h.mailbox.connect().await;
        let notice = wait_for_notice(&mut h.updates, "Connection Error").await;
        assert_eq!(notice.level, Level::Error);
        let panel = wait_for_panel(&mut h.updates, |panel| {
            panel.status == ConnectionStatus::Error
        })
        .await;
        assert!(panel.connect.enabled);
        assert_eq!(h.contract.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn open_wallet_prompt_does_not_block_the_portal() {
        let mut h = setup();
        h.wallet.hold_prompt();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.connect.busy).await;

        h.mailbox.connect().await;
        let notice = wait_for_notice(&mut h.updates, "Please Wait").await;
        assert_eq!(notice.body, "connect already in progress");

        h.mailbox.disconnect().await;
        let panel = wait_for_panel(&mut h.updates, |panel| !panel.connect.busy).await;
        assert_eq!(panel.status, ConnectionStatus::Disconnected);
        assert!(panel.connect.enabled);

        // The answer to the abandoned prompt is ignored.
        h.wallet.answer();
        let late = settle(&mut h.updates).await;
        assert!(late.iter().all(|update| !matches!(
            update,
            Update::Notice(notice) if notice.title == "Connected"
        )));
        let state = h.mailbox.state().await.unwrap();
        assert!(!state.session.connected);
        assert_eq!(h.contract.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn previously_granted_wallet_connects_on_start() {
        let mut h = setup_with(MockWallet::authorized(vec![account()]));
        stake(&h.contract, 2_000_000, 2_000_000, Address::zero());

        let panel = wait_for_panel(&mut h.updates, |panel| panel.user_stake == "2 pSAGA").await;
        assert_eq!(panel.status, ConnectionStatus::Connected);
        assert_eq!(panel.account, Some(account()));
        assert!(!h.wallet.requests().contains(&"eth_requestAccounts"));

        sleep(POLL + POLL / 2).await;
        settle(&mut h.updates).await;
        assert_eq!(h.contract.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_change_reloads_the_session() {
        let mut h = setup();
        h.mailbox.connect().await;
        wait_for_panel(&mut h.updates, |panel| panel.status == ConnectionStatus::Connected).await;

        h.wallet.emit(WalletEvent::ChainChanged(1));
        let panel = wait_for_panel(&mut h.updates, |panel| {
            panel.wrong_chain && panel.status == ConnectionStatus::Connected
        })
        .await;
        assert_eq!(panel.account, Some(account()));
    }

    #[tokio::test(start_paused = true)]
    async fn actions_require_a_connection() {
        let mut h = setup();
        h.mailbox.set_winner(None).await;
        let notice = wait_for_notice(&mut h.updates, "Not Connected").await;
        assert_eq!(notice.body, "Please connect your wallet first");
        assert_eq!(h.contract.calls(), 0);
    }
}
