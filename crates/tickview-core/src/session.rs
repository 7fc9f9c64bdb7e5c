//! Live session runtime: one background task per observed view.
//!
//! A [`LiveSession`] owns a [`LiveScheduler`], the price and health timers and
//! every in-flight request for one view. The public handle talks to the task
//! over an mpsc channel and reads results from `watch` channels, so each
//! refresh replaces the published [`SessionSnapshot`] in one step.
//!
//! Responses are ordered through a [`RequestTracker`]: a result is applied only
//! if no newer request for the same range has been applied and the range has
//! not changed since it was issued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::TickviewConfig;
use crate::scheduler::{LiveScheduler, SchedulerEffect, SchedulerEvent, SchedulerState};
use crate::source::{MarketSource, SourceError, SourceFuture};
use crate::RangeKey;

/// Parameters of one load issued by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub range: RangeKey,
    /// Background refresh that should not surface as loading.
    pub silent: bool,
}

/// A view whose data a [`LiveSession`] keeps fresh.
pub trait LiveView: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    fn load<'a>(&'a self, request: LoadRequest) -> SourceFuture<'a, Self::Output>;
}

/// Identity of one issued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub epoch: u64,
    pub sequence: u64,
    pub range: RangeKey,
    pub silent: bool,
}

/// Discards responses for superseded parameters or older requests.
#[derive(Debug, Default)]
pub struct RequestTracker {
    epoch: u64,
    range: Option<RangeKey>,
    next_sequence: u64,
    committed: Option<u64>,
}

impl RequestTracker {
    /// Issues a ticket; a range different from the last one starts a new epoch.
    pub fn issue(&mut self, range: RangeKey, silent: bool) -> RequestTicket {
        if self.range != Some(range) {
            self.invalidate();
            self.range = Some(range);
        }
        self.next_sequence += 1;
        RequestTicket {
            epoch: self.epoch,
            sequence: self.next_sequence,
            range,
            silent,
        }
    }

    /// Makes every outstanding ticket stale.
    pub fn invalidate(&mut self) {
        self.epoch += 1;
        self.committed = None;
    }

    /// Accepts `ticket` if it is current and newer than anything applied.
    pub fn accept(&mut self, ticket: &RequestTicket) -> bool {
        if ticket.epoch != self.epoch {
            return false;
        }
        if self.committed.is_some_and(|committed| ticket.sequence <= committed) {
            return false;
        }
        self.committed = Some(ticket.sequence);
        true
    }
}

/// Latest state published by a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot<T> {
    /// Range the current `data` was loaded for.
    pub range: Option<RangeKey>,
    pub data: Option<T>,
    /// Error of the most recent applied request, cleared by the next success.
    pub error: Option<SourceError>,
    pub loading: bool,
    /// Number of applied responses.
    pub refreshes: u64,
}

impl<T> Default for SessionSnapshot<T> {
    fn default() -> Self {
        Self {
            range: None,
            data: None,
            error: None,
            loading: false,
            refreshes: 0,
        }
    }
}

/// Timer cadence and initial policy inputs of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub range: RangeKey,
    pub follow_market: bool,
    pub price_poll: Duration,
    pub health_poll: Duration,
}

impl SessionSettings {
    pub fn new(range: RangeKey, follow_market: bool) -> Self {
        Self::from_config(&TickviewConfig::default(), range, follow_market)
    }

    pub fn from_config(config: &TickviewConfig, range: RangeKey, follow_market: bool) -> Self {
        Self {
            range,
            follow_market,
            price_poll: config.price_poll,
            health_poll: config.health_poll,
        }
    }

    /// Portfolio refresh cadence: pinned to LIVE so live prices are re-pulled
    /// every `portfolio_poll` while the market is open.
    pub fn for_portfolio(config: &TickviewConfig) -> Self {
        Self::from_config(config, RangeKey::Live, false).with_price_poll(config.portfolio_poll)
    }

    pub fn with_price_poll(mut self, period: Duration) -> Self {
        self.price_poll = period;
        self
    }
}

#[derive(Debug)]
enum SessionCommand {
    SelectRange(RangeKey),
    FollowMarket(bool),
    Stop,
}

/// Handle to a running live session.
///
/// Dropping the handle cancels the session and everything it started.
pub struct LiveSession<V: LiveView> {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot<V::Output>>,
    states: watch::Receiver<SchedulerState>,
    driver: Option<JoinHandle<()>>,
}

impl<V: LiveView> LiveSession<V> {
    /// Spawns the session task. Must be called within a tokio runtime.
    pub fn start(view: V, market: Arc<dyn MarketSource>, settings: SessionSettings) -> Self {
        let scheduler = LiveScheduler::new(settings.range, settings.follow_market);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (state_tx, state_rx) = watch::channel(scheduler.state());

        let driver = Driver {
            view: Arc::new(view),
            market,
            settings,
            scheduler,
            tracker: RequestTracker::default(),
            health_issued: 0,
            health_applied: 0,
            tasks: JoinSet::new(),
            price_timer: None,
            snapshots: snapshot_tx,
            states: state_tx,
        };
        info!(range = %settings.range, follow_market = settings.follow_market, "live session started");

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            states: state_rx,
            driver: Some(tokio::spawn(driver.run(command_rx))),
        }
    }

    pub fn select_range(&self, range: RangeKey) {
        let _ = self.commands.send(SessionCommand::SelectRange(range));
    }

    pub fn set_follow_market(&self, enabled: bool) {
        let _ = self.commands.send(SessionCommand::FollowMarket(enabled));
    }

    pub fn snapshot(&self) -> SessionSnapshot<V::Output> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot<V::Output>> {
        self.snapshots.clone()
    }

    pub fn state(&self) -> SchedulerState {
        *self.states.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.states.clone()
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the session immediately. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if let Some(handle) = self.driver.take() {
            let _ = self.commands.send(SessionCommand::Stop);
            handle.abort();
        }
    }

    /// Stops the session and waits until its timers and requests are gone.
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.driver.take() {
            let _ = self.commands.send(SessionCommand::Stop);
            if let Err(error) = handle.await {
                if !error.is_cancelled() {
                    warn!(%error, "live session task failed");
                }
            }
        }
    }
}

impl<V: LiveView> Drop for LiveSession<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.take() {
            handle.abort();
        }
    }
}

enum TaskOutcome<T> {
    Data {
        ticket: RequestTicket,
        result: Result<T, SourceError>,
    },
    Health {
        sequence: u64,
        open: bool,
    },
}

struct Driver<V: LiveView> {
    view: Arc<V>,
    market: Arc<dyn MarketSource>,
    settings: SessionSettings,
    scheduler: LiveScheduler,
    tracker: RequestTracker,
    health_issued: u64,
    health_applied: u64,
    tasks: JoinSet<TaskOutcome<V::Output>>,
    price_timer: Option<Interval>,
    snapshots: watch::Sender<SessionSnapshot<V::Output>>,
    states: watch::Sender<SchedulerState>,
}

impl<V: LiveView> Driver<V> {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        let mut health_timer = periodic(self.settings.health_poll);
        let mut running = self.dispatch(SchedulerEvent::Started);

        while running {
            let event = tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::SelectRange(range)) => SchedulerEvent::RangeSelected(range),
                    Some(SessionCommand::FollowMarket(enabled)) => {
                        SchedulerEvent::FollowMarketChanged(enabled)
                    }
                    Some(SessionCommand::Stop) | None => SchedulerEvent::Stopped,
                },
                _ = next_tick(&mut self.price_timer) => SchedulerEvent::PriceTick,
                _ = health_timer.tick() => SchedulerEvent::HealthTick,
                Some(joined) = self.tasks.join_next() => match self.complete(joined) {
                    Some(event) => event,
                    None => continue,
                },
            };
            running = self.dispatch(event);
        }

        self.price_timer = None;
        self.tasks.abort_all();
        info!("live session stopped");
    }

    /// Applies scheduler effects; returns `false` once the session must end.
    fn dispatch(&mut self, event: SchedulerEvent) -> bool {
        let mut running = true;
        for effect in self.scheduler.handle(event) {
            match effect {
                SchedulerEffect::Fetch { range, silent } => self.spawn_fetch(range, silent),
                SchedulerEffect::CheckHealth => self.spawn_health_check(),
                SchedulerEffect::StartPricePolling => {
                    // replacing the handle drops any previous timer first
                    self.price_timer = Some(periodic(self.settings.price_poll));
                }
                SchedulerEffect::StopPricePolling => self.price_timer = None,
                SchedulerEffect::RangeChanged { range, reason } => {
                    debug!(%range, ?reason, "session range follows market");
                }
                SchedulerEffect::Shutdown => running = false,
            }
        }
        self.states.send_replace(self.scheduler.state());
        running
    }

    fn spawn_fetch(&mut self, range: RangeKey, silent: bool) {
        let ticket = self.tracker.issue(range, silent);
        if !silent {
            self.snapshots.send_modify(|snapshot| snapshot.loading = true);
        }
        let view = Arc::clone(&self.view);
        self.tasks.spawn(async move {
            let result = view.load(LoadRequest { range, silent }).await;
            TaskOutcome::Data { ticket, result }
        });
    }

    fn spawn_health_check(&mut self) {
        self.health_issued += 1;
        let sequence = self.health_issued;
        let market = Arc::clone(&self.market);
        self.tasks.spawn(async move {
            let open = match market.market_health().await {
                Ok(health) => health.market_open,
                Err(error) => {
                    warn!(%error, "market health check failed, treating market as closed");
                    false
                }
            };
            TaskOutcome::Health { sequence, open }
        });
    }

    fn complete(
        &mut self,
        joined: Result<TaskOutcome<V::Output>, JoinError>,
    ) -> Option<SchedulerEvent> {
        match joined {
            Ok(TaskOutcome::Data { ticket, result }) => {
                self.commit(ticket, result);
                None
            }
            Ok(TaskOutcome::Health { sequence, open }) => {
                if sequence <= self.health_applied {
                    debug!(sequence, "discarding superseded health check");
                    return None;
                }
                self.health_applied = sequence;
                Some(SchedulerEvent::MarketObserved { open })
            }
            Err(error) => {
                if !error.is_cancelled() {
                    warn!(%error, "session request task failed");
                }
                None
            }
        }
    }

    fn commit(&mut self, ticket: RequestTicket, result: Result<V::Output, SourceError>) {
        if !self.tracker.accept(&ticket) {
            debug!(
                range = %ticket.range,
                sequence = ticket.sequence,
                "discarding response for superseded request"
            );
            return;
        }

        self.snapshots.send_modify(|snapshot| {
            match result {
                Ok(data) => {
                    snapshot.range = Some(ticket.range);
                    snapshot.data = Some(data);
                    snapshot.error = None;
                }
                Err(error) => {
                    warn!(range = %ticket.range, %error, "refresh failed");
                    snapshot.error = Some(error);
                }
            }
            snapshot.loading = false;
            snapshot.refreshes += 1;
        });
    }
}

/// Interval whose first tick is one full period away.
fn periodic(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

fn next_tick(timer: &mut Option<Interval>) -> impl Future<Output = ()> + '_ {
    async move {
        match timer {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
