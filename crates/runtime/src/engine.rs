use std::ops::ControlFlow;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use core_sim::{SimConfig, SimConfigError, TradeGenerator, TradeIntervalGenerator};
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::events::{ControlMessage, DashboardEvent, StartInvestment, StopInvestment, TradeEvent};
use crate::metrics::TradeStats;
use crate::registry::{ActiveSession, ConnectionId, SessionRegistry};
use crate::router::BroadcastRouter;
use crate::scheduler::{Firing, Scheduler};

const DEFAULT_EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub sim: SimConfig,
    pub announce_disconnect: bool,
    pub event_buffer: usize,
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            announce_disconnect: true,
            event_buffer: DEFAULT_EVENT_BUFFER,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("simulation engine is not running")]
    Closed,
    #[error("connection id space exhausted")]
    ConnectionIdOverflow,
    #[error("event buffer must be greater than zero")]
    InvalidEventBuffer,
    #[error(transparent)]
    InvalidSimConfig(#[from] SimConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub active_count: usize,
    pub connections: usize,
    pub investment_ids: Vec<String>,
    pub stats: TradeStats,
    pub win_rate: Option<f64>,
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub trades: mpsc::Receiver<TradeEvent>,
    pub dashboard: broadcast::Receiver<DashboardEvent>,
}

#[derive(Debug)]
enum Command {
    Attach {
        connection: ConnectionId,
        outbox: mpsc::Sender<TradeEvent>,
    },
    Start {
        connection: ConnectionId,
        request: StartInvestment,
    },
    Stop {
        request: StopInvestment,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    dashboard: broadcast::Sender<DashboardEvent>,
    next_connection_id: Arc<AtomicU64>,
    event_buffer: usize,
}

impl EngineHandle {
    pub fn open_connection(&self) -> Result<Connection, EngineError> {
        let previous = self
            .next_connection_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(1)
            })
            .map_err(|_| EngineError::ConnectionIdOverflow)?;
        let id = ConnectionId(previous + 1);

        let dashboard = self.dashboard.subscribe();
        let (outbox, trades) = mpsc::channel(self.event_buffer);
        self.send(Command::Attach {
            connection: id,
            outbox,
        })?;

        Ok(Connection {
            id,
            trades,
            dashboard,
        })
    }

    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<DashboardEvent> {
        self.dashboard.subscribe()
    }

    pub fn apply(&self, connection: ConnectionId, message: ControlMessage) -> Result<(), EngineError> {
        match message {
            ControlMessage::StartInvestment(request) => self.start(connection, request),
            ControlMessage::StopInvestment(request) => self.stop(request),
        }
    }

    pub fn start(&self, connection: ConnectionId, request: StartInvestment) -> Result<(), EngineError> {
        self.send(Command::Start {
            connection,
            request,
        })
    }

    pub fn stop(&self, request: StopInvestment) -> Result<(), EngineError> {
        self.send(Command::Stop { request })
    }

    pub fn disconnect(&self, connection: ConnectionId) -> Result<(), EngineError> {
        self.send(Command::Disconnect { connection })
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Snapshot { reply })?;
        response.await.map_err(|_| EngineError::Closed)
    }

    pub async fn shutdown(&self) -> Result<usize, EngineError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Shutdown { reply })?;
        response.await.map_err(|_| EngineError::Closed)
    }

    fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands.send(command).map_err(|_| EngineError::Closed)
    }
}

pub fn spawn(options: EngineOptions) -> Result<EngineHandle, EngineError> {
    options.sim.validate()?;
    if options.event_buffer == 0 {
        return Err(EngineError::InvalidEventBuffer);
    }

    let (commands, command_rx) = mpsc::unbounded_channel();
    let (dashboard, _) = broadcast::channel(options.event_buffer);
    let (scheduler, firing_rx) = Scheduler::new();
    let rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let engine = SimEngine {
        registry: SessionRegistry::new(),
        router: BroadcastRouter::new(dashboard.clone()),
        scheduler,
        generator: TradeGenerator::new(options.sim.clone()),
        intervals: TradeIntervalGenerator::new(&options.sim),
        stats: TradeStats::new(),
        rng,
        announce_disconnect: options.announce_disconnect,
    };
    tokio::spawn(engine.run(command_rx, firing_rx));

    Ok(EngineHandle {
        commands,
        dashboard,
        next_connection_id: Arc::new(AtomicU64::new(0)),
        event_buffer: options.event_buffer,
    })
}

struct SimEngine {
    registry: SessionRegistry,
    router: BroadcastRouter,
    scheduler: Scheduler,
    generator: TradeGenerator,
    intervals: TradeIntervalGenerator,
    stats: TradeStats,
    rng: StdRng,
    announce_disconnect: bool,
}

impl SimEngine {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut firings: mpsc::UnboundedReceiver<Firing>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).is_break() {
                            return;
                        }
                    }
                    None => {
                        self.shutdown();
                        return;
                    }
                },
                Some(firing) = firings.recv() => self.fire(firing),
            }
        }
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Attach { connection, outbox } => {
                self.router.attach(connection, outbox);
                debug!(connection = connection.0, connections = self.router.connections(), "connection attached");
            }
            Command::Start {
                connection,
                request,
            } => self.start(connection, request),
            Command::Stop { request } => self.stop(request),
            Command::Disconnect { connection } => self.disconnect(connection),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(self.shutdown());
                return ControlFlow::Break(());
            }
        }

        ControlFlow::Continue(())
    }

    fn start(&mut self, connection: ConnectionId, request: StartInvestment) {
        let investment_id = request.investment_id.clone();
        let key = self.registry.issue_key();

        let replaced = self
            .registry
            .register(ActiveSession::new(investment_id.clone(), connection, key));
        let timer = self
            .scheduler
            .arm(&investment_id, key, self.intervals.initial_delay());
        if let Some(session) = self.registry.lookup_mut(&investment_id) {
            session.arm(timer);
        }

        let active_count = self.registry.size();
        info!(
            investment_id = %investment_id,
            username = request.username.as_deref().unwrap_or("-"),
            connection = connection.0,
            restarted = replaced.is_some(),
            active_count,
            "investment simulation started"
        );
        self.router.announce_start(request, active_count);
    }

    fn stop(&mut self, request: StopInvestment) {
        let removed = self.registry.unregister(&request.investment_id).is_some();
        let active_count = self.registry.size();
        if removed {
            info!(investment_id = %request.investment_id, active_count, "investment simulation stopped");
        } else {
            debug!(investment_id = %request.investment_id, active_count, "stop for inactive investment");
        }

        // STOP is announced even when nothing was running.
        self.router.announce_stop(request, active_count);
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        self.router.detach(connection);

        for investment_id in self.registry.owned_by(connection) {
            self.registry.unregister(&investment_id);
            let active_count = self.registry.size();
            info!(
                investment_id = %investment_id,
                connection = connection.0,
                active_count,
                "investment simulation stopped on disconnect"
            );
            if self.announce_disconnect {
                self.router
                    .announce_stop(StopInvestment { investment_id }, active_count);
            }
        }
    }

    fn fire(&mut self, firing: Firing) {
        if !self.registry.is_live(&firing) {
            debug!(investment_id = %firing.investment_id, "suppressed firing for cancelled session");
            return;
        }

        let active_count = self.registry.size();
        let Some(session) = self.registry.lookup_mut(&firing.investment_id) else {
            return;
        };

        let outcome = self.generator.generate(&mut self.rng);
        let trade = TradeEvent::new(firing.investment_id.clone(), outcome, OffsetDateTime::now_utc());
        self.stats.record(&trade);
        let investment_id = trade.investment_id.clone();
        let (is_win, profit_loss) = (trade.is_win, trade.profit_loss);
        let delivery = self.router.deliver(trade, session.owner(), active_count);
        debug!(
            investment_id = %investment_id,
            is_win,
            profit_loss,
            direct = delivery.direct,
            observers = delivery.observers,
            "trade generated"
        );

        let delay = self.intervals.next_delay(&mut self.rng);
        session.arm(self.scheduler.arm(&firing.investment_id, firing.session, delay));
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            active_count: self.registry.size(),
            connections: self.router.connections(),
            investment_ids: self.registry.investment_ids(),
            stats: self.stats.clone(),
            win_rate: self.stats.win_rate(),
        }
    }

    fn shutdown(&mut self) -> usize {
        let cancelled = self.registry.cancel_all();
        info!(cancelled, trades = self.stats.trades, "simulation engine stopped");
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;
    use tokio::time::{sleep, timeout, Instant};

    use super::{spawn, EngineError, EngineHandle, EngineOptions};
    use crate::events::{DashboardEvent, DashboardKind, StartInvestment, StopInvestment};

    fn seeded_engine(seed: u64) -> EngineHandle {
        spawn(EngineOptions {
            seed: Some(seed),
            ..EngineOptions::default()
        })
        .unwrap()
    }

    fn start_request(investment_id: &str) -> StartInvestment {
        StartInvestment {
            investment_id: investment_id.to_string(),
            username: Some("tester".to_string()),
        }
    }

    fn stop_request(investment_id: &str) -> StopInvestment {
        StopInvestment {
            investment_id: investment_id.to_string(),
        }
    }

    async fn next_lifecycle_event(
        dashboard: &mut broadcast::Receiver<DashboardEvent>,
    ) -> DashboardEvent {
        loop {
            let event = dashboard.recv().await.unwrap();
            if event.kind != DashboardKind::Trade {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_trade_arrives_after_initial_delay() {
        let engine = seeded_engine(7);
        let mut connection = engine.open_connection().unwrap();
        let started = Instant::now();

        engine.start(connection.id, start_request("inv_42")).unwrap();
        let trade = connection.trades.recv().await.unwrap();

        let elapsed = started.elapsed();
        assert_eq!(trade.investment_id, "inv_42");
        assert!(elapsed >= Duration::from_millis(1_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_200), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_trades_are_spaced_within_interval_bounds() {
        let engine = seeded_engine(11);
        let mut connection = engine.open_connection().unwrap();
        engine.start(connection.id, start_request("inv_1")).unwrap();

        let mut previous = {
            connection.trades.recv().await.unwrap();
            Instant::now()
        };
        for _ in 0..25 {
            connection.trades.recv().await.unwrap();
            let now = Instant::now();
            let gap = now - previous;
            assert!(gap >= Duration::from_millis(500), "{gap:?}");
            assert!(gap < Duration::from_millis(1_200), "{gap:?}");
            previous = now;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_start_streams_trades_to_owner_and_dashboard() {
        let engine = seeded_engine(42);
        let mut connection = engine.open_connection().unwrap();

        engine.start(connection.id, start_request("inv_42")).unwrap();

        let trade = timeout(Duration::from_millis(2_000), connection.trades.recv())
            .await
            .expect("trade within two seconds")
            .unwrap();
        assert_eq!(trade.investment_id, "inv_42");

        let start = connection.dashboard.recv().await.unwrap();
        let first_trade = connection.dashboard.recv().await.unwrap();
        assert_eq!(start.kind, DashboardKind::Start);
        assert_eq!(start.active_count, 1);
        assert_eq!(first_trade.kind, DashboardKind::Trade);
        assert_eq!(first_trade.active_count, 1);
        assert_eq!(first_trade.investment_id(), "inv_42");
    }

    #[tokio::test(start_paused = true)]
    async fn active_count_tracks_starts_and_stops() {
        let engine = seeded_engine(3);
        let connection = engine.open_connection().unwrap();
        let mut dashboard = connection.dashboard;

        engine.start(connection.id, start_request("inv_1")).unwrap();
        engine.start(connection.id, start_request("inv_2")).unwrap();
        engine.stop(stop_request("inv_1")).unwrap();

        let counts: Vec<(DashboardKind, usize)> = [
            next_lifecycle_event(&mut dashboard).await,
            next_lifecycle_event(&mut dashboard).await,
            next_lifecycle_event(&mut dashboard).await,
        ]
        .into_iter()
        .map(|event| (event.kind, event.active_count))
        .collect();

        assert_eq!(
            counts,
            vec![
                (DashboardKind::Start, 1),
                (DashboardKind::Start, 2),
                (DashboardKind::Stop, 1),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_session_emits_no_further_trades() {
        let engine = seeded_engine(5);
        let mut connection = engine.open_connection().unwrap();
        engine.start(connection.id, start_request("inv_1")).unwrap();
        connection.trades.recv().await.unwrap();

        engine.stop(stop_request("inv_1")).unwrap();

        let after_stop = timeout(Duration::from_secs(3), connection.trades.recv()).await;
        assert!(after_stop.is_err());
        assert_eq!(engine.snapshot().await.unwrap().active_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_prior_session() {
        let engine = seeded_engine(9);
        let mut first_owner = engine.open_connection().unwrap();
        let mut second_owner = engine.open_connection().unwrap();

        engine.start(first_owner.id, start_request("inv_1")).unwrap();
        sleep(Duration::from_millis(500)).await;
        let restarted_at = Instant::now();
        engine.start(second_owner.id, start_request("inv_1")).unwrap();

        second_owner.trades.recv().await.unwrap();
        assert!(restarted_at.elapsed() >= Duration::from_millis(1_000));
        sleep(Duration::from_secs(3)).await;

        assert!(first_owner.trades.try_recv().is_err());
        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.investment_ids, vec!["inv_1"]);

        let first = next_lifecycle_event(&mut first_owner.dashboard).await;
        let second = next_lifecycle_event(&mut first_owner.dashboard).await;
        assert_eq!((first.kind, first.active_count), (DashboardKind::Start, 1));
        assert_eq!((second.kind, second.active_count), (DashboardKind::Start, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_for_unknown_investment_still_reaches_dashboard() {
        let engine = seeded_engine(1);
        let mut observer = engine.subscribe_dashboard();

        engine.stop(stop_request("ghost")).unwrap();
        let snapshot = engine.snapshot().await.unwrap();

        assert_eq!(snapshot.active_count, 0);
        let stop = observer.try_recv().unwrap();
        assert_eq!(stop.kind, DashboardKind::Stop);
        assert_eq!(stop.investment_id(), "ghost");
        assert_eq!(stop.active_count, 0);
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_for_unknown_investment_leaves_running_sessions_alone() {
        let engine = seeded_engine(2);
        let mut connection = engine.open_connection().unwrap();
        engine.start(connection.id, start_request("inv_1")).unwrap();

        engine.stop(stop_request("ghost")).unwrap();

        let start = next_lifecycle_event(&mut connection.dashboard).await;
        let stop = next_lifecycle_event(&mut connection.dashboard).await;
        assert_eq!((start.kind, start.active_count), (DashboardKind::Start, 1));
        assert_eq!((stop.kind, stop.investment_id()), (DashboardKind::Stop, "ghost"));
        assert_eq!(stop.active_count, 1);

        connection.trades.recv().await.unwrap();
        assert_eq!(engine.snapshot().await.unwrap().investment_ids, vec!["inv_1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_owned_sessions_and_announces_stop() {
        let engine = seeded_engine(13);
        let owner = engine.open_connection().unwrap();
        let bystander = engine.open_connection().unwrap();
        let mut observer = engine.subscribe_dashboard();

        engine.start(owner.id, start_request("inv_2")).unwrap();
        engine.start(owner.id, start_request("inv_1")).unwrap();
        engine.start(bystander.id, start_request("inv_3")).unwrap();
        engine.disconnect(owner.id).unwrap();

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.investment_ids, vec!["inv_3"]);

        let mut events = Vec::new();
        for _ in 0..5 {
            let event = next_lifecycle_event(&mut observer).await;
            events.push((event.kind, event.investment_id().to_string(), event.active_count));
        }
        assert_eq!(
            &events[3..],
            &[
                (DashboardKind::Stop, "inv_1".to_string(), 2),
                (DashboardKind::Stop, "inv_2".to_string(), 1),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_disconnect_skips_stop_announcements() {
        let engine = spawn(EngineOptions {
            announce_disconnect: false,
            seed: Some(17),
            ..EngineOptions::default()
        })
        .unwrap();
        let owner = engine.open_connection().unwrap();
        let mut observer = engine.subscribe_dashboard();

        engine.start(owner.id, start_request("inv_1")).unwrap();
        engine.disconnect(owner.id).unwrap();
        let snapshot = engine.snapshot().await.unwrap();

        assert_eq!(snapshot.active_count, 0);
        assert_eq!(observer.try_recv().unwrap().kind, DashboardKind::Start);
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_trade_stats() {
        let engine = seeded_engine(21);
        let mut connection = engine.open_connection().unwrap();
        engine.start(connection.id, start_request("inv_1")).unwrap();

        for _ in 0..5 {
            connection.trades.recv().await.unwrap();
        }
        let stats = engine.snapshot().await.unwrap().stats;

        assert_eq!(stats.trades, 5);
        assert_eq!(stats.wins + stats.losses, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_win_rate_follows_recorded_trades() {
        let engine = seeded_engine(27);
        assert_eq!(engine.snapshot().await.unwrap().win_rate, None);

        let mut connection = engine.open_connection().unwrap();
        engine.start(connection.id, start_request("inv_1")).unwrap();
        for _ in 0..4 {
            connection.trades.recv().await.unwrap();
        }
        let snapshot = engine.snapshot().await.unwrap();

        assert_eq!(
            snapshot.win_rate,
            Some(snapshot.stats.wins as f64 / snapshot.stats.trades as f64)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_sessions_and_closes_outboxes() {
        let engine = seeded_engine(23);
        let mut connection = engine.open_connection().unwrap();
        engine.start(connection.id, start_request("inv_1")).unwrap();
        engine.start(connection.id, start_request("inv_2")).unwrap();

        assert_eq!(engine.shutdown().await.unwrap(), 2);
        assert!(connection.trades.recv().await.is_none());
        assert_eq!(engine.snapshot().await, Err(EngineError::Closed));
    }

    #[tokio::test]
    async fn rejects_invalid_options() {
        let zero_buffer = spawn(EngineOptions {
            event_buffer: 0,
            ..EngineOptions::default()
        });
        let bad_interval = spawn(EngineOptions {
            sim: core_sim::SimConfig {
                min_interval_ms: 0,
                ..core_sim::SimConfig::default()
            },
            ..EngineOptions::default()
        });

        assert!(matches!(zero_buffer, Err(EngineError::InvalidEventBuffer)));
        assert!(matches!(bad_interval, Err(EngineError::InvalidSimConfig(_))));
    }
}
