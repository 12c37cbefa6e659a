use crate::core::config::ConnectorConfig;
use crate::core::errors::{ExchangeError, Stage};
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::dispatcher::{DispatchStats, MessageDispatcher};
use crate::core::kernel::keepalive::{self, KeepaliveEvent, KeepaliveScheduler};
use crate::core::kernel::rest::RestClient;
use crate::core::kernel::ws::{WsConnector, WsFrame, WsSession};
use crate::core::traits::{EventSink, ManagedStream, SessionPlan, StageObserver, StreamProtocol};
use crate::core::types::{ConnectionState, ExchangeId, StreamEvent};
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

thread_local! {
    /// Connector whose sink is running on this thread, zero when none
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Marks this thread as inside a connector's sink until dropped
struct DeliveryMark(usize);

impl DeliveryMark {
    fn enter(id: usize) -> Self {
        Self(DELIVERING.with(|current| current.replace(id)))
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|current| current.set(self.0));
    }
}

/// State shared between the owner handle and the session task
struct Shared {
    /// Cleared exactly once by `stop`
    alive: AtomicBool,
    /// Held shared by every state change and sink delivery; `stop` takes it
    /// exclusively to wait out the ones in flight
    fence: RwLock<()>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn transition(&self, state: ConnectionState) -> bool {
        let _fence = self.fence.read();
        if !self.is_alive() {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn deliver<S: EventSink>(&self, sink: &S, event: StreamEvent) {
        let _fence = self.fence.read();
        if self.is_alive() {
            let _mark = DeliveryMark::enter(self.id());
            sink.deliver(event);
        }
    }

    /// Clear the liveness flag; false when it was already cleared
    fn shut_down(&self) -> bool {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return false;
        }
        // Called from our own sink: the delivery in flight is the caller
        if DELIVERING.with(Cell::get) != self.id() {
            drop(self.fence.write());
        }
        true
    }
}

/// Weak view of the connector used by everything running on its task
#[derive(Clone)]
struct StateHandle(Weak<Shared>);

impl StateHandle {
    fn transition(&self, state: ConnectionState) -> bool {
        let moved = self
            .0
            .upgrade()
            .is_some_and(|shared| shared.transition(state));
        if moved {
            debug!(%state, "Connector state changed");
        }
        moved
    }

    fn is_alive(&self) -> bool {
        self.0.upgrade().is_some_and(|shared| shared.is_alive())
    }
}

impl StageObserver for StateHandle {
    fn enter(&self, state: ConnectionState) {
        self.transition(state);
    }
}

/// Sink wrapper that drops events once the connector is stopped
struct GuardedSink<S> {
    handle: StateHandle,
    inner: S,
}

impl<S: EventSink> EventSink for GuardedSink<S> {
    fn deliver(&self, event: StreamEvent) {
        if let Some(shared) = self.handle.0.upgrade() {
            shared.deliver(&self.inner, event);
        }
    }
}

struct Parts<P, R, W, S> {
    protocol: P,
    rest: R,
    ws: W,
    sink: S,
}

/// Reconnecting stream for one exchange, one credential set and one
/// subscription
///
/// `run` spawns the session task on the current tokio runtime. Errors never
/// escape: every failed attempt discards its token and endpoint, waits the
/// fixed backoff and bootstraps again until `stop` is called.
pub struct StreamConnector<P, R, W, S>
where
    P: StreamProtocol,
    R: RestClient + 'static,
    W: WsConnector + 'static,
    S: EventSink,
{
    exchange: ExchangeId,
    shared: Arc<Shared>,
    stats: Arc<DispatchStats>,
    backoff: Duration,
    parts: Mutex<Option<Parts<P, R, W, S>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<P, R, W, S> StreamConnector<P, R, W, S>
where
    P: StreamProtocol,
    R: RestClient + 'static,
    W: WsConnector + 'static,
    S: EventSink,
{
    pub fn new(protocol: P, rest: R, ws: W, sink: S, config: &ConnectorConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            exchange: protocol.exchange(),
            shared: Arc::new(Shared {
                alive: AtomicBool::new(true),
                fence: RwLock::new(()),
                state,
            }),
            stats: Arc::new(DispatchStats::default()),
            backoff: config.backoff,
            parts: Mutex::new(Some(Parts {
                protocol,
                rest,
                ws,
                sink,
            })),
            task: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    /// Start streaming; later calls and calls after `stop` do nothing
    pub fn run(&self) {
        let mut task = self.task.lock();
        if task.is_some() || !self.shared.is_alive() {
            return;
        }
        let Some(parts) = self.parts.lock().take() else {
            return;
        };

        let subscription = parts.protocol.subscription().clone();
        let handle = StateHandle(Arc::downgrade(&self.shared));
        let runner = SessionRunner {
            dispatcher: MessageDispatcher::new(
                parts.protocol.codec(),
                self.exchange.to_string(),
                self.stats.clone(),
            ),
            protocol: parts.protocol,
            rest: parts.rest,
            ws: parts.ws,
            sink: GuardedSink {
                handle: handle.clone(),
                inner: parts.sink,
            },
            handle,
            backoff: FixedInterval::new(self.backoff),
            exchange: self.exchange,
        };

        info!(
            exchange = %self.exchange,
            kind = ?subscription.kind,
            trade_type = ?subscription.trade_type,
            symbols = subscription.symbols.len(),
            "Starting stream connector"
        );
        *task = Some(tokio::spawn(runner.run()));
    }

    /// Stop streaming for good
    ///
    /// Cancels the in-flight operation and all timers. Once this returns the
    /// state is `Stopped` and the sink receives nothing further. May be
    /// called from inside the sink.
    pub fn stop(&self) {
        if !self.shared.shut_down() {
            return;
        }
        self.shared.state.send_replace(ConnectionState::Stopping);

        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.parts.lock().take();

        self.shared.state.send_replace(ConnectionState::Stopped);
        info!(exchange = %self.exchange, "Stream connector stopped");
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }
}

impl<P, R, W, S> ManagedStream for StreamConnector<P, R, W, S>
where
    P: StreamProtocol,
    R: RestClient + 'static,
    W: WsConnector + 'static,
    S: EventSink,
{
    fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    fn run(&self) {
        Self::run(self);
    }

    fn stop(&self) {
        Self::stop(self);
    }

    fn current_state(&self) -> ConnectionState {
        Self::current_state(self)
    }

    fn stats(&self) -> Arc<DispatchStats> {
        Self::stats(self)
    }
}

impl<P, R, W, S> Drop for StreamConnector<P, R, W, S>
where
    P: StreamProtocol,
    R: RestClient + 'static,
    W: WsConnector + 'static,
    S: EventSink,
{
    fn drop(&mut self) {
        self.stop();
    }
}

struct SessionRunner<P: StreamProtocol, R, W, S> {
    protocol: P,
    rest: R,
    ws: W,
    sink: GuardedSink<S>,
    dispatcher: MessageDispatcher<P::Codec>,
    handle: StateHandle,
    backoff: FixedInterval,
    exchange: ExchangeId,
}

impl<P, R, W, S> SessionRunner<P, R, W, S>
where
    P: StreamProtocol,
    R: RestClient + 'static,
    W: WsConnector + 'static,
    S: EventSink,
{
    async fn run(mut self) {
        loop {
            let result = self.attempt().await;
            if !self.handle.is_alive() {
                break;
            }
            let error = match result {
                Ok(()) => ExchangeError::SessionClosed("session ended".to_string()),
                Err(e) => e,
            };

            let delay = self.backoff.next().unwrap_or(Duration::from_secs(5));
            warn!(
                exchange = %self.exchange,
                error = %error,
                backoff_ms = delay.as_millis() as u64,
                "Stream session failed, retrying"
            );
            if !self.handle.transition(ConnectionState::Idle) {
                break;
            }
            sleep(delay).await;
        }
        debug!(exchange = %self.exchange, "Session task finished");
    }

    /// One full bootstrap and streaming cycle; every value it acquires is
    /// dropped when it returns
    async fn attempt(&mut self) -> Result<(), ExchangeError> {
        let plan = self.protocol.bootstrap(&self.rest, &self.handle).await?;
        debug!(
            exchange = %self.exchange,
            endpoint = plan.endpoint.host_str().unwrap_or_default(),
            "Bootstrap complete"
        );

        self.enter(ConnectionState::WsUpgrading)?;
        let mut session = self.ws.connect(&plan.endpoint).await?;

        let result = self.subscribe_and_stream(&mut session, &plan).await;
        if timeout(Duration::from_secs(1), session.close()).await.is_err() {
            debug!(exchange = %self.exchange, "Close handshake timed out");
        }
        result
    }

    async fn subscribe_and_stream(
        &mut self,
        session: &mut W::Session,
        plan: &SessionPlan,
    ) -> Result<(), ExchangeError> {
        self.enter(ConnectionState::Subscribing)?;
        for frame in self
            .protocol
            .subscription_frames(self.dispatcher.codec(), plan)?
        {
            session.send_text(frame).await?;
        }

        self.enter(ConnectionState::Streaming)?;
        info!(exchange = %self.exchange, topics = plan.topics.len(), "Streaming");

        let mut keepalive = KeepaliveScheduler::new(plan.keepalive, &plan.token);
        loop {
            let next = keepalive.next_deadline();
            tokio::select! {
                frame = session.next_frame() => {
                    let frame = frame?;
                    keepalive.record_activity();
                    if let WsFrame::Text(text) = frame {
                        self.dispatcher.dispatch(&text, &self.sink);
                    }
                }
                event = keepalive::wait_for(next) => match event {
                    KeepaliveEvent::Ping => {
                        if let Some(ping) = self.dispatcher.codec().encode_ping() {
                            session.send_text(ping).await?;
                        }
                        keepalive.ping_sent();
                    }
                    KeepaliveEvent::Renew => {
                        match self.protocol.renew(&self.rest, &plan.token).await {
                            Ok(()) => {
                                info!(exchange = %self.exchange, "Listen key renewed");
                                keepalive.renewed();
                            }
                            Err(e) => {
                                warn!(
                                    exchange = %self.exchange,
                                    error = %e,
                                    "Listen key renewal failed, retrying"
                                );
                                keepalive.renewal_failed();
                            }
                        }
                    }
                    KeepaliveEvent::IdleTimeout => {
                        return Err(ExchangeError::Timeout(Stage::Idle));
                    }
                    KeepaliveEvent::TokenExpired => {
                        return Err(ExchangeError::SessionClosed(
                            "listen key expired without renewal".to_string(),
                        ));
                    }
                },
            }
        }
    }

    fn enter(&self, state: ConnectionState) -> Result<(), ExchangeError> {
        if self.handle.transition(state) {
            Ok(())
        } else {
            Err(ExchangeError::SessionClosed("connector stopped".to_string()))
        }
    }
}
