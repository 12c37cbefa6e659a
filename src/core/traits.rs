use crate::core::{
    errors::ExchangeError,
    kernel::{DispatchStats, KeepalivePolicy, RestClient, WsCodec},
    types::{AuthToken, ConnectionState, ExchangeId, StreamEvent, SubscriptionDescriptor},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// Consumer of parsed stream events
///
/// Called synchronously, in frame arrival order, from the connector's task.
/// Implementations shared between connectors must tolerate interleaved
/// delivery from several instances.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: StreamEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn deliver(&self, event: StreamEvent) {
        (**self).deliver(event);
    }
}

impl EventSink for mpsc::UnboundedSender<StreamEvent> {
    fn deliver(&self, event: StreamEvent) {
        if self.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

/// Adapts a closure into an [`EventSink`]
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    fn deliver(&self, event: StreamEvent) {
        (self.0)(event);
    }
}

/// Receives connection-state transitions from transport code
pub trait StageObserver: Send + Sync {
    fn enter(&self, state: ConnectionState);
}

/// Observer for calls that must not move the connector's state, such as
/// listen-key renewal while streaming
pub struct SilentStages;

impl StageObserver for SilentStages {
    fn enter(&self, _state: ConnectionState) {}
}

/// Everything one session attempt needs after a successful bootstrap
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub token: AuthToken,
    /// WebSocket target, with any connect-time token embedded
    pub endpoint: Url,
    pub keepalive: KeepalivePolicy,
    /// Topics or streams named by the subscription frames
    pub topics: Vec<String>,
}

/// Exchange-specific behaviour consumed by the generic connector
#[async_trait]
pub trait StreamProtocol: Send + Sync + 'static {
    type Codec: WsCodec;

    fn exchange(&self) -> ExchangeId;

    /// What this stream subscribes to, fixed for its lifetime
    fn subscription(&self) -> &SubscriptionDescriptor;

    fn codec(&self) -> Self::Codec;

    /// Acquire fresh authorization material and pick a WebSocket endpoint
    async fn bootstrap(
        &self,
        rest: &dyn RestClient,
        stages: &dyn StageObserver,
    ) -> Result<SessionPlan, ExchangeError>;

    /// Extend the validity of a renewable token
    async fn renew(&self, rest: &dyn RestClient, token: &AuthToken) -> Result<(), ExchangeError> {
        let _ = (rest, token);
        Ok(())
    }

    /// Frames sent once, in order, right after the upgrade
    fn subscription_frames(
        &self,
        codec: &Self::Codec,
        plan: &SessionPlan,
    ) -> Result<Vec<String>, ExchangeError> {
        codec.encode_subscription(&plan.topics)
    }
}

/// Owner-facing control surface of a connector, independent of its
/// exchange and transport types
pub trait ManagedStream: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    /// Idempotent start
    fn run(&self);

    /// Idempotent, terminal stop
    fn stop(&self);

    fn current_state(&self) -> ConnectionState;

    fn stats(&self) -> Arc<DispatchStats>;
}
