use crate::core::types::AuthToken;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// How a streaming session is kept alive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepalivePolicy {
    /// Nothing beyond transport-level ping/pong
    None,
    /// Re-issue the listen key at a fixed interval, regardless of traffic;
    /// a rejected renewal is retried after `retry` until the key expires
    ListenKeyRenewal { interval: Duration, retry: Duration },
    /// Send application pings every `interval`; treat `interval + timeout`
    /// without any received frame as a dead connection
    IdlePing { interval: Duration, timeout: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveEvent {
    Renew,
    Ping,
    /// No frame within the idle window; the session must close
    IdleTimeout,
    /// The listen key reached its hard expiry without a successful renewal
    TokenExpired,
}

/// Deadline bookkeeping for one session
///
/// The scheduler owns no timer; the session loop asks for the next deadline
/// and sleeps on it, so dropping the loop cancels every pending tick.
#[derive(Debug)]
pub struct KeepaliveScheduler {
    policy: KeepalivePolicy,
    validity: Option<Duration>,
    token_expiry: Option<Instant>,
    next_renewal: Option<Instant>,
    next_ping: Option<Instant>,
    last_activity: Instant,
}

impl KeepaliveScheduler {
    pub fn new(policy: KeepalivePolicy, token: &AuthToken) -> Self {
        let now = Instant::now();
        let validity = match token {
            AuthToken::ListenKey { validity, .. } => Some(*validity),
            AuthToken::Subscription(_) => None,
        };

        let (next_renewal, next_ping) = match policy {
            KeepalivePolicy::None => (None, None),
            KeepalivePolicy::ListenKeyRenewal { interval, .. } => (Some(now + interval), None),
            KeepalivePolicy::IdlePing { interval, .. } => (None, Some(now + interval)),
        };

        Self {
            policy,
            validity,
            token_expiry: token.expires_at(),
            next_renewal,
            next_ping,
            last_activity: now,
        }
    }

    pub fn token_expiry(&self) -> Option<Instant> {
        self.token_expiry
    }

    /// Any received frame resets the idle window
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Renewal succeeded; the key's validity restarts now
    pub fn renewed(&mut self) {
        let now = Instant::now();
        if let KeepalivePolicy::ListenKeyRenewal { interval, .. } = self.policy {
            self.next_renewal = Some(now + interval);
        }
        if let Some(validity) = self.validity {
            self.token_expiry = Some(now + validity);
        }
    }

    /// Renewal failed; retry soon, expiry unchanged
    pub fn renewal_failed(&mut self) {
        if let KeepalivePolicy::ListenKeyRenewal { interval, retry } = self.policy {
            self.next_renewal = Some(Instant::now() + retry.min(interval));
        }
    }

    pub fn ping_sent(&mut self) {
        if let KeepalivePolicy::IdlePing { interval, .. } = self.policy {
            self.next_ping = Some(Instant::now() + interval);
        }
    }

    /// Earliest pending deadline; terminal events win ties
    pub fn next_deadline(&self) -> Option<(Instant, KeepaliveEvent)> {
        let idle_deadline = match self.policy {
            KeepalivePolicy::IdlePing { interval, timeout } => {
                Some(self.last_activity + interval + timeout)
            }
            _ => None,
        };

        [
            self.token_expiry.map(|at| (at, KeepaliveEvent::TokenExpired)),
            idle_deadline.map(|at| (at, KeepaliveEvent::IdleTimeout)),
            self.next_renewal.map(|at| (at, KeepaliveEvent::Renew)),
            self.next_ping.map(|at| (at, KeepaliveEvent::Ping)),
        ]
        .into_iter()
        .flatten()
        .min_by_key(|(at, _)| *at)
    }
}

/// Sleep until the given deadline; never resolves when there is none
pub async fn wait_for(next: Option<(Instant, KeepaliveEvent)>) -> KeepaliveEvent {
    match next {
        Some((at, event)) => {
            sleep_until(at).await;
            event
        }
        None => std::future::pending().await,
    }
}
