use crate::core::kernel::codec::{Decoded, WsCodec};
use crate::core::traits::EventSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters describing what the dispatcher did with received frames
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    control: AtomicU64,
    dropped_unknown: AtomicU64,
    dropped_malformed: AtomicU64,
}

impl DispatchStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn control(&self) -> u64 {
        self.control.load(Ordering::Relaxed)
    }

    pub fn dropped_unknown(&self) -> u64 {
        self.dropped_unknown.load(Ordering::Relaxed)
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.dropped_malformed.load(Ordering::Relaxed)
    }
}

/// Routes decoded frames to the sink; never fails
pub struct MessageDispatcher<C: WsCodec> {
    codec: C,
    exchange: String,
    stats: Arc<DispatchStats>,
}

impl<C: WsCodec> MessageDispatcher<C> {
    pub fn new(codec: C, exchange: String, stats: Arc<DispatchStats>) -> Self {
        Self {
            codec,
            exchange,
            stats,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Decode `text` and forward any event to `sink`
    ///
    /// Returns whether an event was delivered.
    pub fn dispatch(&self, text: &str, sink: &dyn EventSink) -> bool {
        match self.codec.decode_message(text) {
            Ok(Decoded::Event(event)) => {
                sink.deliver(event);
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(Decoded::Control(kind)) => {
                debug!(exchange = %self.exchange, kind, "Control frame");
                self.stats.control.fetch_add(1, Ordering::Relaxed);
                false
            }
            Ok(Decoded::Unknown(discriminant)) => {
                debug!(
                    exchange = %self.exchange,
                    %discriminant,
                    "Dropping frame with unknown event type"
                );
                self.stats.dropped_unknown.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(e) => {
                warn!(
                    exchange = %self.exchange,
                    error = %e,
                    raw = %text,
                    "Dropping malformed frame"
                );
                self.stats.dropped_malformed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}
