//! The downstream egress sink (spec §1's "Queue" external collaborator,
//! §6's egress tuple shape).
//!
//! The engine doesn't know or care what's on the other end — only that it
//! can hand over one [`EgressPoint`] per emission while still holding its
//! own mutex (spec §5). `ChannelSink` is the one concrete implementation
//! this crate ships, grounded on `rylv-rylv-metrics`'s use of `crossbeam`
//! for exactly this kind of producer/consumer metrics handoff.

use crate::tags::Tags;
use std::sync::Arc;

/// One derived-metric emission. `hostname` is always `None` for StatsD
/// (there's no host dimension in the wire protocol); it's kept as a field
/// so the tuple shape matches spec §6 exactly and a consumer can treat it
/// uniformly alongside point types that do carry a host.
#[derive(Debug, Clone, PartialEq)]
pub struct EgressPoint {
    pub hostname: Option<String>,
    pub name: String,
    pub value: f64,
    pub timestamp: i64,
    pub metadata: Option<Tags>,
}

impl EgressPoint {
    pub fn new(name: String, value: f64, timestamp: i64, metadata: Option<Tags>) -> Self {
        Self {
            hostname: None,
            name,
            value,
            timestamp,
            metadata,
        }
    }
}

/// A thread-safe sink accepting emitted points. Implementors must not
/// block indefinitely — the flush tick holds the aggregator's mutex for
/// its entire duration (spec §5), so an unbounded stall here stalls
/// ingestion too.
pub trait EgressSink: Send + Sync {
    fn send(&self, point: EgressPoint);
}

impl<T: EgressSink + ?Sized> EgressSink for Arc<T> {
    fn send(&self, point: EgressPoint) {
        (**self).send(point)
    }
}

/// A [`crossbeam_channel`] backed sink. Bounded channels provide the
/// "large enough not to stall the tick" backpressure spec §5 assumes is
/// the caller's responsibility to size; `unbounded` opts out of that
/// entirely.
#[derive(Clone)]
pub struct ChannelSink {
    sender: crossbeam_channel::Sender<EgressPoint>,
}

impl ChannelSink {
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<EgressPoint>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }

    pub fn bounded(capacity: usize) -> (Self, crossbeam_channel::Receiver<EgressPoint>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }
}

impl EgressSink for ChannelSink {
    fn send(&self, point: EgressPoint) {
        if self.sender.send(point).is_err() {
            tracing::debug!("egress sink has no receiver left, dropping point");
        }
    }
}
