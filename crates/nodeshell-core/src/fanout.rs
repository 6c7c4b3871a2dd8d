// ABOUTME: Subscriber set for daemon log events and delivery to each subscribed window.
// ABOUTME: Delivery skips closed sinks and never buffers.

use std::collections::HashMap;

use tracing::trace;

use crate::event::{EventSink, OutboundEvent};
use crate::window::WindowId;

/// Windows subscribed to daemon log lines, keyed by window id.
///
/// Membership is maintained by the window registry: ids are added when a
/// logging window is created and removed inside its close handling.
#[derive(Debug, Default)]
pub struct LogFanout {
    sinks: HashMap<WindowId, EventSink>,
}

impl LogFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, id: WindowId, sink: EventSink) {
        self.sinks.insert(id, sink);
    }

    /// Returns true if the id was subscribed.
    pub fn unsubscribe(&mut self, id: WindowId) -> bool {
        self.sinks.remove(&id).is_some()
    }

    pub fn is_subscribed(&self, id: WindowId) -> bool {
        self.sinks.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Push one log line to every subscriber with a live sink.
    ///
    /// Returns how many windows received it.
    pub fn publish(&self, line: &str) -> usize {
        let mut delivered = 0;
        for (id, sink) in &self.sinks {
            if !sink.is_valid() {
                trace!(window_id = %id, "Skipping log delivery to closed sink");
                continue;
            }
            if sink.send(OutboundEvent::log_line(line)) {
                delivered += 1;
            }
        }
        delivered
    }
}
