//! Typed lifecycle event bus.
//!
//! Every activation, deactivation, and safety-limits change is broadcast so
//! the rest of the system (UI, sync layer) can react without polling shared
//! state. Built on `tokio::sync::broadcast`: subscribers are lossy by design,
//! a slow consumer lags rather than backpressuring device polling.

use crate::capabilities::ConnectionState;
use crate::limits::SafetyLimits;
use tokio::sync::broadcast;

/// Sender id used for platform-originated events such as safety-limit
/// changes, so subscribers can distinguish them from plugin-originated
/// events. Never assigned to a plugin.
pub const PLATFORM_SENDER_ID: &str = "medlink.platform";

/// Default broadcast channel capacity.
const EVENT_BUS_CAPACITY: usize = 64;

/// What happened, without the sender attribution.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    PluginActivated { plugin_id: String },
    PluginDeactivated { plugin_id: String },
    SafetyLimitsChanged(SafetyLimits),
    ConnectionChanged(ConnectionState),
    /// A polling step stored new readings downstream.
    ReadingsStored { count: usize },
}

/// A broadcast event tagged with its originating sender id.
#[derive(Debug, Clone, PartialEq)]
pub struct MedlinkEvent {
    /// Plugin id, or [`PLATFORM_SENDER_ID`] for platform-originated events.
    pub sender: String,
    pub kind: EventKind,
}

/// Shared publish/subscribe handle.
///
/// Cheap to clone; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MedlinkEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event. A zero-subscriber bus is not an error.
    pub fn publish(&self, sender: impl Into<String>, kind: EventKind) {
        let event = MedlinkEvent {
            sender: sender.into(),
            kind,
        };
        // send only fails when there are no receivers, which is fine here
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MedlinkEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
