//! Typed notifications fanned out to subscribers.
//!
//! Session lifecycle, event-stream lifecycle and every routed WebSocket
//! frame are published on a single [`tokio::sync::broadcast`] channel.
//! Each subscriber gets its own receiver; a subscriber that falls behind
//! sees [`RecvError::Lagged`](tokio::sync::broadcast::error::RecvError::Lagged)
//! instead of blocking the stream.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Error;

const NOTIFY_CHANNEL_CAPACITY: usize = 1024;

/// Something the client wants its subscribers to know about.
#[derive(Debug, Clone)]
pub enum Notification {
    /// Login succeeded.
    Authenticated,
    /// The session was ended via `end_session`.
    Disconnected,
    /// The WebSocket event stream opened.
    EventsConnected,
    /// The WebSocket event stream closed, for whatever reason.
    EventsDisconnected,
    /// Stream-side failure: a malformed frame or a socket error.
    Error(Arc<Error>),
    /// `station-connect` frame payload.
    ClientConnected(Value),
    /// `station-disconnect` frame payload.
    ClientDisconnected(Value),
    /// `ap-detected` frame payload.
    DeviceDetected(Value),
    /// `ap-lost` frame payload.
    DeviceLost(Value),
    /// Any frame whose tag has no dedicated variant.
    Event { tag: String, data: Value },
    /// Every routed frame, verbatim.
    RawEvent(Value),
}

impl Notification {
    /// Stable dotted name, e.g. `"client.connected"`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Disconnected => "disconnected",
            Self::EventsConnected => "events.connected",
            Self::EventsDisconnected => "events.disconnected",
            Self::Error(_) => "error",
            Self::ClientConnected(_) => "client.connected",
            Self::ClientDisconnected(_) => "client.disconnected",
            Self::DeviceDetected(_) => "device.detected",
            Self::DeviceLost(_) => "device.lost",
            Self::Event { .. } => "event",
            Self::RawEvent(_) => "raw_event",
        }
    }
}

/// Sending half of the notification channel. Cheap to clone.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, notification: Notification) {
        tracing::trace!(name = notification.name(), "notify");
        // No subscribers is fine.
        let _ = self.tx.send(notification);
    }

    pub(crate) fn emit_error(&self, error: Error) {
        self.emit(Notification::Error(Arc::new(error)));
    }
}
