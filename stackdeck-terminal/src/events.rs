//! Notifications from the multiplexer to the embedding UI

use tokio::sync::mpsc;

use stackdeck_protocol::SessionId;

/// Something the host UI should react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiplexerEvent {
    /// A tab was refused because the list is full
    CapacityExceeded { max: usize },
    /// The last tab closed; the terminal panel can collapse
    CollapsePanel,
    /// Tab list or active tab changed; re-read the tab view
    TabsChanged,
    /// A session failed to open (the error is also in its display)
    SessionFailed { session_id: SessionId, message: String },
}

pub type EventSender = mpsc::UnboundedSender<MultiplexerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<MultiplexerEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Drain every event queued so far
pub fn drain(rx: &mut EventReceiver) -> Vec<MultiplexerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
