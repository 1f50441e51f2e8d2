//! Per-session output relay
//!
//! Each attached session gets its own task that drains the host's output
//! stream into the session's display sink. Delivery and detachment share a
//! gate, so once `detach` returns no further chunk reaches the sink even if
//! it was already received from the host.
//!
//! The gate is reentrant: a sink may detach its own session from inside
//! `on_output`. `on_exit` runs after the gate is released, so a sink may
//! also close its tab from there.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use stackdeck_protocol::SessionId;

use crate::host::{DisplaySink, OutputStream};

/// `true` while chunks may be delivered; flipped under lock by `detach`
type Gate = Arc<ReentrantMutex<Cell<bool>>>;

/// Handle for a running subscription task
#[derive(Debug)]
struct Subscription {
    cancel_token: CancellationToken,
    gate: Gate,
    join_handle: JoinHandle<()>,
}

impl Subscription {
    fn close(self) {
        self.cancel_token.cancel();
        // Waits for an in-flight delivery on another thread to finish
        self.gate.lock().set(false);
    }
}

/// Tracks exactly one output subscription per session
#[derive(Debug, Default)]
pub struct OutputRelay {
    subscriptions: Mutex<HashMap<SessionId, Subscription>>,
}

impl OutputRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start relaying `stream` into `sink`
    ///
    /// An existing subscription for the same session is cancelled first.
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, session_id: SessionId, stream: OutputStream, sink: Arc<dyn DisplaySink>) {
        let cancel_token = CancellationToken::new();
        let gate: Gate = Arc::new(ReentrantMutex::new(Cell::new(true)));

        // Registered before the task can run, so a stream that ends at once
        // still finds its subscription to detach
        let previous = {
            let mut subscriptions = self.subscriptions.lock();
            let join_handle = tokio::spawn(relay_task(
                session_id,
                stream,
                sink,
                cancel_token.clone(),
                Arc::clone(&gate),
            ));
            subscriptions.insert(
                session_id,
                Subscription {
                    cancel_token,
                    gate,
                    join_handle,
                },
            )
        };

        if let Some(old) = previous {
            old.close();
            debug!(session_id = %session_id, "Replaced existing output subscription");
        } else {
            debug!(session_id = %session_id, "Attached output subscription");
        }
    }

    /// Cancel the session's subscription
    ///
    /// Returns true if a subscription was found. Calling it again is a no-op.
    pub fn detach(&self, session_id: SessionId) -> bool {
        let removed = self.subscriptions.lock().remove(&session_id);
        match removed {
            Some(subscription) => {
                subscription.close();
                debug!(session_id = %session_id, "Detached output subscription");
                true
            }
            None => false,
        }
    }

    /// Cancel every subscription
    pub fn detach_all(&self) {
        let drained: Vec<_> = self.subscriptions.lock().drain().collect();
        for (session_id, subscription) in drained {
            subscription.close();
            debug!(session_id = %session_id, "Detached output subscription (detach_all)");
        }
    }

    /// Whether the session has a subscription whose stream is still live
    pub fn is_attached(&self, session_id: SessionId) -> bool {
        self.subscriptions
            .lock()
            .get(&session_id)
            .is_some_and(|s| !s.join_handle.is_finished())
    }

    /// Number of tracked subscriptions
    pub fn count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

async fn relay_task(
    session_id: SessionId,
    mut stream: OutputStream,
    sink: Arc<dyn DisplaySink>,
    cancel_token: CancellationToken,
    gate: Gate,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                trace!(session_id = %session_id, "Output relay cancelled");
                break;
            }

            chunk = stream.recv() => match chunk {
                Some(chunk) => {
                    if chunk.session_id != session_id {
                        warn!(
                            session_id = %session_id,
                            chunk_session = %chunk.session_id,
                            "Dropping output chunk for another session"
                        );
                        continue;
                    }
                    if !deliver(&gate, sink.as_ref(), &chunk.data) {
                        break;
                    }
                    trace!(session_id = %session_id, bytes = chunk.data.len(), "Relayed output");
                }
                None => {
                    // Claim the exit under the gate, notify outside it
                    let open = gate.lock().replace(false);
                    if open {
                        debug!(session_id = %session_id, "Output stream ended");
                        sink.on_exit();
                    }
                    break;
                }
            }
        }
    }
}

/// Hand one chunk to the sink unless the subscription was detached
fn deliver(gate: &Gate, sink: &dyn DisplaySink, data: &[u8]) -> bool {
    let open = gate.lock();
    if !open.get() {
        return false;
    }
    sink.on_output(data);
    true
}
