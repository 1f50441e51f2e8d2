//! Collaborator contracts: the remote pty host and the display sinks
//!
//! The multiplexer never spawns processes itself. It talks to a pty host
//! through [`PtyHost`] and hands output to whatever the embedding UI
//! supplies through [`DisplaySink`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use stackdeck_protocol::{Geometry, OutputChunk, SessionId};
use stackdeck_utils::Result;

/// Per-session output stream, live from a successful `open` until `close`
///
/// Unbounded so no chunk is ever dropped; the sender side is dropped by the
/// host when the pty goes away.
pub type OutputStream = mpsc::UnboundedReceiver<OutputChunk>;

/// Asynchronous request/response contract of the pty host
#[async_trait]
pub trait PtyHost: Send + Sync {
    /// Spawn a shell for `session_id` with the given grid size
    async fn open(&self, session_id: SessionId, geometry: Geometry, cwd: Option<&Path>) -> Result<()>;

    /// Forward raw input (best-effort)
    async fn write(&self, session_id: SessionId, data: &str) -> Result<()>;

    async fn resize(&self, session_id: SessionId, geometry: Geometry) -> Result<()>;

    /// Tear the pty down (best-effort)
    async fn close(&self, session_id: SessionId) -> Result<()>;

    /// Subscribe to the session's output events
    async fn subscribe(&self, session_id: SessionId) -> Result<OutputStream>;
}

/// Narrow capability a session uses to reach its own display
///
/// Handed to the controller at session creation; it is the only path from
/// a session back into the UI.
pub trait DisplaySink: Send + Sync {
    /// Append output to the display, in arrival order
    fn on_output(&self, data: &[u8]);

    /// Render an inline error (e.g. a failed spawn)
    fn on_error(&self, message: &str);

    /// The backend ended the output stream
    fn on_exit(&self) {}
}

/// Creates the display sink for a newly opened tab
pub trait SinkFactory: Send + Sync {
    fn create(&self, session_id: SessionId, label: &str) -> Arc<dyn DisplaySink>;
}

impl<F> SinkFactory for F
where
    F: Fn(SessionId, &str) -> Arc<dyn DisplaySink> + Send + Sync,
{
    fn create(&self, session_id: SessionId, label: &str) -> Arc<dyn DisplaySink> {
        self(session_id, label)
    }
}
