use std::path::PathBuf;
use std::time::Instant;

use stackdeck_protocol::{Geometry, SessionId};

/// Lifecycle state of a terminal session
///
/// `Opening -> Ready -> Closing -> Closed`, or `Opening -> Failed` when the
/// host rejects the spawn, or `Ready -> Exited` when the shell goes away on
/// the host. Failed and exited sessions stay visible until the user closes
/// them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Spawn request in flight
    Opening,
    /// Shell running, output subscription attached
    Ready,
    /// Spawn rejected; the message was rendered into the session's display
    Failed { message: String },
    /// Output stream ended; the pty is gone and input is dropped
    Exited,
    /// Subscription cancelled, close request issued
    Closing,
    /// Removed from the registry
    Closed,
}

impl SessionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, Self::Exited)
    }

    /// Closing or closed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Parameters for opening a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenRequest {
    pub label: Option<String>,
    /// External context the session belongs to (e.g. a site domain)
    pub origin_key: Option<String>,
    pub cwd: Option<PathBuf>,
    /// Written once the shell is up, terminated by a single newline
    pub initial_command: Option<String>,
}

impl OpenRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_origin(mut self, origin_key: impl Into<String>) -> Self {
        self.origin_key = Some(origin_key.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_initial_command(mut self, command: impl Into<String>) -> Self {
        self.initial_command = Some(command.into());
        self
    }
}

/// A terminal session bound 1:1 to a pty on the host
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    label: String,
    origin_key: Option<String>,
    working_directory: Option<PathBuf>,
    state: SessionState,
    /// Last geometry sent to the host
    geometry: Option<Geometry>,
    /// Geometry requested while the spawn was in flight
    deferred_geometry: Option<Geometry>,
    /// Input typed while the spawn was in flight, flushed on Ready
    pending_input: Vec<String>,
    created_at: Instant,
}

impl Session {
    /// Create a session in the `Opening` state
    pub fn new(
        id: SessionId,
        label: impl Into<String>,
        origin_key: Option<String>,
        working_directory: Option<PathBuf>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            origin_key,
            working_directory,
            state: SessionState::Opening,
            geometry: None,
            deferred_geometry: None,
            pending_input: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn origin_key(&self) -> Option<&str> {
        self.origin_key.as_deref()
    }

    pub fn working_directory(&self) -> Option<&PathBuf> {
        self.working_directory.as_ref()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = Some(geometry);
    }

    pub fn defer_geometry(&mut self, geometry: Geometry) {
        self.deferred_geometry = Some(geometry);
    }

    pub fn take_deferred_geometry(&mut self) -> Option<Geometry> {
        self.deferred_geometry.take()
    }

    pub fn buffer_input(&mut self, text: impl Into<String>) {
        self.pending_input.push(text.into());
    }

    pub fn take_pending_input(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_input)
    }

    pub fn pending_input_len(&self) -> usize {
        self.pending_input.len()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}
