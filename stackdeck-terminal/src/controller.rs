//! Session controller
//!
//! Issues open/write/resize/close requests to the pty host and drives each
//! session through `Opening -> Ready -> Closing -> Closed`. State changes
//! follow completion of the host call, never its issuance. A session whose
//! output stream ends on the host side moves to `Exited`.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};
use uuid::Uuid;

use stackdeck_protocol::{Geometry, SessionId};
use stackdeck_utils::StackdeckError;

use crate::config::SessionConfig;
use crate::host::{DisplaySink, PtyHost, SinkFactory};
use crate::relay::OutputRelay;
use crate::session::{OpenRequest, Session, SessionRegistry, SessionState};

/// Label used when a request carries neither a label nor an origin
const DEFAULT_LABEL: &str = "Terminal";

/// What happened to a `write`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Handed to the host
    Sent,
    /// Session still opening; flushed once it is ready
    Buffered,
    /// Unknown, failed or closing session, or the host rejected it
    Dropped,
}

/// What happened to a `resize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    Sent,
    /// Matches the last geometry sent to the host
    Unchanged,
    /// Session still opening; applied once it is ready
    Deferred,
    Dropped,
}

/// Terminate `text` with exactly one newline
pub fn with_terminator(text: &str) -> String {
    let mut line = text.trim_end_matches(&['\r', '\n'][..]).to_string();
    line.push('\n');
    line
}

/// Steps of the post-spawn handoff, decided under the registry lock
enum ReadyStep {
    Flush(Vec<String>),
    Ready(Option<Geometry>),
    Abandon,
}

/// Moves its session to `Exited` when the output stream ends, then passes
/// the exit on to the UI's sink
struct ExitWatch {
    session_id: SessionId,
    registry: Arc<SessionRegistry>,
    relay: Weak<OutputRelay>,
    inner: Arc<dyn DisplaySink>,
}

impl DisplaySink for ExitWatch {
    fn on_output(&self, data: &[u8]) {
        self.inner.on_output(data);
    }

    fn on_error(&self, message: &str) {
        self.inner.on_error(message);
    }

    fn on_exit(&self) {
        let exited = self.registry.update(self.session_id, |s| {
            if matches!(s.state(), SessionState::Opening | SessionState::Ready) {
                s.set_state(SessionState::Exited);
                true
            } else {
                false
            }
        });

        if exited == Some(true) {
            info!(session_id = %self.session_id, "Shell exited");
            // Drop the finished subscription
            if let Some(relay) = self.relay.upgrade() {
                relay.detach(self.session_id);
            }
        }
        self.inner.on_exit();
    }
}

/// Issues pty host requests and tracks per-session readiness
///
/// Cheap to clone; clones share the registry, relay and host.
#[derive(Clone)]
pub struct SessionController {
    host: Arc<dyn PtyHost>,
    registry: Arc<SessionRegistry>,
    relay: Arc<OutputRelay>,
    config: Arc<SessionConfig>,
}

impl SessionController {
    pub fn new(host: Arc<dyn PtyHost>, registry: Arc<SessionRegistry>, config: SessionConfig) -> Self {
        Self {
            host,
            registry,
            relay: Arc::new(OutputRelay::new()),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn relay(&self) -> &Arc<OutputRelay> {
        &self.relay
    }

    pub fn state(&self, session_id: SessionId) -> Option<SessionState> {
        self.registry.state(session_id)
    }

    /// Last geometry sent to the host
    pub fn geometry(&self, session_id: SessionId) -> Option<Geometry> {
        self.registry.geometry(session_id)
    }

    /// Register a session in `Opening` and start its spawn
    ///
    /// Returns immediately; the session becomes `Ready` (or `Failed`) when
    /// the host answers. The display sink is created here and is the only
    /// channel back to the UI.
    pub fn open(&self, request: OpenRequest, sinks: &dyn SinkFactory) -> SessionId {
        let session_id = Uuid::new_v4();
        let label = request
            .label
            .clone()
            .or_else(|| request.origin_key.clone())
            .unwrap_or_else(|| DEFAULT_LABEL.to_string());
        let cwd = request.cwd.clone().unwrap_or_else(|| self.config.workspace());

        self.registry.insert(Session::new(
            session_id,
            label.clone(),
            request.origin_key.clone(),
            Some(cwd.clone()),
        ));
        let sink = sinks.create(session_id, &label);

        info!(
            session_id = %session_id,
            label = %label,
            cwd = %cwd.display(),
            "Opening session"
        );

        let this = self.clone();
        let error_sink = Arc::clone(&sink);
        let spawned = spawn_detached(async move {
            this.complete_open(session_id, cwd, request.initial_command, sink)
                .await;
        });
        if !spawned {
            self.fail(
                session_id,
                &error_sink,
                StackdeckError::internal("no async runtime to spawn the session"),
            );
        }

        session_id
    }

    /// Forward raw input to the session
    ///
    /// Input typed while the session is opening is buffered and flushed in
    /// order once it is ready. Host failures are logged, not returned.
    pub async fn write(&self, session_id: SessionId, text: &str) -> WriteOutcome {
        let ready = self.registry.update(session_id, |s| match s.state() {
            SessionState::Opening => {
                s.buffer_input(text);
                Some(false)
            }
            SessionState::Ready => Some(true),
            _ => None,
        });

        match ready.flatten() {
            Some(false) => {
                debug!(session_id = %session_id, "Buffered input while opening");
                WriteOutcome::Buffered
            }
            Some(true) => {
                if self.send_input(session_id, text).await {
                    WriteOutcome::Sent
                } else {
                    WriteOutcome::Dropped
                }
            }
            None => {
                debug!(session_id = %session_id, "Dropped input for inactive session");
                WriteOutcome::Dropped
            }
        }
    }

    /// Send `geometry` if it differs from the last one sent
    pub async fn resize(&self, session_id: SessionId, geometry: Geometry) -> ResizeOutcome {
        let decision = self.registry.update(session_id, |s| match s.state() {
            SessionState::Opening => {
                s.defer_geometry(geometry);
                ResizeOutcome::Deferred
            }
            SessionState::Ready if s.geometry() == Some(geometry) => ResizeOutcome::Unchanged,
            SessionState::Ready => ResizeOutcome::Sent,
            _ => ResizeOutcome::Dropped,
        });

        match decision {
            Some(ResizeOutcome::Sent) => {}
            Some(outcome) => return outcome,
            None => return ResizeOutcome::Dropped,
        }

        match self.host.resize(session_id, geometry).await {
            Ok(()) => {
                self.registry.update(session_id, |s| s.set_geometry(geometry));
                debug!(session_id = %session_id, geometry = %geometry, "Resized session");
                ResizeOutcome::Sent
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Resize failed");
                ResizeOutcome::Dropped
            }
        }
    }

    /// Cancel the subscription, forget the session and tell the host
    ///
    /// The subscription is gone when this returns. The host close is fire
    /// and forget; its failure is only logged. Returns false for an
    /// unknown session.
    pub fn close(&self, session_id: SessionId) -> bool {
        let previous = self.registry.update(session_id, |s| {
            let previous = s.state().clone();
            s.set_state(SessionState::Closing);
            previous
        });
        let Some(previous) = previous else {
            return false;
        };

        self.relay.detach(session_id);
        self.registry.remove(session_id);

        match previous {
            SessionState::Ready => {
                let host = Arc::clone(&self.host);
                let spawned = spawn_detached(async move {
                    if let Err(e) = host.close(session_id).await {
                        warn!(session_id = %session_id, error = %e, "Close request failed");
                    }
                });
                if !spawned {
                    warn!(session_id = %session_id, "No async runtime; close request not sent");
                }
            }
            // The spawn completion sees the session gone and closes the pty
            SessionState::Opening => {
                debug!(session_id = %session_id, "Closed while opening");
            }
            _ => {}
        }

        info!(session_id = %session_id, "Closed session");
        true
    }

    async fn complete_open(
        &self,
        session_id: SessionId,
        cwd: PathBuf,
        initial_command: Option<String>,
        sink: Arc<dyn DisplaySink>,
    ) {
        let initial = self.config.initial_geometry();
        let Some(geometry) = self.registry.update(session_id, |s| {
            let geometry = s.take_deferred_geometry().unwrap_or(initial);
            s.set_geometry(geometry);
            geometry
        }) else {
            debug!(session_id = %session_id, "Session closed before spawn");
            return;
        };

        if let Err(e) = self.host.open(session_id, geometry, Some(cwd.as_path())).await {
            self.fail(session_id, &sink, e);
            return;
        }

        let stream = match self.host.subscribe(session_id).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(session_id, &sink, e);
                self.close_abandoned(session_id).await;
                return;
            }
        };

        let watched: Arc<dyn DisplaySink> = Arc::new(ExitWatch {
            session_id,
            registry: Arc::clone(&self.registry),
            relay: Arc::downgrade(&self.relay),
            inner: Arc::clone(&sink),
        });
        let attached = self.registry.update(session_id, |s| {
            if *s.state() == SessionState::Opening {
                self.relay.attach(session_id, stream, watched);
                true
            } else {
                false
            }
        });
        if attached != Some(true) {
            self.close_abandoned(session_id).await;
            return;
        }

        let deferred = loop {
            let step = self
                .registry
                .update(session_id, |s| {
                    if *s.state() != SessionState::Opening {
                        return ReadyStep::Abandon;
                    }
                    let pending = s.take_pending_input();
                    if pending.is_empty() {
                        s.set_state(SessionState::Ready);
                        ReadyStep::Ready(s.take_deferred_geometry())
                    } else {
                        ReadyStep::Flush(pending)
                    }
                })
                .unwrap_or(ReadyStep::Abandon);

            match step {
                ReadyStep::Flush(pending) => {
                    debug!(session_id = %session_id, count = pending.len(), "Flushing buffered input");
                    for text in pending {
                        self.send_input(session_id, &text).await;
                    }
                }
                ReadyStep::Ready(deferred) => break deferred,
                ReadyStep::Abandon => {
                    self.close_abandoned(session_id).await;
                    return;
                }
            }
        };

        info!(session_id = %session_id, geometry = %geometry, "Session ready");

        if let Some(deferred) = deferred.filter(|g| *g != geometry) {
            self.resize(session_id, deferred).await;
        }

        if let Some(command) = initial_command {
            // Heuristic: assumes the shell prompt is up by the time the
            // delay elapses. Slow shell startup can still lose the command.
            tokio::time::sleep(self.config.warmup_delay()).await;
            if self.write(session_id, &with_terminator(&command)).await == WriteOutcome::Sent {
                debug!(session_id = %session_id, command = %command, "Sent initial command");
            }
        }
    }

    async fn send_input(&self, session_id: SessionId, text: &str) -> bool {
        match self.host.write(session_id, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Write failed");
                false
            }
        }
    }

    /// Record a spawn failure and render it into the session's display
    fn fail(&self, session_id: SessionId, sink: &Arc<dyn DisplaySink>, error: StackdeckError) {
        let message = error.to_string();
        let recorded = self.registry.update(session_id, |s| {
            if *s.state() == SessionState::Opening {
                s.set_state(SessionState::Failed {
                    message: message.clone(),
                });
                true
            } else {
                false
            }
        });

        if recorded == Some(true) {
            warn!(session_id = %session_id, error = %message, "Session failed to open");
            sink.on_error(&message);
        } else {
            debug!(session_id = %session_id, error = %message, "Spawn failed after close");
        }
    }

    /// The session was closed while its spawn was in flight
    async fn close_abandoned(&self, session_id: SessionId) {
        self.relay.detach(session_id);
        debug!(session_id = %session_id, "Closing pty abandoned during spawn");
        if let Err(e) = self.host.close(session_id).await {
            warn!(session_id = %session_id, error = %e, "Close request failed");
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("sessions", &self.registry.len())
            .field("subscriptions", &self.relay.count())
            .finish()
    }
}

/// Spawn onto the current runtime, if there is one
fn spawn_detached<F>(future: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, HostCall, MockPtyHost, RecordingSinks};
    use std::time::Duration;

    fn controller(host: &Arc<MockPtyHost>) -> SessionController {
        let config = SessionConfig {
            default_workspace: Some(PathBuf::from("/home/dev/Sites")),
            ..SessionConfig::default()
        };
        SessionController::new(host.clone(), Arc::new(SessionRegistry::new()), config)
    }

    async fn wait_ready() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_with_terminator() {
        assert_eq!(with_terminator("composer install"), "composer install\n");
        assert_eq!(with_terminator("ls\n"), "ls\n");
        assert_eq!(with_terminator("ls\r\n\n"), "ls\n");
        assert_eq!(with_terminator(""), "\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_becomes_ready() {
        let host = Arc::new(MockPtyHost::new());
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new().with_cwd("/sites/blog"), &sinks);
        assert_eq!(controller.state(id), Some(SessionState::Opening));

        wait_ready().await;
        assert_eq!(controller.state(id), Some(SessionState::Ready));
        assert_eq!(host.open_cwd(id), Some(PathBuf::from("/sites/blog")));
        assert_eq!(host.open_geometry(id), Some(Geometry::new(80, 24)));
        assert_eq!(controller.geometry(id), Some(Geometry::new(80, 24)));
        assert!(controller.relay().is_attached(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_falls_back_to_default_workspace() {
        let host = Arc::new(MockPtyHost::new());
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &RecordingSinks::new());
        wait_ready().await;

        assert_eq!(host.open_cwd(id), Some(PathBuf::from("/home/dev/Sites")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_reaches_session_sink() {
        let host = Arc::new(MockPtyHost::new());
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &sinks);
        wait_ready().await;

        assert!(host.emit(id, "user@dev:~$ "));
        settle().await;
        assert_eq!(sinks.sink(id).output_string(), "user@dev:~$ ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_command_after_warmup() {
        let host = Arc::new(MockPtyHost::new());
        let controller = controller(&host);

        let id = controller.open(
            OpenRequest::new().with_initial_command("php artisan migrate"),
            &RecordingSinks::new(),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(controller.state(id), Some(SessionState::Ready));
        assert!(host.writes_for(id).is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(host.writes_for(id), vec!["php artisan migrate\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_renders_inline_error() {
        let host = Arc::new(MockPtyHost::failing_open("no such directory"));
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &sinks);
        wait_ready().await;

        match controller.state(id) {
            Some(SessionState::Failed { message }) => assert!(message.contains("no such directory")),
            other => panic!("expected failed session, got {other:?}"),
        }
        let errors = sinks.sink(id).errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("no such directory"));
        assert!(!controller.relay().is_attached(id));
        assert_eq!(controller.write(id, "ls").await, WriteOutcome::Dropped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_during_opening_is_flushed_in_order() {
        let host = Arc::new(MockPtyHost::new());
        host.hold_opens();
        let controller = controller(&host);

        let id = controller.open(
            OpenRequest::new().with_initial_command("npm run dev"),
            &RecordingSinks::new(),
        );
        settle().await;

        assert_eq!(controller.write(id, "c").await, WriteOutcome::Buffered);
        assert_eq!(controller.write(id, "d\r").await, WriteOutcome::Buffered);
        assert!(host.writes_for(id).is_empty());

        host.release_opens();
        wait_ready().await;

        assert_eq!(host.writes_for(id), vec!["c", "d\r", "npm run dev\n"]);
        assert_eq!(controller.write(id, "x").await, WriteOutcome::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_during_opening_is_deferred() {
        let host = Arc::new(MockPtyHost::new());
        host.hold_opens();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &RecordingSinks::new());
        settle().await;

        assert_eq!(
            controller.resize(id, Geometry::new(132, 40)).await,
            ResizeOutcome::Deferred
        );

        host.release_opens();
        wait_ready().await;

        assert_eq!(host.resizes(), vec![(id, Geometry::new(132, 40))]);
        assert_eq!(controller.geometry(id), Some(Geometry::new(132, 40)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_only_when_changed() {
        let host = Arc::new(MockPtyHost::new());
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &RecordingSinks::new());
        wait_ready().await;

        assert_eq!(controller.resize(id, Geometry::new(80, 24)).await, ResizeOutcome::Unchanged);
        assert_eq!(controller.resize(id, Geometry::new(100, 30)).await, ResizeOutcome::Sent);
        assert_eq!(controller.resize(id, Geometry::new(100, 30)).await, ResizeOutcome::Unchanged);
        assert_eq!(host.resizes(), vec![(id, Geometry::new(100, 30))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_detaches_and_closes_host() {
        let host = Arc::new(MockPtyHost::new());
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &sinks);
        wait_ready().await;

        assert!(controller.close(id));
        assert!(!controller.relay().is_attached(id));
        assert!(controller.state(id).is_none());

        // Output already in flight when the tab went away
        host.emit(id, "late");
        settle().await;
        assert_eq!(sinks.sink(id).output_string(), "");
        assert_eq!(host.closes(), vec![id]);

        assert!(!controller.close(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_opening_closes_spawned_pty() {
        let host = Arc::new(MockPtyHost::new());
        host.hold_opens();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &RecordingSinks::new());
        settle().await;
        assert!(controller.close(id));
        assert!(host.closes().is_empty());

        host.release_opens();
        wait_ready().await;

        assert_eq!(host.closes(), vec![id]);
        assert_eq!(controller.relay().count(), 0);
        assert!(controller.state(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_failed_session_skips_host() {
        let host = Arc::new(MockPtyHost::failing_open("boom"));
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &RecordingSinks::new());
        wait_ready().await;

        assert!(controller.close(id));
        settle().await;
        assert!(!host.calls().contains(&HostCall::Close { session_id: id }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_marks_session_exited() {
        let host = Arc::new(MockPtyHost::new());
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &sinks);
        wait_ready().await;

        assert!(host.emit(id, "logout\r\n"));
        host.end_stream(id);
        settle().await;

        assert_eq!(controller.state(id), Some(SessionState::Exited));
        let sink = sinks.sink(id);
        assert_eq!(sink.output_string(), "logout\r\n");
        assert_eq!(sink.exit_count(), 1);
        assert_eq!(controller.relay().count(), 0);

        assert_eq!(controller.write(id, "ls\n").await, WriteOutcome::Dropped);
        assert_eq!(
            controller.resize(id, Geometry::new(100, 30)).await,
            ResizeOutcome::Dropped
        );
        assert!(host.writes_for(id).is_empty());

        // The pty is already gone; closing only forgets the session
        assert!(controller.close(id));
        settle().await;
        assert!(host.closes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_contained() {
        let host = Arc::new(MockPtyHost::new());
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &RecordingSinks::new());
        wait_ready().await;
        host.fail_writes();

        assert_eq!(controller.write(id, "ls\n").await, WriteOutcome::Dropped);
        assert_eq!(controller.state(id), Some(SessionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_label_defaults() {
        let host = Arc::new(MockPtyHost::new());
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        controller.open(OpenRequest::new().with_origin("shop.test"), &sinks);
        controller.open(OpenRequest::new(), &sinks);
        controller.open(OpenRequest::new().with_label("logs"), &sinks);

        assert_eq!(sinks.labels(), vec!["shop.test", "Terminal", "logs"]);
    }

    #[test]
    fn test_open_without_runtime_fails_session() {
        let host = Arc::new(MockPtyHost::new());
        let sinks = RecordingSinks::new();
        let controller = controller(&host);

        let id = controller.open(OpenRequest::new(), &sinks);
        assert!(controller.state(id).is_some_and(|s| s.is_failed()));
        assert_eq!(sinks.sink(id).errors().len(), 1);
    }
}
