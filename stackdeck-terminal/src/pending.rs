//! One-shot "open a terminal here" requests from other components
//!
//! Requests are posted into a [`PendingOpenSlot`] and consumed by a
//! [`PendingOpenHandler`]. Each posted request carries a sequence number;
//! the handler acknowledges exactly the occurrence it processed, so a
//! request is never handled twice and one posted meanwhile is not lost.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stackdeck_protocol::SessionId;

use crate::controller::{with_terminator, WriteOutcome};
use crate::session::OpenRequest;
use crate::tabs::{TabManager, TabOpen};

/// Request to open or focus a session for an origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOpenRequest {
    pub origin_key: String,
    pub working_directory: Option<PathBuf>,
    pub initial_command: Option<String>,
}

impl PendingOpenRequest {
    pub fn new(origin_key: impl Into<String>) -> Self {
        Self {
            origin_key: origin_key.into(),
            working_directory: None,
            initial_command: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(cwd.into());
        self
    }

    pub fn with_initial_command(mut self, command: impl Into<String>) -> Self {
        self.initial_command = Some(command.into());
        self
    }

    fn to_open_request(&self) -> OpenRequest {
        OpenRequest {
            label: Some(self.origin_key.clone()),
            origin_key: Some(self.origin_key.clone()),
            cwd: self.working_directory.clone(),
            initial_command: self.initial_command.clone(),
        }
    }
}

/// Holds at most one pending request
#[derive(Debug, Default)]
pub struct PendingOpenSlot {
    current: Mutex<Option<(u64, PendingOpenRequest)>>,
    next_seq: AtomicU64,
    notify: Notify,
}

impl PendingOpenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a request, replacing any unhandled one; returns its sequence
    pub fn post(&self, request: PendingOpenRequest) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let replaced = self.current.lock().replace((seq, request));
        if let Some((old, _)) = replaced {
            debug!(seq, replaced = old, "Pending open request replaced");
        }
        self.notify.notify_one();
        seq
    }

    pub fn peek(&self) -> Option<(u64, PendingOpenRequest)> {
        self.current.lock().clone()
    }

    /// Clear the slot if it still holds occurrence `seq`
    pub fn acknowledge(&self, seq: u64) -> bool {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|(s, _)| *s == seq) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_none()
    }

    /// Wait for the next `post`
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// How a pending request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    /// An existing tab for the origin was activated
    Focused(SessionId),
    Created(SessionId),
    /// Refused because the tab list is full
    Dropped,
}

/// Consumes pending requests against the tab manager
pub struct PendingOpenHandler {
    tabs: Arc<TabManager>,
    slot: Arc<PendingOpenSlot>,
    last_handled: AtomicU64,
}

impl PendingOpenHandler {
    pub fn new(tabs: Arc<TabManager>, slot: Arc<PendingOpenSlot>) -> Self {
        Self {
            tabs,
            slot,
            last_handled: AtomicU64::new(0),
        }
    }

    pub fn slot(&self) -> &Arc<PendingOpenSlot> {
        &self.slot
    }

    /// Handle the pending request, if any, and acknowledge it
    pub async fn handle_pending(&self) -> Option<PendingOutcome> {
        let (seq, request) = self.slot.peek()?;
        if self.last_handled.fetch_max(seq, Ordering::SeqCst) >= seq {
            return None;
        }

        let outcome = self.process(&request).await;
        self.slot.acknowledge(seq);
        info!(seq, origin = %request.origin_key, ?outcome, "Handled pending open request");
        Some(outcome)
    }

    async fn process(&self, request: &PendingOpenRequest) -> PendingOutcome {
        if let Some(existing) = self.tabs.find_by_origin(&request.origin_key) {
            self.tabs.activate(existing);
            self.send_initial_command(existing, request).await;
            return PendingOutcome::Focused(existing);
        }

        match self.tabs.create_tab(request.to_open_request()) {
            Ok(TabOpen::Created(id)) => PendingOutcome::Created(id),
            // Another caller opened the same origin in between
            Ok(TabOpen::Focused(id)) => {
                self.send_initial_command(id, request).await;
                PendingOutcome::Focused(id)
            }
            Err(e) => {
                warn!(origin = %request.origin_key, error = %e, "Pending open request dropped");
                PendingOutcome::Dropped
            }
        }
    }

    /// Write the request's command to an existing session
    ///
    /// A failed or exited session cannot take it; that loss is logged.
    async fn send_initial_command(
        &self,
        session_id: SessionId,
        request: &PendingOpenRequest,
    ) -> Option<WriteOutcome> {
        let command = request.initial_command.as_deref()?;
        let outcome = self
            .tabs
            .controller()
            .write(session_id, &with_terminator(command))
            .await;
        if outcome == WriteOutcome::Dropped {
            warn!(
                session_id = %session_id,
                origin = %request.origin_key,
                command = %command,
                "Initial command dropped; session is not accepting input"
            );
        }
        Some(outcome)
    }

    /// Handle requests as they are posted until `cancel_token` fires
    pub async fn run(&self, cancel_token: CancellationToken) {
        loop {
            while self.handle_pending().await.is_some() {}

            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Pending open handler stopped");
                    break;
                }
                _ = self.slot.notified() => {}
            }
        }
    }
}

impl std::fmt::Debug for PendingOpenHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOpenHandler")
            .field("last_handled", &self.last_handled.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::controller::SessionController;
    use crate::events::{drain, event_channel, EventReceiver, MultiplexerEvent};
    use crate::session::SessionRegistry;
    use crate::tabs::TabView;
    use crate::testing::{MockPtyHost, RecordingSinks};
    use std::time::Duration;

    struct Fixture {
        host: Arc<MockPtyHost>,
        tabs: Arc<TabManager>,
        handler: Arc<PendingOpenHandler>,
        events: EventReceiver,
    }

    fn fixture(max_tabs: usize) -> Fixture {
        fixture_with(MockPtyHost::new(), max_tabs)
    }

    fn fixture_with(host: MockPtyHost, max_tabs: usize) -> Fixture {
        let host = Arc::new(host);
        let controller = SessionController::new(
            host.clone(),
            Arc::new(SessionRegistry::new()),
            SessionConfig::default(),
        );
        let (tx, events) = event_channel();
        let tabs = Arc::new(TabManager::new(
            controller,
            TabView::new(),
            Arc::new(RecordingSinks::new()),
            tx,
            max_tabs,
        ));
        let handler = Arc::new(PendingOpenHandler::new(
            tabs.clone(),
            Arc::new(PendingOpenSlot::new()),
        ));
        Fixture {
            host,
            tabs,
            handler,
            events,
        }
    }

    async fn wait() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_slot_acknowledge_only_matching_seq() {
        let slot = PendingOpenSlot::new();
        let first = slot.post(PendingOpenRequest::new("blog.test"));
        let second = slot.post(PendingOpenRequest::new("shop.test"));
        assert!(second > first);

        assert!(!slot.acknowledge(first));
        assert_eq!(slot.peek().unwrap().1.origin_key, "shop.test");
        assert!(slot.acknowledge(second));
        assert!(slot.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_origin_focused_and_command_written() {
        let f = fixture(5);
        let a = f
            .tabs
            .create_tab(
                OpenRequest::new()
                    .with_label("A")
                    .with_origin("blog.test")
                    .with_cwd("/sites/blog"),
            )
            .unwrap()
            .session_id();
        let other = f.tabs.create_tab(OpenRequest::new()).unwrap().session_id();
        wait().await;
        assert_eq!(f.tabs.active(), Some(other));

        f.handler.slot().post(
            PendingOpenRequest::new("blog.test").with_initial_command("composer install"),
        );
        let outcome = f.handler.handle_pending().await;

        assert_eq!(outcome, Some(PendingOutcome::Focused(a)));
        assert_eq!(f.tabs.len(), 2);
        assert_eq!(f.tabs.active(), Some(a));
        assert_eq!(f.host.writes_for(a), vec!["composer install\n"]);
        assert!(f.handler.slot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_for_failed_session_is_dropped() {
        let f = fixture_with(MockPtyHost::failing_open("no such directory"), 5);
        let a = f
            .tabs
            .create_tab(OpenRequest::new().with_origin("blog.test"))
            .unwrap()
            .session_id();
        wait().await;
        assert!(f.tabs.controller().state(a).is_some_and(|s| s.is_failed()));

        let request = PendingOpenRequest::new("blog.test").with_initial_command("composer install");
        assert_eq!(
            f.handler.send_initial_command(a, &request).await,
            Some(WriteOutcome::Dropped)
        );
        assert_eq!(
            f.handler.send_initial_command(a, &PendingOpenRequest::new("blog.test")).await,
            None
        );

        f.handler.slot().post(request);
        assert_eq!(f.handler.handle_pending().await, Some(PendingOutcome::Focused(a)));
        assert!(f.host.writes_for(a).is_empty());
        assert!(f.handler.slot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_origin_creates_tab() {
        let f = fixture(5);
        f.handler.slot().post(
            PendingOpenRequest::new("shop.test")
                .with_cwd("/sites/shop")
                .with_initial_command("npm run dev"),
        );

        let id = match f.handler.handle_pending().await {
            Some(PendingOutcome::Created(id)) => id,
            other => panic!("expected created tab, got {other:?}"),
        };
        wait().await;

        assert_eq!(f.tabs.find_by_origin("shop.test"), Some(id));
        assert_eq!(f.tabs.tabs()[0].label, "shop.test");
        assert_eq!(f.host.open_cwd(id), Some(PathBuf::from("/sites/shop")));
        assert_eq!(f.host.writes_for(id), vec!["npm run dev\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_tab_list_drops_and_acknowledges() {
        let mut f = fixture(2);
        f.tabs.create_tab(OpenRequest::new()).unwrap();
        f.tabs.create_tab(OpenRequest::new()).unwrap();
        drain(&mut f.events);

        f.handler.slot().post(PendingOpenRequest::new("blog.test"));
        assert_eq!(f.handler.handle_pending().await, Some(PendingOutcome::Dropped));

        assert_eq!(f.tabs.len(), 2);
        assert!(f.handler.slot().is_empty());
        assert!(drain(&mut f.events).contains(&MultiplexerEvent::CapacityExceeded { max: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_consumed_once() {
        let f = fixture(5);
        f.handler.slot().post(PendingOpenRequest::new("blog.test"));

        assert!(f.handler.handle_pending().await.is_some());
        assert!(f.handler.handle_pending().await.is_none());
        assert_eq!(f.tabs.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_handles_posts_until_cancelled() {
        let f = fixture(5);
        let cancel = CancellationToken::new();
        let handler = f.handler.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { handler.run(token).await });

        f.handler.slot().post(PendingOpenRequest::new("blog.test"));
        wait().await;
        f.handler.slot().post(
            PendingOpenRequest::new("blog.test").with_initial_command("php artisan migrate"),
        );
        wait().await;

        assert_eq!(f.tabs.len(), 1);
        let id = f.tabs.find_by_origin("blog.test").unwrap();
        assert_eq!(f.host.writes_for(id), vec!["php artisan migrate\n"]);

        cancel.cancel();
        task.await.unwrap();
    }
}
