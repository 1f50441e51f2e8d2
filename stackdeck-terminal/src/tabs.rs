//! Tab manager
//!
//! Owns the ordered tab list and the active-tab pointer. Every mutation
//! builds the next [`TabSnapshot`] under one lock and publishes it once
//! through [`TabView`], so readers never see a tab list and an active id
//! from two different updates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use stackdeck_protocol::SessionId;
use stackdeck_utils::{Result, StackdeckError};

use crate::controller::SessionController;
use crate::events::{EventSender, MultiplexerEvent};
use crate::fit::{FitCoordinator, FitTrigger};
use crate::host::{DisplaySink, SinkFactory};
use crate::session::OpenRequest;

/// One tab in the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabEntry {
    pub session_id: SessionId,
    pub label: String,
    pub origin_key: Option<String>,
}

/// Immutable view of the tab list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabSnapshot {
    tabs: Vec<TabEntry>,
    active: Option<SessionId>,
}

impl TabSnapshot {
    pub fn tabs(&self) -> &[TabEntry] {
        &self.tabs
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active_entry(&self) -> Option<&TabEntry> {
        let active = self.active?;
        self.tabs.iter().find(|t| t.session_id == active)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn index_of(&self, session_id: SessionId) -> Option<usize> {
        self.tabs.iter().position(|t| t.session_id == session_id)
    }

    pub fn find_by_origin(&self, origin_key: &str) -> Option<&TabEntry> {
        self.tabs
            .iter()
            .find(|t| t.origin_key.as_deref() == Some(origin_key))
    }
}

/// Lock-free, shareable read side of the tab list
#[derive(Debug, Clone, Default)]
pub struct TabView {
    current: Arc<ArcSwap<TabSnapshot>>,
}

impl TabView {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<TabSnapshot> {
        self.current.load_full()
    }

    pub fn active(&self) -> Option<SessionId> {
        self.current.load().active()
    }

    fn publish(&self, snapshot: TabSnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

/// Result of `create_tab`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabOpen {
    /// A new tab and session were created
    Created(SessionId),
    /// A tab with the same origin already existed and was activated
    Focused(SessionId),
}

impl TabOpen {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Created(id) | Self::Focused(id) => *id,
        }
    }
}

/// Wraps the UI's sink so spawn failures also reach the event channel
struct ReportingSink {
    session_id: SessionId,
    inner: Arc<dyn DisplaySink>,
    events: EventSender,
}

impl DisplaySink for ReportingSink {
    fn on_output(&self, data: &[u8]) {
        self.inner.on_output(data);
    }

    fn on_error(&self, message: &str) {
        self.inner.on_error(message);
        let _ = self.events.send(MultiplexerEvent::SessionFailed {
            session_id: self.session_id,
            message: message.to_string(),
        });
    }

    fn on_exit(&self) {
        self.inner.on_exit();
    }
}

struct ReportingSinks<'a> {
    inner: &'a dyn SinkFactory,
    events: &'a EventSender,
}

impl SinkFactory for ReportingSinks<'_> {
    fn create(&self, session_id: SessionId, label: &str) -> Arc<dyn DisplaySink> {
        Arc::new(ReportingSink {
            session_id,
            inner: self.inner.create(session_id, label),
            events: self.events.clone(),
        })
    }
}

/// Ordered tabs, the active pointer and the capacity cap
pub struct TabManager {
    controller: SessionController,
    state: Mutex<TabSnapshot>,
    view: TabView,
    sinks: Arc<dyn SinkFactory>,
    events: EventSender,
    fit: Option<FitCoordinator>,
    max_tabs: usize,
    /// Numbering for unlabeled tabs
    next_number: AtomicUsize,
}

impl TabManager {
    pub fn new(
        controller: SessionController,
        view: TabView,
        sinks: Arc<dyn SinkFactory>,
        events: EventSender,
        max_tabs: usize,
    ) -> Self {
        let state = TabSnapshot::clone(&view.snapshot());
        Self {
            controller,
            state: Mutex::new(state),
            view,
            sinks,
            events,
            fit: None,
            max_tabs,
            next_number: AtomicUsize::new(1),
        }
    }

    /// Refit the newly active session whenever activation changes
    pub fn with_fit(mut self, fit: FitCoordinator) -> Self {
        self.fit = Some(fit);
        self
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn view(&self) -> &TabView {
        &self.view
    }

    pub fn max_tabs(&self) -> usize {
        self.max_tabs
    }

    pub fn tabs(&self) -> Vec<TabEntry> {
        self.view.snapshot().tabs().to_vec()
    }

    pub fn active(&self) -> Option<SessionId> {
        self.view.active()
    }

    pub fn len(&self) -> usize {
        self.view.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_origin(&self, origin_key: &str) -> Option<SessionId> {
        self.view
            .snapshot()
            .find_by_origin(origin_key)
            .map(|t| t.session_id)
    }

    /// Open a tab, or focus the existing one with the same origin
    ///
    /// Refused with `CapacityExceeded` (and the matching event) when the
    /// list is full; nothing is created in that case. A spawn failure
    /// still yields a tab, showing the error inline.
    pub fn create_tab(&self, mut request: OpenRequest) -> Result<TabOpen> {
        let mut state = self.state.lock();

        if let Some(origin) = request.origin_key.as_deref() {
            if let Some(existing) = state.find_by_origin(origin).map(|t| t.session_id) {
                let changed = state.active != Some(existing);
                state.active = Some(existing);
                self.view.publish(state.clone());
                drop(state);

                debug!(session_id = %existing, origin = %origin, "Focused existing tab");
                if changed {
                    self.activated();
                }
                return Ok(TabOpen::Focused(existing));
            }
        }

        if state.len() >= self.max_tabs {
            drop(state);
            warn!(max = self.max_tabs, "Terminal limit reached; tab refused");
            let _ = self.events.send(MultiplexerEvent::CapacityExceeded { max: self.max_tabs });
            return Err(StackdeckError::CapacityExceeded { max: self.max_tabs });
        }

        let number = self.next_number.fetch_add(1, Ordering::Relaxed);
        let label = request
            .label
            .clone()
            .or_else(|| request.origin_key.clone())
            .unwrap_or_else(|| format!("Terminal {number}"));
        request.label = Some(label.clone());
        let origin_key = request.origin_key.clone();

        // The sink factory runs under the tab lock and must not call back
        // into the tab manager.
        let sinks = ReportingSinks {
            inner: self.sinks.as_ref(),
            events: &self.events,
        };
        let session_id = self.controller.open(request, &sinks);

        state.tabs.push(TabEntry {
            session_id,
            label: label.clone(),
            origin_key,
        });
        state.active = Some(session_id);
        self.view.publish(state.clone());
        drop(state);

        info!(session_id = %session_id, label = %label, "Created tab");
        self.activated();
        Ok(TabOpen::Created(session_id))
    }

    /// Make `session_id` the active tab
    pub fn activate(&self, session_id: SessionId) -> bool {
        let mut state = self.state.lock();
        if state.index_of(session_id).is_none() {
            return false;
        }
        if state.active == Some(session_id) {
            return true;
        }
        state.active = Some(session_id);
        self.view.publish(state.clone());
        drop(state);

        debug!(session_id = %session_id, "Activated tab");
        self.activated();
        true
    }

    /// Activate the tab after the active one, wrapping around
    pub fn activate_next(&self) -> Option<SessionId> {
        self.cycle(1)
    }

    /// Activate the tab before the active one, wrapping around
    pub fn activate_previous(&self) -> Option<SessionId> {
        self.cycle(-1)
    }

    fn cycle(&self, step: isize) -> Option<SessionId> {
        let mut state = self.state.lock();
        let len = state.len() as isize;
        if len == 0 {
            return None;
        }
        let current = state
            .active
            .and_then(|id| state.index_of(id))
            .unwrap_or(0) as isize;
        let next = state.tabs[(current + step).rem_euclid(len) as usize].session_id;
        if state.active == Some(next) {
            return Some(next);
        }
        state.active = Some(next);
        self.view.publish(state.clone());
        drop(state);

        self.activated();
        Some(next)
    }

    /// Remove a tab and close its session
    ///
    /// When the active tab goes, the tab before it becomes active (or the
    /// first one). Closing the last tab asks the host to collapse the
    /// panel. The session is closed even if no tab referenced it.
    pub fn close_tab(&self, session_id: SessionId) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state.index_of(session_id) else {
            drop(state);
            self.controller.close(session_id);
            return false;
        };

        state.tabs.remove(index);
        let was_active = state.active == Some(session_id);
        if was_active {
            state.active = state
                .tabs
                .get(index.saturating_sub(1))
                .map(|t| t.session_id);
        }
        self.view.publish(state.clone());
        self.controller.close(session_id);
        let now_empty = state.is_empty();
        drop(state);

        info!(session_id = %session_id, "Closed tab");
        if now_empty {
            let _ = self.events.send(MultiplexerEvent::TabsChanged);
            let _ = self.events.send(MultiplexerEvent::CollapsePanel);
        } else if was_active {
            self.activated();
        } else {
            let _ = self.events.send(MultiplexerEvent::TabsChanged);
        }
        true
    }

    /// Close every tab (host teardown)
    pub fn close_all(&self) {
        let mut state = self.state.lock();
        if state.is_empty() {
            return;
        }
        let closed: Vec<SessionId> = state.tabs.drain(..).map(|t| t.session_id).collect();
        state.active = None;
        self.view.publish(state.clone());
        for session_id in &closed {
            self.controller.close(*session_id);
        }
        drop(state);

        info!(count = closed.len(), "Closed all tabs");
        let _ = self.events.send(MultiplexerEvent::TabsChanged);
        let _ = self.events.send(MultiplexerEvent::CollapsePanel);
    }

    fn activated(&self) {
        let _ = self.events.send(MultiplexerEvent::TabsChanged);
        if let Some(fit) = &self.fit {
            fit.schedule(FitTrigger::TabActivated);
        }
    }
}

impl std::fmt::Debug for TabManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.view.snapshot();
        f.debug_struct("TabManager")
            .field("tabs", &snapshot.len())
            .field("active", &snapshot.active())
            .field("max_tabs", &self.max_tabs)
            .finish()
    }
}
