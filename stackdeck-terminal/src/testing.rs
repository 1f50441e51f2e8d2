//! Recording doubles for the pty host and display sinks

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use stackdeck_protocol::{Geometry, OutputChunk, SessionId};
use stackdeck_utils::{Result, StackdeckError};

use crate::host::{DisplaySink, OutputStream, PtyHost, SinkFactory};

/// A call received by [`MockPtyHost`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Open {
        session_id: SessionId,
        geometry: Geometry,
        cwd: Option<PathBuf>,
    },
    Write {
        session_id: SessionId,
        data: String,
    },
    Resize {
        session_id: SessionId,
        geometry: Geometry,
    },
    Close {
        session_id: SessionId,
    },
}

/// In-memory pty host that records every request
pub struct MockPtyHost {
    calls: Mutex<Vec<HostCall>>,
    senders: Mutex<HashMap<SessionId, mpsc::UnboundedSender<OutputChunk>>>,
    streams: Mutex<HashMap<SessionId, OutputStream>>,
    fail_open: Mutex<Option<String>>,
    fail_writes: Mutex<bool>,
    release_tx: watch::Sender<bool>,
}

impl MockPtyHost {
    pub fn new() -> Self {
        let (release_tx, _) = watch::channel(true);
        Self {
            calls: Mutex::new(Vec::new()),
            senders: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            fail_open: Mutex::new(None),
            fail_writes: Mutex::new(false),
            release_tx,
        }
    }

    /// Reject every `open` with the given message
    pub fn failing_open(message: &str) -> Self {
        let host = Self::new();
        *host.fail_open.lock() = Some(message.to_string());
        host
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock() = true;
    }

    /// Park `open` calls until [`release_opens`](Self::release_opens)
    pub fn hold_opens(&self) {
        self.release_tx.send_replace(false);
    }

    pub fn release_opens(&self) {
        self.release_tx.send_replace(true);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn opens(&self) -> Vec<SessionId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Open { session_id, .. } => Some(session_id),
                _ => None,
            })
            .collect()
    }

    pub fn open_geometry(&self, id: SessionId) -> Option<Geometry> {
        self.calls().into_iter().find_map(|c| match c {
            HostCall::Open { session_id, geometry, .. } if session_id == id => Some(geometry),
            _ => None,
        })
    }

    pub fn open_cwd(&self, id: SessionId) -> Option<PathBuf> {
        self.calls().into_iter().find_map(|c| match c {
            HostCall::Open { session_id, cwd, .. } if session_id == id => cwd,
            _ => None,
        })
    }

    pub fn writes_for(&self, id: SessionId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Write { session_id, data } if session_id == id => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn resizes(&self) -> Vec<(SessionId, Geometry)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Resize { session_id, geometry } => Some((session_id, geometry)),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> Vec<SessionId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Close { session_id } => Some(session_id),
                _ => None,
            })
            .collect()
    }

    /// Push output for a session, as the host would
    pub fn emit(&self, id: SessionId, data: &str) -> bool {
        let sender = self.senders.lock().get(&id).cloned();
        sender.is_some_and(|tx| tx.send(OutputChunk::new(id, data)).is_ok())
    }

    /// Simulate the pty exiting on the host side
    pub fn end_stream(&self, id: SessionId) {
        self.senders.lock().remove(&id);
    }
}

impl Default for MockPtyHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PtyHost for MockPtyHost {
    async fn open(&self, session_id: SessionId, geometry: Geometry, cwd: Option<&Path>) -> Result<()> {
        self.calls.lock().push(HostCall::Open {
            session_id,
            geometry,
            cwd: cwd.map(Path::to_path_buf),
        });

        let mut release = self.release_tx.subscribe();
        let _ = release.wait_for(|released| *released).await;

        if let Some(message) = self.fail_open.lock().clone() {
            return Err(StackdeckError::host("spawn_failed", message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(session_id, tx);
        self.streams.lock().insert(session_id, rx);
        Ok(())
    }

    async fn write(&self, session_id: SessionId, data: &str) -> Result<()> {
        self.calls.lock().push(HostCall::Write {
            session_id,
            data: data.to_string(),
        });
        if *self.fail_writes.lock() {
            return Err(StackdeckError::connection("broken pipe"));
        }
        Ok(())
    }

    async fn resize(&self, session_id: SessionId, geometry: Geometry) -> Result<()> {
        self.calls.lock().push(HostCall::Resize { session_id, geometry });
        Ok(())
    }

    async fn close(&self, session_id: SessionId) -> Result<()> {
        self.calls.lock().push(HostCall::Close { session_id });
        self.senders.lock().remove(&session_id);
        self.streams.lock().remove(&session_id);
        Ok(())
    }

    async fn subscribe(&self, session_id: SessionId) -> Result<OutputStream> {
        self.streams
            .lock()
            .remove(&session_id)
            .ok_or_else(|| StackdeckError::SessionNotFound(session_id.to_string()))
    }
}

/// Display sink that records what it was given
#[derive(Debug, Default)]
pub struct RecordingSink {
    output: Mutex<Vec<u8>>,
    errors: Mutex<Vec<String>>,
    exits: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn exit_count(&self) -> usize {
        self.exits.load(Ordering::SeqCst)
    }
}

impl DisplaySink for RecordingSink {
    fn on_output(&self, data: &[u8]) {
        self.output.lock().extend_from_slice(data);
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn on_exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sink factory keeping every sink it hands out
#[derive(Debug, Default)]
pub struct RecordingSinks {
    sinks: Mutex<HashMap<SessionId, Arc<RecordingSink>>>,
    labels: Mutex<Vec<String>>,
}

impl RecordingSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self, id: SessionId) -> Arc<RecordingSink> {
        self.sinks
            .lock()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| panic!("no sink created for {id}"))
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().clone()
    }
}

impl SinkFactory for RecordingSinks {
    fn create(&self, session_id: SessionId, label: &str) -> Arc<dyn DisplaySink> {
        let sink = Arc::new(RecordingSink::new());
        self.sinks.lock().insert(session_id, Arc::clone(&sink));
        self.labels.lock().push(label.to_string());
        sink
    }
}

/// Let spawned tasks run to their next suspension point
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
