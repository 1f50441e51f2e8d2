//! Messages exchanged with a remote pty host

use serde::{Deserialize, Serialize};

use uuid::Uuid;

use crate::types::*;

/// Messages sent from the multiplexer to the pty host
///
/// Every request except `Connect` and `Ping` carries a `request_id`; the
/// host answers with exactly one `Ack` or `Error` echoing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// Initial connection handshake
    Connect {
        client_id: Uuid,
        protocol_version: u32,
    },

    /// Spawn a shell bound to a new pseudo-terminal
    OpenPty {
        request_id: u64,
        session_id: SessionId,
        cols: u16,
        rows: u16,
        cwd: Option<String>,
    },

    /// Send input to a pty
    Input {
        request_id: u64,
        session_id: SessionId,
        data: Vec<u8>,
    },

    /// Resize a pty
    ResizePty {
        request_id: u64,
        session_id: SessionId,
        cols: u16,
        rows: u16,
    },

    /// Kill a pty and its shell
    ClosePty {
        request_id: u64,
        session_id: SessionId,
    },

    /// Start, stop or restart a managed service
    ServiceControl {
        request_id: u64,
        name: String,
        action: ServiceAction,
    },

    /// Ping for keepalive
    Ping,
}

impl ClientMessage {
    /// Request id carried by this message, if any
    pub fn request_id(&self) -> Option<u64> {
        match self {
            Self::OpenPty { request_id, .. }
            | Self::Input { request_id, .. }
            | Self::ResizePty { request_id, .. }
            | Self::ClosePty { request_id, .. }
            | Self::ServiceControl { request_id, .. } => Some(*request_id),
            Self::Connect { .. } | Self::Ping => None,
        }
    }
}

/// Messages sent from the pty host to the multiplexer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Handshake accepted
    Connected {
        server_version: String,
        protocol_version: u32,
    },

    /// Request completed
    Ack { request_id: u64 },

    /// Request failed
    Error {
        request_id: Option<u64>,
        code: ErrorCode,
        message: String,
    },

    /// Output produced by a pty
    Output { session_id: SessionId, data: Vec<u8> },

    /// The shell behind a pty exited; no further output follows
    PtyExited {
        session_id: SessionId,
        exit_code: Option<i32>,
    },

    /// Full snapshot of service states
    ServiceStatus { services: Vec<ServiceInfo> },

    /// Pong response to ping
    Pong,
}

/// Error codes reported by the pty host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    SpawnFailed,
    SessionNotFound,
    InvalidRequest,
    ProtocolMismatch,
    ServiceFailed,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SpawnFailed => "spawn_failed",
            Self::SessionNotFound => "session_not_found",
            Self::InvalidRequest => "invalid_request",
            Self::ProtocolMismatch => "protocol_mismatch",
            Self::ServiceFailed => "service_failed",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}
