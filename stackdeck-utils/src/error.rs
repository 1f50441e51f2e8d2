//! Error type shared by the stackdeck crates
//!
//! Most multiplexer failures never reach a caller: write, resize and close
//! errors are logged, spawn errors are rendered into the session's display.
//! What does surface is one of the variants below.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StackdeckError {
    // === IO ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Pty host connection ===
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Nothing listens on the configured socket
    #[error("Pty host not running at {path}")]
    ServerNotRunning { path: PathBuf },

    #[error("Pty host did not answer within {seconds}s")]
    ConnectionTimeout { seconds: u64 },

    #[error("Pty host connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Protocol version mismatch: client={client}, server={server}")]
    ProtocolMismatch { client: u32, server: u32 },

    /// The host answered a request with an error reply
    #[error("Pty host rejected request ({code}): {message}")]
    Host { code: String, message: String },

    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Sessions and tabs ===
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to open terminal session: {0}")]
    SpawnFailed(String),

    #[error("Terminal limit reached ({max} tabs open)")]
    CapacityExceeded { max: usize },

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    // === Services ===
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Cannot {action} service {name} while it is {status}")]
    ServiceActionUnavailable {
        name: String,
        action: String,
        status: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StackdeckError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Error reply from the pty host, `code` in its snake_case form
    pub fn host(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Host {
            code: code.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Transient connection trouble; the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. } | Self::Connection(_))
    }

    /// The pty host connection is gone and must be re-established
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::ServerNotRunning { .. } | Self::ProtocolMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StackdeckError>;
