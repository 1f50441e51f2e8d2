//! stackdeck-terminal: Terminal session multiplexer
//!
//! Opens, tracks and tears down interactive shell sessions running on a
//! remote pty host, one tab per session:
//! - Session registry and controller ([`SessionRegistry`], [`SessionController`])
//! - Output relay from the host's streams to display sinks ([`OutputRelay`])
//! - Geometry fitting for the active tab ([`FitCoordinator`])
//! - Tabs with a capacity cap and origin dedup ([`TabManager`])
//! - Quick commands and pending-open requests
//! - Service controls, the site directory and a socket client for the host
//!
//! [`Multiplexer`] wires everything together for an embedding UI.

pub mod config;
pub mod connection;
pub mod controller;
pub mod events;
pub mod fit;
pub mod host;
pub mod multiplexer;
pub mod pending;
pub mod quick;
pub mod relay;
pub mod services;
pub mod session;
pub mod sites;
pub mod tabs;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use config::{ConfigLoader, TerminalConfig};
pub use connection::RemotePtyHost;
pub use controller::{with_terminator, ResizeOutcome, SessionController, WriteOutcome};
pub use events::{event_channel, EventReceiver, EventSender, MultiplexerEvent};
pub use fit::{FitCoordinator, FitTrigger, SurfaceMeasure, SurfaceSize};
pub use host::{DisplaySink, OutputStream, PtyHost, SinkFactory};
pub use multiplexer::Multiplexer;
pub use pending::{PendingOpenHandler, PendingOpenRequest, PendingOpenSlot, PendingOutcome};
pub use quick::{DispatchOutcome, QuickCommandDispatcher};
pub use relay::OutputRelay;
pub use services::{ServiceManager, ServicePanel};
pub use session::{OpenRequest, Session, SessionRegistry, SessionState};
pub use sites::SiteDirectory;
pub use tabs::{TabEntry, TabManager, TabOpen, TabSnapshot, TabView};
