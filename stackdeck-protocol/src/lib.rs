//! stackdeck-protocol: Shared data model and pty host wire protocol
//!
//! This crate defines the data types exchanged between the terminal
//! multiplexer and the environment manager (sessions, geometry, quick
//! commands, sites, services) and the framed messages used to talk to a
//! remote pty host over a Unix or TCP socket.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{ClientCodec, CodecError, MessageCodec, ServerCodec};
pub use messages::{ClientMessage, ErrorCode, ServerMessage};
pub use types::{
    Geometry, OutputChunk, QuickCommand, QuickCommandCatalog, QuickCommandCategory,
    QuickCommandItem, ServiceAction, ServiceInfo, ServiceStatus, SessionId, Site,
};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;
