//! Multiplexer configuration
//!
//! Read once from `terminal.toml` in the XDG config directory. Every
//! section has defaults, so a missing file or a partial file is fine.

mod defaults;
mod loader;
mod schema;

pub use defaults::DEFAULT_CONFIG_TOML;
pub use loader::ConfigLoader;
pub use schema::*;
