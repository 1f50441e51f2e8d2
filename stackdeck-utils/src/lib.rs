//! stackdeck-utils: Common utilities shared across stackdeck crates
//!
//! This crate provides:
//! - Unified error types ([`StackdeckError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

// Re-export main types at crate root for convenience
pub use error::{Result, StackdeckError};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};

// Re-export commonly used path functions
pub use paths::{
    config_dir, config_file, default_workspace, ensure_all_dirs, log_dir, quick_commands_file,
    runtime_dir, sites_file, socket_path, state_dir,
};
