//! Filesystem locations
//!
//! Config, state and runtime directories follow the XDG Base Directory
//! layout. Every function falls back to a `$HOME`-relative path when the
//! platform directories cannot be resolved.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

const APP_NAME: &str = "stackdeck";

const CONFIG_FILE: &str = "terminal.toml";
const QUICK_COMMANDS_FILE: &str = "quick-commands.json";
const SITES_FILE: &str = "sites.json";
const SOCKET_FILE: &str = "stackdeck.sock";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// `$XDG_RUNTIME_DIR/stackdeck`, or `/tmp/stackdeck-$UID`
pub fn runtime_dir() -> PathBuf {
    runtime_dir_in(std::env::var_os("XDG_RUNTIME_DIR"))
}

fn runtime_dir_in(xdg_runtime: Option<OsString>) -> PathBuf {
    match xdg_runtime {
        Some(dir) => PathBuf::from(dir).join(APP_NAME),
        None => {
            // SAFETY: getuid has no preconditions and cannot fail
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid))
        }
    }
}

/// Default address of the local pty host
pub fn socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_FILE)
}

/// `$XDG_CONFIG_HOME/stackdeck`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config").join(APP_NAME))
}

/// Multiplexer configuration (`terminal.toml`)
pub fn config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Optional quick command catalog override
pub fn quick_commands_file() -> PathBuf {
    config_dir().join(QUICK_COMMANDS_FILE)
}

/// Site registry exported by the environment manager
pub fn sites_file() -> PathBuf {
    config_dir().join(SITES_FILE)
}

/// `$XDG_STATE_HOME/stackdeck`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| home_dir().join(".local").join("state").join(APP_NAME))
}

pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Working directory for terminals opened without one (`~/Sites`)
pub fn default_workspace() -> PathBuf {
    home_dir().join("Sites")
}

/// Create the runtime, config, state and log directories
pub fn ensure_all_dirs() -> std::io::Result<()> {
    for dir in [runtime_dir(), config_dir(), state_dir(), log_dir()] {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
