//! Configuration schema structs

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stackdeck_protocol::Geometry;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub tabs: TabsConfig,
    pub session: SessionConfig,
    pub fit: FitConfig,
    pub host: HostConfig,
    pub quick_commands: QuickCommandsConfig,
}

/// Tab list settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabsConfig {
    pub max_tabs: usize,
}

impl Default for TabsConfig {
    fn default() -> Self {
        Self { max_tabs: 5 }
    }
}

/// Session spawn settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fallback working directory; `~/Sites` when unset
    pub default_workspace: Option<PathBuf>,
    pub initial_cols: u16,
    pub initial_rows: u16,
    /// Delay between spawn and the initial command
    pub warmup_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_workspace: None,
            initial_cols: 80,
            initial_rows: 24,
            warmup_delay_ms: 300,
        }
    }
}

impl SessionConfig {
    pub fn workspace(&self) -> PathBuf {
        self.default_workspace
            .clone()
            .unwrap_or_else(stackdeck_utils::default_workspace)
    }

    /// Geometry sent with `open` before the surface is measured
    pub fn initial_geometry(&self) -> Geometry {
        Geometry::new(self.initial_cols, self.initial_rows)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }
}

/// Fit/resize settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub settle_delay_ms: u64,
    pub cell_width_px: f32,
    pub cell_height_px: f32,
    /// Inner padding on each side of the surface
    pub padding_px: f32,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 50,
            cell_width_px: 8.0,
            cell_height_px: 17.0,
            padding_px: 0.0,
        }
    }
}

impl FitConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Pty host connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// `unix://…` or `tcp://host:port`
    pub address: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: None,
            request_timeout_secs: 10,
        }
    }
}

impl HostConfig {
    /// Configured address, or the runtime socket
    pub fn address(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| format!("unix://{}", stackdeck_utils::socket_path().display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Quick command catalog settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickCommandsConfig {
    pub catalog_path: Option<PathBuf>,
}
