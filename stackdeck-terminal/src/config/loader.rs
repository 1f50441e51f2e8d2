//! Configuration loader

use std::path::Path;

use stackdeck_utils::{config_file, Result, StackdeckError};

use super::TerminalConfig;

/// Upper bound on `tabs.max_tabs`
const MAX_TABS_LIMIT: usize = 32;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<TerminalConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(TerminalConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<TerminalConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| StackdeckError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<TerminalConfig> {
        toml::from_str(content).map_err(|e| StackdeckError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &TerminalConfig) -> Result<()> {
        if config.tabs.max_tabs == 0 || config.tabs.max_tabs > MAX_TABS_LIMIT {
            return Err(StackdeckError::config(format!(
                "max_tabs must be between 1 and {MAX_TABS_LIMIT}"
            )));
        }

        if config.session.initial_cols == 0 || config.session.initial_rows == 0 {
            return Err(StackdeckError::config(
                "initial_cols and initial_rows must be at least 1",
            ));
        }

        if config.fit.cell_width_px <= 0.0 || config.fit.cell_height_px <= 0.0 {
            return Err(StackdeckError::config("cell metrics must be positive"));
        }

        if config.fit.padding_px < 0.0 {
            return Err(StackdeckError::config("padding_px must not be negative"));
        }

        if config.host.request_timeout_secs == 0 {
            return Err(StackdeckError::config(
                "request_timeout_secs must be at least 1",
            ));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<TerminalConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load a specific file and validate it
    pub fn load_and_validate_from(path: &Path) -> Result<TerminalConfig> {
        let config = Self::load_from_path(path)?;
        Self::validate(&config)?;
        Ok(config)
    }
}
