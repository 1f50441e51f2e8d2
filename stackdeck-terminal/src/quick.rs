//! Quick command catalog loading and dispatch
//!
//! Catalog commands go to the active session only: `paste` types the text
//! for the user to confirm, `run` also presses enter.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use stackdeck_protocol::{QuickCommandCatalog, SessionId};
use stackdeck_utils::{quick_commands_file, Result, StackdeckError};

use crate::config::QuickCommandsConfig;
use crate::controller::{with_terminator, SessionController};
use crate::tabs::TabView;

/// Built-in catalog for a local PHP/Node web stack
pub const DEFAULT_CATALOG_JSON: &str = r#"[
  {
    "category": "Composer",
    "items": [
      { "label": "Install", "command": "composer install" },
      { "label": "Update", "command": "composer update" },
      { "label": "Dump autoload", "command": "composer dump-autoload" }
    ]
  },
  {
    "category": "Artisan",
    "items": [
      { "label": "Migrate", "command": "php artisan migrate" },
      { "label": "Fresh seed", "command": "php artisan migrate:fresh --seed" },
      { "label": "Clear caches", "command": "php artisan optimize:clear" },
      { "label": "Tinker", "command": "php artisan tinker" },
      { "label": "Routes", "command": "php artisan route:list" }
    ]
  },
  {
    "category": "npm",
    "items": [
      { "label": "Install", "command": "npm install" },
      { "label": "Dev server", "command": "npm run dev" },
      { "label": "Build", "command": "npm run build" }
    ]
  },
  {
    "category": "Git",
    "items": [
      { "label": "Status", "command": "git status" },
      { "label": "Pull", "command": "git pull" },
      { "label": "Log", "command": "git log --oneline -20" }
    ]
  },
  {
    "category": "Database",
    "items": [
      { "label": "MySQL shell", "command": "mysql -u root" },
      { "label": "PostgreSQL shell", "command": "psql -U postgres" },
      { "label": "Redis CLI", "command": "redis-cli" }
    ]
  }
]"#;

/// The built-in catalog
pub fn default_catalog() -> Result<QuickCommandCatalog> {
    QuickCommandCatalog::from_json(DEFAULT_CATALOG_JSON)
        .map_err(|e| StackdeckError::internal(format!("built-in quick command catalog: {e}")))
}

/// Load the catalog from `path`
pub fn load_catalog_from_path(path: &Path) -> Result<QuickCommandCatalog> {
    let content = std::fs::read_to_string(path).map_err(|e| StackdeckError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    QuickCommandCatalog::from_json(&content).map_err(|e| StackdeckError::ConfigInvalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load the catalog once at startup
///
/// Order: the configured file, then `quick-commands.json` in the config
/// directory, then the built-in catalog.
pub fn load_catalog(config: &QuickCommandsConfig) -> Result<QuickCommandCatalog> {
    if let Some(path) = &config.catalog_path {
        let catalog = load_catalog_from_path(path)?;
        info!(path = %path.display(), commands = catalog.len(), "Loaded quick command catalog");
        return Ok(catalog);
    }

    let path = quick_commands_file();
    if path.exists() {
        let catalog = load_catalog_from_path(&path)?;
        info!(path = %path.display(), commands = catalog.len(), "Loaded quick command catalog");
        return Ok(catalog);
    }

    default_catalog()
}

/// Result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written to (or buffered for) this session
    Sent(SessionId),
    NoActiveSession,
    /// No catalog entry with that category and label
    UnknownCommand,
}

/// Sends catalog commands to the active session
#[derive(Debug, Clone)]
pub struct QuickCommandDispatcher {
    controller: SessionController,
    view: TabView,
    catalog: Arc<QuickCommandCatalog>,
}

impl QuickCommandDispatcher {
    pub fn new(controller: SessionController, view: TabView, catalog: Arc<QuickCommandCatalog>) -> Self {
        Self {
            controller,
            view,
            catalog,
        }
    }

    pub fn catalog(&self) -> &QuickCommandCatalog {
        &self.catalog
    }

    /// Type `command` without a terminator
    pub async fn paste(&self, command: &str) -> DispatchOutcome {
        self.send(command.to_string()).await
    }

    /// Type `command` followed by exactly one newline
    pub async fn run(&self, command: &str) -> DispatchOutcome {
        self.send(with_terminator(command)).await
    }

    pub async fn paste_item(&self, category: &str, label: &str) -> DispatchOutcome {
        match self.catalog.find(category, label) {
            Some(cmd) => self.paste(&cmd.command).await,
            None => DispatchOutcome::UnknownCommand,
        }
    }

    pub async fn run_item(&self, category: &str, label: &str) -> DispatchOutcome {
        match self.catalog.find(category, label) {
            Some(cmd) => self.run(&cmd.command).await,
            None => DispatchOutcome::UnknownCommand,
        }
    }

    async fn send(&self, text: String) -> DispatchOutcome {
        let Some(active) = self.view.active() else {
            debug!("No active session for quick command");
            return DispatchOutcome::NoActiveSession;
        };
        let outcome = self.controller.write(active, &text).await;
        debug!(session_id = %active, ?outcome, "Dispatched quick command");
        DispatchOutcome::Sent(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::events::event_channel;
    use crate::session::{OpenRequest, SessionRegistry};
    use crate::tabs::TabManager;
    use crate::testing::{MockPtyHost, RecordingSinks};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    fn setup() -> (Arc<MockPtyHost>, TabManager, QuickCommandDispatcher) {
        let host = Arc::new(MockPtyHost::new());
        let controller = SessionController::new(
            host.clone(),
            Arc::new(SessionRegistry::new()),
            SessionConfig::default(),
        );
        let view = TabView::new();
        let (tx, _rx) = event_channel();
        let tabs = TabManager::new(
            controller.clone(),
            view.clone(),
            Arc::new(RecordingSinks::new()),
            tx,
            5,
        );
        let dispatcher =
            QuickCommandDispatcher::new(controller, view, Arc::new(default_catalog().unwrap()));
        (host, tabs, dispatcher)
    }

    #[test]
    fn test_default_catalog() {
        let catalog = default_catalog().unwrap();
        let categories: Vec<_> = catalog.categories().iter().map(|c| c.category.as_str()).collect();
        assert_eq!(categories, vec!["Composer", "Artisan", "npm", "Git", "Database"]);
        assert_eq!(
            catalog.find("Composer", "Install").unwrap().command,
            "composer install"
        );
    }

    #[test]
    fn test_load_catalog_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quick-commands.json");
        std::fs::write(
            &path,
            r#"[{"category": "Symfony", "items": [{"label": "Console", "command": "bin/console"}]}]"#,
        )
        .unwrap();

        let config = QuickCommandsConfig {
            catalog_path: Some(path),
        };
        let catalog = load_catalog(&config).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find("Symfony", "Console").unwrap().command, "bin/console");
    }

    #[test]
    fn test_load_catalog_errors() {
        let dir = tempdir().unwrap();
        let missing = QuickCommandsConfig {
            catalog_path: Some(PathBuf::from("/nonexistent/quick.json")),
        };
        assert!(matches!(load_catalog(&missing), Err(StackdeckError::FileRead { .. })));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let bad = QuickCommandsConfig {
            catalog_path: Some(path),
        };
        assert!(matches!(load_catalog(&bad), Err(StackdeckError::ConfigInvalid { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paste_has_no_terminator() {
        let (host, tabs, dispatcher) = setup();
        let id = tabs.create_tab(OpenRequest::new()).unwrap().session_id();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(dispatcher.paste("git status").await, DispatchOutcome::Sent(id));
        assert_eq!(host.writes_for(id), vec!["git status"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_appends_single_newline() {
        let (host, tabs, dispatcher) = setup();
        let id = tabs.create_tab(OpenRequest::new()).unwrap().session_id();
        tokio::time::sleep(Duration::from_secs(1)).await;

        dispatcher.run("npm run build").await;
        dispatcher.run("git pull\n").await;
        assert_eq!(host.writes_for(id), vec!["npm run build\n", "git pull\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_active_session_only() {
        let (host, tabs, dispatcher) = setup();
        let a = tabs.create_tab(OpenRequest::new()).unwrap().session_id();
        let b = tabs.create_tab(OpenRequest::new()).unwrap().session_id();
        tokio::time::sleep(Duration::from_secs(1)).await;

        tabs.activate(a);
        dispatcher.run_item("Artisan", "Migrate").await;

        assert_eq!(host.writes_for(a), vec!["php artisan migrate\n"]);
        assert!(host.writes_for(b).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tabs_is_noop() {
        let (host, _tabs, dispatcher) = setup();
        assert_eq!(dispatcher.run("ls").await, DispatchOutcome::NoActiveSession);
        assert_eq!(dispatcher.paste("ls").await, DispatchOutcome::NoActiveSession);
        assert!(host.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_item() {
        let (host, tabs, dispatcher) = setup();
        let id = tabs.create_tab(OpenRequest::new()).unwrap().session_id();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            dispatcher.paste_item("Composer", "Publish").await,
            DispatchOutcome::UnknownCommand
        );
        assert!(host.writes_for(id).is_empty());
    }
}
