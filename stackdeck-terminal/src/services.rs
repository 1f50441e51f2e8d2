//! Start/stop/restart controls over the external service manager
//!
//! The panel only reads the status feed; service state is owned by the
//! manager and changes arrive through the feed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use stackdeck_protocol::{ServiceAction, ServiceInfo, ServiceStatus};
use stackdeck_utils::{Result, StackdeckError};

/// External service manager
#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn control(&self, name: &str, action: ServiceAction) -> Result<()>;
}

/// Actions offered for a service in `status`
pub fn available_actions(status: ServiceStatus) -> &'static [ServiceAction] {
    match status {
        ServiceStatus::Stopped => &[ServiceAction::Start],
        ServiceStatus::Running => &[ServiceAction::Stop, ServiceAction::Restart],
        ServiceStatus::Starting | ServiceStatus::Stopping => &[],
    }
}

/// One row of the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceControl {
    pub name: String,
    pub status: ServiceStatus,
    pub actions: Vec<ServiceAction>,
}

/// Read-only view of the service feed plus the control entry point
pub struct ServicePanel {
    feed: watch::Receiver<Vec<ServiceInfo>>,
    manager: Arc<dyn ServiceManager>,
}

impl ServicePanel {
    pub fn new(feed: watch::Receiver<Vec<ServiceInfo>>, manager: Arc<dyn ServiceManager>) -> Self {
        Self { feed, manager }
    }

    /// Current rows, in feed order
    pub fn controls(&self) -> Vec<ServiceControl> {
        self.feed
            .borrow()
            .iter()
            .map(|info| ServiceControl {
                name: info.name.clone(),
                status: info.status,
                actions: available_actions(info.status).to_vec(),
            })
            .collect()
    }

    pub fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.feed
            .borrow()
            .iter()
            .find(|info| info.name == name)
            .map(|info| info.status)
    }

    /// Ask the manager to apply `action` if the current status allows it
    pub async fn invoke(&self, name: &str, action: ServiceAction) -> Result<()> {
        let status = self
            .status(name)
            .ok_or_else(|| StackdeckError::ServiceNotFound(name.to_string()))?;

        if !available_actions(status).contains(&action) {
            return Err(StackdeckError::ServiceActionUnavailable {
                name: name.to_string(),
                action: action.to_string(),
                status: status.to_string(),
            });
        }

        info!(service = %name, %action, "Service control requested");
        self.manager.control(name, action).await
    }

    /// Wait until the feed publishes a new status list
    pub async fn changed(&mut self) -> Result<()> {
        self.feed
            .changed()
            .await
            .map_err(|_| StackdeckError::ConnectionClosed)
    }
}

impl std::fmt::Debug for ServicePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePanel")
            .field("services", &self.feed.borrow().len())
            .finish()
    }
}
