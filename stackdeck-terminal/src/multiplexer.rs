//! Wiring of the multiplexer components for an embedding UI
//!
//! [`Multiplexer`] owns one instance of every component. Nothing here is
//! global, so several multiplexers can live side by side.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use stackdeck_protocol::{QuickCommandCatalog, ServiceInfo};
use stackdeck_utils::{Result, StackdeckError};

use crate::config::{ConfigLoader, TerminalConfig};
use crate::connection::RemotePtyHost;
use crate::controller::SessionController;
use crate::events::{event_channel, EventReceiver};
use crate::fit::{FitCoordinator, FitTrigger, SurfaceMeasure};
use crate::host::{PtyHost, SinkFactory};
use crate::pending::{PendingOpenHandler, PendingOpenRequest, PendingOpenSlot};
use crate::quick::{load_catalog, QuickCommandDispatcher};
use crate::services::{ServiceManager, ServicePanel};
use crate::session::{OpenRequest, SessionRegistry};
use crate::sites::SiteDirectory;
use crate::tabs::{TabManager, TabOpen, TabView};

/// Status feed plus the manager that acts on it
struct ServiceSource {
    feed: watch::Receiver<Vec<ServiceInfo>>,
    manager: Arc<dyn ServiceManager>,
}

/// Terminal session multiplexer
pub struct Multiplexer {
    controller: SessionController,
    tabs: Arc<TabManager>,
    fit: FitCoordinator,
    quick: QuickCommandDispatcher,
    pending: Arc<PendingOpenHandler>,
    sites: SiteDirectory,
    services: Option<ServiceSource>,
    cancel_token: CancellationToken,
}

impl Multiplexer {
    /// Assemble a multiplexer around `host`
    ///
    /// The returned receiver carries [`MultiplexerEvent`]s for the UI.
    ///
    /// [`MultiplexerEvent`]: crate::events::MultiplexerEvent
    pub fn new(
        config: &TerminalConfig,
        host: Arc<dyn PtyHost>,
        sinks: Arc<dyn SinkFactory>,
        measure: Arc<dyn SurfaceMeasure>,
        catalog: QuickCommandCatalog,
    ) -> (Self, EventReceiver) {
        let registry = Arc::new(SessionRegistry::new());
        let controller = SessionController::new(host, registry, config.session.clone());
        let view = TabView::new();
        let (events_tx, events_rx) = event_channel();

        let fit = FitCoordinator::new(controller.clone(), view.clone(), measure, &config.fit);
        let tabs = Arc::new(
            TabManager::new(
                controller.clone(),
                view.clone(),
                sinks,
                events_tx,
                config.tabs.max_tabs,
            )
            .with_fit(fit.clone()),
        );
        let quick = QuickCommandDispatcher::new(controller.clone(), view, Arc::new(catalog));
        let pending = Arc::new(PendingOpenHandler::new(
            Arc::clone(&tabs),
            Arc::new(PendingOpenSlot::new()),
        ));

        debug!(max_tabs = config.tabs.max_tabs, "Multiplexer assembled");

        let multiplexer = Self {
            controller,
            tabs,
            fit,
            quick,
            pending,
            sites: SiteDirectory::default(),
            services: None,
            cancel_token: CancellationToken::new(),
        };
        (multiplexer, events_rx)
    }

    /// Validate `config` and load the quick command catalog and site list
    pub fn from_config(
        config: &TerminalConfig,
        host: Arc<dyn PtyHost>,
        sinks: Arc<dyn SinkFactory>,
        measure: Arc<dyn SurfaceMeasure>,
    ) -> Result<(Self, EventReceiver)> {
        ConfigLoader::validate(config)?;
        let catalog = load_catalog(&config.quick_commands)?;
        let sites = SiteDirectory::load()?;

        let (multiplexer, events) = Self::new(config, host, sinks, measure, catalog);
        Ok((multiplexer.with_sites(sites), events))
    }

    /// Connect to the configured pty host and assemble around it
    ///
    /// The connection also serves the service panel.
    pub async fn connect(
        config: &TerminalConfig,
        sinks: Arc<dyn SinkFactory>,
        measure: Arc<dyn SurfaceMeasure>,
    ) -> Result<(Self, EventReceiver)> {
        let host = Arc::new(RemotePtyHost::connect_with_config(&config.host).await?);
        let feed = host.services();

        let (multiplexer, events) = Self::from_config(config, host.clone(), sinks, measure)?;
        Ok((multiplexer.with_services(feed, host), events))
    }

    pub fn with_sites(mut self, sites: SiteDirectory) -> Self {
        self.sites = sites;
        self
    }

    pub fn with_services(
        mut self,
        feed: watch::Receiver<Vec<ServiceInfo>>,
        manager: Arc<dyn ServiceManager>,
    ) -> Self {
        self.services = Some(ServiceSource { feed, manager });
        self
    }

    /// Start consuming pending-open requests in the background
    pub fn start(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| StackdeckError::internal(format!("no async runtime: {e}")))?;

        let pending = Arc::clone(&self.pending);
        let token = self.cancel_token.child_token();
        handle.spawn(async move { pending.run(token).await });
        info!("Multiplexer started");
        Ok(())
    }

    /// Stop background work and close every session
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.tabs.close_all();
        info!("Multiplexer shut down");
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.controller.registry()
    }

    pub fn tabs(&self) -> &Arc<TabManager> {
        &self.tabs
    }

    pub fn view(&self) -> &TabView {
        self.tabs.view()
    }

    pub fn fit(&self) -> &FitCoordinator {
        &self.fit
    }

    pub fn quick_commands(&self) -> &QuickCommandDispatcher {
        &self.quick
    }

    pub fn sites(&self) -> &SiteDirectory {
        &self.sites
    }

    /// Slot other components post "open a terminal here" requests into
    pub fn pending_slot(&self) -> &Arc<PendingOpenSlot> {
        self.pending.slot()
    }

    pub fn pending_handler(&self) -> &Arc<PendingOpenHandler> {
        &self.pending
    }

    /// A panel over the service feed, if one was configured
    pub fn service_panel(&self) -> Option<ServicePanel> {
        self.services
            .as_ref()
            .map(|source| ServicePanel::new(source.feed.clone(), Arc::clone(&source.manager)))
    }

    /// New-tab control
    pub fn new_tab(&self) -> Result<TabOpen> {
        self.tabs.create_tab(OpenRequest::new())
    }

    /// Open or focus the terminal for a site
    pub fn open_for_site(&self, domain: &str) -> Result<TabOpen> {
        let request = self
            .sites
            .open_request(domain)
            .ok_or_else(|| StackdeckError::SiteNotFound(domain.to_string()))?;
        self.tabs.create_tab(request)
    }

    /// Post a pending-open request; returns its sequence number
    pub fn request_open(&self, request: PendingOpenRequest) -> u64 {
        self.pending.slot().post(request)
    }

    /// Host layout changed (window, container or panel toggle)
    pub fn layout_changed(&self, trigger: FitTrigger) {
        self.fit.schedule(trigger);
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("tabs", &self.tabs.len())
            .field("active", &self.tabs.active())
            .field("sites", &self.sites.sites().len())
            .field("services", &self.services.is_some())
            .finish()
    }
}
