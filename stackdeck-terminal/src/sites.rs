//! Read-only project directory used to open terminals for a site

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use stackdeck_protocol::Site;
use stackdeck_utils::{Result, StackdeckError};

use crate::session::OpenRequest;

#[derive(Debug, Deserialize)]
struct SitesFile {
    #[serde(default)]
    sites: Vec<Site>,
}

/// `{domain, root_path}` pairs from the site registry
#[derive(Debug, Clone, Default)]
pub struct SiteDirectory {
    sites: Vec<Site>,
}

impl SiteDirectory {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    /// Load `sites.json` (`{"sites": [{"domain", "root_path"}]}`)
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StackdeckError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: SitesFile =
            serde_json::from_str(&content).map_err(|e| StackdeckError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!(path = %path.display(), count = file.sites.len(), "Loaded sites");
        Ok(Self::new(file.sites))
    }

    /// Load from the default location; missing file means no sites
    pub fn load() -> Result<Self> {
        let path = stackdeck_utils::sites_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn get(&self, domain: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.domain == domain)
    }

    /// Open request for the site's terminal, keyed by its domain
    pub fn open_request(&self, domain: &str) -> Option<OpenRequest> {
        self.get(domain).map(|site| {
            OpenRequest::new()
                .with_label(site.domain.clone())
                .with_origin(site.domain.clone())
                .with_cwd(site.root_path.clone())
        })
    }
}
