use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A project served by the local environment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    /// Local domain, e.g. `blog.test`
    pub domain: String,
    /// Project root on disk
    pub root_path: PathBuf,
}

impl Site {
    pub fn new(domain: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            domain: domain.into(),
            root_path: root_path.into(),
        }
    }
}
