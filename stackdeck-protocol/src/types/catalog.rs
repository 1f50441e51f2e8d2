//! Quick command catalog
//!
//! The catalog is a list of categories, each holding labelled command
//! strings. It is loaded once and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// One catalog entry as stored in the catalog file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuickCommandItem {
    pub label: String,
    pub command: String,
}

/// A named group of quick commands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuickCommandCategory {
    pub category: String,
    #[serde(default)]
    pub items: Vec<QuickCommandItem>,
}

/// A flattened quick command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickCommand {
    pub category: String,
    pub label: String,
    pub command: String,
}

/// The full catalog, serialized as a bare JSON array of categories
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct QuickCommandCatalog {
    categories: Vec<QuickCommandCategory>,
}

impl QuickCommandCatalog {
    pub fn new(categories: Vec<QuickCommandCategory>) -> Self {
        Self { categories }
    }

    /// Parse a catalog from its JSON representation
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn categories(&self) -> &[QuickCommandCategory] {
        &self.categories
    }

    /// All commands in catalog order
    pub fn commands(&self) -> impl Iterator<Item = QuickCommand> + '_ {
        self.categories.iter().flat_map(|category| {
            category.items.iter().map(move |item| QuickCommand {
                category: category.category.clone(),
                label: item.label.clone(),
                command: item.command.clone(),
            })
        })
    }

    /// Look up a command by category and label
    pub fn find(&self, category: &str, label: &str) -> Option<QuickCommand> {
        self.commands()
            .find(|cmd| cmd.category == category && cmd.label == label)
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
