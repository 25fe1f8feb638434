//! Remote game-data documents and how to obtain them.

pub mod fetcher;

use serde::Serialize;
use std::fmt;

/// One of the three published game-data documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Items,
    Recipes,
    Buildings,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 3] = [DatasetKind::Items, DatasetKind::Buildings, DatasetKind::Recipes];

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Items => "items",
            DatasetKind::Recipes => "recipes",
            DatasetKind::Buildings => "buildings",
        }
    }

    /// File name of the cached copy under the cache directory.
    pub fn cache_file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Raw wiki template holding this document.
    pub fn default_url(self) -> &'static str {
        match self {
            DatasetKind::Items => "https://satisfactory.wiki.gg/wiki/Template:DocsItems.json?action=raw",
            DatasetKind::Recipes => "https://satisfactory.wiki.gg/wiki/Template:DocsRecipes.json?action=raw",
            DatasetKind::Buildings => {
                "https://satisfactory.wiki.gg/wiki/Template:DocsBuildings.json?action=raw"
            }
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the accepted document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    /// Fresh copy from the remote document store.
    Wiki,
    /// Copy persisted by a previous run.
    Existing,
    /// Synthesized single-entry stub.
    Empty,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchSource::Wiki => "wiki",
            FetchSource::Existing => "existing",
            FetchSource::Empty => "empty",
        })
    }
}
