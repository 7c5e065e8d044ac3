//! Plugin discovery over a root directory.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::plugin::PluginDescriptor;
use crate::script;

/// Fixed entry-point file name every plugin package must contain.
pub const ENTRY_FILE: &str = "game.rhai";

/// Scans a root directory for plugin packages.
///
/// A package is an immediate subdirectory of the root containing
/// [`ENTRY_FILE`]. Discovery has no side effects and retains no state
/// between scans; descriptors are rebuilt from scratch every call.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    root: PathBuf,
}

impl PluginRegistry {
    /// Create a registry over the given plugin root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The plugin root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List plugin packages under the root, sorted by name.
    ///
    /// Candidate directories without the entry file are silently excluded.
    /// A missing root yields an empty list rather than an error.
    pub fn discover(&self) -> Result<Vec<PluginDescriptor>> {
        let mut plugins = Vec::new();

        if !self.root.exists() {
            tracing::warn!(root = %self.root.display(), "plugin root does not exist");
            return Ok(plugins);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let entry_file = path.join(ENTRY_FILE);
            if !entry_file.is_file() {
                tracing::debug!(
                    dir = %path.display(),
                    "skipping directory without {ENTRY_FILE}"
                );
                continue;
            }

            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let valid = std::fs::read_to_string(&entry_file)
                .map(|source| script::source_defines_hooks(&source))
                .unwrap_or(false);

            plugins.push(PluginDescriptor { name, path, entry: entry_file, valid });
        }

        // Stable ordering for UI lists, independent of directory-listing order.
        plugins.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(count = plugins.len(), "discovered plugins");
        Ok(plugins)
    }

    /// Discover and return the descriptor with the given name, if any.
    pub fn find(&self, name: &str) -> Result<Option<PluginDescriptor>> {
        Ok(self.discover()?.into_iter().find(|d| d.name == name))
    }
}
