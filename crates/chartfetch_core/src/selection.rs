use std::collections::{BTreeSet, HashSet};

use crate::ManifestDescriptor;

/// Manifest paths the user picked for the next task.
///
/// The raw set may briefly hold paths the current catalog no longer has;
/// [`Selection::deduped`] is what actually gets submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection {
    paths: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` when absent, removes it when present.
    pub fn toggle(&mut self, path: &str) {
        if !self.paths.remove(path) {
            self.paths.insert(path.to_string());
        }
    }

    pub fn select_all(&mut self, catalog: &[ManifestDescriptor]) {
        self.paths = catalog.iter().map(|item| item.path.clone()).collect();
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Drops every path the catalog does not contain.
    pub fn retain_in(&mut self, catalog: &[ManifestDescriptor]) {
        let available: HashSet<&str> = catalog.iter().map(|item| item.path.as_str()).collect();
        self.paths.retain(|path| available.contains(path.as_str()));
    }

    /// Selected paths that exist in `catalog`, in catalog order, each once.
    pub fn deduped(&self, catalog: &[ManifestDescriptor]) -> Vec<String> {
        let mut seen = HashSet::new();
        catalog
            .iter()
            .filter(|item| self.paths.contains(&item.path))
            .filter(|item| seen.insert(item.path.as_str()))
            .map(|item| item.path.clone())
            .collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}
