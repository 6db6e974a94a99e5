use std::sync::Arc;

use serde_json::Map as JsonMap;
use serde_json::Value;

/// A fully-resolved bundle: every dependency is an inlined [`Bundle`], never a name.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub name: String,
    pub dependencies: Vec<Arc<Bundle>>,
    pub extra: JsonMap<String, Value>,
}

/// A fully-resolved chart group: every chart is an inlined [`Bundle`].
#[derive(Debug, Clone)]
pub struct BundleGroup {
    pub name: String,
    pub bundles: Vec<Arc<Bundle>>,
    pub extra: JsonMap<String, Value>,
}

/// The outcome of [`crate::resolver::resolve`]: an owned, independent graph rooted at
/// exactly one manifest document. Accessors never re-run resolution and never raise.
#[derive(Debug, Clone)]
pub struct ResolvedManifest {
    pub(crate) release_prefix: String,
    pub(crate) group_documents: Vec<Arc<BundleGroup>>,
}

impl ResolvedManifest {
    /// The ordered list inlined under `manifest.data.chart_groups`.
    pub fn group_documents(&self) -> &[Arc<BundleGroup>] {
        &self.group_documents
    }

    /// Each group's `data` section, order preserved.
    pub fn groups(&self) -> impl Iterator<Item = &BundleGroup> {
        self.group_documents.iter().map(|g| g.as_ref())
    }

    /// Concatenation, in group order then bundle order, of every group's `charts`.
    pub fn bundle_documents(&self) -> Vec<Arc<Bundle>> {
        self.group_documents
            .iter()
            .flat_map(|group| group.bundles.iter().cloned())
            .collect()
    }

    /// Each bundle's `data` section, order preserved, matching `bundle_documents()`.
    pub fn bundles(&self) -> Vec<&Bundle> {
        self.bundle_documents_ref().collect()
    }

    fn bundle_documents_ref(&self) -> impl Iterator<Item = &Bundle> {
        self.group_documents
            .iter()
            .flat_map(|group| group.bundles.iter().map(|b| b.as_ref()))
    }

    pub fn release_prefix(&self) -> &str {
        &self.release_prefix
    }
}
