use thiserror::Error;

/// Errors raised while resolving a manifest's dependency graph.
///
/// `ManifestResolver` recovers from nothing: the first structural problem aborts
/// with a message identifying the offending document by name and kind.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("no manifest document found matching target {target:?}")]
    NoMatchingManifest { target: Option<String> },

    #[error("multiple manifest documents match target {target:?} ({count} found)")]
    MultipleMatchingManifests { target: Option<String>, count: usize },

    #[error("no {kind} documents present in the input set")]
    MissingKind { kind: &'static str },

    #[error("chart group {group:?} references unknown bundle {bundle:?}")]
    MissingBundle { group: String, bundle: String },

    #[error("manifest references unknown chart group {group:?}")]
    MissingGroup { group: String },

    #[error("bundle {bundle:?} references unknown dependency {dependency:?}")]
    MissingDependency { bundle: String, dependency: String },

    #[error("cycle detected in bundle dependency graph at {bundle:?}")]
    Cycle { bundle: String },

    #[error("document {name:?} has an invalid {kind} body: {source}")]
    InvalidDocument { name: String, kind: &'static str, source: String },
}
