//! Manifest/dependency-graph resolution.
//!
//! Classifies heterogeneous documents by their `schema` into bundles, bundle groups,
//! and manifests, selects exactly one target manifest, and recursively dereferences
//! name-string references into a fully inlined, owned graph via [`resolver::resolve`].

pub mod document;
pub mod error;
pub mod loader;
pub mod resolved;
pub mod resolver;

pub use document::{BundleData, BundleRef, DocumentKind, DocumentMetadata, GroupData, GroupRef, ManifestData, RawDocument};
pub use error::ManifestError;
pub use resolved::{Bundle, BundleGroup, ResolvedManifest};
pub use resolver::resolve;
