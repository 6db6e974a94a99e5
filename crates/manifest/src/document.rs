use serde::{Deserialize, Serialize};

/// The three schema strings recognised by the resolver's registry, mapping onto the
/// `{Chart, ChartGroup, Manifest}` kinds. Any other `schema` value is skipped during
/// classification rather than rejected.
pub const SCHEMA_CHART: &str = "charts.armada.process/v1";
pub const SCHEMA_CHART_GROUP: &str = "chartgroups.armada.process/v1";
pub const SCHEMA_MANIFEST: &str = "manifests.armada.process/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Chart,
    ChartGroup,
    Manifest,
}

impl DocumentKind {
    pub fn of_schema(schema: &str) -> Option<Self> {
        match schema {
            SCHEMA_CHART => Some(Self::Chart),
            SCHEMA_CHART_GROUP => Some(Self::ChartGroup),
            SCHEMA_MANIFEST => Some(Self::Manifest),
            _ => None,
        }
    }
}

/// An as-yet-unclassified input document: `schema`, `metadata.name`, and `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDocument {
    pub schema: String,
    pub metadata: DocumentMetadata,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub name: String,
}

/// A reference to a bundle: either a bare name to be looked up, or an object already
/// inlined by the document's author. Inlined objects are left exactly as authored —
/// the resolver does not recurse into them (see the "pseudo-polymorphism" design note:
/// the source never recursively re-resolves something that's already an object).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BundleRef {
    Name(String),
    Inline(Box<BundleData>),
}

/// The `data` section of a Bundle (Chart) document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleData {
    #[serde(default)]
    pub dependencies: Vec<BundleRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A reference to a chart group: a bare name, or an already-inlined group object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Name(String),
    Inline(Box<GroupData>),
}

/// The `data` section of a BundleGroup (ChartGroup) document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupData {
    #[serde(default)]
    pub charts: Vec<BundleRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The `data` section of a Manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestData {
    #[serde(default)]
    pub chart_groups: Vec<GroupRef>,
    pub release_prefix: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
