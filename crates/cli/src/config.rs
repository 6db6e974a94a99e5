use serde::{Deserialize, Serialize};

use armada_lock::LockSettings;

/// Top-level TOML configuration for the `armada` binary.
///
/// Mirrors the nested, all-`#[serde(default)]` shape used elsewhere in this corpus:
/// every section is optional so an empty or partial file still parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmadaConfig {
    pub cluster: ClusterConfig,
    pub lock: LockSettings,
    pub manifest: ManifestConfig,
}

impl Default for ArmadaConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            lock: LockSettings::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Kubeconfig context to use; `None` uses the default in-cluster or local context.
    pub context: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { context: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Directory of `*.yaml`/`*.yml` bundle/group/manifest documents.
    pub directory: String,
    /// The manifest `metadata.name` to drive the release; `None` requires exactly
    /// one manifest document to be present.
    pub target: Option<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self { directory: "manifests".to_string(), target: None }
    }
}
