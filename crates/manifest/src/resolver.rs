use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::instrument;

use crate::document::{BundleData, BundleRef, DocumentKind, GroupData, GroupRef, ManifestData, RawDocument};
use crate::error::ManifestError;
use crate::resolved::{Bundle, BundleGroup, ResolvedManifest};

/// Classifies, selects a target manifest from, and recursively dereferences `documents`
/// into an owned, fully-inlined dependency graph.
///
/// `documents` is treated as immutable source material; resolution builds a new owned
/// graph rather than mutating the input in place (see the source's shared-mutation
/// design note).
#[instrument(skip(documents), fields(target = ?target_name, count = documents.len()))]
pub fn resolve(
    documents: &[RawDocument],
    target_name: Option<&str>,
) -> Result<ResolvedManifest, ManifestError> {
    let mut bundles_raw: HashMap<&str, &RawDocument> = HashMap::new();
    let mut groups_raw: HashMap<&str, &RawDocument> = HashMap::new();
    let mut manifests_raw: Vec<&RawDocument> = Vec::new();

    for doc in documents {
        match DocumentKind::of_schema(&doc.schema) {
            Some(DocumentKind::Chart) => {
                bundles_raw.insert(&doc.metadata.name, doc);
            }
            Some(DocumentKind::ChartGroup) => {
                groups_raw.insert(&doc.metadata.name, doc);
            }
            Some(DocumentKind::Manifest) => manifests_raw.push(doc),
            None => {} // unrecognised schema: skipped, not an error
        }
    }

    let target = match target_name {
        Some(target) => {
            let matching: Vec<&&RawDocument> = manifests_raw
                .iter()
                .filter(|d| d.metadata.name == target)
                .collect();
            select_one(matching, Some(target))?
        }
        None => select_one(manifests_raw.iter().collect(), None)?,
    };

    if bundles_raw.is_empty() {
        return Err(ManifestError::MissingKind { kind: "bundle" });
    }
    if groups_raw.is_empty() {
        return Err(ManifestError::MissingKind { kind: "group" });
    }

    let manifest_data: ManifestData = deserialize_data(target, "manifest")?;

    let mut bundle_cache: HashMap<String, Arc<Bundle>> = HashMap::new();
    let mut group_cache: HashMap<String, Arc<BundleGroup>> = HashMap::new();
    let mut visiting: HashSet<String> = HashSet::new();

    let group_documents = manifest_data
        .chart_groups
        .into_iter()
        .map(|entry| resolve_group_ref(entry, &groups_raw, &bundles_raw, &mut group_cache, &mut bundle_cache, &mut visiting))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedManifest {
        release_prefix: manifest_data.release_prefix,
        group_documents,
    })
}

fn select_one<'a>(
    mut candidates: Vec<&'a &'a RawDocument>,
    target: Option<&str>,
) -> Result<&'a RawDocument, ManifestError> {
    match candidates.len() {
        0 => Err(ManifestError::NoMatchingManifest { target: target.map(str::to_string) }),
        1 => Ok(candidates.pop().unwrap()),
        count => Err(ManifestError::MultipleMatchingManifests { target: target.map(str::to_string), count }),
    }
}

fn deserialize_data<T: serde::de::DeserializeOwned>(
    doc: &RawDocument,
    kind: &'static str,
) -> Result<T, ManifestError> {
    serde_json::from_value(doc.data.clone()).map_err(|e| ManifestError::InvalidDocument {
        name: doc.metadata.name.clone(),
        kind,
        source: e.to_string(),
    })
}

fn resolve_group_ref(
    entry: GroupRef,
    groups_raw: &HashMap<&str, &RawDocument>,
    bundles_raw: &HashMap<&str, &RawDocument>,
    group_cache: &mut HashMap<String, Arc<BundleGroup>>,
    bundle_cache: &mut HashMap<String, Arc<Bundle>>,
    visiting: &mut HashSet<String>,
) -> Result<Arc<BundleGroup>, ManifestError> {
    match entry {
        GroupRef::Inline(data) => Ok(Arc::new(inline_group(*data))),
        GroupRef::Name(name) => {
            resolve_group_by_name(&name, groups_raw, bundles_raw, group_cache, bundle_cache, visiting)
        }
    }
}

fn inline_group(data: GroupData) -> BundleGroup {
    // Already an inlined object: left exactly as authored, per the "leave it" rule —
    // no recursive re-resolution of its own charts list.
    let bundles = data
        .charts
        .into_iter()
        .map(|c| match c {
            BundleRef::Inline(b) => Arc::new(inline_bundle(*b)),
            BundleRef::Name(name) => Arc::new(Bundle { name, dependencies: Vec::new(), extra: serde_json::Map::new() }),
        })
        .collect();
    BundleGroup { name: "(inline)".to_string(), bundles, extra: data.extra }
}

fn inline_bundle(data: BundleData) -> Bundle {
    let dependencies = data
        .dependencies
        .into_iter()
        .map(|d| match d {
            BundleRef::Inline(b) => Arc::new(inline_bundle(*b)),
            BundleRef::Name(name) => Arc::new(Bundle { name, dependencies: Vec::new(), extra: serde_json::Map::new() }),
        })
        .collect();
    Bundle { name: "(inline)".to_string(), dependencies, extra: data.extra }
}

#[allow(clippy::too_many_arguments)]
fn resolve_group_by_name(
    name: &str,
    groups_raw: &HashMap<&str, &RawDocument>,
    bundles_raw: &HashMap<&str, &RawDocument>,
    group_cache: &mut HashMap<String, Arc<BundleGroup>>,
    bundle_cache: &mut HashMap<String, Arc<Bundle>>,
    visiting: &mut HashSet<String>,
) -> Result<Arc<BundleGroup>, ManifestError> {
    if let Some(cached) = group_cache.get(name) {
        return Ok(Arc::clone(cached));
    }

    let doc = groups_raw
        .get(name)
        .ok_or_else(|| ManifestError::MissingGroup { group: name.to_string() })?;
    let data: GroupData = deserialize_data(doc, "chart group")?;

    let bundles = data
        .charts
        .into_iter()
        .map(|entry| match entry {
            BundleRef::Inline(b) => Ok(Arc::new(inline_bundle(*b))),
            BundleRef::Name(bundle_name) => resolve_bundle_by_name(
                &bundle_name,
                bundles_raw,
                bundle_cache,
                visiting,
                &|missing| ManifestError::MissingBundle { group: name.to_string(), bundle: missing.to_string() },
            ),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let resolved = Arc::new(BundleGroup { name: name.to_string(), bundles, extra: data.extra });
    group_cache.insert(name.to_string(), Arc::clone(&resolved));
    Ok(resolved)
}

fn resolve_bundle_by_name(
    name: &str,
    bundles_raw: &HashMap<&str, &RawDocument>,
    bundle_cache: &mut HashMap<String, Arc<Bundle>>,
    visiting: &mut HashSet<String>,
    not_found: &dyn Fn(&str) -> ManifestError,
) -> Result<Arc<Bundle>, ManifestError> {
    if let Some(cached) = bundle_cache.get(name) {
        return Ok(Arc::clone(cached));
    }
    if !visiting.insert(name.to_string()) {
        return Err(ManifestError::Cycle { bundle: name.to_string() });
    }

    let doc = bundles_raw.get(name).ok_or_else(|| not_found(name))?;
    let data: BundleData = deserialize_data(doc, "bundle")?;

    let mut dependencies = Vec::with_capacity(data.dependencies.len());
    for dep in data.dependencies {
        let resolved = match dep {
            BundleRef::Inline(b) => Arc::new(inline_bundle(*b)),
            BundleRef::Name(dep_name) => {
                let enclosing = name.to_string();
                resolve_bundle_by_name(
                    &dep_name,
                    bundles_raw,
                    bundle_cache,
                    visiting,
                    &|missing| ManifestError::MissingDependency { bundle: enclosing.clone(), dependency: missing.to_string() },
                )?
            }
        };
        dependencies.push(resolved);
    }

    visiting.remove(name);
    let resolved = Arc::new(Bundle { name: name.to_string(), dependencies, extra: data.extra });
    bundle_cache.insert(name.to_string(), Arc::clone(&resolved));
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentMetadata, SCHEMA_CHART, SCHEMA_CHART_GROUP, SCHEMA_MANIFEST};
    use serde_json::json;

    fn doc(schema: &str, name: &str, data: serde_json::Value) -> RawDocument {
        RawDocument {
            schema: schema.to_string(),
            metadata: DocumentMetadata { name: name.to_string() },
            data,
        }
    }

    fn bundle_a_b_g_m() -> Vec<RawDocument> {
        vec![
            doc(SCHEMA_CHART, "A", json!({ "dependencies": ["B"] })),
            doc(SCHEMA_CHART, "B", json!({ "dependencies": [] })),
            doc(SCHEMA_CHART_GROUP, "G", json!({ "charts": ["A"] })),
            doc(SCHEMA_MANIFEST, "M", json!({ "chart_groups": ["G"], "release_prefix": "armada" })),
        ]
    }

    // S4 — manifest with dependencies resolves names into full documents, preserving
    // order, and release_prefix comes through unchanged.
    #[test]
    fn s4_manifest_with_dependencies_resolves() {
        let documents = bundle_a_b_g_m();
        let resolved = resolve(&documents, Some("M")).unwrap();

        assert_eq!(resolved.release_prefix(), "armada");
        let bundles = resolved.bundle_documents();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].name, "A");
        assert_eq!(bundles[0].dependencies.len(), 1);
        assert_eq!(bundles[0].dependencies[0].name, "B");
    }

    // S5 — a group referencing a bundle absent from the document set fails,
    // naming both the group and the missing bundle.
    #[test]
    fn s5_missing_reference_names_group_and_bundle() {
        let documents = vec![
            doc(SCHEMA_CHART_GROUP, "G", json!({ "charts": ["X"] })),
            doc(SCHEMA_CHART, "unrelated", json!({ "dependencies": [] })),
            doc(SCHEMA_MANIFEST, "M", json!({ "chart_groups": ["G"], "release_prefix": "armada" })),
        ];

        let err = resolve(&documents, Some("M")).unwrap_err();
        match err {
            ManifestError::MissingBundle { group, bundle } => {
                assert_eq!(group, "G");
                assert_eq!(bundle, "X");
            }
            other => panic!("expected MissingBundle, got {other:?}"),
        }
    }

    #[test]
    fn zero_manifests_is_an_error() {
        let documents = vec![
            doc(SCHEMA_CHART, "A", json!({ "dependencies": [] })),
            doc(SCHEMA_CHART_GROUP, "G", json!({ "charts": ["A"] })),
        ];
        let err = resolve(&documents, None).unwrap_err();
        assert!(matches!(err, ManifestError::NoMatchingManifest { .. }));
    }

    #[test]
    fn two_manifests_without_target_is_ambiguous() {
        let mut documents = bundle_a_b_g_m();
        documents.push(doc(SCHEMA_MANIFEST, "M2", json!({ "chart_groups": ["G"], "release_prefix": "other" })));

        let err = resolve(&documents, None).unwrap_err();
        assert!(matches!(err, ManifestError::MultipleMatchingManifests { .. }));
    }

    #[test]
    fn two_manifests_with_target_selects_one() {
        let mut documents = bundle_a_b_g_m();
        documents.push(doc(SCHEMA_MANIFEST, "M2", json!({ "chart_groups": ["G"], "release_prefix": "other" })));

        let resolved = resolve(&documents, Some("M2")).unwrap();
        assert_eq!(resolved.release_prefix(), "other");
    }

    #[test]
    fn unrecognised_schema_is_skipped_not_rejected() {
        let mut documents = bundle_a_b_g_m();
        documents.push(doc("something.else/v1", "ignored", json!({})));

        assert!(resolve(&documents, Some("M")).is_ok());
    }

    #[test]
    fn cyclic_bundle_dependency_fails_with_cycle_error() {
        let documents = vec![
            doc(SCHEMA_CHART, "A", json!({ "dependencies": ["B"] })),
            doc(SCHEMA_CHART, "B", json!({ "dependencies": ["A"] })),
            doc(SCHEMA_CHART_GROUP, "G", json!({ "charts": ["A"] })),
            doc(SCHEMA_MANIFEST, "M", json!({ "chart_groups": ["G"], "release_prefix": "armada" })),
        ];

        let err = resolve(&documents, Some("M")).unwrap_err();
        assert!(matches!(err, ManifestError::Cycle { .. }));
    }

    #[test]
    fn shared_bundle_is_cached_not_reprocessed_per_group() {
        let documents = vec![
            doc(SCHEMA_CHART, "Shared", json!({ "dependencies": [] })),
            doc(SCHEMA_CHART_GROUP, "G1", json!({ "charts": ["Shared"] })),
            doc(SCHEMA_CHART_GROUP, "G2", json!({ "charts": ["Shared"] })),
            doc(SCHEMA_MANIFEST, "M", json!({ "chart_groups": ["G1", "G2"], "release_prefix": "armada" })),
        ];

        let resolved = resolve(&documents, Some("M")).unwrap();
        let bundles = resolved.bundle_documents();
        assert_eq!(bundles.len(), 2);
        assert!(Arc::ptr_eq(&bundles[0], &bundles[1]));
    }

    #[test]
    fn order_is_preserved_across_groups_and_dependencies() {
        let documents = vec![
            doc(SCHEMA_CHART, "A", json!({ "dependencies": [] })),
            doc(SCHEMA_CHART, "B", json!({ "dependencies": [] })),
            doc(SCHEMA_CHART_GROUP, "G", json!({ "charts": ["B", "A"] })),
            doc(SCHEMA_MANIFEST, "M", json!({ "chart_groups": ["G"], "release_prefix": "armada" })),
        ];

        let resolved = resolve(&documents, Some("M")).unwrap();
        let names: Vec<&str> = resolved.bundles().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
