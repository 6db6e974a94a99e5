//! Loads [`RawDocument`]s from a directory of YAML files, feeding the otherwise
//! purely in-memory [`crate::resolver::resolve`] algorithm.

use std::path::Path;

use serde::Deserialize as _;

use crate::document::RawDocument;
use crate::error::ManifestError;

/// Reads every `*.yaml`/`*.yml` file in `dir`, splits each on `---` document
/// separators, and deserialises each document into a [`RawDocument`].
///
/// # Errors
///
/// Returns [`ManifestError::InvalidDocument`] if any document fails to parse.
pub async fn load_documents_from_dir(dir: &Path) -> Result<Vec<RawDocument>, ManifestError> {
    let mut documents = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| ManifestError::InvalidDocument {
        name: dir.display().to_string(),
        kind: "directory",
        source: e.to_string(),
    })?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| ManifestError::InvalidDocument {
        name: dir.display().to_string(),
        kind: "directory",
        source: e.to_string(),
    })? {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| ManifestError::InvalidDocument {
            name: path.display().to_string(),
            kind: "file",
            source: e.to_string(),
        })?;
        documents.extend(parse_documents(&path.display().to_string(), &contents)?);
    }

    Ok(documents)
}

/// Parses a multi-document YAML string (`---`-separated) into [`RawDocument`]s.
pub fn parse_documents(source_name: &str, contents: &str) -> Result<Vec<RawDocument>, ManifestError> {
    let mut documents = Vec::new();
    for raw in serde_yaml_ng::Deserializer::from_str(contents) {
        let value = serde_yaml_ng::Value::deserialize(raw).map_err(|e| ManifestError::InvalidDocument {
            name: source_name.to_string(),
            kind: "yaml",
            source: e.to_string(),
        })?;
        if value.is_null() {
            continue; // trailing separator producing an empty document
        }
        let doc: RawDocument = serde_yaml_ng::from_value(value).map_err(|e| ManifestError::InvalidDocument {
            name: source_name.to_string(),
            kind: "yaml",
            source: e.to_string(),
        })?;
        documents.push(doc);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multi_document_yaml_stream() {
        let yaml = "\
schema: charts.armada.process/v1
metadata:
  name: A
data:
  dependencies: []
---
schema: chartgroups.armada.process/v1
metadata:
  name: G
data:
  charts: [A]
";
        let docs = parse_documents("inline", yaml).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.name, "A");
        assert_eq!(docs[1].metadata.name, "G");
    }

    #[test]
    fn trailing_separator_does_not_produce_an_empty_document() {
        let yaml = "\
schema: charts.armada.process/v1
metadata:
  name: A
data:
  dependencies: []
---
";
        let docs = parse_documents("inline", yaml).unwrap();
        assert_eq!(docs.len(), 1);
    }
}
