//! Layer order from the export archive's `manifest.json`.
//!
//! The export writes a JSON array with one entry per requested image. Each
//! entry lists its layer archives base layer first, e.g.
//!
//! ```json
//! [{"Config": "abc.json", "RepoTags": ["alpine:3"], "Layers": ["sha256:aaa/layer.tar"]}]
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{LayerError, Result};
use crate::materialize::is_empty_dir;

/// Manifest file name at the root of an unpacked export.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Suffix of each layer archive path.
pub const LAYER_SUFFIX: &str = "/layer.tar";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestItem {
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub repo_tags: Option<Vec<String>>,
    pub layers: Vec<String>,
}

/// Strip the layer archive suffix, leaving the bare identifier.
pub fn layer_id(path: &str) -> &str {
    path.strip_suffix(LAYER_SUFFIX).unwrap_or(path)
}

/// Read the layer identifiers of the single image in an export, base first.
///
/// An export that unpacked nothing at all yields no layers; a manifest
/// missing from a non-empty export is invalid.
pub fn read_manifest_layers(export_dir: &Path) -> Result<Vec<String>> {
    let path = export_dir.join(MANIFEST_FILE);
    if !path.exists() && is_empty_dir(export_dir) {
        debug!(path = %export_dir.display(), "export is empty");
        return Ok(Vec::new());
    }

    let file = File::open(&path)
        .map_err(|e| LayerError::InvalidManifest(format!("{}: {}", path.display(), e)))?;

    let items: Vec<ManifestItem> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| LayerError::InvalidManifest(format!("{}: {}", path.display(), e)))?;

    let layers = parse_layers(items)?;
    debug!(count = layers.len(), path = %path.display(), "read manifest layers");
    Ok(layers)
}

/// Pull identifiers out of a decoded manifest.
pub fn parse_layers(items: Vec<ManifestItem>) -> Result<Vec<String>> {
    let [item]: [ManifestItem; 1] = items.try_into().map_err(|items: Vec<ManifestItem>| {
        LayerError::InvalidManifest(format!("expected exactly one entry, found {}", items.len()))
    })?;

    item.layers
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let id = layer_id(path.trim());
            if id.is_empty() {
                Err(LayerError::InvalidManifest(format!(
                    "layer {index} has an empty path"
                )))
            } else {
                Ok(id.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), content).unwrap();
        dir
    }

    #[test]
    fn test_layer_id_strips_suffix() {
        assert_eq!(layer_id("sha256:abc/layer.tar"), "sha256:abc");
        assert_eq!(layer_id("sha256:abc"), "sha256:abc");
        assert_eq!(layer_id("abc/layer.tar.gz"), "abc/layer.tar.gz");
    }

    #[test]
    fn test_reads_layers_in_order() {
        let dir = write_manifest(
            r#"[{"Config":"cfg.json","RepoTags":["alpine:3"],
                "Layers":["a/layer.tar","b/layer.tar","c/layer.tar"]}]"#,
        );
        let layers = read_manifest_layers(dir.path()).unwrap();
        assert_eq!(layers, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_null_repo_tags_accepted() {
        let dir = write_manifest(r#"[{"Config":"cfg.json","RepoTags":null,"Layers":["a/layer.tar"]}]"#);
        assert_eq!(read_manifest_layers(dir.path()).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_empty_layer_list() {
        let dir = write_manifest(r#"[{"Config":"cfg.json","RepoTags":[],"Layers":[]}]"#);
        assert!(read_manifest_layers(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_entries_rejected() {
        let dir = write_manifest("[]");
        let err = read_manifest_layers(dir.path()).unwrap_err();
        assert!(matches!(err, LayerError::InvalidManifest(_)));
    }

    #[test]
    fn test_multiple_entries_rejected() {
        let dir = write_manifest(
            r#"[{"Config":"a","RepoTags":[],"Layers":["a/layer.tar"]},
                {"Config":"b","RepoTags":[],"Layers":["b/layer.tar"]}]"#,
        );
        let err = read_manifest_layers(dir.path()).unwrap_err();
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_empty_export_has_no_layers() {
        let dir = TempDir::new().unwrap();
        assert!(read_manifest_layers(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "{}").unwrap();
        let err = read_manifest_layers(dir.path()).unwrap_err();
        assert!(matches!(err, LayerError::InvalidManifest(_)));
    }

    #[test]
    fn test_malformed_json() {
        let dir = write_manifest("{not json");
        let err = read_manifest_layers(dir.path()).unwrap_err();
        assert!(matches!(err, LayerError::InvalidManifest(_)));
    }

    #[test]
    fn test_missing_layers_field() {
        let dir = write_manifest(r#"[{"Config":"cfg.json"}]"#);
        let err = read_manifest_layers(dir.path()).unwrap_err();
        assert!(matches!(err, LayerError::InvalidManifest(_)));
    }

    #[test]
    fn test_empty_layer_path_rejected() {
        let dir = write_manifest(r#"[{"Config":"c","RepoTags":[],"Layers":["a/layer.tar","/layer.tar"]}]"#);
        let err = read_manifest_layers(dir.path()).unwrap_err();
        assert!(err.to_string().contains("layer 1"));
    }
}
