//! Shared test utilities for layerprobe tests.
#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use layerprobe::{ContainerEngine, LayerError, Result};
use tempfile::TempDir;

/// Scratch directories for one test.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Temporary-local root handed to the materializer
    pub tmp_local: PathBuf,
    /// Where fake engine scripts and archive sources live
    pub fixtures: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let tmp_local = temp_dir.path().join("tmp-local");
        let fixtures = temp_dir.path().join("fixtures");
        fs::create_dir_all(&fixtures).expect("Failed to create fixtures dir");

        Self {
            _temp_dir: temp_dir,
            tmp_local,
            fixtures,
        }
    }
}

/// Manifest JSON for a single image with the given layer ids, base first.
pub fn manifest_json(layer_ids: &[&str]) -> String {
    let layers: Vec<String> = layer_ids
        .iter()
        .map(|id| format!("\"{}/layer.tar\"", id))
        .collect();
    format!(
        r#"[{{"Config":"config.json","RepoTags":["demo:1"],"Layers":[{}]}}]"#,
        layers.join(",")
    )
}

/// Lay out an unpacked export: manifest.json plus one layer.tar per layer.
pub fn write_export_tree(dir: &Path, layer_ids: &[&str]) {
    fs::create_dir_all(dir).expect("Failed to create export dir");
    fs::write(dir.join("manifest.json"), manifest_json(layer_ids))
        .expect("Failed to write manifest");
    fs::write(dir.join("config.json"), "{}").expect("Failed to write config");
    for id in layer_ids {
        let layer_dir = dir.join(id);
        fs::create_dir_all(&layer_dir).expect("Failed to create layer dir");
        fs::write(layer_dir.join("layer.tar"), b"").expect("Failed to write layer.tar");
    }
}

/// Write an executable script standing in for the engine CLI.
///
/// `save <image>` tars up `export_src`, `history ... <image>` prints
/// `history` one per line; any other image is reported missing.
pub fn create_fake_engine(path: &Path, image: &str, export_src: &Path, history: &[&str]) {
    let script = format!(
        r#"#!/bin/sh
for last; do :; done
if [ "$last" != "{image}" ]; then
    echo "Error response from daemon: No such image: $last" >&2
    exit 1
fi
case "$1" in
    save) exec tar cf - -C "{src}" . ;;
    history) printf '{lines}' ;;
    *) echo "unknown command: $1" >&2; exit 1 ;;
esac
"#,
        image = image,
        src = export_src.display(),
        lines = history
            .iter()
            .map(|h| format!("{}\\n", h))
            .collect::<String>(),
    );

    write_script(path, &script);
}

/// Write an executable shell script.
pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("Failed to write script");
    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// In-memory engine with canned export contents and history.
pub struct FakeEngine {
    /// Manifest written on export; None makes the export fail
    pub manifest: Option<String>,
    /// Newest-first history; None makes the query fail
    pub history: Option<Vec<String>>,
    pub export_calls: Cell<usize>,
    pub history_calls: Cell<usize>,
}

impl FakeEngine {
    pub fn new(manifest: Option<String>, history: Option<&[&str]>) -> Self {
        Self {
            manifest,
            history: history.map(|h| h.iter().map(|s| s.to_string()).collect()),
            export_calls: Cell::new(0),
            history_calls: Cell::new(0),
        }
    }
}

impl ContainerEngine for FakeEngine {
    fn export(&self, reference: &str, dest: &Path) -> Result<()> {
        self.export_calls.set(self.export_calls.get() + 1);
        match &self.manifest {
            Some(manifest) => {
                fs::write(dest.join("manifest.json"), manifest)?;
                Ok(())
            }
            None => Err(LayerError::ExtractionFailed(format!(
                "No such image: {reference}"
            ))),
        }
    }

    fn history(&self, reference: &str) -> Result<Vec<String>> {
        self.history_calls.set(self.history_calls.get() + 1);
        self.history
            .clone()
            .ok_or_else(|| LayerError::HistoryUnavailable(format!("No such image: {reference}")))
    }
}

/// Assert that a directory exists.
pub fn assert_dir_exists(path: &Path) {
    assert!(
        path.is_dir(),
        "Expected directory to exist: {}",
        path.display()
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}
