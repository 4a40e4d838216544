//! Image export into a temporary local tree.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::engine::ContainerEngine;
use crate::error::{LayerError, Result};
use crate::image::Image;

/// Subdirectory of an image's export tree holding the unpacked archive.
const BLOBS_DIR: &str = "blobs";

/// True for an existing directory with no entries.
pub(crate) fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// A directory holding one image's unpacked export archive.
///
/// Returned by [`Materializer::export`] and passed explicitly to the
/// manifest reader. Nothing removes it automatically; see
/// [`Materializer::clean`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDir {
    path: PathBuf,
}

impl ExportDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove this export tree only.
    pub fn remove(self) -> Result<()> {
        if self.path.exists() {
            fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}

/// Exports images below a temporary-local root.
#[derive(Debug, Clone)]
pub struct Materializer {
    tmp_root: PathBuf,
}

impl Materializer {
    pub fn new(tmp_root: impl Into<PathBuf>) -> Self {
        Self {
            tmp_root: tmp_root.into(),
        }
    }

    pub fn tmp_root(&self) -> &Path {
        &self.tmp_root
    }

    /// Export path for an image: `<root>/<repository>/blobs`.
    ///
    /// The tag does not take part, so two tags of one repository share a
    /// path.
    pub fn export_path(&self, image: &Image) -> PathBuf {
        self.tmp_root.join(&image.name).join(BLOBS_DIR)
    }

    /// Recreate the export directory from scratch.
    ///
    /// The repository name must stay below the root: absolute names and
    /// `..` components are rejected before anything is removed.
    pub fn prepare_dir(&self, image: &Image) -> Result<ExportDir> {
        let confined = Path::new(&image.name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if image.name.is_empty() || !confined {
            return Err(LayerError::InvalidReference(image.reference()));
        }

        let path = self.export_path(image);
        if path.exists() {
            debug!(path = %path.display(), "removing stale export");
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(ExportDir { path })
    }

    /// Save `image` through `engine` into a fresh export directory.
    pub fn export(&self, engine: &dyn ContainerEngine, image: &Image) -> Result<ExportDir> {
        let dir = self.prepare_dir(image)?;
        let reference = image.reference();
        debug!(reference = %reference, path = %dir.path().display(), "exporting image");
        engine.export(&reference, dir.path())?;
        Ok(dir)
    }

    /// Remove the whole temporary-local root.
    pub fn clean(&self) -> Result<()> {
        debug!(root = %self.tmp_root.display(), "cleaning temporary local repository");
        if self.tmp_root.exists() {
            fs::remove_dir_all(&self.tmp_root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct RecordingEngine {
        calls: RefCell<Vec<(String, PathBuf)>>,
        fail: bool,
    }

    impl ContainerEngine for RecordingEngine {
        fn export(&self, reference: &str, dest: &Path) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((reference.to_string(), dest.to_path_buf()));
            if self.fail {
                return Err(LayerError::ExtractionFailed("no such image".into()));
            }
            fs::write(dest.join("manifest.json"), "[]")?;
            Ok(())
        }

        fn history(&self, _reference: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_export_path_ignores_tag() {
        let m = Materializer::new("/tmp/layerprobe");
        let a = m.export_path(&Image::new("library/ubuntu", "22.04"));
        let b = m.export_path(&Image::new("library/ubuntu", "24.04"));
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/tmp/layerprobe/library/ubuntu/blobs"));
    }

    #[test]
    fn test_prepare_dir_removes_stale_content() {
        let tmp = TempDir::new().unwrap();
        let m = Materializer::new(tmp.path());
        let image = Image::new("alpine", "3");

        let first = m.prepare_dir(&image).unwrap();
        fs::write(first.path().join("stale"), "old").unwrap();

        let second = m.prepare_dir(&image).unwrap();
        assert_eq!(first, second);
        assert!(second.path().is_dir());
        assert!(!second.path().join("stale").exists());
    }

    #[test]
    fn test_prepare_dir_rejects_escaping_names() {
        let tmp = TempDir::new().unwrap();
        let m = Materializer::new(tmp.path().join("root"));
        for name in ["../outside", "/etc", "a/../../b", ""] {
            let err = m.prepare_dir(&Image::new(name, "1")).unwrap_err();
            assert!(matches!(err, LayerError::InvalidReference(_)), "{name:?}");
        }
        assert!(!tmp.path().join("outside").exists());
    }

    #[test]
    fn test_export_passes_reference_and_dir() {
        let tmp = TempDir::new().unwrap();
        let m = Materializer::new(tmp.path());
        let engine = RecordingEngine {
            calls: RefCell::new(Vec::new()),
            fail: false,
        };

        let dir = m.export(&engine, &Image::new("alpine", "3.19")).unwrap();
        let calls = engine.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "alpine:3.19");
        assert_eq!(calls[0].1, dir.path());
        assert!(dir.path().join("manifest.json").exists());
    }

    #[test]
    fn test_export_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let m = Materializer::new(tmp.path());
        let engine = RecordingEngine {
            calls: RefCell::new(Vec::new()),
            fail: true,
        };

        let err = m.export(&engine, &Image::new("missing", "1")).unwrap_err();
        assert!(matches!(err, LayerError::ExtractionFailed(_)));
    }

    #[test]
    fn test_clean_is_explicit_and_idempotent() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let m = Materializer::new(&root);

        let dir = m.prepare_dir(&Image::new("alpine", "3")).unwrap();
        assert!(dir.path().exists());

        m.clean().unwrap();
        assert!(!root.exists());
        m.clean().unwrap();
    }

    #[test]
    fn test_export_dir_remove() {
        let tmp = TempDir::new().unwrap();
        let m = Materializer::new(tmp.path());
        let dir = m.prepare_dir(&Image::new("alpine", "3")).unwrap();
        let path = dir.path().to_path_buf();
        dir.remove().unwrap();
        assert!(!path.exists());
        assert!(tmp.path().join("alpine").exists());
    }
}
