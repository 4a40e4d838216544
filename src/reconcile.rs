//! Merge manifest and runtime history into layer records.
//!
//! Two modes:
//! - [`prepare`] exports the image, reads the manifest for the canonical
//!   layer order and pairs it index by index with the runtime history.
//! - [`from_history`] uses the runtime history alone when no export is
//!   wanted; layers carry no history text.
//!
//! In both modes `image.fs_layers` is only extended once every step has
//! succeeded.

use tracing::{debug, info};

use crate::engine::ContainerEngine;
use crate::error::{LayerError, Result};
use crate::history::runtime_history;
use crate::image::{Image, Layer};
use crate::manifest::read_manifest_layers;
use crate::materialize::{ExportDir, Materializer};

/// Populate `image.fs_layers` from the export manifest and runtime history.
///
/// Returns the export directory, which stays on disk until the caller
/// removes it.
pub fn prepare(
    engine: &dyn ContainerEngine,
    materializer: &Materializer,
    image: &mut Image,
) -> Result<ExportDir> {
    let reference = image.reference();
    debug!("preparing {}", reference);

    let dir = materializer.export(engine, image)?;

    info!("getting image's history");
    let manifest = read_manifest_layers(dir.path())?;
    let history = runtime_history(engine, &reference)?;

    let layers = merge(&manifest, history)?;
    info!(count = layers.len(), "reconciled layers for {}", reference);
    image.fs_layers.extend(layers);
    Ok(dir)
}

/// Populate `image.fs_layers` from the runtime history only.
pub fn from_history(engine: &dyn ContainerEngine, image: &mut Image) -> Result<()> {
    let reference = image.reference();
    let ids = runtime_history(engine, &reference)?;

    if ids.is_empty() {
        return Err(LayerError::HistoryUnavailable(format!(
            "no history for {reference}"
        )));
    }

    image.fs_layers.extend(ids.into_iter().map(Layer::new));
    Ok(())
}

/// Pair manifest identifiers with base-first history entries by position.
///
/// Both sequences must be the same length. Identifiers are not compared,
/// as manifest and history name layers differently.
///
/// Docker's `history -q` also lists build steps that add no filesystem
/// layer (`CMD`, `ENV`, `LABEL`, ...), so most images built from a
/// Dockerfile report more history entries than manifest layers and fail
/// here with [`LayerError::LayerCountMismatch`]. Use [`from_history`] for
/// those images.
pub fn merge(manifest: &[String], history: Vec<String>) -> Result<Vec<Layer>> {
    if manifest.is_empty() && history.is_empty() {
        return Err(LayerError::HistoryUnavailable(
            "manifest and history are both empty".to_string(),
        ));
    }

    if manifest.len() != history.len() {
        return Err(LayerError::LayerCountMismatch {
            manifest: manifest.len(),
            history: history.len(),
        });
    }

    Ok(manifest
        .iter()
        .zip(history)
        .map(|(blob_sum, history)| Layer::with_history(blob_sum.as_str(), history))
        .collect())
}
