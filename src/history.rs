//! Layer order from the engine's runtime history.

use tracing::debug;

use crate::engine::ContainerEngine;
use crate::error::Result;

/// Query the engine's history for `reference` and return it base layer
/// first.
///
/// The engine lists the newest layer first. An empty history is returned as
/// an empty vector; whether that is fatal is up to the caller.
pub fn runtime_history(engine: &dyn ContainerEngine, reference: &str) -> Result<Vec<String>> {
    let mut layers = engine.history(reference)?;
    debug!(reference, count = layers.len(), "read runtime history");
    to_base_first(&mut layers);
    Ok(layers)
}

/// Reverse a newest-first sequence in place.
pub fn to_base_first(layers: &mut [String]) {
    layers.reverse();
}
