//! layerprobe: recover a local container image's ordered layers and their
//! build history, ready for layer-by-layer vulnerability scanning.
//!
//! The image is saved and unpacked through an external process pipeline,
//! its manifest gives the canonical base-to-top layer order, and the
//! engine's runtime history is reversed and paired with it by position.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod image;
pub mod manifest;
pub mod materialize;
pub mod netaddr;
pub mod preflight;
pub mod process;
pub mod reconcile;

pub use engine::{ContainerEngine, DockerCli};
pub use error::{LayerError, PipelineError, Result};
pub use image::{Image, Layer};
pub use materialize::{ExportDir, Materializer};
pub use reconcile::{from_history, prepare};
