//! Container engine backends.
//!
//! The reconciler only needs two capabilities from an engine: dump an
//! image's export archive into a directory, and list its layer history.
//! [`DockerCli`] provides both by running the engine's command line through
//! a [`Pipeline`].

use std::io::{BufRead, Cursor};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{LayerError, PipelineError, Result};
use crate::process::{Cmd, Pipeline};

/// The engine operations layer extraction depends on.
pub trait ContainerEngine {
    /// Export `reference` and unpack the archive into `dest`.
    ///
    /// An export that yields zero bytes is not an error here.
    fn export(&self, reference: &str, dest: &Path) -> Result<()>;

    /// Layer identifiers of `reference`, newest first, exactly as the engine
    /// reports them.
    fn history(&self, reference: &str) -> Result<Vec<String>>;
}

/// Engine backed by a Docker-compatible CLI (`docker`, `podman`, ...).
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
    timeout: Option<Duration>,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill engine pipelines that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `<engine> save <reference> | tar xf - -C <dest>`
    pub fn export_pipeline(&self, reference: &str, dest: &Path) -> Pipeline {
        Pipeline::new()
            .stage(Cmd::new(&self.program).args(["save", reference]))
            .stage(
                Cmd::new("tar")
                    .args(["xf", "-", "-C"])
                    .arg_path(dest),
            )
            .timeout(self.timeout)
    }

    /// `<engine> history -q --no-trunc <reference>`
    pub fn history_pipeline(&self, reference: &str) -> Pipeline {
        Pipeline::new()
            .stage(Cmd::new(&self.program).args(["history", "-q", "--no-trunc", reference]))
            .timeout(self.timeout)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ContainerEngine for DockerCli {
    fn export(&self, reference: &str, dest: &Path) -> Result<()> {
        debug!(reference, dest = %dest.display(), "saving image");
        match self.export_pipeline(reference, dest).run() {
            Ok(()) => Ok(()),
            // Save exited cleanly without writing a byte and tar refused the
            // empty stream. Any other tar failure is a broken export.
            Err(PipelineError::Stage {
                stage: 1,
                received: 0,
                stderr,
                ..
            }) => {
                warn!(reference, stderr = %stderr.trim(), "image export was empty");
                Ok(())
            }
            Err(e) => Err(LayerError::extraction(e)),
        }
    }

    fn history(&self, reference: &str) -> Result<Vec<String>> {
        debug!(reference, "querying image history");
        let out = self
            .history_pipeline(reference)
            .output()
            .map_err(LayerError::history)?;
        parse_history_output(Cursor::new(out))
    }
}

/// Collect one identifier per non-blank line, in output order.
pub fn parse_history_output(reader: impl BufRead) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| {
            LayerError::HistoryUnavailable(format!("reading history output: {e}"))
        })?;
        let id = line.trim();
        if id.is_empty() {
            continue;
        }
        if id.contains(char::is_whitespace) {
            warn!(line = id, "history line contains whitespace");
        }
        ids.push(id.to_string());
    }
    Ok(ids)
}
