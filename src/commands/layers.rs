//! Layers command - extracts and lists an image's layers.

use anyhow::{Context, Result};

use layerprobe::config::Config;
use layerprobe::{from_history, prepare, DockerCli, Image, Materializer};

/// Which sources the layer list is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Export manifest paired with runtime history
    Full,
    /// Runtime history only
    HistoryOnly,
}

pub struct LayersOptions {
    pub mode: Mode,
    /// Remove the export tree once layers are listed
    pub clean: bool,
    pub json: bool,
}

/// Execute the layers command.
pub fn cmd_layers(config: &Config, reference: &str, options: LayersOptions) -> Result<()> {
    let mut image = Image::parse(reference)?;
    let engine = DockerCli::new(&config.engine).with_timeout(config.timeout);

    match options.mode {
        Mode::Full => {
            let materializer = Materializer::new(&config.tmp_local);
            let export = prepare(&engine, &materializer, &mut image)
                .with_context(|| format!("extracting layers of {}", image.reference()))?;
            if options.clean {
                export
                    .remove()
                    .context("removing temporary export")?;
            }
        }
        Mode::HistoryOnly => {
            from_history(&engine, &mut image)
                .with_context(|| format!("reading history of {}", image.reference()))?;
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&image.fs_layers)?);
        return Ok(());
    }

    println!("Layers found: {}", image.fs_layers.len());
    for layer in &image.fs_layers {
        match &layer.history {
            Some(history) => println!("Layer: {} ({})", layer.blob_sum, history),
            None => println!("Layer: {}", layer.blob_sum),
        }
    }
    Ok(())
}
