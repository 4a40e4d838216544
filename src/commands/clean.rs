//! Clean command - removes temporary export trees.

use anyhow::{Context, Result};

use layerprobe::config::Config;
use layerprobe::Materializer;

/// Execute the clean command.
pub fn cmd_clean(config: &Config) -> Result<()> {
    let materializer = Materializer::new(&config.tmp_local);
    if !materializer.tmp_root().exists() {
        println!("Nothing to clean.");
        return Ok(());
    }

    println!("Removing {}...", materializer.tmp_root().display());
    materializer
        .clean()
        .context("cleaning temporary local repository")?;
    println!("Clean complete.");
    Ok(())
}
