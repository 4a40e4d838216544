//! Local IP command - prints the local server address.

use anyhow::{Context, Result};

use layerprobe::config::Config;
use layerprobe::netaddr;

/// Execute the local-ip command.
pub fn cmd_local_ip(config: &Config) -> Result<()> {
    let address =
        netaddr::local_server_ip(config).context("retrieving docker0 interface ip")?;
    println!("{}", address);
    Ok(())
}
