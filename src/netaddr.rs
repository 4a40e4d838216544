//! Local server address discovery.

use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;
use crate::process::{Cmd, Pipeline};

/// `ip route show | grep docker0 | awk '{print $9}'`
pub fn docker0_pipeline() -> Pipeline {
    Pipeline::new()
        .stage(Cmd::new("ip").args(["route", "show"]))
        .stage(Cmd::new("grep").arg("docker0"))
        .stage(Cmd::new("awk").arg("{print $9}"))
}

/// Source address of the docker0 bridge route.
pub fn docker0_interface_ip() -> Result<String, PipelineError> {
    let out = docker0_pipeline().output()?;
    Ok(String::from_utf8_lossy(&out).trim().to_string())
}

/// `ip:port` of the local server, discovering the IP when not configured.
pub fn local_server_ip(config: &Config) -> Result<String, PipelineError> {
    let ip = match &config.local_ip {
        Some(ip) => ip.clone(),
        None => {
            info!("retrieving docker0 interface as local IP");
            docker0_interface_ip()?
        }
    };
    Ok(format_address(&ip, &config.local_port))
}

fn format_address(ip: &str, port: &str) -> String {
    format!("{}:{}", ip.trim(), port)
}
