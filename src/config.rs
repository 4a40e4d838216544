//! Configuration management for layerprobe.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default container engine CLI.
pub const DEFAULT_ENGINE: &str = "docker";

/// Default port of the local server clair pulls layers from.
pub const DEFAULT_LOCAL_PORT: &str = "60000";

/// Default bound on a single engine pipeline, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// layerprobe configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the temporary export trees (default: $TMPDIR/layerprobe)
    pub tmp_local: PathBuf,
    /// Container engine program (e.g. "docker", "podman")
    pub engine: String,
    /// Pipeline timeout; None waits indefinitely
    pub timeout: Option<Duration>,
    /// Local server IP; None means discover it from docker0
    pub local_ip: Option<String>,
    /// Local server port
    pub local_port: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmp_local: std::env::temp_dir().join("layerprobe"),
            engine: DEFAULT_ENGINE.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            local_ip: None,
            local_port: DEFAULT_LOCAL_PORT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from .env (if present) and the environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build configuration from key/value pairs, falling back to defaults.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let defaults = Self::default();

        let tmp_local = get("LAYERPROBE_TMP_LOCAL")
            .map(PathBuf::from)
            .unwrap_or(defaults.tmp_local);

        let engine = get("LAYERPROBE_ENGINE").unwrap_or(defaults.engine);

        let timeout = match get("LAYERPROBE_TIMEOUT_SECS") {
            None => defaults.timeout,
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn!(
                        value = %raw,
                        "invalid LAYERPROBE_TIMEOUT_SECS, using {}s",
                        DEFAULT_TIMEOUT_SECS
                    );
                    defaults.timeout
                }
            },
        };

        let local_ip = get("LAYERPROBE_LOCAL_IP");
        let local_port = get("LAYERPROBE_LOCAL_PORT").unwrap_or(defaults.local_port);

        Self {
            tmp_local,
            engine,
            timeout,
            local_ip,
            local_port,
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  LAYERPROBE_TMP_LOCAL: {}", self.tmp_local.display());
        println!("  LAYERPROBE_ENGINE: {}", self.engine);
        match self.timeout {
            Some(t) => println!("  LAYERPROBE_TIMEOUT_SECS: {}", t.as_secs()),
            None => println!("  LAYERPROBE_TIMEOUT_SECS: 0 (no timeout)"),
        }
        match &self.local_ip {
            Some(ip) => println!("  LAYERPROBE_LOCAL_IP: {}", ip),
            None => println!("  LAYERPROBE_LOCAL_IP: (discover from docker0)"),
        }
        println!("  LAYERPROBE_LOCAL_PORT: {}", self.local_port);
    }
}
