//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `layers` - Extract and list image layers
//! - `clean` - Remove temporary export trees
//! - `show` - Display information
//! - `local_ip` - Print the local server address
//! - `preflight` - Run preflight checks

pub mod clean;
pub mod layers;
mod local_ip;
mod preflight;
pub mod show;

pub use clean::cmd_clean;
pub use layers::cmd_layers;
pub use local_ip::cmd_local_ip;
pub use preflight::cmd_preflight;
pub use show::cmd_show;
