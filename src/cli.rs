//! # CLI Module - Command Line Interface for the Guidance Process
//!
//! The binary runs the whole closed-loop pipeline: video decode, tracking,
//! autopilot and the datagram links to the simulator and controller
//! processes. Every tunable lives in the typed configuration
//! ([`crate::config`]); the CLI only selects a config file and offers a few
//! overrides that are convenient when juggling multiple simulator setups.
//!
//! **Usage**:
//! ```bash
//! guidance-rs --config guidance.toml --seed 42 -v
//! ```

use crate::config::GuidanceConfig;
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Video stream URL handed to the decoder process
    #[arg(long)]
    pub stream_url: Option<String>,

    /// Address of the simulator datagram endpoint
    #[arg(long)]
    pub simulator_addr: Option<String>,

    /// Address to bind for incoming controller events
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Tracker RNG seed for reproducible runs
    #[arg(long)]
    pub seed: Option<u64>,

    /// Enable debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolves the effective configuration: file (or defaults), then CLI
    /// overrides on top.
    pub fn resolve_config(&self) -> Result<GuidanceConfig> {
        let mut config = match &self.config {
            Some(path) => GuidanceConfig::load(path)?,
            None => GuidanceConfig::default(),
        };

        if let Some(url) = &self.stream_url {
            config.link.stream_url = url.clone();
        }
        if let Some(addr) = &self.simulator_addr {
            config.link.simulator_addr = addr.clone();
        }
        if let Some(addr) = &self.listen_addr {
            config.link.listen_addr = addr.clone();
        }
        if let Some(seed) = self.seed {
            config.tracker.seed = Some(seed);
        }

        Ok(config)
    }
}
