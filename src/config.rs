//! # Config Module - Typed Configuration for the Guidance Pipeline
//!
//! All tunables of the tracker and the autopilot live here as typed values
//! with their defaults, so the core never depends on the CLI or on a config
//! file being present. An optional TOML file can override any subset of the
//! defaults, and the CLI applies its own overrides on top of that.
//!
//! The tracker parameters follow the incremental visual tracking literature:
//! a condensation particle filter over affine states scored against an
//! incrementally learned eigenbasis. The autopilot parameters shape the
//! smoothed proportional control law that closes the loop on the tracker
//! output.

use crate::error::{GuidanceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of degrees of freedom carried by an affine particle state.
/// Translation x/y, scale, aspect ratio and rotation angle; diffusion
/// entries beyond the configured `affsig` vector are zero.
pub const STATE_DOF: usize = 5;

/// Parameters of the incremental visual tracker.
///
/// These control the condensation particle filter and the sequential
/// Karhunen-Loeve appearance model it scores against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// Number of particles used by the condensation algorithm. More
    /// particles improve the estimate at the cost of per-frame work.
    pub nparticles: usize,

    /// Standard deviation of the observation likelihood. Smaller values
    /// concentrate confidence on the best-matching particles.
    pub condenssig: f32,

    /// Forgetting factor for the incremental appearance update. 1 keeps
    /// all past data, values below 1 progressively discount it.
    pub forgetting: f32,

    /// Number of tracked frames accumulated before each eigenbasis update.
    /// Smaller batches adapt faster to appearance change but drift more.
    pub batch_size: usize,

    /// Side length of the square template the tracking window is sampled
    /// at. Large initial windows may need a larger template.
    pub template_size: usize,

    /// Maximum number of basis vectors kept in the learned appearance
    /// model. The dropped tail is folded into the residual energy.
    pub max_basis: usize,

    /// Per-DOF standard deviations of the particle dynamics, in state
    /// order: x translation (px), y translation (px), scale, aspect
    /// ratio, rotation (radians). Missing entries are treated as zero.
    pub affsig: Vec<f32>,

    /// Seed for the tracker-owned random generator. `None` seeds from OS
    /// entropy; tests pin this for reproducible particle streams.
    pub seed: Option<u64>,
}

impl Default for TrackerParams {
    fn default() -> Self {
        TrackerParams {
            nparticles: 500,
            condenssig: 0.75,
            forgetting: 0.95,
            batch_size: 5,
            template_size: 32,
            max_basis: 16,
            affsig: vec![10.0, 10.0, 0.05, 0.002],
            seed: None,
        }
    }
}

impl TrackerParams {
    /// Template vector length `D = template_size * template_size`.
    pub fn template_dim(&self) -> usize {
        self.template_size * self.template_size
    }

    /// The diffusion vector padded to the full state dimensionality.
    /// Entries beyond the configured vector diffuse with sigma zero, extra
    /// entries are ignored.
    pub fn affsig_padded(&self) -> [f32; STATE_DOF] {
        let mut sig = [0.0; STATE_DOF];
        for (slot, value) in sig.iter_mut().zip(self.affsig.iter()) {
            *slot = *value;
        }
        sig
    }

    /// Validates values a config file could plausibly get wrong.
    pub fn validate(&self) -> Result<()> {
        if self.nparticles < 1 {
            return Err(GuidanceError::Config(
                "nparticles must be at least 1".to_string(),
            ));
        }
        if self.template_size < 2 {
            return Err(GuidanceError::Config(
                "template_size must be at least 2".to_string(),
            ));
        }
        if !(self.forgetting > 0.0 && self.forgetting <= 1.0) {
            return Err(GuidanceError::Config(
                "forgetting must lie in (0, 1]".to_string(),
            ));
        }
        if self.batch_size < 1 {
            return Err(GuidanceError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.affsig.iter().any(|sigma| *sigma < 0.0) {
            return Err(GuidanceError::Config(
                "affsig entries must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the autopilot control law.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotParams {
    /// Normalised pitch offsets below this magnitude are forced to zero to
    /// suppress jitter around the aim point.
    pub deadzone: f32,

    /// Exponential smoothing factor applied to the raw pixel offsets.
    /// 0 disables smoothing, values near 1 respond sluggishly.
    pub smoothing: f32,

    /// Constant forward bias added to the throttle channel.
    pub throttle_bias: f32,
}

impl Default for AutopilotParams {
    fn default() -> Self {
        AutopilotParams {
            deadzone: 0.02,
            smoothing: 0.4,
            throttle_bias: 0.05,
        }
    }
}

/// Wiring of the external collaborators: video stream, simulator link and
/// controller event listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    /// URL of the vehicle video stream handed to the decoder process.
    pub stream_url: String,

    /// Expected stream resolution (width, height) in pixels.
    pub resolution: (u32, u32),

    /// Address the simulator listens on for guidance datagrams.
    pub simulator_addr: String,

    /// Address this process binds for incoming controller events.
    pub listen_addr: String,

    /// Divisor converting the raw reticle axis value into a reticle size
    /// in pixels (clamped to at least 1).
    pub reticle_divisor: i32,
}

impl Default for LinkParams {
    fn default() -> Self {
        LinkParams {
            stream_url: "udp://127.0.0.1:9000".to_string(),
            resolution: (640, 480),
            simulator_addr: "127.0.0.1:9001".to_string(),
            listen_addr: "127.0.0.1:9002".to_string(),
            reticle_divisor: 64,
        }
    }
}

/// Complete configuration of the guidance process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    pub tracker: TrackerParams,
    pub autopilot: AutopilotParams,
    pub link: LinkParams,
}

impl GuidanceConfig {
    /// Loads a configuration from a TOML file, filling any omitted fields
    /// with the built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            GuidanceError::Config(format!("{}: {}", path.display(), err))
        })?;
        let config: GuidanceConfig = toml::from_str(&text)
            .map_err(|err| GuidanceError::Config(format!("{}: {}", path.display(), err)))?;
        config.tracker.validate()?;
        Ok(config)
    }
}
