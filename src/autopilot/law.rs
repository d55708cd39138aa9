//! The discrete-time control law closing the loop on tracker output.
//!
//! Pixel offsets of the tracked window from the aim point are smoothed
//! exponentially, normalised by the half-resolution and converted into
//! stick deflections. The vertical offset is referenced to the bottom edge
//! of the target window, so a locked-on vehicle sits above the aim point
//! by half its size. Target growth relative to the size captured when the
//! autopilot engaged feeds the throttle channel, together with a constant
//! forward bias.

use crate::config::AutopilotParams;
use crate::io::TargetReport;

/// Normalised deflections produced for one target update, before
/// conversion to 11-bit stick values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deflections {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub throttle: f32,
}

/// Smoothing and anchor state of the control law. Zeroed whenever the
/// autopilot disengages, so every engagement starts from rest.
#[derive(Debug, Clone)]
pub struct ControlLaw {
    params: AutopilotParams,
    centre_x: f32,
    centre_y: f32,
    smoothed_dx: f32,
    smoothed_dy: f32,
    anchor_size: Option<f32>,
}

impl ControlLaw {
    pub fn new(params: AutopilotParams, resolution: (u32, u32)) -> Self {
        ControlLaw {
            params,
            centre_x: resolution.0 as f32 / 2.0,
            centre_y: resolution.1 as f32 / 2.0,
            smoothed_dx: 0.0,
            smoothed_dy: 0.0,
            anchor_size: None,
        }
    }

    /// Clears the smoothing state and drops the size anchor.
    pub fn reset(&mut self) {
        self.smoothed_dx = 0.0;
        self.smoothed_dy = 0.0;
        self.anchor_size = None;
    }

    /// Computes the deflections for one target update. The first target
    /// after a reset anchors the reference size.
    pub fn step(&mut self, target: TargetReport) -> Deflections {
        let size = target.size as f32;
        let anchor = *self.anchor_size.get_or_insert(size);

        let dx = target.x as f32 - self.centre_x;
        let dy = target.y as f32 - self.centre_y + size / 2.0;
        let ds = size - anchor;

        let alpha = self.params.smoothing;
        self.smoothed_dx = (1.0 - alpha) * dx + alpha * self.smoothed_dx;
        self.smoothed_dy = (1.0 - alpha) * dy + alpha * self.smoothed_dy;

        let nx = self.smoothed_dx / self.centre_x;
        let mut ny = self.smoothed_dy / self.centre_y;
        let ns = ds / self.centre_y;

        // Pitch jitter around the aim point is gated out entirely
        if ny.abs() < self.params.deadzone {
            ny = 0.0;
        }

        let throttle = -(ny + ns + self.params.throttle_bias);

        Deflections {
            pitch: ny,
            roll: nx,
            yaw: nx,
            throttle,
        }
    }
}

/// Maps a normalised deflection onto the 11-bit stick range, centred at
/// 1023.
pub fn stick_value(coefficient: f32) -> i32 {
    let value = (1023.0 + coefficient * 1023.0).round() as i64;
    value.clamp(0, 2047) as i32
}
