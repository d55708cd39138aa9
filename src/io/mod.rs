//! # IO Module - External Interfaces of the Guidance Core
//!
//! The core talks to the rest of the system through four narrow capability
//! interfaces: a frame source (see [`crate::frame`]), a target sink for the
//! operator overlay, a stick sink for the virtual controller and a mode bus
//! delivering operator intent. Implementations are injected at
//! construction; nothing here is a global registry.
//!
//! ## Submodules
//!
//! - [`datagram`]: UDP/JSON link to the simulator and controller processes
//! - [`mode`]: demux of raw stick events into mode transitions
//! - [`video`]: external decoder process feeding the shared frame buffer

pub mod datagram;
pub mod mode;
pub mod video;


use serde::{Deserialize, Serialize};

/// The tracked window reported once per frame: centre and the smaller
/// window side, in stream pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub x: i32,
    pub y: i32,
    pub size: i32,
}

/// Abstract controller axes. Mapping to OS-level input codes is the
/// receiving sink's concern; on the wire they travel as small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Pitch,
    Roll,
    Yaw,
    Throttle,
    Mode,
    Reticle,
}

impl Axis {
    /// The wire code of this axis.
    pub fn code(self) -> u8 {
        match self {
            Axis::Pitch => 0,
            Axis::Roll => 1,
            Axis::Yaw => 2,
            Axis::Throttle => 3,
            Axis::Mode => 4,
            Axis::Reticle => 5,
        }
    }

    /// Parses a wire code; unknown codes are rejected so malformed
    /// datagrams cannot masquerade as control input.
    pub fn from_code(code: u8) -> Option<Axis> {
        match code {
            0 => Some(Axis::Pitch),
            1 => Some(Axis::Roll),
            2 => Some(Axis::Yaw),
            3 => Some(Axis::Throttle),
            4 => Some(Axis::Mode),
            5 => Some(Axis::Reticle),
            _ => None,
        }
    }
}

/// One axis deflection from the physical controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickEvent {
    pub axis: Axis,
    pub value: i32,
}

/// Operator mode selected on the three-position mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceMode {
    Standby,
    Tracking,
    Autopilot,
}

impl GuidanceMode {
    /// Nominal axis value of each switch position.
    pub fn position(self) -> i32 {
        match self {
            GuidanceMode::Standby => 0,
            GuidanceMode::Tracking => 1024,
            GuidanceMode::Autopilot => 2047,
        }
    }

    /// Snaps a raw mode axis value to the nearest switch position.
    pub fn from_position(value: i32) -> GuidanceMode {
        if value < 512 {
            GuidanceMode::Standby
        } else if value < 1536 {
            GuidanceMode::Tracking
        } else {
            GuidanceMode::Autopilot
        }
    }
}

/// Typed events the mode bus delivers to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    ModeChanged(GuidanceMode),
    ReticleResize(i32),
    StickPassThrough(Axis, i32),
}

/// Capability interface of the display/overlay collaborator. `None` means
/// "no current target". Sinks handle their own delivery failures.
pub trait TargetSink: Send + Sync {
    fn update_target(&self, target: Option<TargetReport>);
    fn update_reticle_size(&self, size: i32);
}

/// Capability interface of the virtual stick output. Values are 11-bit
/// deflections in `[0, 2047]`; the sink appends any synchronisation marker
/// its transport needs and logs its own failures.
pub trait StickSink: Send + Sync {
    fn send(&self, axis: Axis, value: i32);
}
