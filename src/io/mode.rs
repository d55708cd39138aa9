//! Mode demux: turns the raw stick event stream into mode transitions,
//! reticle updates and pass-through deflections, and serialises the
//! resulting calls into the tracker and the autopilot.
//!
//! The mode switch maps onto the guidance lifecycle as
//! STANDBY -> reset, TRACKING -> lock on, AUTOPILOT -> engage. Every other
//! axis is forwarded verbatim to the virtual stick unless the autopilot is
//! flying, in which case the operator's deflections are suppressed.

use crate::autopilot::Autopilot;
use crate::io::{Axis, GuidanceMode, ModeEvent, StickEvent, StickSink, TargetSink};
use crate::tracker::IncrementalTracker;
use log::info;
use std::sync::Arc;

/// The mode consumer. Owns the current mode and routes each event into
/// the tracker, the autopilot or the stick sink.
pub struct ModeRouter {
    tracker: Arc<IncrementalTracker>,
    autopilot: Arc<Autopilot>,
    sticks: Arc<dyn StickSink>,
    targets: Arc<dyn TargetSink>,
    reticle_divisor: i32,
    mode: GuidanceMode,
}

impl ModeRouter {
    pub fn new(
        tracker: Arc<IncrementalTracker>,
        autopilot: Arc<Autopilot>,
        sticks: Arc<dyn StickSink>,
        targets: Arc<dyn TargetSink>,
        reticle_divisor: i32,
    ) -> Self {
        ModeRouter {
            tracker,
            autopilot,
            sticks,
            targets,
            reticle_divisor: reticle_divisor.max(1),
            mode: GuidanceMode::Standby,
        }
    }

    pub fn mode(&self) -> GuidanceMode {
        self.mode
    }

    /// Classifies one raw event into the typed mode-bus event it carries.
    pub fn classify(&self, event: StickEvent) -> ModeEvent {
        match event.axis {
            Axis::Mode => ModeEvent::ModeChanged(GuidanceMode::from_position(event.value)),
            Axis::Reticle => {
                ModeEvent::ReticleResize((event.value / self.reticle_divisor).max(1))
            }
            axis => ModeEvent::StickPassThrough(axis, event.value),
        }
    }

    /// Routes one raw event.
    pub fn handle(&mut self, event: StickEvent) {
        match self.classify(event) {
            ModeEvent::ModeChanged(mode) => {
                if mode != self.mode {
                    self.apply_mode(mode);
                }
            }
            ModeEvent::ReticleResize(size) => {
                self.tracker.update_initial_box(size);
                self.targets.update_reticle_size(size);
            }
            ModeEvent::StickPassThrough(axis, value) => {
                // The autopilot owns the stick while engaged
                if self.mode != GuidanceMode::Autopilot {
                    self.sticks.send(axis, value);
                }
            }
        }
    }

    fn apply_mode(&mut self, mode: GuidanceMode) {
        info!("mode change: {:?} -> {:?}", self.mode, mode);
        self.mode = mode;

        match mode {
            GuidanceMode::Standby => {
                self.autopilot.disable();
                self.tracker.reset();
            }
            GuidanceMode::Tracking => {
                self.autopilot.disable();
                self.tracker.init();
            }
            GuidanceMode::Autopilot => {
                self.autopilot.enable();
            }
        }
    }
}
