//! # Autopilot Module - Target-Following Stick Synthesis
//!
//! Consumes the tracker's target reports and emits smoothed stick
//! deflections to the virtual controller, as if a second pilot were flying
//! toward the tracked window.
//!
//! A dedicated worker blocks on a target queue and does cheap per-item
//! work. The smoothing and anchor state is private to the worker; the only
//! cross-thread surface is the atomic enable flag and the queue itself.
//! Disabling enqueues a clear command behind any in-flight targets, so the
//! state observed after re-enabling is always fully zeroed.
//!
//! When the producer outruns the consumer, queued target reports coalesce:
//! the worker drains the queue on every wake and steers toward the latest
//! report only. Order is preserved; a clear command still voids everything
//! queued before it.
//!
//! ## Submodules
//!
//! - [`law`]: the deflection computation itself
//! - [`tests`]: unit tests for the law and the worker lifecycle

pub mod law;

use crate::config::AutopilotParams;
use crate::error::GuidanceError;
use crate::io::{Axis, StickSink, TargetReport, TargetSink};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use law::{stick_value, ControlLaw};

enum Command {
    Target(TargetReport),
    Clear,
}

/// The autopilot controller and its worker handle.
pub struct Autopilot {
    params: AutopilotParams,
    resolution: (u32, u32),
    sink: Arc<dyn StickSink>,
    enabled: AtomicBool,
    running: AtomicBool,
    sender: mpsc::Sender<Command>,
    receiver: Mutex<Option<mpsc::Receiver<Command>>>,
}

impl Autopilot {
    /// Builds a disabled autopilot steering through `sink`, aiming at the
    /// centre of a stream with the given resolution.
    pub fn new(
        params: AutopilotParams,
        resolution: (u32, u32),
        sink: Arc<dyn StickSink>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();

        Autopilot {
            params,
            resolution,
            sink,
            enabled: AtomicBool::new(false),
            running: AtomicBool::new(false),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// True while the worker is draining the queue; turns false once the
    /// worker exits, including when it dies unexpectedly.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Engages the autopilot. The first target received afterwards anchors
    /// the reference size.
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            info!("autopilot engaged");
        }
    }

    /// Disengages and zeroes the control state. The clear command queues
    /// behind any in-flight targets, so ordering is preserved.
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            info!("autopilot disengaged");
        }
        self.enqueue(Command::Clear);
    }

    /// Queues a command for the worker. A failed send means the worker is
    /// gone and the command is lost; report it the way the datagram link
    /// reports dropped deliveries.
    fn enqueue(&self, command: Command) {
        if self.sender.send(command).is_err() {
            error!(
                "autopilot command dropped: {}",
                GuidanceError::ChannelClosed("autopilot worker queue")
            );
        }
    }

    /// Starts the autopilot worker.
    ///
    /// # Panics
    ///
    /// Panics when called twice; the queue receiver moves into the worker.
    pub fn spawn(self: &Arc<Self>) -> thread::JoinHandle<()> {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("autopilot worker already spawned");

        self.running.store(true, Ordering::SeqCst);
        let pilot = Arc::clone(self);

        thread::spawn(move || pilot.run(receiver))
    }

    /// Stops the worker. Idempotent: clears the running flag, wakes the
    /// worker through the queue and disengages.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.disable();
    }

    fn run(&self, receiver: mpsc::Receiver<Command>) {
        let mut law = ControlLaw::new(self.params, self.resolution);
        info!("autopilot worker started");

        while self.running.load(Ordering::SeqCst) {
            let Ok(first) = receiver.recv() else {
                break;
            };

            // Drain the queue: later reports supersede earlier ones, a
            // clear voids everything queued before it
            let mut batch = vec![first];
            while let Ok(command) = receiver.try_recv() {
                batch.push(command);
            }

            let mut latest = None;
            for command in batch {
                match command {
                    Command::Clear => {
                        law.reset();
                        latest = None;
                    }
                    Command::Target(report) => latest = Some(report),
                }
            }

            let Some(report) = latest else {
                continue;
            };
            if !self.enabled.load(Ordering::SeqCst) {
                continue;
            }

            let deflections = law.step(report);
            debug!(
                "steering toward ({}, {}) size {}: pitch {:.3} roll {:.3} throttle {:.3}",
                report.x, report.y, report.size,
                deflections.pitch, deflections.roll, deflections.throttle
            );

            self.sink.send(Axis::Pitch, stick_value(deflections.pitch));
            self.sink.send(Axis::Roll, stick_value(deflections.roll));
            self.sink.send(Axis::Yaw, stick_value(deflections.yaw));
            self.sink
                .send(Axis::Throttle, stick_value(deflections.throttle));
        }

        // Mark the worker gone so producers and `stop` can tell a dead
        // queue from a parked one
        self.running.store(false, Ordering::SeqCst);
        info!("autopilot worker stopped");
    }
}

impl TargetSink for Autopilot {
    /// Queues a target for the worker. Updates arriving while disengaged
    /// are discarded; "no target" is not a control input.
    fn update_target(&self, target: Option<TargetReport>) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        let Some(report) = target else {
            return;
        };
        self.enqueue(Command::Target(report));
    }

    fn update_reticle_size(&self, _size: i32) {}
}

impl Drop for Autopilot {
    fn drop(&mut self) {
        self.stop();
    }
}
