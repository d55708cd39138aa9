//! # Tracker Module - Incremental Visual Tracking Orchestrator
//!
//! Wraps the condensation filter and the incremental appearance model in a
//! small state machine driven by mode events:
//!
//! - **Idle** - nothing is tracked, the model is zero-rank.
//! - **Armed** - `init` seeded the model from the window under the reticle;
//!   the next frame tiles the particle population.
//! - **Tracking** - every frame runs one filter step and publishes the MAP
//!   window to the registered target sinks.
//!
//! A dedicated worker owns the per-frame loop. It parks while idle on a
//! binary tracking signal and holds the tracker lock only while mutating
//! the model and particle state, so `reset` from the mode consumer can race
//! in between ticks. A reset during a tick lets the tick finish and
//! suppresses its publication.
//!
//! ## Submodules
//!
//! - [`filter`]: the condensation particle filter and batch learning
//! - [`tests`]: unit tests for the state machine and filter invariants

pub mod filter;
pub mod tests;

use crate::affine::AffineState;
use crate::config::TrackerParams;
use crate::error::{GuidanceError, Result};
use crate::frame::FrameSource;
use crate::io::{TargetReport, TargetSink};
use crate::subspace::AppearanceModel;
use crate::tracker::filter::{condensation_step, learn_if_ready, FilterState};
use crate::warp;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Reticle size used until the operator resizes it.
const DEFAULT_RETICLE_SIZE: i32 = 20;

/// How long the worker sleeps when the source has no frame, and the upper
/// bound on how long `stop` can go unnoticed while parked.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Lifecycle of the tracking state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Armed,
    Tracking,
}

/// The operator-designated initial window: centred on the image, sized by
/// the reticle.
#[derive(Debug, Clone, Copy)]
pub struct InitialBox {
    pub x: i32,
    pub y: i32,
    pub size: i32,
}

/// Everything the tracker mutates per frame, guarded by one mutex.
struct TrackerShared {
    state: TrackerState,
    model: AppearanceModel,
    filter: Option<FilterState>,
    initial_box: InitialBox,
    rng: StdRng,
}

/// Binary event the worker parks on while nothing is tracked.
struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn new() -> Self {
        Signal {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn set(&self) {
        *self.flag.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock().unwrap() = false;
    }

    fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Waits up to `timeout` for the signal; returns its state afterwards.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = self.flag.lock().unwrap();
        if *flag {
            return true;
        }
        let (flag, _) = self.cond.wait_timeout(flag, timeout).unwrap();
        *flag
    }

    fn kick(&self) {
        self.cond.notify_all();
    }
}

/// Orchestrator around the condensation filter and the appearance model.
pub struct IncrementalTracker {
    params: TrackerParams,
    source: Arc<dyn FrameSource>,
    sinks: Vec<Arc<dyn TargetSink>>,
    shared: Mutex<TrackerShared>,
    is_tracking: Signal,
    running: AtomicBool,
}

impl IncrementalTracker {
    /// Builds an idle tracker reading from `source` and publishing targets
    /// to every sink in `sinks`. The initial box starts at the image
    /// centre with the default reticle size.
    pub fn new(
        params: TrackerParams,
        source: Arc<dyn FrameSource>,
        sinks: Vec<Arc<dyn TargetSink>>,
    ) -> Self {
        let (width, height) = source.resolution();
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        IncrementalTracker {
            shared: Mutex::new(TrackerShared {
                state: TrackerState::Idle,
                model: AppearanceModel::empty(params.template_dim()),
                filter: None,
                initial_box: InitialBox {
                    x: width as i32 / 2,
                    y: height as i32 / 2,
                    size: DEFAULT_RETICLE_SIZE,
                },
                rng,
            }),
            params,
            source,
            sinks,
            is_tracking: Signal::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrackerState {
        self.shared.lock().unwrap().state
    }

    /// Rank of the current appearance model; zero while idle.
    pub fn model_rank(&self) -> usize {
        self.shared.lock().unwrap().model.rank()
    }

    /// Current best estimate while armed or tracking.
    pub fn estimate(&self) -> Option<AffineState> {
        let shared = self.shared.lock().unwrap();
        shared.filter.as_ref().map(|filter| filter.est)
    }

    /// Arms the tracker on the window currently under the reticle.
    ///
    /// A no-op unless idle, and a no-op when the source has not produced a
    /// frame yet: arming without video would seed the model from nothing.
    pub fn init(&self) {
        // Frame copy happens before taking the tracker lock
        let Some(frame) = self.source.read() else {
            warn!("init ignored: no frame available yet");
            return;
        };

        let mut shared = self.shared.lock().unwrap();
        if shared.state != TrackerState::Idle {
            debug!("init ignored: tracker is {:?}", shared.state);
            return;
        }

        let initial_box = shared.initial_box;
        let est = AffineState::initial(
            initial_box.x as f32,
            initial_box.y as f32,
            initial_box.size as f32,
            self.params.template_size,
        );

        let shape = (self.params.template_size, self.params.template_size);
        let gray = frame.to_grayscale();
        let template = warp::flatten(&warp::warp(&gray, &est, shape));

        let mut model = AppearanceModel::empty(self.params.template_dim());
        model.seed_mean(template.clone());

        shared.model = model;
        shared.filter = Some(FilterState::armed(est, template));
        shared.state = TrackerState::Armed;
        drop(shared);

        self.is_tracking.set();
        info!(
            "tracker armed on ({}, {}) size {}",
            initial_box.x, initial_box.y, initial_box.size
        );
    }

    /// Drops the target and returns to idle with a zero-rank model.
    /// Publishes a single "no target" update; a tick already in flight
    /// sees the cleared signal and discards its result.
    pub fn reset(&self) {
        self.is_tracking.clear();
        self.publish(None);

        let mut shared = self.shared.lock().unwrap();
        shared.state = TrackerState::Idle;
        shared.model = AppearanceModel::empty(self.params.template_dim());
        shared.filter = None;
        info!("tracker reset");
    }

    /// Updates the size of the initial box the next `init` will use.
    /// Ignored while tracking; the locked-on window keeps its own scale.
    pub fn update_initial_box(&self, size: i32) {
        if size < 1 {
            warn!("ignoring non-positive initial box size {}", size);
            return;
        }

        let mut shared = self.shared.lock().unwrap();
        if shared.state == TrackerState::Tracking {
            return;
        }
        shared.initial_box.size = size;
    }

    /// Starts the tracker worker. The worker parks until `init` raises the
    /// tracking signal and exits when `stop` clears the running flag.
    pub fn spawn(self: &Arc<Self>) -> thread::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let tracker = Arc::clone(self);

        thread::spawn(move || {
            info!("tracker worker started");
            while tracker.running.load(Ordering::SeqCst) {
                if !tracker.is_tracking.wait_timeout(IDLE_WAIT) {
                    continue;
                }

                match tracker.tick() {
                    Ok(Some(report)) => tracker.publish(Some(report)),
                    Ok(None) => {}
                    // Recovered locally: wait for the stream to catch up
                    Err(GuidanceError::FrameUnavailable) => thread::sleep(IDLE_WAIT),
                    Err(err) => {
                        error!("tracking failed, dropping to idle: {}", err);
                        tracker.recover();
                    }
                }
            }
            info!("tracker worker stopped");
        })
    }

    /// Stops the worker. Idempotent: clears the running flag, wakes any
    /// parked waiter and returns; the worker exits on its next iteration.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.is_tracking.kick();
    }

    /// One frame of work: filter step, batch learning, report extraction.
    /// Returns `None` when there is nothing to publish - no frame yet, the
    /// tracker went idle, or a reset raced with the tick.
    fn tick(&self) -> Result<Option<TargetReport>> {
        let Some(frame) = self.source.read() else {
            return Err(GuidanceError::FrameUnavailable);
        };
        let gray = frame.to_grayscale();

        let mut shared = self.shared.lock().unwrap();
        let TrackerShared {
            state,
            model,
            filter,
            rng,
            ..
        } = &mut *shared;

        let Some(filter) = filter.as_mut() else {
            return Ok(None);
        };

        condensation_step(&gray, model, filter, &self.params, rng)?;
        learn_if_ready(model, filter, &self.params)?;
        *state = TrackerState::Tracking;

        let est = filter.est;
        drop(shared);

        // A reset that fired mid-tick already published "no target"; the
        // stale estimate must not overwrite it
        if !self.is_tracking.is_set() {
            return Ok(None);
        }

        Ok(Some(TargetReport {
            x: est.cx.round() as i32,
            y: est.cy.round() as i32,
            size: (est.target_size(self.params.template_size).round() as i32).max(1),
        }))
    }

    /// Numeric failure recovery: unmount the model and report no target.
    fn recover(&self) {
        self.is_tracking.clear();
        self.publish(None);

        let mut shared = self.shared.lock().unwrap();
        shared.state = TrackerState::Idle;
        shared.model = AppearanceModel::empty(self.params.template_dim());
        shared.filter = None;
    }

    fn publish(&self, target: Option<TargetReport>) {
        for sink in &self.sinks {
            sink.update_target(target);
        }
    }
}

impl Drop for IncrementalTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
