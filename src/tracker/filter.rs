//! Condensation particle filter over affine window states.
//!
//! One [`condensation_step`] per frame: resample the population from the
//! previous confidences, diffuse, warp every candidate window into template
//! space, score the residuals against the appearance model and keep the MAP
//! particle as the new estimate.

use crate::affine::AffineState;
use crate::config::TrackerParams;
use crate::error::{GuidanceError, Result};
use crate::frame::GrayFrame;
use crate::subspace::{sklm, AppearanceModel};
use crate::warp;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::Rng;

/// Robustification constant of the reconstruction error: squared residuals
/// saturate at one instead of growing without bound, so a few wild pixels
/// cannot dominate the score.
const ROBUST_SIGMA: f64 = 0.1;

/// The weighted particle population. Confidences are kept in double
/// precision, normalised to sum one.
#[derive(Debug, Clone)]
pub struct ParticleSet {
    pub states: Vec<AffineState>,
    pub conf: Vec<f64>,
}

impl ParticleSet {
    /// Draws a new population from the current one proportionally to
    /// confidence, by inverting the cumulative distribution with one
    /// uniform draw per particle.
    pub fn resample(&self, rng: &mut StdRng) -> Vec<AffineState> {
        let n = self.states.len();
        let mut cdf = Vec::with_capacity(n);
        let mut total = 0.0f64;
        for weight in &self.conf {
            total += weight;
            cdf.push(total);
        }

        (0..n)
            .map(|_| {
                let draw: f64 = rng.random();
                let index = cdf.partition_point(|cum| *cum < draw).min(n - 1);
                self.states[index]
            })
            .collect()
    }

    /// Index of the most confident particle.
    pub fn map_index(&self) -> usize {
        let mut best = 0;
        for (index, weight) in self.conf.iter().enumerate() {
            if *weight > self.conf[best] {
                best = index;
            }
        }
        best
    }
}

/// Filter state carried between frames.
#[derive(Debug, Clone)]
pub struct FilterState {
    /// Particle population; `None` until the first frame after arming,
    /// which tiles the population from the initial estimate.
    pub particles: Option<ParticleSet>,

    /// Current best estimate.
    pub est: AffineState,

    /// Warped window of the best particle from the latest frame.
    pub wimg: DVector<f32>,

    /// Subspace coefficients of all particles from the latest scoring
    /// pass, kept for re-projection across model updates.
    pub coef: Option<DMatrix<f32>>,

    /// Best windows accumulated since the last model update.
    pub pending: Vec<DVector<f32>>,
}

impl FilterState {
    /// Fresh state from the initial estimate and its template.
    pub fn armed(est: AffineState, template: DVector<f32>) -> Self {
        FilterState {
            particles: None,
            est,
            wimg: template,
            coef: None,
            pending: Vec::new(),
        }
    }
}

/// Runs one condensation update against the given frame and appearance
/// model, leaving the MAP estimate in `filter.est` and appending the best
/// window to the pending batch.
pub fn condensation_step(
    gray: &GrayFrame,
    model: &AppearanceModel,
    filter: &mut FilterState,
    params: &TrackerParams,
    rng: &mut StdRng,
) -> Result<()> {
    let n = params.nparticles;
    let shape = (params.template_size, params.template_size);
    let sigma = params.affsig_padded();

    // Resample from the previous confidences, or tile the population on
    // the first frame after arming
    let parents = match &filter.particles {
        Some(particles) => particles.resample(rng),
        None => vec![filter.est; n],
    };

    let states: Vec<AffineState> = parents
        .iter()
        .map(|state| state.diffused(&sigma, rng))
        .collect();

    if states.iter().any(|state| !state.is_finite()) {
        return Err(GuidanceError::Numeric(
            "non-finite particle state after diffusion".to_string(),
        ));
    }

    // Warp every candidate window into template space: one column each
    let warped = warp::warp_many(gray, &states, shape);

    let mut diff = warped.clone();
    for mut column in diff.column_iter_mut() {
        column -= model.mean();
    }

    // Remove the part of each residual the learned subspace explains
    let coef = if model.rank() > 0 {
        let projection = model.basis().transpose() * &diff;
        diff -= model.basis() * &projection;
        Some(projection)
    } else {
        None
    };

    let precision = 1.0 / params.condenssig as f64;
    let robust = ROBUST_SIGMA * ROBUST_SIGMA;

    let mut conf: Vec<f64> = diff
        .column_iter()
        .map(|column| {
            let error: f64 = column
                .iter()
                .map(|value| {
                    let squared = (value * value) as f64;
                    squared / (squared + robust)
                })
                .sum();
            (-error * precision).exp()
        })
        .collect();

    let total: f64 = conf.iter().sum();
    if total > 0.0 && total.is_finite() {
        for weight in &mut conf {
            *weight /= total;
        }
    } else {
        // Every particle underflowed; fall back to a uniform population
        conf.fill(1.0 / n as f64);
    }

    let particles = ParticleSet { states, conf };
    let best = particles.map_index();

    filter.est = particles.states[best];
    filter.wimg = warped.column(best).into_owned();
    filter.pending.push(filter.wimg.clone());
    filter.coef = coef;
    filter.particles = Some(particles);

    Ok(())
}

/// Folds the pending batch into the appearance model once it has grown to
/// the configured batch size, carrying particle coefficients across the
/// basis change and applying the basis cap.
pub fn learn_if_ready(
    model: &mut AppearanceModel,
    filter: &mut FilterState,
    params: &TrackerParams,
) -> Result<()> {
    if filter.pending.len() < params.batch_size {
        return Ok(());
    }

    match filter.coef.take() {
        Some(coef) => {
            // Reconstruct the particle windows under the old basis so the
            // coefficients can be re-expressed under the new one
            let mut reconstruction = model.basis() * &coef;
            for mut column in reconstruction.column_iter_mut() {
                column += model.mean();
            }

            let update = sklm(&filter.pending, model, params.forgetting)?;
            model.apply(update);

            for mut column in reconstruction.column_iter_mut() {
                column -= model.mean();
            }
            filter.coef = Some(model.basis().transpose() * reconstruction);
        }
        None => {
            let update = sklm(&filter.pending, model, params.forgetting)?;
            model.apply(update);
        }
    }

    filter.pending.clear();

    if model.truncate(params.max_basis, params.forgetting) {
        if let Some(coef) = &filter.coef {
            filter.coef = Some(coef.rows(0, params.max_basis).into_owned());
        }
    }

    Ok(())
}
