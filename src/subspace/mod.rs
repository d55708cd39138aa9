//! # Subspace Module - Incremental Appearance Model
//!
//! Maintains a low-rank model of the template windows observed while
//! tracking: a mean vector, an orthonormal eigenbasis with its singular
//! values, the effective sample count and the residual energy folded out of
//! the basis by truncation.
//!
//! The update is the sequential Karhunen-Loeve transform with a forgetting
//! factor: each batch of new templates extends the previous decomposition
//! without revisiting old data. [`sklm`] is a pure function of the previous
//! model and the batch; the caller swaps the returned state in under its own
//! lock, so a failed update never leaves the model half-written.

use crate::error::{GuidanceError, Result};
use nalgebra::{DMatrix, DVector};

/// Relative threshold below which singular values are dropped after the
/// merged decomposition.
const SIGNIFICANCE_CUTOFF: f32 = 1e-3;

/// SVD convergence parameters for the small merge matrix.
const SVD_EPSILON: f32 = 1e-7;
const SVD_MAX_ITERATIONS: usize = 256;

/// The learned appearance subspace.
///
/// Invariants: `basis` columns are orthonormal, `eigval` is sorted in
/// non-increasing order and `basis.ncols() == eigval.len()`.
#[derive(Debug, Clone)]
pub struct AppearanceModel {
    mean: DVector<f32>,
    basis: DMatrix<f32>,
    eigval: DVector<f32>,
    nsamples: f32,
    residual: f32,
}

/// The tuple produced by one SKL update, substituted into the model by the
/// caller.
#[derive(Debug, Clone)]
pub struct SklUpdate {
    pub basis: DMatrix<f32>,
    pub eigval: DVector<f32>,
    pub mean: DVector<f32>,
    pub nsamples: f32,
}

impl AppearanceModel {
    /// A zero-rank model over templates of dimension `dim`.
    pub fn empty(dim: usize) -> Self {
        AppearanceModel {
            mean: DVector::zeros(dim),
            basis: DMatrix::zeros(dim, 0),
            eigval: DVector::zeros(0),
            nsamples: 0.0,
            residual: 0.0,
        }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Number of basis columns currently held.
    pub fn rank(&self) -> usize {
        self.basis.ncols()
    }

    pub fn mean(&self) -> &DVector<f32> {
        &self.mean
    }

    pub fn basis(&self) -> &DMatrix<f32> {
        &self.basis
    }

    pub fn eigval(&self) -> &DVector<f32> {
        &self.eigval
    }

    pub fn nsamples(&self) -> f32 {
        self.nsamples
    }

    /// Energy of the singular values dropped by basis truncation,
    /// discounted by the forgetting factor on every fold.
    pub fn residual(&self) -> f32 {
        self.residual
    }

    /// Overwrites the mean, leaving the basis untouched. Used when the
    /// tracker seeds a fresh model from the initial template.
    pub fn seed_mean(&mut self, template: DVector<f32>) {
        self.mean = template;
    }

    /// Substitutes the result of an SKL update.
    pub fn apply(&mut self, update: SklUpdate) {
        self.basis = update.basis;
        self.eigval = update.eigval;
        self.mean = update.mean;
        self.nsamples = update.nsamples;
    }

    /// Caps the basis at `max_basis` columns, folding the squared tail of
    /// the spectrum into the residual energy. Returns true when columns
    /// were dropped, so the caller can truncate stored coefficients in
    /// lockstep.
    pub fn truncate(&mut self, max_basis: usize, forgetting: f32) -> bool {
        if self.rank() <= max_basis {
            return false;
        }

        let tail_energy: f32 = self
            .eigval
            .iter()
            .skip(max_basis)
            .map(|sigma| sigma * sigma)
            .sum();
        self.residual = forgetting * self.residual + tail_energy;

        self.basis = self.basis.columns(0, max_basis).into_owned();
        self.eigval = self.eigval.rows(0, max_basis).into_owned();
        true
    }

    /// Coefficients of `v - mean` in the current basis.
    pub fn project(&self, v: &DVector<f32>) -> DVector<f32> {
        self.basis.transpose() * (v - &self.mean)
    }

    /// Template reconstructed from subspace coefficients.
    pub fn reconstruct(&self, coef: &DVector<f32>) -> DVector<f32> {
        &self.basis * coef + &self.mean
    }
}

/// One sequential Karhunen-Loeve update.
///
/// Merges a batch of `m` templates into the previous decomposition
/// `(U, sigma, mean, n)` under forgetting factor `forgetting`, returning the
/// updated tuple. The previous model is not modified.
///
/// The mean update weighs the old mean by `f*n` and the batch mean by `m`;
/// the mean shift enters the decomposition as an extra column scaled by
/// `sqrt(m*n / (m + n))`, as in the incremental visual tracking literature.
pub fn sklm(
    batch: &[DVector<f32>],
    model: &AppearanceModel,
    forgetting: f32,
) -> Result<SklUpdate> {
    if batch.is_empty() {
        return Err(GuidanceError::State(
            "sklm requires a non-empty template batch".to_string(),
        ));
    }

    let dim = model.dim();
    if batch.iter().any(|template| template.len() != dim) {
        return Err(GuidanceError::Numeric(format!(
            "template length mismatch: model dimension is {}",
            dim
        )));
    }

    let new_samples = batch.len() as f32;
    let mut data = DMatrix::from_columns(batch);

    let new_mean = data.column_mean();
    for mut column in data.column_iter_mut() {
        column -= &new_mean;
    }

    // A model without a basis starts over from the batch alone
    if model.rank() == 0 {
        let (basis, eigval) = thin_svd(data)?;
        return Ok(SklUpdate {
            basis,
            eigval,
            mean: new_mean,
            nsamples: new_samples,
        });
    }

    let prev_samples = model.nsamples;
    let weighted_total = forgetting * prev_samples + new_samples;
    let mean = (forgetting * prev_samples / weighted_total) * &model.mean
        + (new_samples / weighted_total) * &new_mean;

    // The shift between old and new means carries variance the centred
    // batch alone cannot express; append it as one extra column
    let harmonic = new_samples * prev_samples / (new_samples + prev_samples);
    let mean_shift = harmonic.sqrt() * (&new_mean - &model.mean);

    let mut augmented = DMatrix::zeros(dim, batch.len() + 1);
    augmented.columns_mut(0, batch.len()).copy_from(&data);
    augmented.column_mut(batch.len()).copy_from(&mean_shift);

    let nsamples = new_samples + forgetting * prev_samples;

    // Split the new data into the span of the old basis and its complement
    let projection = model.basis.transpose() * &augmented;
    let orthogonal = &augmented - &model.basis * &projection;

    let orth_basis = orthogonal.clone().qr().q();
    let residual_block = orth_basis.transpose() * &orthogonal;

    // Merge matrix: old spectrum (forgotten) alongside the projections of
    // the new data, over the residual block in the complement
    let k = model.rank();
    let extra = orth_basis.ncols();
    let cols = batch.len() + 1;

    let mut merge = DMatrix::zeros(k + extra, k + cols);
    for (i, sigma) in model.eigval.iter().enumerate() {
        merge[(i, i)] = forgetting * sigma;
    }
    merge
        .view_mut((0, k), (k, cols))
        .copy_from(&projection);
    merge
        .view_mut((k, k), (extra, cols))
        .copy_from(&residual_block);

    let (merge_u, sigma) = thin_svd(merge)?;

    // Keep only the significant part of the merged spectrum
    let cutoff = sigma.norm() * SIGNIFICANCE_CUTOFF;
    let keep = sigma.iter().take_while(|value| **value >= cutoff).count();

    let combined = {
        let mut stacked = DMatrix::zeros(dim, k + extra);
        stacked.columns_mut(0, k).copy_from(&model.basis);
        stacked.columns_mut(k, extra).copy_from(&orth_basis);
        stacked
    };

    let basis = &combined * merge_u.columns(0, keep);
    let eigval = sigma.rows(0, keep).into_owned();

    Ok(SklUpdate {
        basis,
        eigval,
        mean,
        nsamples,
    })
}

/// Thin SVD returning the left singular vectors and the singular values in
/// non-increasing order.
fn thin_svd(matrix: DMatrix<f32>) -> Result<(DMatrix<f32>, DVector<f32>)> {
    let svd = matrix
        .try_svd(true, false, SVD_EPSILON, SVD_MAX_ITERATIONS)
        .ok_or_else(|| GuidanceError::Numeric("SVD did not converge".to_string()))?;

    let u = svd
        .u
        .ok_or_else(|| GuidanceError::Numeric("SVD produced no left vectors".to_string()))?;

    if svd.singular_values.iter().any(|value| !value.is_finite()) {
        return Err(GuidanceError::Numeric(
            "SVD produced non-finite singular values".to_string(),
        ));
    }

    Ok((u, svd.singular_values))
}

/// Unit tests for the incremental update
pub mod tests;
