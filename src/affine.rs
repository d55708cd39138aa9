//! # Affine Module - Particle State over Image Windows
//!
//! A tracked window is described by an affine state: centre, scale relative
//! to the template side, aspect ratio and an optional rotation angle. The
//! particle filter propagates a population of these states with elementwise
//! Gaussian diffusion.

use crate::config::STATE_DOF;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fmt::Display;

/// Affine description of a candidate tracking window.
///
/// `scale` is relative to the template side: a window of side
/// `scale * template_size` pixels. `aspect` multiplies the width to give the
/// height. `angle` is a rotation about the centre in radians; it stays zero
/// unless the diffusion vector gives it a non-zero sigma.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineState {
    pub cx: f32,
    pub cy: f32,
    pub scale: f32,
    pub aspect: f32,
    pub angle: f32,
}

impl AffineState {
    /// The state describing a centred square window of side `size` pixels.
    pub fn initial(cx: f32, cy: f32, size: f32, template_size: usize) -> Self {
        AffineState {
            cx,
            cy,
            scale: size / template_size as f32,
            aspect: 1.0,
            angle: 0.0,
        }
    }

    /// Window extent `(width, height)` in pixels for a given template side.
    pub fn window(&self, template_size: usize) -> (f32, f32) {
        let width = self.scale * template_size as f32;
        let height = self.aspect * width;
        (width, height)
    }

    /// The reported target size: the smaller of the window sides.
    pub fn target_size(&self, template_size: usize) -> f32 {
        let (width, height) = self.window(template_size);
        width.min(height)
    }

    /// Returns this state perturbed by zero-mean Gaussian noise with the
    /// given per-DOF standard deviations. A zero sigma leaves the component
    /// untouched, so an all-zero vector reproduces the state exactly.
    pub fn diffused<R: Rng>(&self, sigma: &[f32; STATE_DOF], rng: &mut R) -> Self {
        let mut values = [self.cx, self.cy, self.scale, self.aspect, self.angle];

        for (value, sigma) in values.iter_mut().zip(sigma.iter()) {
            if *sigma > 0.0 {
                // Normal::new only fails on a negative or non-finite sigma
                let normal = Normal::new(0.0, *sigma).unwrap();
                *value += normal.sample(rng);
            }
        }

        AffineState {
            cx: values[0],
            cy: values[1],
            scale: values[2],
            aspect: values[3],
            angle: values[4],
        }
    }

    /// True when every component is a finite number. Diffusion applied to a
    /// corrupted state propagates NaN, which the tracker treats as a
    /// numeric failure.
    pub fn is_finite(&self) -> bool {
        self.cx.is_finite()
            && self.cy.is_finite()
            && self.scale.is_finite()
            && self.aspect.is_finite()
            && self.angle.is_finite()
    }
}

impl Display for AffineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AffineState {{ centre: ({:.1}, {:.1}), scale: {:.3}, aspect: {:.3}, angle: {:.4} }}",
            self.cx, self.cy, self.scale, self.aspect, self.angle
        )
    }
}

/// Unit tests for affine state arithmetic
pub mod tests;
