//! # Warp Module - Affine Window Extraction
//!
//! Maps candidate affine states back into canonical template space. The
//! extraction follows a crop-then-resize scheme: the window centre and
//! extent are rounded to whole pixels, an axis-aligned region is cropped
//! (after rotating the frame when the state carries an angle) and the
//! region is bilinearly resized to the template shape.
//!
//! Windows falling entirely outside the frame produce a zero patch, which
//! scores far from the learned appearance and is culled by the filter
//! without special-casing.

use crate::affine::AffineState;
use crate::frame::GrayFrame;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Rotation angles below this threshold skip the rotation pass entirely.
const ANGLE_EPSILON: f32 = 1e-5;

/// Extracts a `shape`-sized patch centred on `centre` with the given pixel
/// extent, rotated by `angle` radians.
///
/// Centre and extent are rounded to integers before cropping. The crop is
/// clamped to the frame bounds; an empty clamped region yields an all-zero
/// patch. A region already matching `shape` is returned without resampling,
/// so a full-frame extraction reproduces the frame exactly.
///
/// `shape` is `(width, height)` of the returned patch; the matrix has
/// `shape.1` rows and `shape.0` columns.
pub fn extract(
    image: &GrayFrame,
    centre: (f32, f32),
    width: f32,
    height: f32,
    shape: (usize, usize),
    angle: f32,
) -> DMatrix<f32> {
    let (target_width, target_height) = shape;

    let cx = centre.0.round() as i64;
    let cy = centre.1.round() as i64;
    let width = width.round() as i64;
    let height = height.round() as i64;

    let rotated;
    let source = if angle.abs() > ANGLE_EPSILON {
        rotated = rotate_about(image, cx as f32, cy as f32, -angle);
        &rotated
    } else {
        image
    };

    // Axis-aligned crop, clamped to the frame
    let left = (cx - width / 2).max(0);
    let top = (cy - height / 2).max(0);
    let right = (cx - width / 2 + width).min(source.width() as i64);
    let bottom = (cy - height / 2 + height).min(source.height() as i64);

    if left >= right || top >= bottom {
        return DMatrix::zeros(target_height, target_width);
    }

    let region_width = (right - left) as usize;
    let region_height = (bottom - top) as usize;

    if region_width == target_width && region_height == target_height {
        return DMatrix::from_fn(target_height, target_width, |row, col| {
            source.get(left + col as i64, top + row as i64)
        });
    }

    resize_region(source, left, top, region_width, region_height, shape)
}

/// Extracts the template-space window described by an affine state.
/// The window is `scale * Tw` pixels wide and `aspect` times as tall.
pub fn warp(image: &GrayFrame, state: &AffineState, shape: (usize, usize)) -> DMatrix<f32> {
    let width = state.scale * shape.0 as f32;
    let height = state.aspect * width;
    extract(image, (state.cx, state.cy), width, height, shape, state.angle)
}

/// Warps one window per state and stacks the flattened patches as the
/// columns of a `D x N` matrix.
///
/// The per-state work is independent, so the windows are extracted in
/// parallel; the result is identical to warping sequentially.
pub fn warp_many(
    image: &GrayFrame,
    states: &[AffineState],
    shape: (usize, usize),
) -> DMatrix<f32> {
    let columns: Vec<DVector<f32>> = states
        .par_iter()
        .map(|state| flatten(&warp(image, state, shape)))
        .collect();

    DMatrix::from_columns(&columns)
}

/// Flattens a patch into the template vector of length `D = rows * cols`.
pub fn flatten(patch: &DMatrix<f32>) -> DVector<f32> {
    DVector::from_column_slice(patch.as_slice())
}

/// Rotates the frame by `angle` radians about `(cx, cy)` with bilinear
/// interpolation and a constant zero border.
fn rotate_about(image: &GrayFrame, cx: f32, cy: f32, angle: f32) -> GrayFrame {
    let width = image.width();
    let height = image.height();
    let mut rotated = GrayFrame::zeros(width, height);

    // Inverse mapping: each destination pixel samples the source at the
    // back-rotated position
    let (sin, cos) = (-angle).sin_cos();

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let src_x = cx + cos * dx - sin * dy;
            let src_y = cy + sin * dx + cos * dy;
            rotated.set(x, y, sample_border_zero(image, src_x, src_y));
        }
    }

    rotated
}

/// Bilinear sample with a constant zero border outside the frame.
fn sample_border_zero(image: &GrayFrame, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as i64;
    let y0 = y0 as i64;

    let p00 = image.get(x0, y0);
    let p10 = image.get(x0 + 1, y0);
    let p01 = image.get(x0, y0 + 1);
    let p11 = image.get(x0 + 1, y0 + 1);

    let top = p00 + (p10 - p00) * fx;
    let bottom = p01 + (p11 - p01) * fx;
    top + (bottom - top) * fy
}

/// Bilinearly resizes a cropped region to the target shape. Sample
/// positions use pixel-centre alignment and clamp at the region edges.
fn resize_region(
    image: &GrayFrame,
    left: i64,
    top: i64,
    region_width: usize,
    region_height: usize,
    shape: (usize, usize),
) -> DMatrix<f32> {
    let (target_width, target_height) = shape;
    let scale_x = region_width as f32 / target_width as f32;
    let scale_y = region_height as f32 / target_height as f32;

    DMatrix::from_fn(target_height, target_width, |row, col| {
        let src_x = ((col as f32 + 0.5) * scale_x - 0.5).clamp(0.0, region_width as f32 - 1.0);
        let src_y = ((row as f32 + 0.5) * scale_y - 0.5).clamp(0.0, region_height as f32 - 1.0);

        let x0 = src_x.floor();
        let y0 = src_y.floor();
        let fx = src_x - x0;
        let fy = src_y - y0;

        let x0 = left + x0 as i64;
        let y0 = top + y0 as i64;
        let x1 = (x0 + 1).min(left + region_width as i64 - 1);
        let y1 = (y0 + 1).min(top + region_height as i64 - 1);

        let p00 = image.get(x0, y0);
        let p10 = image.get(x1, y0);
        let p01 = image.get(x0, y1);
        let p11 = image.get(x1, y1);

        let top_row = p00 + (p10 - p00) * fx;
        let bottom_row = p01 + (p11 - p01) * fx;
        top_row + (bottom_row - top_row) * fy
    })
}
