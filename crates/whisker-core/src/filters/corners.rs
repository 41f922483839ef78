//! Harris corner detection and the circle-detection placeholder.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Zip};
use serde::{Deserialize, Serialize};

use super::color::to_grayscale;
use super::convolve::{convolve, Border};
use super::{Kernel, Precision};
use crate::error::{FilterError, FilterResult};

/// Color painted over detected corners.
pub const CORNER_MARK: [u8; 3] = [255, 0, 0];

/// Harris detector parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HarrisParams {
    /// Trace penalty in `R = det(M) - k·trace(M)²`
    pub k: f32,
    /// Fraction of the strongest response a corner must exceed
    pub threshold: f32,
    /// Standard deviation of the Gaussian window
    pub sigma: f32,
}

impl Default for HarrisParams {
    fn default() -> Self {
        Self {
            k: 0.04,
            threshold: 0.01,
            sigma: 1.0,
        }
    }
}

/// Harris corner response of a grayscale plane.
///
/// Derivatives and smoothing mirror the image at its border, so a
/// constant image yields exactly zero response everywhere.
pub fn harris_response<F: Precision>(
    gray: ArrayView2<'_, F>,
    params: &HarrisParams,
) -> FilterResult<Array2<F>> {
    let ix: Array2<F> = convolve(gray, &Kernel::sobel_x(), Border::Reflect)?;
    let iy: Array2<F> = convolve(gray, &Kernel::sobel_y(), Border::Reflect)?;

    let row = Kernel::gaussian_row(params.sigma)?;
    let column = row.transposed();
    let blur = |a: Array2<F>| -> FilterResult<Array2<F>> {
        let horizontal: Array2<F> = convolve(a.view(), &row, Border::Reflect)?;
        convolve(horizontal.view(), &column, Border::Reflect)
    };

    let ixx = blur(&ix * &ix)?;
    let ixy = blur(&ix * &iy)?;
    let iyy = blur(&iy * &iy)?;

    let k: F = params.k.into();
    Ok(Zip::from(&ixx)
        .and(&ixy)
        .and(&iyy)
        .map_collect(|&xx, &xy, &yy| {
            let det = xx * yy - xy * xy;
            let trace = xx + yy;
            det - k * trace * trace
        }))
}

/// Select pixels that are maxima of their 3×3 neighborhood and whose
/// response exceeds `threshold · max(R)`.
///
/// Ties with a neighbor do not disqualify a pixel, so both members of a
/// mirror-symmetric pair are kept.
pub fn corner_mask<F: Precision>(response: ArrayView2<'_, F>, threshold: F) -> Array2<bool> {
    let (height, width) = response.dim();
    let max = response.iter().fold(F::neg_infinity(), |m, &v| m.max(v));
    let limit = threshold * max;

    Array2::from_shape_fn((height, width), |(y, x)| {
        let r = response[[y, x]];
        if !(r > limit) {
            return false;
        }
        let mut rows = y.saturating_sub(1)..(y + 2).min(height);
        rows.all(|ny| {
            let mut cols = x.saturating_sub(1)..(x + 2).min(width);
            cols.all(|nx| response[[ny, nx]] <= r)
        })
    })
}

/// Mark Harris corners of an RGB(A) image in pure red.
///
/// The response is computed on a floating-point luma copy; the marks are
/// painted on a copy of the original pixels. Channels past the third are
/// left untouched.
pub fn corner_detection<F>(
    image: ArrayView3<'_, u8>,
    params: &HarrisParams,
) -> FilterResult<Array3<u8>>
where
    F: Precision,
{
    if !(params.k > 0.0) || !(0.0..=1.0).contains(&params.threshold) {
        return Err(FilterError::InvalidParameter(format!(
            "harris k must be > 0 and threshold in [0, 1], got k={} threshold={}",
            params.k, params.threshold
        )));
    }
    let gray = to_grayscale::<u8, F>(image, None)?;
    let response = harris_response(gray.view(), params)?;
    let mask = corner_mask(response.view(), params.threshold.into());

    let mut marked = image.to_owned();
    for ((y, x), _) in mask.indexed_iter().filter(|(_, &is_corner)| is_corner) {
        for (c, &value) in CORNER_MARK.iter().enumerate() {
            marked[[y, x, c]] = value;
        }
    }
    Ok(marked)
}

/// Circle detection is not implemented; a Hough-transform search would be
/// required. Returns an unchanged copy of the input.
pub fn circle_detection(image: ArrayView3<'_, u8>) -> Array3<u8> {
    image.to_owned()
}
