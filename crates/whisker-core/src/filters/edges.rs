//! Sobel edge detection.

use ndarray::{Array2, ArrayView2, ArrayView3, Zip};

use super::color::to_grayscale;
use super::convolve::{convolve, Border};
use super::{Kernel, Precision};
use crate::error::FilterResult;

/// Sobel edge strength of an RGB(A) image, scaled to `0..=255`.
///
/// The image is reduced to BT.601 luma first; see [`gradient_magnitude`].
pub fn edge_detection<T, F>(image: ArrayView3<'_, T>) -> FilterResult<Array2<F>>
where
    T: Copy,
    F: Precision + From<T>,
{
    let gray = to_grayscale::<T, F>(image, None)?;
    gradient_magnitude(gray.view())
}

/// `sqrt(gx² + gy²)` of a single plane, divided by its own maximum and
/// multiplied by 255.
///
/// The normalization is per image: the strongest edge always maps to 255.
/// Zero padding makes the image frame itself an edge unless the border
/// pixels are black. An all-zero gradient is returned unscaled.
pub fn gradient_magnitude<F: Precision>(gray: ArrayView2<'_, F>) -> FilterResult<Array2<F>> {
    let gx: Array2<F> = convolve(gray, &Kernel::sobel_x(), Border::Zero)?;
    let gy: Array2<F> = convolve(gray, &Kernel::sobel_y(), Border::Zero)?;

    let mut magnitude = Zip::from(&gx)
        .and(&gy)
        .map_collect(|&x, &y| (x * x + y * y).sqrt());

    let max = magnitude.iter().fold(F::zero(), |m, &v| m.max(v));
    if max > F::zero() {
        let full_scale: F = 255u8.into();
        magnitude.mapv_inplace(|v| v * full_scale / max);
    }
    Ok(magnitude)
}
