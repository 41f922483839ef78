//! Spatial filters and feature extractors.
//!
//! Everything here is a pure function of its input arrays:
//! - **kernel**: immutable weight matrices (Sobel, Gaussian)
//! - **convolve**: same-size cross-correlation with zero or reflect borders
//! - **color**: grayscale reduction and gamma lookup
//! - **edges**: Sobel gradient magnitude
//! - **corners**: Harris corners and the circle-detection placeholder
//!
//! [`FeatureExtractor`] bundles the operations behind one value whose type
//! parameter fixes the floating-point width used for intermediate math.

pub mod color;
pub mod convolve;
pub mod corners;
pub mod edges;
pub mod kernel;

use std::marker::PhantomData;

use ndarray::{Array, Array2, Array3, ArrayView, ArrayView2, ArrayView3, Dimension, NdFloat};

pub use color::BT601_WEIGHTS;
pub use convolve::Border;
pub use corners::{HarrisParams, CORNER_MARK};
pub use kernel::Kernel;

use crate::error::FilterResult;

/// Floating-point width used for intermediate computation.
///
/// Implemented for `f32` (the default) and `f64`.
pub trait Precision: NdFloat + From<u8> + From<f32> {}

impl Precision for f32 {}
impl Precision for f64 {}

/// Stateless entry point to the filter set, parameterized by precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor<F: Precision = f32> {
    _precision: PhantomData<F>,
}

impl<F: Precision> FeatureExtractor<F> {
    pub fn new() -> Self {
        Self {
            _precision: PhantomData,
        }
    }

    /// Zero-padded same-size correlation.
    pub fn convolve<T, D>(
        &self,
        image: ArrayView<'_, T, D>,
        kernel: &Kernel,
    ) -> FilterResult<Array<F, D>>
    where
        T: Copy,
        F: From<T>,
        D: Dimension,
    {
        convolve::convolve(image, kernel, Border::Zero)
    }

    /// Same-size correlation with an explicit border mode.
    pub fn convolve_with<T, D>(
        &self,
        image: ArrayView<'_, T, D>,
        kernel: &Kernel,
        border: Border,
    ) -> FilterResult<Array<F, D>>
    where
        T: Copy,
        F: From<T>,
        D: Dimension,
    {
        convolve::convolve(image, kernel, border)
    }

    pub fn to_grayscale<T>(
        &self,
        image: ArrayView3<'_, T>,
        weights: Option<[F; 3]>,
    ) -> FilterResult<Array2<F>>
    where
        T: Copy,
        F: From<T>,
    {
        color::to_grayscale(image, weights)
    }

    pub fn gamma_correction<T, D>(
        &self,
        image: ArrayView<'_, T, D>,
        gamma: F,
    ) -> FilterResult<Array<F, D>>
    where
        T: Copy,
        F: From<T>,
        D: Dimension,
    {
        color::gamma_correction(image, gamma)
    }

    /// Sobel edge strength of an RGB(A) image, normalized to `0..=255`.
    pub fn edge_detection<T>(&self, image: ArrayView3<'_, T>) -> FilterResult<Array2<F>>
    where
        T: Copy,
        F: From<T>,
    {
        edges::edge_detection(image)
    }

    /// Sobel edge strength of an already single-channel plane.
    pub fn gradient_magnitude(&self, gray: ArrayView2<'_, F>) -> FilterResult<Array2<F>> {
        edges::gradient_magnitude(gray)
    }

    /// Copy of `image` with Harris corners painted red.
    pub fn corner_detection(
        &self,
        image: ArrayView3<'_, u8>,
        params: &HarrisParams,
    ) -> FilterResult<Array3<u8>> {
        corners::corner_detection::<F>(image, params)
    }

    /// Unimplemented; returns a copy of `image`.
    pub fn circle_detection(&self, image: ArrayView3<'_, u8>) -> Array3<u8> {
        corners::circle_detection(image)
    }
}
