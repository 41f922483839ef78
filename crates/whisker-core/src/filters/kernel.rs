//! Convolution kernels.

use ndarray::{arr2, Array2, ArrayView2};

use super::Precision;
use crate::error::{FilterError, FilterResult};

/// Gaussian support is truncated at this many standard deviations.
const GAUSSIAN_TRUNCATE: f32 = 4.0;

/// A small immutable weight matrix applied by cross-correlation.
///
/// Weights are stored in single precision and upcast to the engine's
/// working precision at the start of each convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Array2<f32>,
}

impl Kernel {
    /// Wrap a weight matrix. Fails if either axis is empty.
    pub fn new(weights: Array2<f32>) -> FilterResult<Self> {
        if weights.is_empty() {
            return Err(FilterError::EmptyKernel);
        }
        Ok(Self { weights })
    }

    /// Horizontal Sobel derivative (responds to vertical edges).
    pub fn sobel_x() -> Self {
        Self {
            weights: arr2(&[[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]]),
        }
    }

    /// Vertical Sobel derivative (responds to horizontal edges).
    pub fn sobel_y() -> Self {
        Self {
            weights: arr2(&[[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]]),
        }
    }

    /// A normalized 1×N Gaussian row kernel.
    ///
    /// The radius is `round(4σ)`, so σ = 1 gives a 9-tap kernel. Use
    /// [`Kernel::transposed`] for the matching column kernel.
    pub fn gaussian_row(sigma: f32) -> FilterResult<Self> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(FilterError::InvalidParameter(format!(
                "gaussian sigma must be > 0, got {sigma}"
            )));
        }
        let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as usize;
        let denom = 2.0 * sigma * sigma;
        let taps: Vec<f32> = (0..=2 * radius)
            .map(|i| {
                let x = i as f32 - radius as f32;
                (-x * x / denom).exp()
            })
            .collect();
        let sum: f32 = taps.iter().sum();
        let normalized: Vec<f32> = taps.into_iter().map(|t| t / sum).collect();
        let weights = Array2::from_shape_vec((1, normalized.len()), normalized)?;
        Ok(Self { weights })
    }

    /// Swap rows and columns.
    pub fn transposed(&self) -> Self {
        Self {
            weights: self.weights.t().to_owned(),
        }
    }

    /// `(rows, cols)` of the kernel.
    pub fn dim(&self) -> (usize, usize) {
        self.weights.dim()
    }

    pub fn weights(&self) -> ArrayView2<'_, f32> {
        self.weights.view()
    }

    /// Upcast the weights to the working precision.
    pub(crate) fn cast<F: Precision>(&self) -> Array2<F> {
        self.weights.mapv(|w| w.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_kernel_rejected() {
        let err = Kernel::new(Array2::zeros((0, 3))).unwrap_err();
        assert_eq!(err, FilterError::EmptyKernel);
    }

    #[test]
    fn test_sobel_kernels_are_transposes() {
        assert_eq!(Kernel::sobel_x().transposed(), Kernel::sobel_y());
    }

    #[test]
    fn test_gaussian_row_is_normalized() {
        let k = Kernel::gaussian_row(1.0).unwrap();
        assert_eq!(k.dim(), (1, 9));
        let sum: f32 = k.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // symmetric, peak in the middle
        let w = k.weights();
        assert_eq!(w[[0, 0]], w[[0, 8]]);
        assert!(w[[0, 4]] > w[[0, 3]]);
    }

    #[test]
    fn test_gaussian_rejects_bad_sigma() {
        assert!(Kernel::gaussian_row(0.0).is_err());
        assert!(Kernel::gaussian_row(f32::NAN).is_err());
    }
}
