//! Same-size 2D cross-correlation with configurable border handling.
//!
//! The kernel is slid over the image without flipping. Images are padded by
//! `rows/2` and `cols/2` on each side so the output always has the input's
//! spatial shape, including for even-sized kernels (the trailing row/column
//! of the valid region is cropped). Three-dimensional inputs are treated as
//! `H × W × C` and each channel is filtered independently with the same
//! kernel.

use ndarray::{s, Array, Array2, Array3, ArrayView, ArrayView2, Axis, Dimension, Ix2, Ix3};

use super::{Kernel, Precision};
use crate::error::{FilterError, FilterResult};

/// How pixels outside the image are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Border {
    /// Out-of-bounds pixels are zero.
    #[default]
    Zero,
    /// Half-sample symmetric mirror: `d c b a | a b c d | d c b a`.
    Reflect,
}

/// Correlate an `H × W` or `H × W × C` image with `kernel`.
///
/// The image is upcast to `F` before any arithmetic and the result stays in
/// `F`; narrowing back to 8-bit is left to the caller.
pub fn convolve<T, F, D>(
    image: ArrayView<'_, T, D>,
    kernel: &Kernel,
    border: Border,
) -> FilterResult<Array<F, D>>
where
    T: Copy,
    F: Precision + From<T>,
    D: Dimension,
{
    match image.ndim() {
        2 => {
            let plane = image.into_dimensionality::<Ix2>()?;
            let out = convolve_plane::<T, F>(plane, kernel, border)?;
            Ok(out.into_dimensionality::<D>()?)
        }
        3 => {
            let cube = image.into_dimensionality::<Ix3>()?;
            let (height, width, channels) = cube.dim();
            if height == 0 || width == 0 {
                return Err(FilterError::EmptyImage { height, width });
            }
            let mut out = Array3::<F>::zeros((height, width, channels));
            for (c, plane) in cube.axis_iter(Axis(2)).enumerate() {
                let filtered = convolve_plane::<T, F>(plane, kernel, border)?;
                out.index_axis_mut(Axis(2), c).assign(&filtered);
            }
            Ok(out.into_dimensionality::<D>()?)
        }
        n => Err(FilterError::UnsupportedRank(n)),
    }
}

/// Correlate a single plane.
pub fn convolve_plane<T, F>(
    plane: ArrayView2<'_, T>,
    kernel: &Kernel,
    border: Border,
) -> FilterResult<Array2<F>>
where
    T: Copy,
    F: Precision + From<T>,
{
    let (height, width) = plane.dim();
    if height == 0 || width == 0 {
        return Err(FilterError::EmptyImage { height, width });
    }

    let (kh, kw) = kernel.dim();
    let padded = pad::<T, F>(plane, kh / 2, kw / 2, border);
    let (ph, pw) = padded.dim();
    if kh > ph || kw > pw {
        return Err(FilterError::KernelTooLarge {
            kernel: (kh, kw),
            padded: (ph, pw),
        });
    }

    let weights = kernel.cast::<F>();
    // Exactly height × width windows fit in this region for odd and even kernels.
    let region = padded.slice(s![..height + kh - 1, ..width + kw - 1]);

    let mut out = Array2::<F>::zeros((height, width));
    for (o, window) in out.iter_mut().zip(region.windows((kh, kw))) {
        *o = window
            .iter()
            .zip(weights.iter())
            .fold(F::zero(), |acc, (&x, &w)| acc + x * w);
    }
    Ok(out)
}

fn pad<T, F>(plane: ArrayView2<'_, T>, pad_h: usize, pad_w: usize, border: Border) -> Array2<F>
where
    T: Copy,
    F: Precision + From<T>,
{
    let (height, width) = plane.dim();
    let shape = (height + 2 * pad_h, width + 2 * pad_w);
    match border {
        Border::Zero => {
            let mut padded = Array2::<F>::zeros(shape);
            padded
                .slice_mut(s![pad_h..pad_h + height, pad_w..pad_w + width])
                .zip_mut_with(&plane, |dst, &src| *dst = src.into());
            padded
        }
        Border::Reflect => Array2::from_shape_fn(shape, |(i, j)| {
            let y = reflect_index(i as isize - pad_h as isize, height);
            let x = reflect_index(j as isize - pad_w as isize, width);
            plane[[y, x]].into()
        }),
    }
}

/// Map a possibly out-of-range coordinate into `0..len` by mirroring.
fn reflect_index(mut i: isize, len: usize) -> usize {
    let n = len as isize;
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}
