//! Intensity transforms: luma reduction and gamma lookup.

use ndarray::{Array, Array2, ArrayView, ArrayView3, Dimension};

use super::Precision;
use crate::error::{FilterError, FilterResult};

/// ITU-R BT.601 luma weights for R, G, B.
pub const BT601_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Number of entries in the gamma lookup table (one per 8-bit level).
const LUT_SIZE: usize = 256;

/// Collapse an `H × W × C` image to `H × W` luma.
///
/// Only the first three channels contribute, so RGBA input is accepted and
/// its alpha ignored. `weights` defaults to [`BT601_WEIGHTS`].
pub fn to_grayscale<T, F>(
    image: ArrayView3<'_, T>,
    weights: Option<[F; 3]>,
) -> FilterResult<Array2<F>>
where
    T: Copy,
    F: Precision + From<T>,
{
    let (height, width, channels) = image.dim();
    if channels < 3 {
        return Err(FilterError::ChannelCount {
            expected: 3,
            actual: channels,
        });
    }
    let weights = weights.unwrap_or_else(|| BT601_WEIGHTS.map(|w| w.into()));

    Ok(Array2::from_shape_fn((height, width), |(y, x)| {
        (0..3).fold(F::zero(), |acc, c| {
            let v: F = image[[y, x, c]].into();
            acc + v * weights[c]
        })
    }))
}

/// Build the 256-entry table `255 · (i/255)^(1/γ)`.
pub fn gamma_table<F: Precision>(gamma: F) -> FilterResult<Vec<F>> {
    if !(gamma > F::zero() && gamma.is_finite()) {
        return Err(FilterError::InvalidGamma(gamma.to_f64().unwrap_or(f64::NAN)));
    }
    let max: F = 255u8.into();
    let inv_gamma = F::one() / gamma;
    Ok((0..LUT_SIZE)
        .map(|i| {
            let level: F = (i as u8).into();
            (level / max).powf(inv_gamma) * max
        })
        .collect())
}

/// Apply gamma correction through a lookup table.
///
/// Each pixel is truncated to an integer level in `0..=255` and replaced by
/// the table entry; any array shape is accepted.
pub fn gamma_correction<T, F, D>(image: ArrayView<'_, T, D>, gamma: F) -> FilterResult<Array<F, D>>
where
    T: Copy,
    F: Precision + From<T>,
    D: Dimension,
{
    let table = gamma_table(gamma)?;
    Ok(image.mapv(|v| {
        let v: F = v.into();
        let level = v.to_usize().unwrap_or(0).min(LUT_SIZE - 1);
        table[level]
    }))
}
