//! Core data types for the Whisker pipeline.
//!
//! [`ImageRecord`] is the unit of work that flows through the stages;
//! [`BatchReport`] is what a batch hands back to its caller.

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array2, Array3, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::error::{FilterError, FilterResult, PipelineError, PipelineResult};

/// Pixel payload of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// 8-bit `H × W × 3` display form
    Rgb(Array3<u8>),
    /// Single-channel floating-point intermediate (e.g. edge strength)
    Luma(Array2<f32>),
}

impl Frame {
    /// Convert a decoded image to 3-channel 8-bit form.
    pub fn from_dynamic(image: &DynamicImage) -> FilterResult<Self> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let array = Array3::from_shape_vec((height as usize, width as usize, 3), rgb.into_raw())?;
        Ok(Frame::Rgb(array))
    }

    /// Narrow to an encodable 8-bit image.
    ///
    /// Floating-point values are clamped to `0..=255` and truncated.
    pub fn to_dynamic(&self) -> FilterResult<DynamicImage> {
        let (height, width) = self.dimensions();
        match self {
            Frame::Rgb(array) => {
                let channels = array.dim().2;
                if channels != 3 {
                    return Err(FilterError::ChannelCount {
                        expected: 3,
                        actual: channels,
                    });
                }
                let raw: Vec<u8> = array.iter().copied().collect();
                RgbImage::from_raw(width as u32, height as u32, raw)
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(|| {
                        FilterError::Shape(format!("cannot build {width}x{height} RGB buffer"))
                    })
            }
            Frame::Luma(array) => {
                let raw: Vec<u8> = array.iter().map(|&v| v.clamp(0.0, 255.0) as u8).collect();
                GrayImage::from_raw(width as u32, height as u32, raw)
                    .map(DynamicImage::ImageLuma8)
                    .ok_or_else(|| {
                        FilterError::Shape(format!("cannot build {width}x{height} gray buffer"))
                    })
            }
        }
    }

    /// `(height, width)`.
    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            Frame::Rgb(a) => (a.dim().0, a.dim().1),
            Frame::Luma(a) => a.dim(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Frame::Rgb(a) => a.shape(),
            Frame::Luma(a) => a.shape(),
        }
    }

    /// Element-wise sum clamped to `0..=255`.
    ///
    /// A luma operand is broadcast across the channels of an RGB one.
    pub fn saturating_add(&self, other: &Frame) -> FilterResult<Frame> {
        self.combine(other, |a, b| a + b)
    }

    /// Element-wise difference clamped to `0..=255`.
    pub fn saturating_sub(&self, other: &Frame) -> FilterResult<Frame> {
        self.combine(other, |a, b| a - b)
    }

    fn combine(&self, other: &Frame, op: impl Fn(f32, f32) -> f32) -> FilterResult<Frame> {
        match (self, other) {
            (Frame::Luma(a), Frame::Luma(b)) => {
                ensure_same_shape(a.shape(), b.shape())?;
                Ok(Frame::Luma(
                    Zip::from(a)
                        .and(b)
                        .map_collect(|&x, &y| op(x, y).clamp(0.0, 255.0)),
                ))
            }
            _ => {
                let a = self.to_rgb_f32();
                let b = other.to_rgb_f32();
                ensure_same_shape(a.shape(), b.shape())?;
                Ok(Frame::Rgb(
                    Zip::from(&a)
                        .and(&b)
                        .map_collect(|&x, &y| op(x, y).clamp(0.0, 255.0) as u8),
                ))
            }
        }
    }

    fn to_rgb_f32(&self) -> Array3<f32> {
        match self {
            Frame::Rgb(a) => a.mapv(f32::from),
            Frame::Luma(l) => {
                let (height, width) = l.dim();
                Array3::from_shape_fn((height, width, 3), |(y, x, _)| l[[y, x]])
            }
        }
    }
}

fn ensure_same_shape(left: &[usize], right: &[usize]) -> FilterResult<()> {
    if left != right {
        return Err(FilterError::ShapeMismatch {
            left: left.to_vec(),
            right: right.to_vec(),
        });
    }
    Ok(())
}

/// An image plus its provenance.
///
/// Records are never mutated; every stage that changes the payload builds a
/// new record carrying the same index.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    index: usize,
    origin: Option<String>,
    image: Option<Frame>,
}

impl ImageRecord {
    /// A discovered record whose payload has not been downloaded yet.
    pub fn pending(index: usize, origin: impl Into<String>) -> Self {
        Self {
            index,
            origin: Some(origin.into()),
            image: None,
        }
    }

    pub fn new(index: usize, origin: Option<String>, image: Frame) -> Self {
        Self {
            index,
            origin,
            image: Some(image),
        }
    }

    /// A copy of this record with `image` as its payload.
    pub fn with_image(&self, image: Frame) -> Self {
        Self {
            index: self.index,
            origin: self.origin.clone(),
            image: Some(image),
        }
    }

    /// 1-based ordinal assigned at discovery.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn image(&self) -> Option<&Frame> {
        self.image.as_ref()
    }

    /// The payload, or [`PipelineError::MissingData`].
    pub fn require_image(&self) -> PipelineResult<&Frame> {
        self.image
            .as_ref()
            .ok_or(PipelineError::MissingData { index: self.index })
    }

    /// Payload-wise saturating sum; provenance is taken from `self`.
    pub fn saturating_add(&self, other: &ImageRecord) -> PipelineResult<ImageRecord> {
        self.combine(other, Frame::saturating_add)
    }

    /// Payload-wise saturating difference; provenance is taken from `self`.
    pub fn saturating_sub(&self, other: &ImageRecord) -> PipelineResult<ImageRecord> {
        self.combine(other, Frame::saturating_sub)
    }

    fn combine(
        &self,
        other: &ImageRecord,
        op: impl Fn(&Frame, &Frame) -> FilterResult<Frame>,
    ) -> PipelineResult<ImageRecord> {
        let lhs = self.require_image()?;
        let rhs = other.require_image()?;
        let frame = op(lhs, rhs).map_err(|source| PipelineError::Filter {
            index: self.index,
            source,
        })?;
        Ok(self.with_image(frame))
    }
}

/// Pipeline stage at which an item can be excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discover,
    Download,
    Process,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discover => "discover",
            Stage::Download => "download",
            Stage::Process => "process",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// An item dropped from the batch, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub index: usize,
    pub stage: Stage,
    pub reason: String,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchReport {
    /// Descriptors returned by the metadata endpoint
    pub discovered: usize,

    /// Records with a decoded payload
    pub downloaded: usize,

    /// Records the extractor succeeded on
    pub processed: usize,

    /// Processed items whose original and derived outputs were all written
    pub persisted: usize,

    /// Every file written, in index order
    pub files: Vec<PathBuf>,

    /// Per-item failures, in stage then index order
    pub exclusions: Vec<Exclusion>,

    /// Wall-clock duration of the batch in seconds
    pub total_seconds: f64,
}

impl BatchReport {
    /// Number of distinct items excluded at any stage.
    pub fn excluded(&self) -> usize {
        self.exclusions
            .iter()
            .map(|e| e.index)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn exclusions_at(&self, stage: Stage) -> impl Iterator<Item = &Exclusion> {
        self.exclusions.iter().filter(move |e| e.stage == stage)
    }

    /// Persisted items per second of wall-clock time.
    pub fn images_per_second(&self) -> f64 {
        if self.total_seconds > 0.0 {
            self.persisted as f64 / self.total_seconds
        } else {
            0.0
        }
    }
}
