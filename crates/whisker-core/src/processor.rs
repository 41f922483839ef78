//! Feature extraction on image records.
//!
//! [`ImageProcessor`] holds a [`FeatureExtractor`] and exposes its
//! operations on [`ImageRecord`]s, so the pipeline can schedule work without
//! knowing which extractor runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ProcessingConfig;
use crate::error::{FilterError, PipelineError, PipelineResult};
use crate::filters::{FeatureExtractor, HarrisParams};
use crate::types::{Frame, ImageRecord};

/// Extractor applied during the process stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Sobel gradient magnitude (single channel)
    #[default]
    Edges,
    /// Harris corners painted red on the original
    Corners,
    /// Placeholder; output equals input
    Circles,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Edges => "edges",
            Operation::Corners => "corners",
            Operation::Circles => "circles",
        };
        f.write_str(name)
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "edges" => Ok(Operation::Edges),
            "corners" => Ok(Operation::Corners),
            "circles" => Ok(Operation::Circles),
            other => Err(format!(
                "unknown operation '{other}' (expected edges, corners or circles)"
            )),
        }
    }
}

/// Runs extractors on records. Cheap to share across worker threads.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    extractor: FeatureExtractor<f32>,
    harris: HarrisParams,
    operation: Operation,
}

impl ImageProcessor {
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            harris: HarrisParams {
                k: config.harris_k,
                threshold: config.harris_threshold,
                ..HarrisParams::default()
            },
            operation: config.operation,
        }
    }

    /// The operation [`ImageProcessor::apply`] runs.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Run the configured operation.
    pub fn apply(&self, record: &ImageRecord) -> PipelineResult<ImageRecord> {
        self.apply_operation(self.operation, record)
    }

    pub fn apply_operation(
        &self,
        operation: Operation,
        record: &ImageRecord,
    ) -> PipelineResult<ImageRecord> {
        tracing::trace!(index = record.index(), %operation, "Applying extractor");
        match operation {
            Operation::Edges => self.edge_detection(record),
            Operation::Corners => self.corner_detection(record),
            Operation::Circles => self.circle_detection(record),
        }
    }

    /// Sobel edge strength as a new luma record.
    pub fn edge_detection(&self, record: &ImageRecord) -> PipelineResult<ImageRecord> {
        let edges = match record.require_image()? {
            Frame::Rgb(rgb) => self.extractor.edge_detection(rgb.view()),
            Frame::Luma(gray) => self.extractor.gradient_magnitude(gray.view()),
        }
        .map_err(|source| filter_error(record, source))?;
        Ok(record.with_image(Frame::Luma(edges)))
    }

    /// Copy of the record with Harris corners painted red.
    pub fn corner_detection(&self, record: &ImageRecord) -> PipelineResult<ImageRecord> {
        let rgb = require_rgb(record)?;
        let marked = self
            .extractor
            .corner_detection(rgb.view(), &self.harris)
            .map_err(|source| filter_error(record, source))?;
        Ok(record.with_image(Frame::Rgb(marked)))
    }

    /// Unimplemented extractor; the payload is copied unchanged.
    pub fn circle_detection(&self, record: &ImageRecord) -> PipelineResult<ImageRecord> {
        let rgb = require_rgb(record)?;
        Ok(record.with_image(Frame::Rgb(self.extractor.circle_detection(rgb.view()))))
    }

    /// Gamma-corrected copy. RGB payloads are narrowed back to 8 bits.
    pub fn gamma_correction(
        &self,
        record: &ImageRecord,
        gamma: f32,
    ) -> PipelineResult<ImageRecord> {
        let frame = match record.require_image()? {
            Frame::Rgb(rgb) => {
                let corrected = self
                    .extractor
                    .gamma_correction(rgb.view(), gamma)
                    .map_err(|source| filter_error(record, source))?;
                Frame::Rgb(corrected.mapv(|v| v.clamp(0.0, 255.0) as u8))
            }
            Frame::Luma(gray) => Frame::Luma(
                self.extractor
                    .gamma_correction(gray.view(), gamma)
                    .map_err(|source| filter_error(record, source))?,
            ),
        };
        Ok(record.with_image(frame))
    }

    /// `original - processed`, clamped, keeping the original's provenance.
    pub fn enhance(
        &self,
        original: &ImageRecord,
        processed: &ImageRecord,
    ) -> PipelineResult<ImageRecord> {
        original.saturating_sub(processed)
    }
}

fn require_rgb(record: &ImageRecord) -> PipelineResult<&ndarray::Array3<u8>> {
    match record.require_image()? {
        Frame::Rgb(rgb) => Ok(rgb),
        Frame::Luma(_) => Err(filter_error(
            record,
            FilterError::ChannelCount {
                expected: 3,
                actual: 1,
            },
        )),
    }
}

fn filter_error(record: &ImageRecord, source: FilterError) -> PipelineError {
    PipelineError::Filter {
        index: record.index(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array2, Array3};

    fn processor(operation: Operation) -> ImageProcessor {
        ImageProcessor::new(&ProcessingConfig {
            operation,
            ..ProcessingConfig::default()
        })
    }

    fn square_record() -> ImageRecord {
        let mut image = Array3::<u8>::zeros((20, 20, 3));
        image.slice_mut(s![10.., 10.., ..]).fill(255);
        ImageRecord::new(7, Some("http://img/7.png".into()), Frame::Rgb(image))
    }

    #[test]
    fn test_operation_parse_and_display() {
        assert_eq!("Corners".parse::<Operation>().unwrap(), Operation::Corners);
        assert_eq!(Operation::Circles.to_string(), "circles");
        assert!("blur".parse::<Operation>().is_err());
    }

    #[test]
    fn test_edge_detection_yields_new_luma_record() {
        let input = square_record();
        let out = processor(Operation::Edges).apply(&input).unwrap();
        assert_eq!(out.index(), 7);
        assert_eq!(out.origin(), Some("http://img/7.png"));
        assert!(matches!(out.image(), Some(Frame::Luma(a)) if a.dim() == (20, 20)));
        // the input is untouched
        assert_eq!(input, square_record());
    }

    #[test]
    fn test_edge_detection_accepts_luma() {
        let record = ImageRecord::new(1, None, Frame::Luma(Array2::from_elem((5, 5), 3.0)));
        let out = processor(Operation::Edges).edge_detection(&record).unwrap();
        assert_eq!(out.image().map(Frame::dimensions), Some((5, 5)));
    }

    #[test]
    fn test_missing_payload_fails() {
        let record = ImageRecord::pending(2, "http://img/2.png");
        for op in [Operation::Edges, Operation::Corners, Operation::Circles] {
            let err = processor(op).apply(&record).unwrap_err();
            assert!(matches!(err, PipelineError::MissingData { index: 2 }));
        }
    }

    #[test]
    fn test_corner_detection_marks_square() {
        let input = square_record();
        let out = processor(Operation::Corners).apply(&input).unwrap();
        let Some(Frame::Rgb(marked)) = out.image() else {
            panic!("expected RGB output");
        };
        let reds = marked
            .outer_iter()
            .flat_map(|row| row.outer_iter().map(|px| px.to_vec()).collect::<Vec<_>>())
            .filter(|px| px == &[255, 0, 0])
            .count();
        assert!(reds >= 1);
    }

    #[test]
    fn test_corner_detection_rejects_luma() {
        let record = ImageRecord::new(4, None, Frame::Luma(Array2::zeros((4, 4))));
        let err = processor(Operation::Corners).apply(&record).unwrap_err();
        assert!(matches!(err, PipelineError::Filter { index: 4, .. }));
    }

    #[test]
    fn test_circle_detection_copies_payload() {
        let input = square_record();
        let out = processor(Operation::Circles).apply(&input).unwrap();
        assert_eq!(out.image(), input.image());
    }

    #[test]
    fn test_gamma_correction_brightens() {
        let record = ImageRecord::new(1, None, Frame::Rgb(Array3::from_elem((2, 2, 3), 64)));
        let p = processor(Operation::Edges);
        let out = p.gamma_correction(&record, 2.2).unwrap();
        let Some(Frame::Rgb(px)) = out.image() else {
            panic!("expected RGB output");
        };
        assert!(px.iter().all(|&v| v > 64));
        assert!(p.gamma_correction(&record, 0.0).is_err());
    }

    #[test]
    fn test_enhance_subtracts_edges() {
        let p = processor(Operation::Edges);
        let original = square_record();
        let edges = p.edge_detection(&original).unwrap();
        let enhanced = p.enhance(&original, &edges).unwrap();
        assert_eq!(enhanced.index(), 7);
        assert_eq!(
            enhanced.image().map(Frame::shape),
            Some(&[20usize, 20, 3][..])
        );
    }
}
