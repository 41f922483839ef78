//! Decoding of downloaded bytes with format sniffing, size limits, and timeout.

use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::LimitsConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::types::Frame;

/// Turns raw response bodies into 3-channel 8-bit frames.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

impl ImageDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode on the blocking pool, bounded by `limits.decode_timeout_ms`.
    pub async fn decode(&self, index: usize, url: &str, bytes: Vec<u8>) -> PipelineResult<Frame> {
        let decode_error = |message: String| PipelineError::Decode {
            index,
            url: url.to_string(),
            message,
        };
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let decode_result = timeout(
            timeout_duration,
            tokio::task::spawn_blocking(move || decode_bytes_sync(bytes)),
        )
        .await;

        let image = match decode_result {
            Ok(Ok(Ok(image))) => image,
            Ok(Ok(Err(message))) => return Err(decode_error(message)),
            Ok(Err(e)) => return Err(decode_error(format!("Task join error: {e}"))),
            Err(_) => {
                return Err(decode_error(format!(
                    "timed out after {}ms",
                    self.limits.decode_timeout_ms
                )))
            }
        };

        let (width, height) = image.dimensions();
        let max_dim = self.limits.max_image_dimension;
        if width > max_dim || height > max_dim {
            return Err(decode_error(format!("image is {width}x{height}, limit is {max_dim}")));
        }

        Frame::from_dynamic(&image).map_err(|e| decode_error(e.to_string()))
    }
}

/// Synchronous decode (runs in spawn_blocking).
fn decode_bytes_sync(bytes: Vec<u8>) -> Result<DynamicImage, String> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| format!("Cannot detect image format: {e}"))?;
    if reader.format().is_none() {
        return Err("Unrecognized image format".to_string());
    }
    reader.decode().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let pixels = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let image = DynamicImage::ImageRgb8(pixels);
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn test_decode_png() {
        let decoder = ImageDecoder::new(LimitsConfig::default());
        let bytes = png_bytes(4, 3);
        let frame = decoder.decode(1, "http://img/1.png", bytes).await.unwrap();
        assert_eq!(frame.shape(), &[3, 4, 3]);
    }

    #[tokio::test]
    async fn test_garbage_is_decode_error() {
        let decoder = ImageDecoder::new(LimitsConfig::default());
        let err = decoder
            .decode(2, "http://img/2.png", b"<html>not an image</html>".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Decode { index: 2, .. }));
    }

    #[tokio::test]
    async fn test_oversized_image_rejected() {
        let decoder = ImageDecoder::new(LimitsConfig {
            max_image_dimension: 8,
            ..LimitsConfig::default()
        });
        let err = decoder
            .decode(5, "http://img/5.png", png_bytes(16, 2))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit is 8"));
    }
}
