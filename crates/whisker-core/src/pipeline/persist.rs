//! PNG output store keyed by ordinal index.

use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Frame, ImageRecord};

/// Which artifact of an item a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// The downloaded image
    Original,
    /// Extractor output
    Processed,
    /// `original - edges`
    Enhanced,
}

impl OutputKind {
    fn suffix(self) -> &'static str {
        match self {
            OutputKind::Original => "original",
            OutputKind::Processed => "processed",
            OutputKind::Enhanced => "enhanced",
        }
    }
}

/// Writes `{index}_{kind}.png` files into one directory.
///
/// Each file is written to a `.part` sibling first and renamed into place,
/// so a reader never observes a truncated PNG.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if absent.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn path_for(&self, index: usize, kind: OutputKind) -> PathBuf {
        self.dir.join(format!("{index}_{}.png", kind.suffix()))
    }

    /// Encode the record's payload as PNG and write it.
    pub async fn write(
        &self,
        record: Arc<ImageRecord>,
        kind: OutputKind,
    ) -> PipelineResult<PathBuf> {
        let path = self.path_for(record.index(), kind);
        let persist_error = |message: String| PipelineError::Persist {
            path: path.clone(),
            message,
        };

        let encoded = tokio::task::spawn_blocking(move || encode_png(&record))
            .await
            .map_err(|e| persist_error(format!("Task join error: {e}")))?
            .map_err(persist_error)?;

        let part = path.with_extension("png.part");
        tokio::fs::write(&part, &encoded)
            .await
            .map_err(|e| persist_error(e.to_string()))?;
        tokio::fs::rename(&part, &path)
            .await
            .map_err(|e| persist_error(e.to_string()))?;

        tracing::trace!("Wrote {:?} ({} bytes)", path, encoded.len());
        Ok(path)
    }

    /// Read a stored file back as an 8-bit frame.
    pub async fn read(&self, index: usize, kind: OutputKind) -> PipelineResult<Frame> {
        let path = self.path_for(index, kind);
        let persist_error = |message: String| PipelineError::Persist {
            path: path.clone(),
            message,
        };
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| persist_error(e.to_string()))?;
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(|e| persist_error(e.to_string()))?;
        match kind {
            OutputKind::Processed if image.color().channel_count() == 1 => {
                let gray = image.to_luma8();
                let (width, height) = gray.dimensions();
                let array = ndarray::Array2::from_shape_vec(
                    (height as usize, width as usize),
                    gray.into_raw().into_iter().map(f32::from).collect(),
                )
                .map_err(|e| persist_error(e.to_string()))?;
                Ok(Frame::Luma(array))
            }
            _ => Frame::from_dynamic(&image).map_err(|e| persist_error(e.to_string())),
        }
    }
}

/// Decode a local image file to 3-channel 8-bit form (blocking).
pub fn read_image_file(path: &Path) -> PipelineResult<Frame> {
    let persist_error = |message: String| PipelineError::Persist {
        path: path.to_path_buf(),
        message,
    };
    let image = image::ImageReader::open(path)
        .map_err(|e| persist_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| persist_error(e.to_string()))?
        .decode()
        .map_err(|e| persist_error(e.to_string()))?;
    Frame::from_dynamic(&image).map_err(|e| persist_error(e.to_string()))
}

/// Encode a frame to `path`, choosing the format from its extension (blocking).
pub fn write_image_file(frame: &Frame, path: &Path) -> PipelineResult<()> {
    let persist_error = |message: String| PipelineError::Persist {
        path: path.to_path_buf(),
        message,
    };
    frame
        .to_dynamic()
        .map_err(|e| persist_error(e.to_string()))?
        .save(path)
        .map_err(|e| persist_error(e.to_string()))
}

fn encode_png(record: &ImageRecord) -> Result<Vec<u8>, String> {
    let frame = record.require_image().map_err(|e| e.to_string())?;
    let image = frame.to_dynamic().map_err(|e| e.to_string())?;
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_naming_scheme() {
        let store = ImageStore::new("/out");
        assert_eq!(
            store.path_for(3, OutputKind::Original),
            PathBuf::from("/out/3_original.png")
        );
        assert_eq!(
            store.path_for(3, OutputKind::Processed),
            PathBuf::from("/out/3_processed.png")
        );
        assert_eq!(
            store.path_for(12, OutputKind::Enhanced),
            PathBuf::from("/out/12_enhanced.png")
        );
    }

    #[tokio::test]
    async fn test_rgb_roundtrip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("nested"));
        store.ensure_dir().await.unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let pixels = Array3::from_shape_fn((9, 13, 3), |_| rng.gen::<u8>());
        let record = Arc::new(ImageRecord::new(1, None, Frame::Rgb(pixels.clone())));

        let path = store.write(record, OutputKind::Original).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("png.part").exists());

        let back = store.read(1, OutputKind::Original).await.unwrap();
        assert_eq!(back, Frame::Rgb(pixels));
    }

    #[tokio::test]
    async fn test_luma_is_written_as_grayscale() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let edges = Array2::from_shape_fn((4, 4), |(y, x)| (y * 60 + x) as f32 + 0.7);
        let record = Arc::new(ImageRecord::new(2, None, Frame::Luma(edges)));

        store.write(record, OutputKind::Processed).await.unwrap();
        let Frame::Luma(back) = store.read(2, OutputKind::Processed).await.unwrap() else {
            panic!("expected a grayscale file");
        };
        // fractional parts are truncated on the way to 8 bits
        assert_eq!(back[[1, 2]], 62.0);
        assert_eq!(back[[3, 3]], 183.0);
    }

    #[tokio::test]
    async fn test_missing_payload_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let record = Arc::new(ImageRecord::pending(5, "http://img/5.png"));
        let err = store.write(record, OutputKind::Original).await.unwrap_err();
        assert!(matches!(err, PipelineError::Persist { .. }));
    }

    #[test]
    fn test_local_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.png");
        let frame = Frame::Luma(Array2::from_elem((3, 5), 254.9));
        write_image_file(&frame, &path).unwrap();

        let back = read_image_file(&path).unwrap();
        assert_eq!(back, Frame::Rgb(Array3::from_elem((3, 5, 3), 254)));
        assert!(read_image_file(&dir.path().join("absent.png")).is_err());
    }

    #[tokio::test]
    async fn test_missing_directory_is_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("does-not-exist"));
        let frame = Frame::Rgb(Array3::zeros((2, 2, 3)));
        let record = Arc::new(ImageRecord::new(1, None, frame));
        let err = store.write(record, OutputKind::Original).await.unwrap_err();
        assert!(err.to_string().contains("1_original.png"));
    }
}
