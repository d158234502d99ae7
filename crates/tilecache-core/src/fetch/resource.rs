use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::ImageFormat;

use crate::models::TileCoordinate;

use super::FetchError;

/// Where a resolved tile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileOrigin {
    Network,
    Cache,
    Placeholder,
}

impl fmt::Display for TileOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TileOrigin::Network => "network",
            TileOrigin::Cache => "cache",
            TileOrigin::Placeholder => "placeholder",
        };
        f.write_str(label)
    }
}

/// Counts image resources handed out and not yet released.
#[derive(Debug, Clone, Default)]
pub struct ImageTracker {
    live: Arc<AtomicUsize>,
}

impl ImageTracker {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn register(&self) -> LiveToken {
        self.live.fetch_add(1, Ordering::SeqCst);
        LiveToken(self.live.clone())
    }
}

#[derive(Debug)]
struct LiveToken(Arc<AtomicUsize>);

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A displayable tile. Owning it keeps it counted as live; dropping it (or
/// calling [`TileImage::release`]) gives it back.
#[derive(Debug)]
pub struct TileImage {
    coordinate: TileCoordinate,
    bytes: Arc<[u8]>,
    format: ImageFormat,
    origin: TileOrigin,
    _token: LiveToken,
}

impl TileImage {
    /// Wrap encoded image bytes, rejecting anything that isn't an image.
    pub(crate) fn decode(
        coordinate: TileCoordinate,
        bytes: impl Into<Arc<[u8]>>,
        origin: TileOrigin,
        tracker: &ImageTracker,
    ) -> Result<Self, FetchError> {
        let bytes = bytes.into();
        let format = image::guess_format(&bytes).map_err(|_| FetchError::NotAnImage)?;
        Ok(Self {
            coordinate,
            bytes,
            format,
            origin,
            _token: tracker.register(),
        })
    }

    pub(crate) fn placeholder(coordinate: TileCoordinate, png: Arc<[u8]>, tracker: &ImageTracker) -> Self {
        Self {
            coordinate,
            bytes: png,
            format: ImageFormat::Png,
            origin: TileOrigin::Placeholder,
            _token: tracker.register(),
        }
    }

    pub fn coordinate(&self) -> TileCoordinate {
        self.coordinate
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn origin(&self) -> TileOrigin {
        self.origin
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == TileOrigin::Placeholder
    }

    /// Explicitly hand the resource back once it has been drawn.
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn test_decode_recognises_png() {
        let tracker = ImageTracker::default();
        let image = TileImage::decode(TileCoordinate::new(0, 0, 0), PNG_MAGIC.to_vec(), TileOrigin::Cache, &tracker)
            .unwrap();
        assert_eq!(image.format(), ImageFormat::Png);
        assert_eq!(image.content_type(), "image/png");
        assert_eq!(image.origin(), TileOrigin::Cache);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let tracker = ImageTracker::default();
        let result = TileImage::decode(TileCoordinate::new(0, 0, 0), b"<html>".to_vec(), TileOrigin::Network, &tracker);
        assert!(matches!(result, Err(FetchError::NotAnImage)));
        assert_eq!(tracker.live(), 0);
    }

    #[test]
    fn test_release_decrements_live_count() {
        let tracker = ImageTracker::default();
        let a = TileImage::decode(TileCoordinate::new(1, 0, 0), PNG_MAGIC.to_vec(), TileOrigin::Cache, &tracker)
            .unwrap();
        let b = TileImage::placeholder(TileCoordinate::new(1, 1, 0), Arc::from(PNG_MAGIC), &tracker);
        assert_eq!(tracker.live(), 2);

        a.release();
        assert_eq!(tracker.live(), 1);
        drop(b);
        assert_eq!(tracker.live(), 0);
    }
}
