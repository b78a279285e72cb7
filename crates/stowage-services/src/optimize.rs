//! Optional re-encoding of image uploads before they are staged.

use bytes::Bytes;

/// Bounds applied by an [`ImageOptimizer`].
#[derive(Debug, Clone)]
pub struct OptimizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub content_type: String,
}

impl OptimizeOptions {
    pub fn for_content_type(content_type: impl Into<String>) -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            content_type: content_type.into(),
        }
    }
}

/// `optimize(buffer, opts) -> buffer`. Implementations must hand back the input
/// unchanged when they cannot process it.
pub trait ImageOptimizer: Send + Sync {
    fn optimize(&self, data: Bytes, options: &OptimizeOptions) -> Bytes;
}

/// Leaves every buffer untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOptimizer;

impl ImageOptimizer for NoopOptimizer {
    fn optimize(&self, data: Bytes, _options: &OptimizeOptions) -> Bytes {
        data
    }
}

#[cfg(feature = "image")]
pub use resize::ResizeOptimizer;

#[cfg(feature = "image")]
mod resize {
    use super::{ImageOptimizer, OptimizeOptions};
    use bytes::Bytes;
    use image::imageops::FilterType;
    use image::{GenericImageView, ImageFormat};
    use std::io::Cursor;

    /// Shrinks images to fit within the configured bounds and re-encodes them in
    /// their original format. Images already within bounds are returned as is.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ResizeOptimizer;

    impl ResizeOptimizer {
        fn format_for(content_type: &str) -> Option<ImageFormat> {
            match content_type {
                "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
                "image/png" => Some(ImageFormat::Png),
                "image/gif" => Some(ImageFormat::Gif),
                "image/webp" => Some(ImageFormat::WebP),
                _ => None,
            }
        }

        fn try_optimize(data: &[u8], options: &OptimizeOptions) -> Result<Option<Bytes>, anyhow::Error> {
            let Some(format) = Self::format_for(&options.content_type) else {
                return Ok(None);
            };
            let img = image::load_from_memory_with_format(data, format)?;
            let (width, height) = img.dimensions();
            if width <= options.max_width && height <= options.max_height {
                return Ok(None);
            }

            let resized = img.resize(options.max_width, options.max_height, FilterType::Lanczos3);
            let mut buffer = Vec::new();
            resized.write_to(&mut Cursor::new(&mut buffer), format)?;

            tracing::debug!(
                from_width = width,
                from_height = height,
                to_width = resized.width(),
                to_height = resized.height(),
                "Image resized"
            );
            Ok(Some(Bytes::from(buffer)))
        }
    }

    impl ImageOptimizer for ResizeOptimizer {
        fn optimize(&self, data: Bytes, options: &OptimizeOptions) -> Bytes {
            match Self::try_optimize(&data, options) {
                Ok(Some(optimized)) => optimized,
                Ok(None) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "Image optimization failed, keeping original");
                    data
                }
            }
        }
    }

}
