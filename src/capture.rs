//! Frame capture
//!
//! Reads a rendered texture back from the GPU and writes it as a PNG.

use std::path::Path;

use image::RgbaImage;

use crate::gpu_context::RenderContext;
use crate::texture::{Texture, TextureError};

/// Errors raised while capturing a frame
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read frame back: {0}")]
    Readback(#[from] TextureError),
    #[error("readback returned {actual} bytes for a {width}x{height} frame")]
    BufferSize { width: u32, height: u32, actual: usize },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Read `texture` back into an RGBA image
pub fn capture_image(ctx: &RenderContext, texture: &Texture) -> Result<RgbaImage, CaptureError> {
    let (width, height) = texture.size();
    let pixels = texture.read_rgba8(ctx)?;
    let actual = pixels.len();
    RgbaImage::from_raw(width, height, pixels).ok_or(CaptureError::BufferSize { width, height, actual })
}

/// Read `texture` back and save it as a PNG at `path`
pub fn capture_png(ctx: &RenderContext, texture: &Texture, path: &Path) -> Result<(), CaptureError> {
    let image = capture_image(ctx, texture)?;
    save_png(&image, path)?;
    tracing::info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "Captured frame"
    );
    Ok(())
}

/// Encode `image` as PNG regardless of the file extension
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), CaptureError> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|source| CaptureError::Encode {
            path: path.display().to_string(),
            source,
        })
}
