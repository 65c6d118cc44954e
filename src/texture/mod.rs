//! GPU textures and render targets
//!
//! A `Texture` owns a wgpu texture plus a 4×4 transform matrix applied to
//! texture coordinates when the texture is sampled (a camera sensor's
//! orientation, for instance). A `Framebuffer` is a texture that effects can
//! draw into. Both are deleted explicitly through the `RenderContext` that
//! created them; deletion is idempotent.

mod framebuffer;
mod readback;

pub use framebuffer::Framebuffer;

use glam::Mat4;

use crate::gpu_context::{RenderContext, TextureHandle};

/// Errors raised by texture and framebuffer operations
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("texture has been deleted")]
    Deleted,
    #[error("invalid texture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("incomplete framebuffer: {reason}")]
    IncompleteFramebuffer { reason: String },
    #[error("pixel data is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("cannot read back {0:?} textures")]
    UnsupportedFormat(wgpu::TextureFormat),
    #[error("texture read-back failed: {0}")]
    Readback(String),
}

/// Storage of a live texture
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// A GPU texture with a caller-settable coordinate transform.
pub struct Texture {
    handle: Option<TextureHandle>,
    gpu: Option<GpuTexture>,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    transform: Mat4,
    label: &'static str,
}

impl Texture {
    /// Default usage for sampled textures
    const SAMPLED_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
        .union(wgpu::TextureUsages::COPY_DST)
        .union(wgpu::TextureUsages::COPY_SRC);

    /// Allocate an uninitialized sampled texture.
    pub fn new(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self, TextureError> {
        Self::with_usage(ctx, width, height, format, Self::SAMPLED_USAGE, "Texture")
    }

    /// Create a texture holding tightly packed RGBA8 pixels, top row first.
    pub fn from_rgba8(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, TextureError> {
        let texture = Self::new(ctx, width, height, wgpu::TextureFormat::Rgba8Unorm)?;
        texture.upload_rgba8(ctx, pixels)?;
        Ok(texture)
    }

    pub(crate) fn with_usage(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &'static str,
    ) -> Result<Self, TextureError> {
        check_size(ctx, width, height)?;

        let gpu = Self::allocate(ctx, width, height, format, usage, label);
        let handle = ctx.register_texture();
        log::debug!("Created {} {:?} ({}x{}, {:?})", label, handle, width, height, format);

        Ok(Self {
            handle: Some(handle),
            gpu: Some(gpu),
            width,
            height,
            format,
            usage,
            transform: Mat4::IDENTITY,
            label,
        })
    }

    fn allocate(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> GpuTexture {
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture { texture, view }
    }

    /// Upload tightly packed RGBA8 pixels covering the whole texture.
    pub fn upload_rgba8(&self, ctx: &RenderContext, pixels: &[u8]) -> Result<(), TextureError> {
        let gpu = self.gpu.as_ref().ok_or(TextureError::Deleted)?;
        let expected = rgba8_len(self.width, self.height)?;
        if pixels.len() != expected {
            return Err(TextureError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Reallocate storage for new dimensions.
    ///
    /// No-op when the size is unchanged. Otherwise the old handle is released
    /// and a fresh one is issued; contents are undefined afterwards.
    pub fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), TextureError> {
        if self.gpu.is_some() && self.width == width && self.height == height {
            return Ok(());
        }
        check_size(ctx, width, height)?;

        self.delete(ctx);
        self.gpu = Some(Self::allocate(ctx, width, height, self.format, self.usage, self.label));
        self.handle = Some(ctx.register_texture());
        self.width = width;
        self.height = height;

        log::debug!("Resized {} to {}x{} as {:?}", self.label, width, height, self.handle);
        Ok(())
    }

    /// Release the GPU texture. Safe to call more than once.
    pub fn delete(&mut self, ctx: &RenderContext) {
        if let Some(gpu) = self.gpu.take() {
            gpu.texture.destroy();
        }
        if let Some(handle) = self.handle.take() {
            ctx.release_texture(handle);
            log::debug!("Deleted {} {:?}", self.label, handle);
        }
    }

    /// Handle of the live texture, `None` once deleted
    pub fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// View used for sampling and rendering.
    pub fn view(&self) -> Result<&wgpu::TextureView, TextureError> {
        self.gpu.as_ref().map(|gpu| &gpu.view).ok_or(TextureError::Deleted)
    }

    pub(crate) fn raw(&self) -> Result<&wgpu::Texture, TextureError> {
        self.gpu.as_ref().map(|gpu| &gpu.texture).ok_or(TextureError::Deleted)
    }

    /// Texture coordinate transform as a row-major 4×4 matrix.
    pub fn transform_matrix(&self) -> [f32; 16] {
        self.transform.transpose().to_cols_array()
    }

    /// Set the texture coordinate transform from a row-major 4×4 matrix.
    pub fn set_transform_matrix(&mut self, row_major: [f32; 16]) {
        self.transform = Mat4::from_cols_array(&row_major).transpose();
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// Read the texture back as tightly packed RGBA8 pixels, top row first.
    ///
    /// Blocks until the GPU has finished all submitted work.
    pub fn read_rgba8(&self, ctx: &RenderContext) -> Result<Vec<u8>, TextureError> {
        readback::read_rgba8(ctx, self)
    }
}

/// Reject empty sizes and sizes beyond the device's 2D texture limit.
fn check_size(ctx: &RenderContext, width: u32, height: u32) -> Result<(), TextureError> {
    let max = ctx.device().limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(TextureError::InvalidSize { width, height });
    }
    Ok(())
}

/// Byte length of tightly packed RGBA8 pixels
fn rgba8_len(width: u32, height: u32) -> Result<usize, TextureError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|texels| texels.checked_mul(4))
        .ok_or(TextureError::InvalidSize { width, height })
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("handle", &self.handle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(handle) = self.handle {
            log::debug!("{} {:?} dropped without delete()", self.label, handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_row_major_round_trip() {
        let row_major = [
            1.0, 0.0, 0.0, 0.5, //
            0.0, -1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let transform = Mat4::from_cols_array(&row_major).transpose();
        // Translation lives in the last row-major column
        assert_eq!(transform.w_axis.x, 0.5);
        assert_eq!(transform.w_axis.y, 1.0);
        assert_eq!(transform.transpose().to_cols_array(), row_major);
    }

    #[test]
    fn test_rgba8_len_does_not_overflow() {
        assert_eq!(rgba8_len(4, 2).unwrap(), 32);
        assert_eq!(rgba8_len(16_384, 16_384).unwrap(), 1usize << 30);
        assert!(rgba8_len(u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn test_texture_error_display() {
        let err = TextureError::SizeMismatch { expected: 16, actual: 4 };
        assert_eq!(err.to_string(), "pixel data is 4 bytes, expected 16");
    }
}
