//! Render targets

use std::ops::Deref;

use super::{Texture, TextureError};
use crate::gpu_context::RenderContext;

/// A texture that can be drawn into.
///
/// Creation validates that the attachment is complete: non-empty, within
/// device limits, and in a format the device can render to.
pub struct Framebuffer {
    texture: Texture,
}

impl Framebuffer {
    const USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
        .union(wgpu::TextureUsages::TEXTURE_BINDING)
        .union(wgpu::TextureUsages::COPY_DST)
        .union(wgpu::TextureUsages::COPY_SRC);

    pub fn new(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self, TextureError> {
        Self::with_label(ctx, width, height, format, "Framebuffer")
    }

    pub(crate) fn with_label(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &'static str,
    ) -> Result<Self, TextureError> {
        check_complete(ctx, width, height, format)?;
        let texture = Texture::with_usage(ctx, width, height, format, Self::USAGE, label)?;
        Ok(Self { texture })
    }

    /// Reallocate for a new surface size; no-op if unchanged.
    pub fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), TextureError> {
        if self.texture.is_valid() && self.texture.size() == (width, height) {
            return Ok(());
        }
        check_complete(ctx, width, height, self.texture.format())?;
        self.texture.resize(ctx, width, height)
    }

    /// Release the attachment. Safe to call more than once.
    pub fn delete(&mut self, ctx: &RenderContext) {
        self.texture.delete(ctx);
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// View bound as the color attachment when drawing.
    pub(crate) fn target_view(&self) -> Result<&wgpu::TextureView, TextureError> {
        self.texture.view()
    }
}

impl Deref for Framebuffer {
    type Target = Texture;

    fn deref(&self) -> &Texture {
        &self.texture
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Framebuffer").field(&self.texture).finish()
    }
}

fn check_complete(
    ctx: &RenderContext,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> Result<(), TextureError> {
    let max = ctx.device().limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(TextureError::IncompleteFramebuffer {
            reason: format!("attachment size {}x{} outside 1..={}", width, height, max),
        });
    }
    if format.is_depth_stencil_format() || format.is_compressed() {
        return Err(TextureError::IncompleteFramebuffer {
            reason: format!("{:?} is not a color attachment format", format),
        });
    }

    let features = format.guaranteed_format_features(ctx.device().features());
    if !features
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
    {
        return Err(TextureError::IncompleteFramebuffer {
            reason: format!("{:?} cannot be rendered to", format),
        });
    }
    Ok(())
}
