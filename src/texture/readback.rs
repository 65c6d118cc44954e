//! Synchronous GPU → CPU texture read-back

use half::f16;

use super::{Texture, TextureError};
use crate::gpu_context::RenderContext;

/// Texel layouts `read_rgba8` can convert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Rgba8,
    Bgra8,
    Rgba16Float,
}

impl Layout {
    fn of(format: wgpu::TextureFormat) -> Result<Self, TextureError> {
        match format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Ok(Layout::Rgba8),
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => Ok(Layout::Bgra8),
            wgpu::TextureFormat::Rgba16Float => Ok(Layout::Rgba16Float),
            other => Err(TextureError::UnsupportedFormat(other)),
        }
    }

    fn bytes_per_texel(self) -> u32 {
        match self {
            Layout::Rgba8 | Layout::Bgra8 => 4,
            Layout::Rgba16Float => 8,
        }
    }

    /// Append one row of texels to `out` as RGBA8.
    fn convert_row(self, row: &[u8], out: &mut Vec<u8>) {
        match self {
            Layout::Rgba8 => out.extend_from_slice(row),
            Layout::Bgra8 => {
                for px in row.chunks_exact(4) {
                    out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                }
            }
            Layout::Rgba16Float => {
                for channel in row.chunks_exact(2) {
                    let value = f16::from_le_bytes([channel[0], channel[1]]).to_f32();
                    out.push(unorm8(value));
                }
            }
        }
    }
}

/// Quantize a linear [0, 1] value to 8 bits; NaN maps to 0.
fn unorm8(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Copy `texture` into a staging buffer, wait for the GPU, and return
/// tightly packed RGBA8 rows.
pub(super) fn read_rgba8(ctx: &RenderContext, texture: &Texture) -> Result<Vec<u8>, TextureError> {
    let layout = Layout::of(texture.format())?;
    let raw = texture.raw()?;
    let (width, height) = texture.size();

    let unpadded_bytes_per_row = width * layout.bytes_per_texel();
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

    let staging = ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx.create_encoder("Readback Encoder");
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: raw,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.submit(encoder);

    let slice = staging.slice(..);
    let (tx, rx) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.wait_idle();

    match rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(TextureError::Readback(e.to_string())),
        Err(_) => return Err(TextureError::Readback("map callback dropped".into())),
    }

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    {
        let data = slice.get_mapped_range();
        // Strip row padding
        for row in data.chunks_exact(padded_bytes_per_row as usize).take(height as usize) {
            layout.convert_row(&row[..unpadded_bytes_per_row as usize], &mut pixels);
        }
    }
    staging.unmap();

    Ok(pixels)
}
