//! Compiled shader programs with resolved uniform slots

use std::collections::HashMap;

use glam::Mat4;

use crate::gpu_context::{ProgramId, RenderContext};
use crate::texture::{Framebuffer, Texture, TextureError};

/// Name of the implicit uniform holding the input texture transform
pub const TRANSFORM_UNIFORM: &str = "transform";

/// Errors raised by shader programs
#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to compile program '{label}': {diagnostic}")]
    Compile { label: String, diagnostic: String },
    #[error("program '{program}' has no uniform named '{name}'")]
    UnknownUniform { program: String, name: String },
    #[error("program '{program}' is not current")]
    NotCurrent { program: String },
    #[error("uniform '{name}' expects {expected:?}, got {actual:?}")]
    TypeMismatch {
        name: String,
        expected: UniformType,
        actual: UniformType,
    },
    #[error("program '{program}' expects {expected} input textures, got {actual}")]
    InputCount {
        program: String,
        expected: usize,
        actual: usize,
    },
    #[error("program '{0}' has been deleted")]
    Deleted(String),
    #[error(transparent)]
    Texture(#[from] TextureError),
}

/// Host-side type of a uniform block member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Int,
    /// Stored as `u32` in WGSL
    Bool,
    Vec2,
    Vec4,
    Mat4,
}

impl UniformType {
    /// WGSL uniform address space (size, alignment)
    fn layout(self) -> (usize, usize) {
        match self {
            UniformType::Float | UniformType::Int | UniformType::Bool => (4, 4),
            UniformType::Vec2 => (8, 8),
            UniformType::Vec4 => (16, 16),
            UniformType::Mat4 => (64, 16),
        }
    }
}

/// A value written into a uniform slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    /// Row-major 4×4 matrix
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Bool(_) => UniformType::Bool,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    fn write(&self, dst: &mut [u8]) {
        match self {
            UniformValue::Float(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Int(v) => dst.copy_from_slice(bytemuck::bytes_of(v)),
            UniformValue::Bool(v) => dst.copy_from_slice(bytemuck::bytes_of(&(*v as u32))),
            UniformValue::Vec2(v) => dst.copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Vec4(v) => dst.copy_from_slice(bytemuck::cast_slice(v)),
            UniformValue::Mat4(row_major) => {
                // WGSL matrices are column-major
                let columns = Mat4::from_cols_array(row_major).transpose().to_cols_array();
                dst.copy_from_slice(bytemuck::cast_slice(&columns));
            }
        }
    }
}

/// Declaration of one uniform block member after the implicit transform
#[derive(Debug, Clone, Copy)]
pub struct UniformDecl {
    pub name: &'static str,
    pub ty: UniformType,
}

impl UniformDecl {
    pub const fn new(name: &'static str, ty: UniformType) -> Self {
        Self { name, ty }
    }
}

/// Everything needed to build a program
#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    /// WGSL fragment module exporting `fs_main`
    pub fragment: &'a str,
    /// Uniform block members in declaration order, excluding `transform`
    pub uniforms: &'a [UniformDecl],
    /// Number of sampled input textures
    pub inputs: usize,
    /// Format of the render target
    pub format: wgpu::TextureFormat,
}

#[derive(Debug, Clone, Copy)]
struct UniformSlot {
    offset: usize,
    ty: UniformType,
}

/// Resolve byte offsets of every uniform; returns the slots and block size.
fn resolve_layout(uniforms: &[UniformDecl]) -> (HashMap<&'static str, UniformSlot>, usize) {
    let mut slots = HashMap::with_capacity(uniforms.len() + 1);
    let mut offset = 0usize;

    let members = std::iter::once(UniformDecl::new(TRANSFORM_UNIFORM, UniformType::Mat4))
        .chain(uniforms.iter().copied());
    for decl in members {
        let (size, align) = decl.ty.layout();
        offset = offset.next_multiple_of(align);
        slots.insert(decl.name, UniformSlot { offset, ty: decl.ty });
        offset += size;
    }

    // Uniform structs are 16-byte aligned
    (slots, offset.next_multiple_of(16))
}

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

/// A render pipeline plus its uniform block.
///
/// Uniform writes are staged on the host and uploaded right before the next
/// draw. Each draw is submitted on its own, so successive draws of the same
/// program observe the uniform values set in between.
pub struct ShaderProgram {
    id: Option<ProgramId>,
    label: String,
    gpu: Option<GpuProgram>,
    slots: HashMap<&'static str, UniformSlot>,
    staging: Vec<u8>,
    dirty: bool,
    inputs: usize,
    format: wgpu::TextureFormat,
}

impl ShaderProgram {
    /// Compile a fragment module against the shared vertex stage.
    ///
    /// Validation runs inside an error scope; any diagnostic becomes
    /// `ShaderError::Compile` and nothing is registered with the context.
    pub fn compile(ctx: &RenderContext, desc: &ProgramDesc<'_>) -> Result<Self, ShaderError> {
        ctx.ensure_render_thread();
        let device = ctx.device();
        let (slots, block_size) = resolve_layout(desc.uniforms);

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.fragment.into()),
        });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        for i in 0..desc.inputs {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.label),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: ctx.vertex_module(),
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Compile {
                label: desc.label.to_string(),
                diagnostic: error.to_string(),
            });
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: block_size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut staging = vec![0u8; block_size];
        UniformValue::Mat4(IDENTITY_ROW_MAJOR).write(&mut staging[..64]);

        let id = ctx.register_program();
        log::debug!("Compiled program '{}' as {:?}", desc.label, id);

        Ok(Self {
            id: Some(id),
            label: desc.label.to_string(),
            gpu: Some(GpuProgram {
                pipeline,
                bind_group_layout,
                uniform_buffer,
                sampler,
            }),
            slots,
            staging,
            dirty: true,
            inputs: desc.inputs,
            format: desc.format,
        })
    }

    pub fn id(&self) -> Option<ProgramId> {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_valid(&self) -> bool {
        self.gpu.is_some()
    }

    /// Render target format this program was built for
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn has_uniform(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Make this program current on the context.
    pub fn use_program(&self, ctx: &RenderContext) -> Result<(), ShaderError> {
        let id = self.id.ok_or_else(|| ShaderError::Deleted(self.label.clone()))?;
        ctx.set_current_program(Some(id));
        Ok(())
    }

    fn ensure_current(&self, ctx: &RenderContext) -> Result<(), ShaderError> {
        let id = self.id.ok_or_else(|| ShaderError::Deleted(self.label.clone()))?;
        if ctx.current_program() != Some(id) {
            return Err(ShaderError::NotCurrent {
                program: self.label.clone(),
            });
        }
        Ok(())
    }

    /// Stage a uniform value. The program must be current.
    pub fn set_uniform(
        &mut self,
        ctx: &RenderContext,
        name: &str,
        value: UniformValue,
    ) -> Result<(), ShaderError> {
        self.ensure_current(ctx)?;
        let slot = *self.slots.get(name).ok_or_else(|| ShaderError::UnknownUniform {
            program: self.label.clone(),
            name: name.to_string(),
        })?;
        if slot.ty != value.ty() {
            return Err(ShaderError::TypeMismatch {
                name: name.to_string(),
                expected: slot.ty,
                actual: value.ty(),
            });
        }

        let (size, _) = slot.ty.layout();
        value.write(&mut self.staging[slot.offset..slot.offset + size]);
        self.dirty = true;
        Ok(())
    }

    /// Draw one full-surface pass sampling `inputs` into `target`.
    ///
    /// The first input's transform matrix is applied to texture coordinates.
    /// The pass is submitted immediately. A target whose format differs from
    /// the one the program was compiled for is `IncompleteFramebuffer`.
    pub fn draw(
        &mut self,
        ctx: &RenderContext,
        inputs: &[&Texture],
        target: &Framebuffer,
    ) -> Result<(), ShaderError> {
        self.ensure_current(ctx)?;
        if inputs.len() != self.inputs {
            return Err(ShaderError::InputCount {
                program: self.label.clone(),
                expected: self.inputs,
                actual: inputs.len(),
            });
        }
        if target.format() != self.format {
            return Err(TextureError::IncompleteFramebuffer {
                reason: format!(
                    "program '{}' renders {:?}, target is {:?}",
                    self.label,
                    self.format,
                    target.format()
                ),
            }
            .into());
        }

        let transform = inputs
            .first()
            .map(|texture| texture.transform_matrix())
            .unwrap_or(IDENTITY_ROW_MAJOR);
        self.set_uniform(ctx, TRANSFORM_UNIFORM, UniformValue::Mat4(transform))?;

        let gpu = self
            .gpu
            .as_ref()
            .ok_or_else(|| ShaderError::Deleted(self.label.clone()))?;

        if self.dirty {
            ctx.queue().write_buffer(&gpu.uniform_buffer, 0, &self.staging);
            self.dirty = false;
        }

        let views = inputs
            .iter()
            .map(|texture| texture.view())
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: gpu.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&gpu.sampler),
            },
        ];
        for (i, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &gpu.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = ctx.create_encoder(&self.label);
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&self.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.target_view()?,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&gpu.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        ctx.submit(encoder);
        Ok(())
    }

    /// Release the program. Safe to call more than once.
    pub fn delete(&mut self, ctx: &RenderContext) {
        if let Some(gpu) = self.gpu.take() {
            gpu.uniform_buffer.destroy();
        }
        if let Some(id) = self.id.take() {
            ctx.release_program(id);
            log::debug!("Deleted program '{}' {:?}", self.label, id);
        }
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("inputs", &self.inputs)
            .finish()
    }
}

const IDENTITY_ROW_MAJOR: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];
