//! Flow-based abstraction engine
//!
//! Owns the compiled programs and the scratch framebuffers shared by the
//! stages, and executes planned passes over them.

use std::collections::HashMap;

use super::stages::{plan, widest_settings, Pass, ProgramKind, Slot, Stage};
use crate::effects::traits::{EffectError, SurfaceInfo};
use crate::gpu_context::RenderContext;
use crate::shaders::{ProgramDesc, ShaderProgram};
use crate::texture::{Framebuffer, Texture};

/// Intermediate results keep signed and >1 values (tensor, Lab, DoG)
pub const SCRATCH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub(crate) struct FlowAbsEngine {
    name: &'static str,
    programs: HashMap<ProgramKind, ShaderProgram>,
    scratch: HashMap<Slot, Framebuffer>,
}

impl FlowAbsEngine {
    /// Compile the programs and allocate the scratch slots `stage` needs.
    ///
    /// On failure everything allocated so far is released again.
    pub fn new(
        ctx: &RenderContext,
        name: &'static str,
        stage: Stage,
        surface: SurfaceInfo,
    ) -> Result<Self, EffectError> {
        let mut engine = Self {
            name,
            programs: HashMap::new(),
            scratch: HashMap::new(),
        };
        if let Err(e) = engine.allocate(ctx, stage, surface) {
            engine.release(ctx);
            return Err(e);
        }
        Ok(engine)
    }

    fn allocate(&mut self, ctx: &RenderContext, stage: Stage, surface: SurfaceInfo) -> Result<(), EffectError> {
        for pass in plan(stage, &widest_settings()) {
            if !self.programs.contains_key(&pass.program) {
                let format = if pass.output == Slot::Output {
                    surface.format
                } else {
                    SCRATCH_FORMAT
                };
                let program = ShaderProgram::compile(
                    ctx,
                    &ProgramDesc {
                        label: pass.program.label(),
                        fragment: pass.program.fragment(),
                        uniforms: pass.program.uniforms(),
                        inputs: pass.program.inputs(),
                        format,
                    },
                )
                .map_err(|e| EffectError::shader(self.name, e))?;
                self.programs.insert(pass.program, program);
            }

            if pass.output != Slot::Output && !self.scratch.contains_key(&pass.output) {
                let framebuffer = Framebuffer::with_label(
                    ctx,
                    surface.width,
                    surface.height,
                    SCRATCH_FORMAT,
                    "FlowAbs Scratch",
                )
                .map_err(|e| EffectError::texture(self.name, e))?;
                self.scratch.insert(pass.output, framebuffer);
            }
        }

        log::debug!(
            "{}: {} programs, {} scratch framebuffers at {}x{}",
            self.name,
            self.programs.len(),
            self.scratch.len(),
            surface.width,
            surface.height
        );
        Ok(())
    }

    pub fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), EffectError> {
        for framebuffer in self.scratch.values_mut() {
            framebuffer
                .resize(ctx, width, height)
                .map_err(|e| EffectError::texture(self.name, e))?;
        }
        Ok(())
    }

    /// Execute `passes` in order. Leaves no program current.
    pub fn run(
        &mut self,
        ctx: &RenderContext,
        passes: &[Pass],
        source: &Texture,
        output: &Framebuffer,
    ) -> Result<(), EffectError> {
        let result = self.run_passes(ctx, passes, source, output);
        ctx.clear_current_program();
        result
    }

    fn run_passes(
        &mut self,
        ctx: &RenderContext,
        passes: &[Pass],
        source: &Texture,
        output: &Framebuffer,
    ) -> Result<(), EffectError> {
        let name = self.name;
        let Self { programs, scratch, .. } = self;

        for pass in passes {
            let program = programs
                .get_mut(&pass.program)
                .ok_or_else(|| EffectError::NotInitialized(format!("{} ({})", name, pass.program.label())))?;

            let inputs = pass
                .inputs
                .iter()
                .map(|slot| match slot {
                    Slot::Source => Ok(source),
                    slot => scratch
                        .get(slot)
                        .map(|framebuffer| framebuffer.texture())
                        .ok_or_else(|| EffectError::NotInitialized(format!("{} ({:?})", name, slot))),
                })
                .collect::<Result<Vec<&Texture>, _>>()?;

            let target = match pass.output {
                Slot::Output => output,
                slot => scratch
                    .get(&slot)
                    .ok_or_else(|| EffectError::NotInitialized(format!("{} ({:?})", name, slot)))?,
            };

            program.use_program(ctx).map_err(|e| EffectError::shader(name, e))?;
            for (uniform, value) in &pass.uniforms {
                program
                    .set_uniform(ctx, uniform, *value)
                    .map_err(|e| EffectError::shader(name, e))?;
            }
            program
                .draw(ctx, &inputs, target)
                .map_err(|e| EffectError::shader(name, e))?;
        }
        Ok(())
    }

    /// Delete every program and scratch framebuffer. Idempotent.
    pub fn release(&mut self, ctx: &RenderContext) {
        for (_, mut program) in self.programs.drain() {
            program.delete(ctx);
        }
        for (_, mut framebuffer) in self.scratch.drain() {
            framebuffer.delete(ctx);
        }
    }
}
