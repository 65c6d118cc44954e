//! Single-program effects
//!
//! Most effects are one fragment shader over the input plus a few uniforms
//! driven by parameters. `ShaderEffect` implements `Effect` for all of them.

use std::sync::Arc;

use super::traits::{Effect, EffectError, SurfaceInfo};
use super::types::{Parameter, ParameterError, ParameterSet};
use super::uniforms::UniformQueue;
use crate::gpu_context::RenderContext;
use crate::shaders::{ProgramDesc, ShaderProgram, UniformDecl};
use crate::texture::{Framebuffer, Texture};

/// An effect backed by exactly one shader program
pub struct ShaderEffect {
    effect_type: &'static str,
    name: &'static str,
    fragment: &'static str,
    uniforms: &'static [UniformDecl],
    parameters: ParameterSet,
    queue: UniformQueue,
    program: Option<ShaderProgram>,
}

impl ShaderEffect {
    pub fn new(
        effect_type: &'static str,
        name: &'static str,
        fragment: &'static str,
        uniforms: &'static [UniformDecl],
    ) -> Self {
        Self {
            effect_type,
            name,
            fragment,
            uniforms,
            parameters: ParameterSet::new(),
            queue: UniformQueue::new(),
            program: None,
        }
    }

    /// Queue that parameter delegates of this effect should write to
    pub fn queue(&self) -> &UniformQueue {
        &self.queue
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<Arc<Parameter>, ParameterError> {
        self.parameters.add(parameter)
    }

    /// Add a parameter forwarding its value unchanged to `uniform`.
    pub fn bind_parameter(
        &mut self,
        parameter: Parameter,
        uniform: &'static str,
    ) -> Result<Arc<Parameter>, ParameterError> {
        let delegate = self.queue.delegate(uniform);
        self.parameters.add(parameter.with_delegate(delegate))
    }

    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }
}

impl Effect for ShaderEffect {
    fn effect_type(&self) -> &'static str {
        self.effect_type
    }

    fn name(&self) -> &str {
        self.name
    }

    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn is_initialized(&self) -> bool {
        self.program.is_some()
    }

    fn initialize(&mut self, ctx: &RenderContext, surface: SurfaceInfo) -> Result<(), EffectError> {
        if let Some(mut old) = self.program.take() {
            old.delete(ctx);
        }

        let program = ShaderProgram::compile(
            ctx,
            &ProgramDesc {
                label: self.name,
                fragment: self.fragment,
                uniforms: self.uniforms,
                inputs: 1,
                format: surface.format,
            },
        )
        .map_err(|e| EffectError::shader(self.name, e))?;
        self.program = Some(program);

        // Fresh uniform block: push every current value again
        self.parameters.replay_all();
        Ok(())
    }

    fn apply(&mut self, ctx: &RenderContext, input: &Texture, output: &Framebuffer) -> Result<(), EffectError> {
        let program = self
            .program
            .as_mut()
            .ok_or_else(|| EffectError::NotInitialized(self.name.to_string()))?;

        let result = self
            .queue
            .apply_to(ctx, program)
            .and_then(|()| program.draw(ctx, &[input], output));
        ctx.clear_current_program();
        result.map_err(|e| EffectError::shader(self.name, e))
    }

    fn release(&mut self, ctx: &RenderContext) {
        if let Some(mut program) = self.program.take() {
            program.delete(ctx);
        }
        // Pending writes target the deleted program; initialize() replays
        self.queue.drain().for_each(drop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{UniformType, FLIP_SHADER};

    const UNIFORMS: &[UniformDecl] = &[UniformDecl::new("mode", UniformType::Int)];

    #[test]
    fn test_bind_parameter_reports_duplicates() {
        let mut effect = ShaderEffect::new("test", "Test", FLIP_SHADER, UNIFORMS);
        effect.bind_parameter(Parameter::int("Mode", 0, 3, 1), "mode").unwrap();
        let err = effect
            .bind_parameter(Parameter::int("Mode", 0, 3, 2), "mode")
            .unwrap_err();
        assert_eq!(err, ParameterError::DuplicateName("Mode".into()));
        assert_eq!(effect.parameters().len(), 1);
        assert!(!effect.is_initialized());
    }

    #[test]
    fn test_pending_writes_coalesce_until_applied() {
        let mut effect = ShaderEffect::new("test", "Test", FLIP_SHADER, UNIFORMS);
        let mode = effect.bind_parameter(Parameter::int("Mode", 0, 3, 1), "mode").unwrap();
        for value in [0, 2, 3, 0, 2] {
            mode.set_int(value).unwrap();
        }
        assert_eq!(effect.queue().len(), 1);
    }
}
