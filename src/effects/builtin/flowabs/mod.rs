//! Flow-based abstraction
//!
//! Image abstraction after Kyprianidis and Döllner: a smoothed structure
//! tensor gives the local edge flow, which guides a separated bilateral
//! filter, difference-of-Gaussians edges, soft luminance quantization and a
//! final flow-aligned smoothing pass. Each stage is also available as its
//! own effect showing that stage's intermediate result.

mod engine;
mod stages;

pub use engine::SCRATCH_FORMAT;
pub use stages::{plan, stage_parameters, FlowAbsSettings, Pass, ProgramKind, Slot, Stage};

use engine::FlowAbsEngine;

use crate::effects::traits::{Effect, EffectDefinition, EffectError, SurfaceInfo};
use crate::effects::types::ParameterSet;
use crate::effects::uniforms::UniformQueue;
use crate::gpu_context::RenderContext;
use crate::texture::{Framebuffer, Texture};

/// Flow abstraction effect definition, one per stage
pub struct FlowAbsDefinition {
    pub stage: Stage,
}

impl EffectDefinition for FlowAbsDefinition {
    fn effect_type(&self) -> &'static str {
        self.stage.effect_type()
    }

    fn display_name(&self) -> &'static str {
        self.stage.display_name()
    }

    fn category(&self) -> &'static str {
        "Stylize"
    }

    fn description(&self) -> &'static str {
        self.stage.description()
    }

    fn create(&self) -> Box<dyn Effect> {
        Box::new(FlowAbsEffect::new(self.stage))
    }
}

/// The flow abstraction chain, run up to `stage`
pub struct FlowAbsEffect {
    stage: Stage,
    parameters: ParameterSet,
    queue: UniformQueue,
    settings: FlowAbsSettings,
    engine: Option<FlowAbsEngine>,
}

impl FlowAbsEffect {
    pub fn new(stage: Stage) -> Self {
        let queue = UniformQueue::new();
        let parameters = stage_parameters(stage, &queue).unwrap_or_else(|e| {
            log::warn!("{}: {}", stage.display_name(), e);
            ParameterSet::default()
        });
        Self {
            stage,
            parameters,
            queue,
            settings: FlowAbsSettings::default(),
            engine: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Settings as of the last applied frame
    pub fn settings(&self) -> &FlowAbsSettings {
        &self.settings
    }

    fn sync_settings(&mut self) {
        for write in self.queue.drain() {
            self.settings.apply(&write);
        }
    }
}

impl Effect for FlowAbsEffect {
    fn effect_type(&self) -> &'static str {
        self.stage.effect_type()
    }

    fn name(&self) -> &str {
        self.stage.display_name()
    }

    fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    fn initialize(&mut self, ctx: &RenderContext, surface: SurfaceInfo) -> Result<(), EffectError> {
        if let Some(mut engine) = self.engine.take() {
            engine.release(ctx);
        }
        self.engine = Some(FlowAbsEngine::new(ctx, self.stage.display_name(), self.stage, surface)?);
        self.parameters.replay_all();
        Ok(())
    }

    fn apply(&mut self, ctx: &RenderContext, input: &Texture, output: &Framebuffer) -> Result<(), EffectError> {
        self.sync_settings();
        let passes = plan(self.stage, &self.settings);
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| EffectError::NotInitialized(self.stage.display_name().to_string()))?;
        engine.run(ctx, &passes, input, output)
    }

    fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), EffectError> {
        match self.engine.as_mut() {
            Some(engine) => engine.resize(ctx, width, height),
            None => Ok(()),
        }
    }

    fn release(&mut self, ctx: &RenderContext) {
        if let Some(mut engine) = self.engine.take() {
            engine.release(ctx);
        }
    }
}
