//! Effect pipeline - ordered effect chain and its scratch resources
//!
//! - `EffectTexturePool` - Ping-pong framebuffers shared by the chain
//! - `Pipeline` - Owns effect instances and threads a frame through them

use std::fmt;

use super::registry::EffectRegistry;
use super::traits::{Effect, EffectError, SurfaceInfo};
use super::types::{ParameterInfo, ParameterSet, RangePolicy};
use crate::gpu_context::RenderContext;
use crate::texture::{Framebuffer, Texture, TextureError};

/// Errors raised by the pipeline itself
///
/// Failures of individual effects are not errors of the pipeline: they are
/// recorded on the effect's entry and the effect is skipped.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("source texture is not valid")]
    InvalidSource,
    #[error("unknown effect {0}")]
    UnknownEffect(EffectId),
    #[error("unknown effect type '{0}'")]
    UnknownEffectType(String),
    #[error("scratch framebuffers are not allocated")]
    NoSurface,
    #[error("scratch framebuffer: {0}")]
    Texture(#[from] TextureError),
}

/// Identifier of an effect within one pipeline. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(pub u32);

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an effect's GPU state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectState {
    /// Not initialized yet; happens on the first frame it is enabled for
    Pending,
    Ready,
    /// Initialization or rendering failed; skipped until re-enabled
    Failed(String),
}

/// Pipeline behaviour taken from `PipelineSettings`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Format of the scratch framebuffers and of every effect's output
    pub scratch_format: wgpu::TextureFormat,
    /// Whether `add_effect` enables the new effect
    pub enable_new_effects: bool,
    /// Out-of-range handling for parameters of added effects
    pub range_policy: RangePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scratch_format: wgpu::TextureFormat::Rgba8Unorm,
            enable_new_effects: false,
            range_policy: RangePolicy::Reject,
        }
    }
}

/// Manages intermediate framebuffers for effect chain processing
///
/// Uses a ping-pong strategy: effects alternate reading from one framebuffer
/// and writing to the other, avoiding per-effect allocation.
pub struct EffectTexturePool {
    framebuffers: [Framebuffer; 2],
}

impl EffectTexturePool {
    pub fn new(
        ctx: &RenderContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<Self, TextureError> {
        let first = Framebuffer::with_label(ctx, width, height, format, "Effect Texture A")?;
        let second = match Framebuffer::with_label(ctx, width, height, format, "Effect Texture B") {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                let mut first = first;
                first.delete(ctx);
                return Err(e);
            }
        };
        Ok(Self {
            framebuffers: [first, second],
        })
    }

    /// Resize both framebuffers if dimensions changed
    pub fn resize(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), TextureError> {
        for framebuffer in &mut self.framebuffers {
            framebuffer.resize(ctx, width, height)?;
        }
        Ok(())
    }

    /// Framebuffer 0 or 1
    pub fn get(&self, index: usize) -> &Framebuffer {
        &self.framebuffers[index % 2]
    }

    /// Target for the next effect when the previous one wrote `current`
    ///
    /// The first effect of a frame writes to 0, then the chain alternates.
    pub fn next_target(current: Option<usize>) -> usize {
        match current {
            Some(index) => 1 - index % 2,
            None => 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.framebuffers[0].size()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.framebuffers[0].format()
    }

    pub fn delete(&mut self, ctx: &RenderContext) {
        for framebuffer in &mut self.framebuffers {
            framebuffer.delete(ctx);
        }
    }
}

/// One effect in the pipeline
pub struct PipelineEntry {
    id: EffectId,
    effect: Box<dyn Effect>,
    enabled: bool,
    state: EffectState,
}

impl PipelineEntry {
    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn effect(&self) -> &dyn Effect {
        self.effect.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> &EffectState {
        &self.state
    }

    fn is_active(&self) -> bool {
        self.enabled && !matches!(self.state, EffectState::Failed(_))
    }

    /// Record a failure and free whatever the effect allocated
    fn fail(&mut self, ctx: &RenderContext, error: EffectError) {
        log::error!(
            "Effect {} '{}' failed and will be skipped: {}",
            self.id,
            self.effect.name(),
            error
        );
        self.effect.release(ctx);
        self.state = EffectState::Failed(error.to_string());
    }
}

/// Ordered chain of effects applied to each frame
///
/// All methods taking a `RenderContext` must run on the render thread. The
/// pipeline owns its effects; removing an effect releases its GPU state.
pub struct Pipeline {
    options: PipelineOptions,
    entries: Vec<PipelineEntry>,
    next_id: u32,
    /// Size declared by the surface lifecycle, if any
    surface: Option<(u32, u32)>,
    pool: Option<EffectTexturePool>,
    /// Pool index holding the last rendered frame
    last_output: Option<usize>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
            next_id: 1,
            surface: None,
            pool: None,
            last_output: None,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Append an effect at the end of the chain
    pub fn add_effect(&mut self, effect: Box<dyn Effect>) -> EffectId {
        let id = EffectId(self.next_id);
        self.next_id += 1;

        effect.parameters().set_policy(self.options.range_policy);
        log::debug!("Added effect {} '{}'", id, effect.name());

        self.entries.push(PipelineEntry {
            id,
            effect,
            enabled: self.options.enable_new_effects,
            state: EffectState::Pending,
        });
        id
    }

    /// Instantiate a registered effect type and append it
    pub fn add_effect_type(&mut self, registry: &EffectRegistry, effect_type: &str) -> Result<EffectId, PipelineError> {
        let effect = registry
            .create(effect_type)
            .ok_or_else(|| PipelineError::UnknownEffectType(effect_type.to_string()))?;
        Ok(self.add_effect(effect))
    }

    /// Remove an effect and release its GPU state
    pub fn remove_effect(&mut self, ctx: &RenderContext, id: EffectId) -> Result<(), PipelineError> {
        let pos = self.position(id)?;
        let mut entry = self.entries.remove(pos);
        entry.effect.release(ctx);
        log::debug!("Removed effect {} '{}'", id, entry.effect.name());
        Ok(())
    }

    /// Move an effect to a new index (clamped to the chain length)
    pub fn move_effect(&mut self, id: EffectId, new_index: usize) -> Result<(), PipelineError> {
        let pos = self.position(id)?;
        let entry = self.entries.remove(pos);
        let index = new_index.min(self.entries.len());
        self.entries.insert(index, entry);
        Ok(())
    }

    /// Include or exclude an effect from rendering without touching its state.
    ///
    /// Enabling a failed effect gives it another initialization attempt.
    pub fn set_enabled(&mut self, id: EffectId, enabled: bool) -> Result<(), PipelineError> {
        let pos = self.position(id)?;
        let entry = &mut self.entries[pos];
        entry.enabled = enabled;
        if enabled && matches!(entry.state, EffectState::Failed(_)) {
            entry.state = EffectState::Pending;
        }
        Ok(())
    }

    pub fn is_enabled(&self, id: EffectId) -> Result<bool, PipelineError> {
        Ok(self.entry(id)?.enabled)
    }

    /// Effects in application order
    pub fn effects(&self) -> impl Iterator<Item = &PipelineEntry> {
        self.entries.iter()
    }

    pub fn entry(&self, id: EffectId) -> Result<&PipelineEntry, PipelineError> {
        Ok(&self.entries[self.position(id)?])
    }

    /// Index of an effect in the chain
    pub fn position(&self, id: EffectId) -> Result<usize, PipelineError> {
        self.entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(PipelineError::UnknownEffect(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameters of one effect
    pub fn parameters(&self, id: EffectId) -> Result<&ParameterSet, PipelineError> {
        Ok(self.entry(id)?.effect.parameters())
    }

    /// Descriptors of every effect's parameters, in chain order
    pub fn parameter_infos(&self) -> Vec<(EffectId, Vec<ParameterInfo>)> {
        self.entries
            .iter()
            .map(|e| (e.id, e.effect.parameters().infos()))
            .collect()
    }

    /// Effects that failed to initialize or render, with the reason
    pub fn failures(&self) -> impl Iterator<Item = (EffectId, &str)> {
        self.entries.iter().filter_map(|e| match &e.state {
            EffectState::Failed(reason) => Some((e.id, reason.as_str())),
            _ => None,
        })
    }

    /// Output of the last frame that ran at least one effect.
    ///
    /// `None` if the last frame passed the source through unchanged.
    pub fn last_output(&self) -> Option<&Texture> {
        let index = self.last_output?;
        self.pool.as_ref().map(|pool| pool.get(index).texture())
    }

    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.surface
    }

    // ---- surface lifecycle -----------------------------------------------

    pub fn on_surface_created(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), PipelineError> {
        log::info!("Surface created: {}x{}", width, height);
        self.surface = Some((width, height));
        self.ensure_size(ctx, width, height)
    }

    pub fn on_surface_changed(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), PipelineError> {
        log::info!("Surface changed: {}x{}", width, height);
        self.surface = Some((width, height));
        self.ensure_size(ctx, width, height)
    }

    /// Release every GPU resource of the pipeline and its effects.
    ///
    /// Effects keep their parameters and are initialized again on the next
    /// frame after a new surface exists.
    pub fn on_surface_destroyed(&mut self, ctx: &RenderContext) {
        log::info!("Surface destroyed, releasing {} effects", self.entries.len());
        ctx.wait_idle();

        if let Some(mut pool) = self.pool.take() {
            pool.delete(ctx);
        }
        self.last_output = None;
        self.surface = None;

        for entry in &mut self.entries {
            entry.effect.release(ctx);
            entry.state = EffectState::Pending;
        }
        ctx.clear_current_program();
    }

    /// Resize the scratch pool and initialized effects to `width`x`height`
    fn ensure_size(&mut self, ctx: &RenderContext, width: u32, height: u32) -> Result<(), PipelineError> {
        match self.pool.as_mut() {
            Some(pool) if pool.dimensions() == (width, height) => return Ok(()),
            Some(pool) => pool.resize(ctx, width, height)?,
            None => {
                self.pool = Some(EffectTexturePool::new(ctx, width, height, self.options.scratch_format)?);
            }
        }
        self.last_output = None;

        for entry in &mut self.entries {
            if entry.state != EffectState::Ready {
                continue;
            }
            if let Err(e) = entry.effect.resize(ctx, width, height) {
                entry.fail(ctx, e);
            }
        }
        Ok(())
    }

    // ---- rendering -------------------------------------------------------

    /// Run `source` through every enabled effect in order.
    ///
    /// Returns the final output, or `source` itself if no effect is enabled.
    /// Effects are initialized lazily; one that fails is logged, marked
    /// failed and skipped while the rest of the chain still runs.
    pub fn render_frame<'a>(
        &'a mut self,
        ctx: &RenderContext,
        source: &'a Texture,
    ) -> Result<&'a Texture, PipelineError> {
        ctx.ensure_render_thread();

        if !source.is_valid() {
            log::warn!("render_frame called with a deleted source texture");
            return Err(PipelineError::InvalidSource);
        }

        if !self.entries.iter().any(PipelineEntry::is_active) {
            self.last_output = None;
            return Ok(source);
        }

        let (width, height) = self.surface.unwrap_or_else(|| source.size());
        self.ensure_size(ctx, width, height)?;
        let surface = SurfaceInfo {
            width,
            height,
            format: self.options.scratch_format,
        };

        let Self {
            entries,
            pool,
            last_output,
            ..
        } = self;
        let pool = pool.as_ref().ok_or(PipelineError::NoSurface)?;

        let mut current: Option<usize> = None;
        for entry in entries.iter_mut().filter(|e| e.is_active()) {
            if entry.state == EffectState::Pending {
                if let Err(e) = entry.effect.initialize(ctx, surface) {
                    entry.fail(ctx, e);
                    continue;
                }
                log::debug!("Initialized effect {} '{}'", entry.id, entry.effect.name());
                entry.state = EffectState::Ready;
            }

            let input = match current {
                Some(index) => pool.get(index).texture(),
                None => source,
            };
            let target = EffectTexturePool::next_target(current);

            if let Err(e) = entry.effect.apply(ctx, input, pool.get(target)) {
                entry.fail(ctx, e);
                continue;
            }
            current = Some(target);
        }

        ctx.clear_current_program();
        *last_output = current;
        Ok(match current {
            Some(index) => pool.get(index).texture(),
            None => source,
        })
    }
}
