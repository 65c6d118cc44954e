//! Effect traits
//!
//! - `Effect` - a GPU-rendered stage the pipeline applies to a frame
//! - `EffectDefinition` - factory trait for creating effect instances by type

use super::types::{ParameterError, ParameterSet};
use crate::gpu_context::RenderContext;
use crate::shaders::ShaderError;
use crate::texture::{Framebuffer, Texture, TextureError};

/// Errors raised by effects
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("effect '{effect}': {source}")]
    Shader {
        effect: String,
        #[source]
        source: ShaderError,
    },
    #[error("effect '{effect}': {source}")]
    Texture {
        effect: String,
        #[source]
        source: TextureError,
    },
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("effect '{0}' is not initialized")]
    NotInitialized(String),
}

impl EffectError {
    pub fn shader(effect: &str, source: ShaderError) -> Self {
        EffectError::Shader {
            effect: effect.to_string(),
            source,
        }
    }

    pub fn texture(effect: &str, source: TextureError) -> Self {
        EffectError::Texture {
            effect: effect.to_string(),
            source,
        }
    }
}

/// Render surface an effect draws for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    /// Format of the framebuffers passed to `Effect::apply`
    pub format: wgpu::TextureFormat,
}

/// A GPU-rendered transformation stage with adjustable parameters.
///
/// Parameters exist from construction so a control surface can list and set
/// them before the effect ever runs. GPU state is created by `initialize`,
/// which the pipeline calls lazily on first use, and destroyed by `release`.
/// All methods taking a `RenderContext` run on the render thread.
pub trait Effect: Send {
    /// Type identifier the effect was registered under
    fn effect_type(&self) -> &'static str;

    /// Human-readable name
    fn name(&self) -> &str;

    fn parameters(&self) -> &ParameterSet;

    fn is_initialized(&self) -> bool;

    /// Compile programs and allocate private resources for `surface`.
    ///
    /// Replays the current parameter values into the new shader state.
    fn initialize(&mut self, ctx: &RenderContext, surface: SurfaceInfo) -> Result<(), EffectError>;

    /// Render `input` into `output`. Leaves no program current.
    fn apply(&mut self, ctx: &RenderContext, input: &Texture, output: &Framebuffer) -> Result<(), EffectError>;

    /// The rendering surface changed size.
    fn resize(&mut self, _ctx: &RenderContext, _width: u32, _height: u32) -> Result<(), EffectError> {
        Ok(())
    }

    /// Release all GPU resources. The effect can be initialized again later.
    fn release(&mut self, ctx: &RenderContext);
}

/// Factory for one effect type
///
/// Each effect type implements this trait to provide metadata and create
/// instances. Definitions are registered with the `EffectRegistry` at
/// startup.
pub trait EffectDefinition: Send + Sync {
    /// Unique identifier for this effect type (e.g., "flip", "flowabs")
    fn effect_type(&self) -> &'static str;

    /// Human-readable display name (e.g., "Flip", "Flow Abstraction")
    fn display_name(&self) -> &'static str;

    /// Category for grouping (e.g., "Color", "Transform", "Stylize")
    fn category(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Create an uninitialized instance
    fn create(&self) -> Box<dyn Effect>;
}
