//! Spectaculum Library
//!
//! GPU effect pipeline for video, camera and image frames: an ordered chain
//! of shader effects with live-adjustable parameters, driven from a
//! dedicated render thread.

pub mod capture;
pub mod effects;
pub mod gpu_context;
pub mod renderer;
pub mod settings;
pub mod shaders;
pub mod telemetry;
pub mod texture;

pub use capture::CaptureError;
pub use effects::{
    Effect, EffectDefinition, EffectError, EffectId, EffectRegistry, Parameter, ParameterInfo, ParameterSet,
    ParameterValue, Pipeline, PipelineError, PipelineOptions, RangePolicy,
};
pub use gpu_context::{ContextError, RenderContext};
pub use renderer::{PngSequenceSink, PresentationSink, RenderState, RenderThread, RenderThreadError};
pub use settings::{PipelineSettings, SettingsError};
pub use texture::{Framebuffer, Texture, TextureError};
