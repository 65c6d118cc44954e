//! Effects system for spectaculum
//!
//! # Architecture
//!
//! - **Parameters** (`types.rs`): named, typed, bounded values shared as
//!   `Arc<Parameter>` so controls on any thread can change them
//! - **Uniform queue** (`uniforms.rs`): carries parameter delegate writes to
//!   the render thread, where they are applied to shader programs
//! - **Traits** (`traits.rs`): `Effect` for GPU stages and `EffectDefinition`
//!   for effect factories
//! - **ShaderEffect** (`shader_effect.rs`): single-program effects
//! - **Registry** (`registry.rs`): central registry of available effects
//! - **Runtime** (`runtime.rs`): the `Pipeline` and its ping-pong framebuffers
//! - **Builtin** (`builtin/`): contrast/brightness, flip, color filter and
//!   the flow-based abstraction stages
//!
//! # Usage
//!
//! ```ignore
//! let registry = EffectRegistry::with_builtins();
//! let mut pipeline = Pipeline::new(PipelineOptions::default());
//!
//! let id = pipeline.add_effect_type(&registry, "contrast_brightness")?;
//! pipeline.set_enabled(id, true)?;
//! pipeline.parameters(id)?.set("Contrast", ParameterValue::Float(1.5))?;
//!
//! let output = pipeline.render_frame(&ctx, &source)?;
//! ```

mod types;
mod uniforms;
mod traits;
mod shader_effect;
mod registry;
mod runtime;
pub mod builtin;

pub use types::*;
pub use uniforms::*;
pub use traits::*;
pub use shader_effect::*;
pub use registry::*;
pub use runtime::*;
