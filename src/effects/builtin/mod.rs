//! Built-in effects
//!
//! This module contains the standard effects that ship with spectaculum.

mod color_filter;
mod contrast_brightness;
pub mod flip;
pub mod flowabs;

pub use color_filter::{color_filter, ColorFilterDefinition, COLORS};
pub use contrast_brightness::{contrast_brightness, ContrastBrightnessDefinition};
pub use flip::{flip, FlipDefinition};
pub use flowabs::{FlowAbsDefinition, FlowAbsEffect};

use super::EffectRegistry;

/// Register all built-in effects with the registry
pub fn register_builtin_effects(registry: &mut EffectRegistry) {
    registry.register(ContrastBrightnessDefinition);
    registry.register(ColorFilterDefinition);
    registry.register(FlipDefinition);
    for stage in flowabs::Stage::ALL {
        registry.register(FlowAbsDefinition { stage });
    }
}
