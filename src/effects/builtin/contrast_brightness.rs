//! Contrast/Brightness Effect
//!
//! Scales contrast around mid-gray, then brightness. Defaults are the identity.

use crate::effects::shader_effect::ShaderEffect;
use crate::effects::traits::{Effect, EffectDefinition};
use crate::effects::types::Parameter;
use crate::shaders::{UniformDecl, UniformType, CONTRAST_BRIGHTNESS_SHADER};

const UNIFORMS: &[UniformDecl] = &[
    UniformDecl::new("contrast", UniformType::Float),
    UniformDecl::new("brightness", UniformType::Float),
];

/// Contrast/Brightness effect definition
pub struct ContrastBrightnessDefinition;

impl EffectDefinition for ContrastBrightnessDefinition {
    fn effect_type(&self) -> &'static str {
        "contrast_brightness"
    }

    fn display_name(&self) -> &'static str {
        "Contrast/Brightness"
    }

    fn category(&self) -> &'static str {
        "Color"
    }

    fn description(&self) -> &'static str {
        "Adjusts contrast and brightness"
    }

    fn create(&self) -> Box<dyn Effect> {
        Box::new(contrast_brightness())
    }
}

/// Build a Contrast/Brightness effect
pub fn contrast_brightness() -> ShaderEffect {
    let def = ContrastBrightnessDefinition;
    let mut effect = ShaderEffect::new(def.effect_type(), def.display_name(), CONTRAST_BRIGHTNESS_SHADER, UNIFORMS);
    for (name, uniform) in [("Contrast", "contrast"), ("Brightness", "brightness")] {
        if let Err(e) = effect.bind_parameter(Parameter::float(name, 0.0, 5.0, 1.0), uniform) {
            log::warn!("{}: {}", def.display_name(), e);
        }
    }
    effect
}
