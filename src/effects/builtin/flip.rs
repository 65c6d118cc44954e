//! Flip Effect
//!
//! Mirrors the input. Mode 0 flips horizontally, 1 vertically, 2 both and
//! 3 leaves the image as is.

use crate::effects::shader_effect::ShaderEffect;
use crate::effects::traits::{Effect, EffectDefinition};
use crate::effects::types::Parameter;
use crate::shaders::{UniformDecl, UniformType, FLIP_SHADER};

const UNIFORMS: &[UniformDecl] = &[UniformDecl::new("mode", UniformType::Int)];

pub const MODE_HORIZONTAL: i32 = 0;
pub const MODE_VERTICAL: i32 = 1;
pub const MODE_BOTH: i32 = 2;
pub const MODE_NONE: i32 = 3;

/// Flip effect definition
pub struct FlipDefinition;

impl EffectDefinition for FlipDefinition {
    fn effect_type(&self) -> &'static str {
        "flip"
    }

    fn display_name(&self) -> &'static str {
        "Flip"
    }

    fn category(&self) -> &'static str {
        "Transform"
    }

    fn description(&self) -> &'static str {
        "Mirrors the image horizontally, vertically or both"
    }

    fn create(&self) -> Box<dyn Effect> {
        Box::new(flip())
    }
}

/// Build a Flip effect
pub fn flip() -> ShaderEffect {
    let def = FlipDefinition;
    let mut effect = ShaderEffect::new(def.effect_type(), def.display_name(), FLIP_SHADER, UNIFORMS);
    let mode = Parameter::int("Mode", MODE_HORIZONTAL, MODE_NONE, MODE_VERTICAL)
        .with_description("0 horizontal, 1 vertical, 2 both, 3 none");
    if let Err(e) = effect.bind_parameter(mode, "mode") {
        log::warn!("{}: {}", def.display_name(), e);
    }
    effect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::types::ParameterValue;

    #[test]
    fn test_mode_parameter() {
        let effect = flip();
        let mode = effect.parameters().get("Mode").unwrap();
        assert_eq!(mode.value(), ParameterValue::Int(1));
        assert_eq!(mode.min(), ParameterValue::Int(0));
        assert_eq!(mode.max(), ParameterValue::Int(3));
        assert!(mode.set_int(4).is_err());
    }
}
