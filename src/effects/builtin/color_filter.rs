//! Color Filter Effect
//!
//! Multiplies every pixel by a color picked from a fixed palette.

use crate::effects::shader_effect::ShaderEffect;
use crate::effects::traits::{Effect, EffectDefinition};
use crate::effects::types::{Parameter, ParameterValue};
use crate::shaders::{UniformDecl, UniformType, UniformValue, COLOR_FILTER_SHADER};

const UNIFORMS: &[UniformDecl] = &[UniformDecl::new("color", UniformType::Vec4)];

/// Palette as (label, RGBA)
pub const COLORS: &[(&str, [f32; 4])] = &[
    ("White", [1.0, 1.0, 1.0, 1.0]),
    ("Red", [1.0, 0.0, 0.0, 1.0]),
    ("Green", [0.0, 1.0, 0.0, 1.0]),
    ("Blue", [0.0, 0.0, 1.0, 1.0]),
    ("Yellow", [1.0, 1.0, 0.0, 1.0]),
    ("Cyan", [0.0, 1.0, 1.0, 1.0]),
    ("Magenta", [1.0, 0.0, 1.0, 1.0]),
];

fn color_uniform(value: &ParameterValue) -> UniformValue {
    let index = match value {
        ParameterValue::Choice(i) => *i,
        _ => 0,
    };
    UniformValue::Vec4(COLORS.get(index).map_or(COLORS[0].1, |(_, rgba)| *rgba))
}

/// Color filter effect definition
pub struct ColorFilterDefinition;

impl EffectDefinition for ColorFilterDefinition {
    fn effect_type(&self) -> &'static str {
        "color_filter"
    }

    fn display_name(&self) -> &'static str {
        "Color Filter"
    }

    fn category(&self) -> &'static str {
        "Color"
    }

    fn description(&self) -> &'static str {
        "Tints the image by multiplying with a color"
    }

    fn create(&self) -> Box<dyn Effect> {
        Box::new(color_filter())
    }
}

/// Build a Color Filter effect
pub fn color_filter() -> ShaderEffect {
    let def = ColorFilterDefinition;
    let mut effect = ShaderEffect::new(def.effect_type(), def.display_name(), COLOR_FILTER_SHADER, UNIFORMS);
    let delegate = effect.queue().delegate_with("color", color_uniform);
    let color = Parameter::choice("Color", COLORS.iter().map(|(label, _)| *label), 0).with_delegate(delegate);
    if let Err(e) = effect.add_parameter(color) {
        log::warn!("{}: {}", def.display_name(), e);
    }
    effect
}
