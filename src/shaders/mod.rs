//! Shader sources and compiled shader programs
//!
//! Every program shares the full-screen triangle vertex stage in
//! `fullscreen.wgsl`; fragment stages live next to it and are embedded at
//! build time. A fragment module must follow the binding convention used by
//! [`ShaderProgram`]:
//!
//! - `@group(0) @binding(0)`: uniform block, first member `transform: mat4x4<f32>`
//! - `@group(0) @binding(1)`: filtering sampler
//! - `@group(0) @binding(2..)`: the program's input textures, in order
//!
//! and export its entry point as `fs_main`.

mod program;

pub use program::{ProgramDesc, ShaderError, ShaderProgram, UniformDecl, UniformType, UniformValue};

/// Full-screen triangle vertex stage shared by every program
pub const FULLSCREEN_VERTEX_SHADER: &str = include_str!("fullscreen.wgsl");

pub const CONTRAST_BRIGHTNESS_SHADER: &str = include_str!("contrast_brightness.wgsl");

pub const FLIP_SHADER: &str = include_str!("flip.wgsl");

pub const COLOR_FILTER_SHADER: &str = include_str!("color_filter.wgsl");

/// Fragment stages of the flow-based abstraction chain
pub mod flowabs {
    macro_rules! flowabs_stage {
        ($file:literal) => {
            concat!(include_str!("flowabs/common.wgsl"), include_str!($file))
        };
    }

    pub const STRUCTURE_TENSOR: &str = flowabs_stage!("flowabs/sst.wgsl");
    pub const TANGENT_FLOW_MAP: &str = flowabs_stage!("flowabs/tfm.wgsl");
    pub const RGB_TO_LAB: &str = flowabs_stage!("flowabs/lab.wgsl");
    pub const BILATERAL: &str = flowabs_stage!("flowabs/bilateral.wgsl");
    pub const DOG_ACROSS_FLOW: &str = flowabs_stage!("flowabs/fdog0.wgsl");
    pub const DOG_ALONG_FLOW: &str = flowabs_stage!("flowabs/fdog1.wgsl");
    pub const QUANTIZE: &str = flowabs_stage!("flowabs/quantize.wgsl");
    pub const FLOW_SMOOTHING: &str = flowabs_stage!("flowabs/smooth.wgsl");
    pub const VISUALIZE: &str = flowabs_stage!("flowabs/visualize.wgsl");
}
