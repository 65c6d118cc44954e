//! Flow-based abstraction: stages, settings and pass planning
//!
//! Every frame is planned as an ordered list of passes. A pass runs one
//! program over named texture slots; the engine maps slots to the source,
//! its private scratch framebuffers and the pipeline-visible output.

use crate::effects::types::{Parameter, ParameterError, ParameterSet};
use crate::effects::uniforms::{UniformQueue, UniformWrite};
use crate::shaders::{flowabs, UniformDecl, UniformType, UniformValue};

/// How far the chain runs, and what it shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    StructureTensor,
    TangentFlowMap,
    Bilateral,
    Edges,
    Quantization,
    /// The complete abstraction
    Full,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::StructureTensor,
        Stage::TangentFlowMap,
        Stage::Bilateral,
        Stage::Edges,
        Stage::Quantization,
        Stage::Full,
    ];

    pub fn effect_type(self) -> &'static str {
        match self {
            Stage::StructureTensor => "flowabs_structure_tensor",
            Stage::TangentFlowMap => "flowabs_tangent_flow_map",
            Stage::Bilateral => "flowabs_bilateral",
            Stage::Edges => "flowabs_edges",
            Stage::Quantization => "flowabs_quantization",
            Stage::Full => "flowabs",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Stage::StructureTensor => "FlowAbs Structure Tensor",
            Stage::TangentFlowMap => "FlowAbs Tangent Flow Map",
            Stage::Bilateral => "FlowAbs Bilateral Filter",
            Stage::Edges => "FlowAbs DoG Edges",
            Stage::Quantization => "FlowAbs Color Quantization",
            Stage::Full => "Flow Abstraction",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Stage::StructureTensor => "Shows the smoothed local structure tensor",
            Stage::TangentFlowMap => "Shows the edge tangent flow as color",
            Stage::Bilateral => "Edge-preserving smoothing along the flow",
            Stage::Edges => "Shows flow-based difference-of-Gaussians edges",
            Stage::Quantization => "Quantized luminance composed with edges",
            Stage::Full => "Cartoon-like abstraction guided by the image flow",
        }
    }
}

/// Texture a pass reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Source,
    Tensor,
    Flow,
    LabA,
    LabB,
    Dog,
    Edges,
    Quantized,
    Output,
}

/// Programs used by the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    StructureTensor,
    TangentFlow,
    RgbToLab,
    Bilateral,
    DogAcrossFlow,
    DogAlongFlow,
    Quantize,
    FlowSmoothing,
    Visualize,
}

impl ProgramKind {
    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::StructureTensor => "FlowAbs Structure Tensor",
            ProgramKind::TangentFlow => "FlowAbs Tangent Flow",
            ProgramKind::RgbToLab => "FlowAbs RGB to Lab",
            ProgramKind::Bilateral => "FlowAbs Bilateral",
            ProgramKind::DogAcrossFlow => "FlowAbs DoG Across Flow",
            ProgramKind::DogAlongFlow => "FlowAbs DoG Along Flow",
            ProgramKind::Quantize => "FlowAbs Quantize",
            ProgramKind::FlowSmoothing => "FlowAbs Smoothing",
            ProgramKind::Visualize => "FlowAbs Visualize",
        }
    }

    pub fn fragment(self) -> &'static str {
        match self {
            ProgramKind::StructureTensor => flowabs::STRUCTURE_TENSOR,
            ProgramKind::TangentFlow => flowabs::TANGENT_FLOW_MAP,
            ProgramKind::RgbToLab => flowabs::RGB_TO_LAB,
            ProgramKind::Bilateral => flowabs::BILATERAL,
            ProgramKind::DogAcrossFlow => flowabs::DOG_ACROSS_FLOW,
            ProgramKind::DogAlongFlow => flowabs::DOG_ALONG_FLOW,
            ProgramKind::Quantize => flowabs::QUANTIZE,
            ProgramKind::FlowSmoothing => flowabs::FLOW_SMOOTHING,
            ProgramKind::Visualize => flowabs::VISUALIZE,
        }
    }

    pub fn uniforms(self) -> &'static [UniformDecl] {
        const NONE: &[UniformDecl] = &[];
        const SIGMA: &[UniformDecl] = &[UniformDecl::new("sigma", UniformType::Float)];
        const BILATERAL: &[UniformDecl] = &[
            UniformDecl::new("sigma_d", UniformType::Float),
            UniformDecl::new("sigma_r", UniformType::Float),
            UniformDecl::new("pass_index", UniformType::Int),
        ];
        const DOG_ACROSS: &[UniformDecl] = &[
            UniformDecl::new("sigma_e", UniformType::Float),
            UniformDecl::new("tau", UniformType::Float),
        ];
        const DOG_ALONG: &[UniformDecl] = &[
            UniformDecl::new("sigma_m", UniformType::Float),
            UniformDecl::new("phi", UniformType::Float),
        ];
        const QUANTIZE: &[UniformDecl] = &[
            UniformDecl::new("bins", UniformType::Int),
            UniformDecl::new("phi", UniformType::Float),
            UniformDecl::new("edges", UniformType::Bool),
        ];
        const VISUALIZE: &[UniformDecl] = &[UniformDecl::new("mode", UniformType::Int)];

        match self {
            ProgramKind::StructureTensor | ProgramKind::RgbToLab => NONE,
            ProgramKind::TangentFlow | ProgramKind::FlowSmoothing => SIGMA,
            ProgramKind::Bilateral => BILATERAL,
            ProgramKind::DogAcrossFlow => DOG_ACROSS,
            ProgramKind::DogAlongFlow => DOG_ALONG,
            ProgramKind::Quantize => QUANTIZE,
            ProgramKind::Visualize => VISUALIZE,
        }
    }

    /// Number of texture inputs
    pub fn inputs(self) -> usize {
        match self {
            ProgramKind::StructureTensor
            | ProgramKind::TangentFlow
            | ProgramKind::RgbToLab
            | ProgramKind::Visualize => 1,
            _ => 2,
        }
    }
}

/// One draw of the chain
#[derive(Debug, Clone, PartialEq)]
pub struct Pass {
    pub program: ProgramKind,
    pub inputs: Vec<Slot>,
    pub output: Slot,
    pub uniforms: Vec<(&'static str, UniformValue)>,
}

impl Pass {
    fn new(program: ProgramKind, inputs: &[Slot], output: Slot) -> Self {
        Self {
            program,
            inputs: inputs.to_vec(),
            output,
            uniforms: Vec::new(),
        }
    }

    fn with(mut self, name: &'static str, value: UniformValue) -> Self {
        self.uniforms.push((name, value));
        self
    }
}

const VISUALIZE_TENSOR: i32 = 0;
const VISUALIZE_FLOW: i32 = 1;
const VISUALIZE_LAB: i32 = 2;
const VISUALIZE_GRAY: i32 = 3;

/// Current values of every stage parameter, fed by the uniform queue
#[derive(Debug, Clone, PartialEq)]
pub struct FlowAbsSettings {
    pub tfm_sigma: f32,
    pub bilateral_iterations: i32,
    pub bilateral_sigma_d: f32,
    pub bilateral_sigma_r: f32,
    pub edges: bool,
    pub edge_sigma_e: f32,
    pub edge_tau: f32,
    pub edge_sigma_m: f32,
    pub edge_phi: f32,
    pub quantization_bins: i32,
    pub quantization_phi: f32,
    pub smoothing_sigma: f32,
}

impl Default for FlowAbsSettings {
    fn default() -> Self {
        Self {
            tfm_sigma: 2.0,
            bilateral_iterations: 4,
            bilateral_sigma_d: 3.0,
            bilateral_sigma_r: 4.25,
            edges: true,
            edge_sigma_e: 1.0,
            edge_tau: 0.99,
            edge_sigma_m: 3.0,
            edge_phi: 2.0,
            quantization_bins: 8,
            quantization_phi: 3.4,
            smoothing_sigma: 1.0,
        }
    }
}

impl FlowAbsSettings {
    /// Apply one queued parameter write.
    pub fn apply(&mut self, write: &UniformWrite) {
        let float = || match write.value {
            UniformValue::Float(v) => Some(v),
            _ => None,
        };
        let int = || match write.value {
            UniformValue::Int(v) => Some(v),
            _ => None,
        };

        let applied = match write.target {
            "tfm_sigma" => float().map(|v| self.tfm_sigma = v),
            "bilateral_iterations" => int().map(|v| self.bilateral_iterations = v),
            "bilateral_sigma_d" => float().map(|v| self.bilateral_sigma_d = v),
            "bilateral_sigma_r" => float().map(|v| self.bilateral_sigma_r = v),
            "edges" => match write.value {
                UniformValue::Bool(v) => Some(self.edges = v),
                _ => None,
            },
            "edge_sigma_e" => float().map(|v| self.edge_sigma_e = v),
            "edge_tau" => float().map(|v| self.edge_tau = v),
            "edge_sigma_m" => float().map(|v| self.edge_sigma_m = v),
            "edge_phi" => float().map(|v| self.edge_phi = v),
            "quantization_bins" => int().map(|v| self.quantization_bins = v),
            "quantization_phi" => float().map(|v| self.quantization_phi = v),
            "smoothing_sigma" => float().map(|v| self.smoothing_sigma = v),
            _ => None,
        };

        if applied.is_none() {
            log::error!("Unexpected flow abstraction setting {:?}", write);
            debug_assert!(false, "unexpected flow abstraction setting {:?}", write);
        }
    }
}

/// Passes that render `stage` with `settings`, in execution order.
///
/// The last pass always writes `Slot::Output`.
pub fn plan(stage: Stage, settings: &FlowAbsSettings) -> Vec<Pass> {
    let mut passes = vec![Pass::new(ProgramKind::StructureTensor, &[Slot::Source], Slot::Tensor)];
    if stage == Stage::StructureTensor {
        passes.push(visualize(Slot::Tensor, VISUALIZE_TENSOR));
        return passes;
    }

    passes.push(
        Pass::new(ProgramKind::TangentFlow, &[Slot::Tensor], Slot::Flow)
            .with("sigma", UniformValue::Float(settings.tfm_sigma)),
    );
    if stage == Stage::TangentFlowMap {
        passes.push(visualize(Slot::Flow, VISUALIZE_FLOW));
        return passes;
    }

    // Each iteration filters across then along the flow; the result ends in LabA
    passes.push(Pass::new(ProgramKind::RgbToLab, &[Slot::Source], Slot::LabA));
    for _ in 0..settings.bilateral_iterations.max(0) {
        for (pass_index, input, output) in [(0, Slot::LabA, Slot::LabB), (1, Slot::LabB, Slot::LabA)] {
            passes.push(
                Pass::new(ProgramKind::Bilateral, &[input, Slot::Flow], output)
                    .with("sigma_d", UniformValue::Float(settings.bilateral_sigma_d))
                    .with("sigma_r", UniformValue::Float(settings.bilateral_sigma_r))
                    .with("pass_index", UniformValue::Int(pass_index)),
            );
        }
    }
    if stage == Stage::Bilateral {
        passes.push(visualize(Slot::LabA, VISUALIZE_LAB));
        return passes;
    }

    if stage == Stage::Edges || settings.edges {
        passes.push(
            Pass::new(ProgramKind::DogAcrossFlow, &[Slot::LabA, Slot::Flow], Slot::Dog)
                .with("sigma_e", UniformValue::Float(settings.edge_sigma_e))
                .with("tau", UniformValue::Float(settings.edge_tau)),
        );
        passes.push(
            Pass::new(ProgramKind::DogAlongFlow, &[Slot::Dog, Slot::Flow], Slot::Edges)
                .with("sigma_m", UniformValue::Float(settings.edge_sigma_m))
                .with("phi", UniformValue::Float(settings.edge_phi)),
        );
    }
    if stage == Stage::Edges {
        passes.push(visualize(Slot::Edges, VISUALIZE_GRAY));
        return passes;
    }

    let quantized = if stage == Stage::Quantization {
        Slot::Output
    } else {
        Slot::Quantized
    };
    passes.push(
        Pass::new(ProgramKind::Quantize, &[Slot::LabA, Slot::Edges], quantized)
            .with("bins", UniformValue::Int(settings.quantization_bins))
            .with("phi", UniformValue::Float(settings.quantization_phi))
            .with("edges", UniformValue::Bool(settings.edges)),
    );
    if stage == Stage::Quantization {
        return passes;
    }

    passes.push(
        Pass::new(ProgramKind::FlowSmoothing, &[Slot::Quantized, Slot::Flow], Slot::Output)
            .with("sigma", UniformValue::Float(settings.smoothing_sigma)),
    );
    passes
}

fn visualize(input: Slot, mode: i32) -> Pass {
    Pass::new(ProgramKind::Visualize, &[input], Slot::Output).with("mode", UniformValue::Int(mode))
}

/// Settings under which `plan` touches every program and slot of `stage`
pub(crate) fn widest_settings() -> FlowAbsSettings {
    FlowAbsSettings {
        bilateral_iterations: 1,
        edges: true,
        ..FlowAbsSettings::default()
    }
}

/// Parameters of `stage`, wired to `queue`.
///
/// A stage carries the parameters of every stage it runs.
pub fn stage_parameters(stage: Stage, queue: &UniformQueue) -> Result<ParameterSet, ParameterError> {
    let mut set = ParameterSet::new();
    if stage == Stage::StructureTensor {
        return Ok(set);
    }

    set.add(
        Parameter::float("Sigma", 0.0, 10.0, 2.0)
            .with_description("Smoothing of the structure tensor")
            .with_delegate(queue.delegate("tfm_sigma")),
    )?;
    if stage == Stage::TangentFlowMap {
        return Ok(set);
    }

    set.add(Parameter::int("Bilateral Iterations", 0, 8, 4).with_delegate(queue.delegate("bilateral_iterations")))?;
    set.add(Parameter::float("Bilateral Sigma D", 0.0, 10.0, 3.0).with_delegate(queue.delegate("bilateral_sigma_d")))?;
    set.add(Parameter::float("Bilateral Sigma R", 0.0, 20.0, 4.25).with_delegate(queue.delegate("bilateral_sigma_r")))?;
    if stage == Stage::Bilateral {
        return Ok(set);
    }

    set.add(Parameter::float("Edge Sigma E", 0.0, 5.0, 1.0).with_delegate(queue.delegate("edge_sigma_e")))?;
    set.add(Parameter::float("Edge Tau", 0.0, 1.0, 0.99).with_delegate(queue.delegate("edge_tau")))?;
    set.add(Parameter::float("Edge Sigma M", 0.0, 10.0, 3.0).with_delegate(queue.delegate("edge_sigma_m")))?;
    set.add(Parameter::float("Edge Phi", 0.0, 10.0, 2.0).with_delegate(queue.delegate("edge_phi")))?;
    if stage == Stage::Edges {
        return Ok(set);
    }

    set.add(
        Parameter::bool("Edges", true)
            .with_description("Darken the result along detected edges")
            .with_delegate(queue.delegate("edges")),
    )?;
    set.add(Parameter::int("Quantization Bins", 2, 32, 8).with_delegate(queue.delegate("quantization_bins")))?;
    set.add(Parameter::float("Quantization Phi", 0.0, 10.0, 3.4).with_delegate(queue.delegate("quantization_phi")))?;
    if stage == Stage::Quantization {
        return Ok(set);
    }

    set.add(Parameter::float("Smoothing Sigma", 0.0, 10.0, 1.0).with_delegate(queue.delegate("smoothing_sigma")))?;
    Ok(set)
}
