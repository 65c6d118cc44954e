//! GPU-backed pipeline scenarios
//!
//! Every test skips when the machine has no GPU adapter.

use std::sync::Arc;

use spectaculum::effects::builtin::{color_filter, contrast_brightness, flip, flowabs::Stage, FlowAbsEffect};
use spectaculum::effects::{Effect, EffectError, EffectState, ParameterSet, ParameterValue, ShaderEffect, SurfaceInfo};
use spectaculum::settings::ScratchFormat;
use spectaculum::shaders::{ProgramDesc, ShaderError, ShaderProgram, UniformDecl, UniformType, FLIP_SHADER};
use spectaculum::{
    ContextError, EffectRegistry, Framebuffer, Pipeline, PipelineError, PipelineOptions, PipelineSettings,
    RenderContext, RenderThread, RenderThreadError, Texture, TextureError,
};

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const YELLOW: [u8; 4] = [255, 255, 0, 255];

fn context_or_skip() -> Option<RenderContext> {
    match RenderContext::new_headless() {
        Ok(ctx) => Some(ctx),
        Err(ContextError::NoAdapter) => {
            eprintln!("Skipping test: no GPU adapter found");
            None
        }
        Err(e) => panic!("render context failed to initialize: {e:?}"),
    }
}

fn pixels(colors: &[[u8; 4]]) -> Vec<u8> {
    colors.iter().flatten().copied().collect()
}

/// 2x2 frame, top row red/green, bottom row blue/yellow
fn quad_source(ctx: &RenderContext) -> Texture {
    Texture::from_rgba8(ctx, 2, 2, &pixels(&[RED, GREEN, BLUE, YELLOW])).unwrap()
}

/// 4x4 frame with a horizontal ramp, so flips and filters change it
fn ramp_source(ctx: &RenderContext) -> Texture {
    let mut data = Vec::new();
    for y in 0..4u8 {
        for x in 0..4u8 {
            data.extend_from_slice(&[x * 60, y * 60, 255 - x * 40, 255]);
        }
    }
    Texture::from_rgba8(ctx, 4, 4, &data).unwrap()
}

fn enabled_pipeline() -> Pipeline {
    Pipeline::new(PipelineOptions {
        enable_new_effects: true,
        ..Default::default()
    })
}

fn assert_close(actual: &[u8], expected: &[u8]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            a.abs_diff(*e) <= 1,
            "byte {} differs: got {}, expected {}",
            i,
            a,
            e
        );
    }
}

#[test]
fn flip_vertical_swaps_rows() {
    let Some(ctx) = context_or_skip() else { return };
    let source = quad_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let id = pipeline.add_effect(Box::new(flip()));
    assert_eq!(pipeline.parameters(id).unwrap().get("Mode").unwrap().value().as_i32(), 1);

    let output = pipeline.render_frame(&ctx, &source).unwrap();
    let data = output.read_rgba8(&ctx).unwrap();
    assert_eq!(data, pixels(&[BLUE, YELLOW, RED, GREEN]));
}

#[test]
fn flip_modes_follow_mapping() {
    let Some(ctx) = context_or_skip() else { return };
    let source = quad_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let id = pipeline.add_effect(Box::new(flip()));
    let mode = pipeline.parameters(id).unwrap().get("Mode").unwrap().clone();

    let expected = [
        (0, [GREEN, RED, YELLOW, BLUE]),
        (2, [YELLOW, BLUE, GREEN, RED]),
        (3, [RED, GREEN, BLUE, YELLOW]),
    ];
    for (value, colors) in expected {
        mode.set_int(value).unwrap();
        let data = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
        assert_eq!(data, pixels(&colors), "mode {}", value);
    }
}

#[test]
fn no_enabled_effects_returns_source() {
    let Some(ctx) = context_or_skip() else { return };
    let source = quad_source(&ctx);

    let mut empty = Pipeline::default();
    let output = empty.render_frame(&ctx, &source).unwrap();
    assert_eq!(output.handle(), source.handle());

    // Added but disabled effects do not run either
    let mut disabled = Pipeline::default();
    disabled.add_effect(Box::new(flip()));
    let output = disabled.render_frame(&ctx, &source).unwrap();
    assert_eq!(output.handle(), source.handle());
    assert!(disabled.last_output().is_none());
}

#[test]
fn contrast_brightness_defaults_are_identity() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);
    let original = source.read_rgba8(&ctx).unwrap();

    let mut pipeline = enabled_pipeline();
    pipeline.add_effect(Box::new(contrast_brightness()));
    let output = pipeline.render_frame(&ctx, &source).unwrap();
    assert_ne!(output.handle(), source.handle());
    assert_close(&output.read_rgba8(&ctx).unwrap(), &original);
}

#[test]
fn chain_equals_effects_applied_in_order() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);
    let surface = SurfaceInfo {
        width: 4,
        height: 4,
        format: wgpu::TextureFormat::Rgba8Unorm,
    };

    let mut pipeline = enabled_pipeline();
    let a = pipeline.add_effect(Box::new(flip()));
    let b = pipeline.add_effect(Box::new(color_filter()));
    pipeline.parameters(a).unwrap().get("Mode").unwrap().set_int(0).unwrap();
    pipeline.parameters(b).unwrap().get("Color").unwrap().set_choice_label("Cyan").unwrap();
    let chained = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();

    // Same effects applied one at a time
    let mut first = flip();
    first.parameters().get("Mode").unwrap().set_int(0).unwrap();
    let mut second = color_filter();
    second.parameters().get("Color").unwrap().set_choice_label("Cyan").unwrap();
    first.initialize(&ctx, surface).unwrap();
    second.initialize(&ctx, surface).unwrap();

    let mut intermediate = Framebuffer::new(&ctx, 4, 4, surface.format).unwrap();
    let mut result = Framebuffer::new(&ctx, 4, 4, surface.format).unwrap();
    first.apply(&ctx, &source, &intermediate).unwrap();
    second.apply(&ctx, intermediate.texture(), &result).unwrap();
    assert!(ctx.current_program().is_none());

    assert_eq!(chained, result.read_rgba8(&ctx).unwrap());

    first.release(&ctx);
    second.release(&ctx);
    intermediate.delete(&ctx);
    result.delete(&ctx);
}

#[test]
fn disable_and_reenable_reproduces_output() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let a = pipeline.add_effect(Box::new(flip()));
    let b = pipeline.add_effect(Box::new(color_filter()));
    pipeline.parameters(b).unwrap().get("Color").unwrap().set_choice_label("Yellow").unwrap();

    let both = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();

    pipeline.set_enabled(a, false).unwrap();
    let only_filter = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_ne!(both, only_filter);
    assert_eq!(pipeline.entry(a).unwrap().state(), &EffectState::Ready);

    pipeline.set_enabled(a, true).unwrap();
    let again = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(both, again);
}

#[test]
fn resize_round_trip_does_not_leak() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);

    let mut pipeline = enabled_pipeline();
    pipeline.add_effect(Box::new(FlowAbsEffect::new(Stage::Full)));
    pipeline.add_effect(Box::new(contrast_brightness()));

    pipeline.on_surface_created(&ctx, 4, 4).unwrap();
    pipeline.render_frame(&ctx, &source).unwrap();
    let textures = ctx.live_textures();
    let programs = ctx.live_programs();
    assert!(programs > 1);

    pipeline.on_surface_changed(&ctx, 8, 6).unwrap();
    let output = pipeline.render_frame(&ctx, &source).unwrap();
    assert_eq!(output.size(), (8, 6));

    pipeline.on_surface_changed(&ctx, 4, 4).unwrap();
    let output = pipeline.render_frame(&ctx, &source).unwrap();
    assert_eq!(output.size(), (4, 4));
    assert_eq!(output.read_rgba8(&ctx).unwrap().len(), 4 * 4 * 4);

    assert_eq!(ctx.live_textures(), textures);
    assert_eq!(ctx.live_programs(), programs);
    assert_eq!(pipeline.failures().count(), 0);

    // Teardown leaves only the caller's source alive
    pipeline.on_surface_destroyed(&ctx);
    assert_eq!(ctx.live_textures(), 1);
    assert_eq!(ctx.live_programs(), 0);
    assert!(pipeline.last_output().is_none());

    // A new surface brings the effects back lazily
    pipeline.on_surface_created(&ctx, 4, 4).unwrap();
    pipeline.render_frame(&ctx, &source).unwrap();
    assert_eq!(ctx.live_programs(), programs);
}

#[test]
fn broken_effect_is_isolated() {
    let Some(ctx) = context_or_skip() else { return };
    let source = quad_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let broken = pipeline.add_effect(Box::new(ShaderEffect::new(
        "broken",
        "Broken",
        "this is not a shader",
        &[],
    )));
    pipeline.add_effect(Box::new(flip()));

    let data = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(data, pixels(&[BLUE, YELLOW, RED, GREEN]));

    let failures: Vec<_> = pipeline.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, broken);
    assert!(!failures[0].1.is_empty());
    assert_eq!(ctx.live_programs(), 1);
}

#[test]
fn deleted_source_is_rejected() {
    let Some(ctx) = context_or_skip() else { return };
    let mut source = quad_source(&ctx);

    let mut pipeline = enabled_pipeline();
    pipeline.add_effect(Box::new(flip()));
    let first = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();

    source.delete(&ctx);
    assert!(matches!(
        pipeline.render_frame(&ctx, &source),
        Err(PipelineError::InvalidSource)
    ));
    let previous = pipeline.last_output().unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(previous, first);
}

#[test]
fn tangent_flow_map_stage_renders() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let registry = EffectRegistry::with_builtins();
    pipeline.add_effect_type(&registry, "flowabs_tangent_flow_map").unwrap();

    let data = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(data.len(), 4 * 4 * 4);
    assert_eq!(pipeline.failures().count(), 0);
    assert!(data.chunks_exact(4).all(|px| px[3] == 255));
}

#[test]
fn flow_abstraction_without_edges_or_bilateral() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let id = pipeline.add_effect(Box::new(FlowAbsEffect::new(Stage::Full)));
    let full = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(full.len(), 4 * 4 * 4);

    let parameters = pipeline.parameters(id).unwrap().clone();
    parameters.set("Edges", ParameterValue::Bool(false)).unwrap();
    let no_edges = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(no_edges.len(), full.len());

    parameters.set("Bilateral Iterations", ParameterValue::Int(0)).unwrap();
    let unsmoothed = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(unsmoothed.len(), full.len());

    assert_eq!(pipeline.failures().count(), 0);
    assert_eq!(pipeline.entry(id).unwrap().state(), &EffectState::Ready);
}

#[test]
fn reset_restores_default_on_gpu() {
    let Some(ctx) = context_or_skip() else { return };
    let source = ramp_source(&ctx);
    let original = source.read_rgba8(&ctx).unwrap();

    let mut pipeline = enabled_pipeline();
    let id = pipeline.add_effect(Box::new(contrast_brightness()));
    let brightness = pipeline.parameters(id).unwrap().get("Brightness").unwrap().clone();

    brightness.set_float(0.25).unwrap();
    let dimmed = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_ne!(dimmed, original);

    brightness.reset();
    let restored = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_close(&restored, &original);
}

const MODE_UNIFORMS: &[UniformDecl] = &[UniformDecl::new("mode", UniformType::Int)];

#[test]
fn draw_rejects_target_of_other_format() {
    let Some(ctx) = context_or_skip() else { return };
    let source = quad_source(&ctx);

    let mut program = ShaderProgram::compile(
        &ctx,
        &ProgramDesc {
            label: "flip",
            fragment: FLIP_SHADER,
            uniforms: MODE_UNIFORMS,
            inputs: 1,
            format: wgpu::TextureFormat::Rgba8Unorm,
        },
    )
    .unwrap();
    let mut target = Framebuffer::new(&ctx, 2, 2, wgpu::TextureFormat::Rgba16Float).unwrap();

    program.use_program(&ctx).unwrap();
    let err = program.draw(&ctx, &[&source], &target).unwrap_err();
    assert!(
        matches!(err, ShaderError::Texture(TextureError::IncompleteFramebuffer { .. })),
        "{err}"
    );

    program.delete(&ctx);
    target.delete(&ctx);
}

#[test]
fn oversized_targets_are_rejected() {
    let Some(ctx) = context_or_skip() else { return };
    let max = ctx.device().limits().max_texture_dimension_2d;

    assert!(matches!(
        Framebuffer::new(&ctx, max + 1, 4, wgpu::TextureFormat::Rgba8Unorm),
        Err(TextureError::IncompleteFramebuffer { .. })
    ));
    assert!(matches!(
        Texture::new(&ctx, 4, max + 1, wgpu::TextureFormat::Rgba8Unorm),
        Err(TextureError::InvalidSize { .. })
    ));
    assert_eq!(ctx.live_textures(), 0);
}

/// Flip that builds its program for a format other than the pipeline's
struct MismatchedFlip(ShaderEffect);

impl Effect for MismatchedFlip {
    fn effect_type(&self) -> &'static str {
        "mismatched_flip"
    }

    fn name(&self) -> &str {
        "Mismatched Flip"
    }

    fn parameters(&self) -> &ParameterSet {
        self.0.parameters()
    }

    fn is_initialized(&self) -> bool {
        self.0.is_initialized()
    }

    fn initialize(&mut self, ctx: &RenderContext, surface: SurfaceInfo) -> Result<(), EffectError> {
        let surface = SurfaceInfo {
            format: wgpu::TextureFormat::Rgba16Float,
            ..surface
        };
        self.0.initialize(ctx, surface)
    }

    fn apply(&mut self, ctx: &RenderContext, input: &Texture, output: &Framebuffer) -> Result<(), EffectError> {
        self.0.apply(ctx, input, output)
    }

    fn release(&mut self, ctx: &RenderContext) {
        self.0.release(ctx)
    }
}

#[test]
fn format_mismatch_fails_only_that_effect() {
    let Some(ctx) = context_or_skip() else { return };
    let source = quad_source(&ctx);

    let mut pipeline = enabled_pipeline();
    let mismatched = pipeline.add_effect(Box::new(MismatchedFlip(flip())));
    pipeline.add_effect(Box::new(flip()));

    let data = pipeline.render_frame(&ctx, &source).unwrap().read_rgba8(&ctx).unwrap();
    assert_eq!(data, pixels(&[BLUE, YELLOW, RED, GREEN]));

    let failures: Vec<_> = pipeline.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, mismatched);
    assert!(failures[0].1.contains("incomplete framebuffer"), "{}", failures[0].1);
    assert!(ctx.current_program().is_none());
}

fn render_thread_with(scratch_format: ScratchFormat) -> Option<RenderThread> {
    let settings = PipelineSettings {
        surface_width: 2,
        surface_height: 2,
        scratch_format,
        enable_new_effects: true,
        ..Default::default()
    };
    match RenderThread::spawn(&settings, EffectRegistry::with_builtins()) {
        Ok(thread) => Some(thread),
        Err(RenderThreadError::Context(ContextError::NoAdapter)) => {
            eprintln!("Skipping test: no GPU adapter found");
            None
        }
        Err(e) => panic!("render thread failed to start: {e:?}"),
    }
}

fn render_thread_or_skip() -> Option<RenderThread> {
    render_thread_with(ScratchFormat::default())
}

#[test]
fn render_thread_applies_parameters_from_other_threads() {
    let Some(renderer) = render_thread_or_skip() else { return };

    assert!(matches!(renderer.render(), Err(RenderThreadError::NoSource)));
    renderer
        .set_source_rgba8(2, 2, pixels(&[RED, GREEN, BLUE, YELLOW]))
        .unwrap();

    let id = renderer.add_effect("flip").unwrap();
    let (width, height, data) = renderer.render_rgba8().unwrap();
    assert_eq!((width, height), (2, 2));
    assert_eq!(data, pixels(&[BLUE, YELLOW, RED, GREEN]));

    let parameters = renderer.parameters(id).unwrap();
    let mode = parameters.iter().find(|p| p.name() == "Mode").unwrap().clone();
    std::thread::spawn(move || mode.set_int(3).unwrap())
        .join()
        .unwrap();

    let (_, _, data) = renderer.render_rgba8().unwrap();
    assert_eq!(data, pixels(&[RED, GREEN, BLUE, YELLOW]));

    renderer.remove_effect(id).unwrap();
    assert!(renderer.set_enabled(id, true).is_err());
    renderer.shutdown().unwrap();
}

#[test]
fn render_thread_captures_png() {
    let Some(renderer) = render_thread_or_skip() else { return };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.png");

    renderer
        .set_source_rgba8(2, 2, pixels(&[RED, GREEN, BLUE, YELLOW]))
        .unwrap();
    let id = renderer.add_effect("color_filter").unwrap();
    renderer.set_enabled(id, true).unwrap();
    renderer.capture_png(&path).unwrap();

    let image = image::open(&path).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (2, 2));
    assert_eq!(image.get_pixel(0, 1).0, BLUE);

    renderer.surface_destroyed().unwrap();
    renderer.surface_created(2, 2).unwrap();
    renderer.render().unwrap();
}

#[test]
fn every_scratch_format_can_be_captured() {
    for format in ScratchFormat::ALL {
        let Some(renderer) = render_thread_with(format) else { return };
        renderer
            .set_source_rgba8(2, 2, pixels(&[RED, GREEN, BLUE, YELLOW]))
            .unwrap();
        renderer.add_effect("flip").unwrap();

        let (_, _, data) = renderer.render_rgba8().unwrap();
        assert_eq!(data, pixels(&[BLUE, YELLOW, RED, GREEN]), "{:?}", format);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        renderer.capture_png(&path).unwrap();
        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.get_pixel(0, 0).0, BLUE, "{:?}", format);
        renderer.shutdown().unwrap();
    }
}

#[test]
fn concurrent_parameter_writes_reach_the_gpu() {
    let Some(renderer) = render_thread_or_skip() else { return };
    renderer
        .set_source_rgba8(2, 2, pixels(&[RED, GREEN, BLUE, YELLOW]))
        .unwrap();
    let id = renderer.add_effect("flip").unwrap();
    renderer.render().unwrap();

    let mode = renderer
        .parameters(id)
        .unwrap()
        .into_iter()
        .find(|p| p.name() == "Mode")
        .unwrap();
    let writers: Vec<_> = (0..4)
        .map(|offset| {
            let mode = Arc::clone(&mode);
            std::thread::spawn(move || {
                for i in 0..250 {
                    mode.set_int((i + offset) % 4).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let expected = match mode.value().as_i32() {
        0 => [GREEN, RED, YELLOW, BLUE],
        1 => [BLUE, YELLOW, RED, GREEN],
        2 => [YELLOW, BLUE, GREEN, RED],
        _ => [RED, GREEN, BLUE, YELLOW],
    };
    let (_, _, data) = renderer.render_rgba8().unwrap();
    assert_eq!(data, pixels(&expected));
    renderer.shutdown().unwrap();
}
