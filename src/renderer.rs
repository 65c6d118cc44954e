//! Dedicated render thread
//!
//! The render thread creates the `RenderContext` and owns it together with
//! the pipeline, the effect registry and the current source frame. Other
//! threads talk to it through a command channel; commands run strictly in
//! the order they were sent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};

use crate::capture::{self, CaptureError};
use crate::effects::{Effect, EffectId, EffectRegistry, Parameter, ParameterInfo, Pipeline, PipelineError};
use crate::gpu_context::{ContextError, RenderContext};
use crate::settings::PipelineSettings;
use crate::texture::{Texture, TextureError};

/// Error type returned by presentation sinks
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receives the final texture of every rendered frame
pub trait PresentationSink: Send {
    fn present(&mut self, ctx: &RenderContext, frame: &Texture) -> Result<(), SinkError>;
}

/// Writes every presented frame as a numbered PNG into a directory
pub struct PngSequenceSink {
    dir: PathBuf,
    next_index: u64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_index: 0,
        }
    }

    /// Path the next frame will be written to
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!("frame_{:05}.png", self.next_index))
    }
}

impl PresentationSink for PngSequenceSink {
    fn present(&mut self, ctx: &RenderContext, frame: &Texture) -> Result<(), SinkError> {
        let path = self.next_path();
        capture::capture_png(ctx, frame, &path)?;
        self.next_index += 1;
        Ok(())
    }
}

/// Errors raised by render thread commands
#[derive(Debug, thiserror::Error)]
pub enum RenderThreadError {
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("render thread is not running")]
    Disconnected,
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("no source frame has been set")]
    NoSource,
    #[error("presentation sink failed: {0}")]
    Sink(String),
}

/// Everything owned by the render thread
///
/// Closures passed to `RenderThread::execute` receive this state.
pub struct RenderState {
    pub ctx: RenderContext,
    pub pipeline: Pipeline,
    pub registry: EffectRegistry,
    /// Frame fed to the pipeline by `render`
    pub source: Option<Texture>,
    pub sink: Option<Box<dyn PresentationSink>>,
}

impl RenderState {
    pub fn new(ctx: RenderContext, pipeline: Pipeline, registry: EffectRegistry) -> Self {
        Self {
            ctx,
            pipeline,
            registry,
            source: None,
            sink: None,
        }
    }

    /// Replace the source frame with tightly packed RGBA8 pixels.
    ///
    /// Reuses the current source texture when the size is unchanged.
    pub fn set_source_rgba8(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<(), TextureError> {
        match &self.source {
            Some(source) if source.is_valid() && source.size() == (width, height) => {
                source.upload_rgba8(&self.ctx, pixels)
            }
            _ => {
                let texture = Texture::from_rgba8(&self.ctx, width, height, pixels)?;
                if let Some(mut old) = self.source.replace(texture) {
                    old.delete(&self.ctx);
                }
                Ok(())
            }
        }
    }

    /// Render the current source and hand the result to the sink
    pub fn render(&mut self) -> Result<(), RenderThreadError> {
        let Self {
            ctx,
            pipeline,
            source,
            sink,
            ..
        } = self;
        let source = source.as_ref().ok_or(RenderThreadError::NoSource)?;
        let frame = pipeline.render_frame(ctx, source)?;
        if let Some(sink) = sink {
            sink.present(ctx, frame)
                .map_err(|e| RenderThreadError::Sink(e.to_string()))?;
        }
        Ok(())
    }

    /// Render the current source and read the result back as RGBA8
    pub fn render_rgba8(&mut self) -> Result<(u32, u32, Vec<u8>), RenderThreadError> {
        let Self {
            ctx,
            pipeline,
            source,
            ..
        } = self;
        let source = source.as_ref().ok_or(RenderThreadError::NoSource)?;
        let frame = pipeline.render_frame(ctx, source)?;
        let (width, height) = frame.size();
        Ok((width, height, frame.read_rgba8(ctx)?))
    }

    /// Render the current source and save the result as a PNG
    pub fn capture_png(&mut self, path: &Path) -> Result<(), RenderThreadError> {
        let Self {
            ctx,
            pipeline,
            source,
            ..
        } = self;
        let source = source.as_ref().ok_or(RenderThreadError::NoSource)?;
        let frame = pipeline.render_frame(ctx, source)?;
        capture::capture_png(ctx, frame, path)?;
        Ok(())
    }

    /// Release every GPU resource held by the state
    fn teardown(&mut self) {
        self.pipeline.on_surface_destroyed(&self.ctx);
        if let Some(mut source) = self.source.take() {
            source.delete(&self.ctx);
        }
        tracing::debug!(
            live_textures = self.ctx.live_textures(),
            live_programs = self.ctx.live_programs(),
            "Render thread torn down"
        );
    }
}

type Job = Box<dyn FnOnce(&mut RenderState) + Send>;

enum Command {
    Run(Job),
    Shutdown,
}

/// Handle to the render thread
///
/// Dropping the handle shuts the thread down and waits for it.
pub struct RenderThread {
    commands: Sender<Command>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    /// Spawn a render thread with a headless context.
    ///
    /// The pipeline is configured from `settings` and a surface of the
    /// configured size is created.
    pub fn spawn(settings: &PipelineSettings, registry: EffectRegistry) -> Result<Self, RenderThreadError> {
        Self::spawn_with(settings, registry, RenderContext::new_headless)
    }

    /// Spawn a render thread whose context is built by `create_context`.
    ///
    /// `create_context` runs on the new thread.
    pub fn spawn_with<F>(
        settings: &PipelineSettings,
        registry: EffectRegistry,
        create_context: F,
    ) -> Result<Self, RenderThreadError>
    where
        F: FnOnce() -> Result<RenderContext, ContextError> + Send + 'static,
    {
        let (commands, command_rx) = unbounded::<Command>();
        let (ready_tx, ready_rx) = bounded::<Result<(), RenderThreadError>>(1);

        let options = settings.pipeline_options();
        let surface = (settings.surface_width, settings.surface_height);

        let thread_handle = thread::Builder::new()
            .name("spectaculum-render".into())
            .spawn(move || {
                let ctx = match create_context() {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                let mut state = RenderState::new(ctx, Pipeline::new(options), registry);
                if let Err(e) = state.pipeline.on_surface_created(&state.ctx, surface.0, surface.1) {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                tracing::info!("Render thread started");

                while let Ok(command) = command_rx.recv() {
                    match command {
                        Command::Run(job) => job(&mut state),
                        Command::Shutdown => break,
                    }
                }

                state.teardown();
                tracing::info!("Render thread stopped");
            })
            .map_err(RenderThreadError::Spawn)?;

        let mut render_thread = Self {
            commands,
            thread_handle: Some(thread_handle),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(render_thread),
            Ok(Err(e)) => {
                render_thread.join();
                Err(e)
            }
            Err(_) => {
                render_thread.join();
                Err(RenderThreadError::Disconnected)
            }
        }
    }

    /// Queue a closure on the render thread without waiting for it
    pub fn queue_event(&self, job: impl FnOnce(&mut RenderState) + Send + 'static) -> Result<(), RenderThreadError> {
        self.commands
            .send(Command::Run(Box::new(job)))
            .map_err(|_| RenderThreadError::Disconnected)
    }

    /// Run a closure on the render thread and wait for its result
    pub fn execute<R, F>(&self, job: F) -> Result<R, RenderThreadError>
    where
        R: Send + 'static,
        F: FnOnce(&mut RenderState) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = bounded(1);
        self.queue_event(move |state| {
            let _ = reply_tx.send(job(state));
        })?;
        reply_rx.recv().map_err(|_| RenderThreadError::Disconnected)
    }

    /// Upload a new source frame
    pub fn set_source_rgba8(&self, width: u32, height: u32, pixels: Vec<u8>) -> Result<(), RenderThreadError> {
        self.execute(move |state| state.set_source_rgba8(width, height, &pixels))??;
        Ok(())
    }

    /// Set the source frame's 4x4 row-major transform
    pub fn set_source_transform(&self, row_major: [f32; 16]) -> Result<(), RenderThreadError> {
        self.execute(move |state| match state.source.as_mut() {
            Some(source) => {
                source.set_transform_matrix(row_major);
                Ok(())
            }
            None => Err(RenderThreadError::NoSource),
        })?
    }

    /// Instantiate a registered effect type at the end of the pipeline
    pub fn add_effect(&self, effect_type: &str) -> Result<EffectId, RenderThreadError> {
        let effect_type = effect_type.to_string();
        Ok(self.execute(move |state| state.pipeline.add_effect_type(&state.registry, &effect_type))??)
    }

    /// Append an already constructed effect
    pub fn add_boxed_effect(&self, effect: Box<dyn Effect>) -> Result<EffectId, RenderThreadError> {
        self.execute(move |state| state.pipeline.add_effect(effect))
    }

    pub fn set_enabled(&self, id: EffectId, enabled: bool) -> Result<(), RenderThreadError> {
        Ok(self.execute(move |state| state.pipeline.set_enabled(id, enabled))??)
    }

    pub fn remove_effect(&self, id: EffectId) -> Result<(), RenderThreadError> {
        Ok(self.execute(move |state| state.pipeline.remove_effect(&state.ctx, id))??)
    }

    pub fn move_effect(&self, id: EffectId, new_index: usize) -> Result<(), RenderThreadError> {
        Ok(self.execute(move |state| state.pipeline.move_effect(id, new_index))??)
    }

    /// Shared handles to an effect's parameters, settable from any thread
    pub fn parameters(&self, id: EffectId) -> Result<Vec<Arc<Parameter>>, RenderThreadError> {
        Ok(self.execute(move |state| {
            state
                .pipeline
                .parameters(id)
                .map(|parameters| parameters.iter().cloned().collect::<Vec<_>>())
        })??)
    }

    /// Parameter descriptors of every effect in chain order
    pub fn parameter_infos(&self) -> Result<Vec<(EffectId, Vec<ParameterInfo>)>, RenderThreadError> {
        self.execute(|state| state.pipeline.parameter_infos())
    }

    /// Effects that failed, with the reason
    pub fn failures(&self) -> Result<Vec<(EffectId, String)>, RenderThreadError> {
        self.execute(|state| {
            state
                .pipeline
                .failures()
                .map(|(id, reason)| (id, reason.to_string()))
                .collect()
        })
    }

    pub fn surface_created(&self, width: u32, height: u32) -> Result<(), RenderThreadError> {
        Ok(self.execute(move |state| state.pipeline.on_surface_created(&state.ctx, width, height))??)
    }

    pub fn surface_changed(&self, width: u32, height: u32) -> Result<(), RenderThreadError> {
        Ok(self.execute(move |state| state.pipeline.on_surface_changed(&state.ctx, width, height))??)
    }

    pub fn surface_destroyed(&self) -> Result<(), RenderThreadError> {
        self.execute(|state| state.pipeline.on_surface_destroyed(&state.ctx))
    }

    pub fn set_sink(&self, sink: Box<dyn PresentationSink>) -> Result<(), RenderThreadError> {
        self.execute(move |state| state.sink = Some(sink))
    }

    /// Render one frame and present it
    pub fn render(&self) -> Result<(), RenderThreadError> {
        self.execute(|state| state.render())?
    }

    /// Render one frame and read it back as RGBA8
    pub fn render_rgba8(&self) -> Result<(u32, u32, Vec<u8>), RenderThreadError> {
        self.execute(|state| state.render_rgba8())?
    }

    /// Render one frame and save it as a PNG
    pub fn capture_png(&self, path: impl Into<PathBuf>) -> Result<(), RenderThreadError> {
        let path = path.into();
        self.execute(move |state| state.capture_png(&path))?
    }

    /// Stop the thread after all queued commands have run
    pub fn shutdown(mut self) -> Result<(), RenderThreadError> {
        let _ = self.commands.send(Command::Shutdown);
        if self.join() {
            Ok(())
        } else {
            Err(RenderThreadError::Disconnected)
        }
    }

    /// Returns false if the thread panicked
    fn join(&mut self) -> bool {
        match self.thread_handle.take() {
            Some(handle) => match handle.join() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Render thread panicked: {:?}", e);
                    false
                }
            },
            None => true,
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_sequence_paths() {
        let sink = PngSequenceSink::new("/tmp/frames");
        assert_eq!(sink.next_path(), PathBuf::from("/tmp/frames/frame_00000.png"));
    }

    #[test]
    fn test_context_failure_is_reported() {
        let result = RenderThread::spawn_with(
            &PipelineSettings::default(),
            EffectRegistry::new(),
            || Err(ContextError::NoAdapter),
        );
        assert!(matches!(
            result,
            Err(RenderThreadError::Context(ContextError::NoAdapter))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RenderThreadError::NoSource.to_string(),
            "no source frame has been set"
        );
        assert_eq!(
            RenderThreadError::from(PipelineError::InvalidSource).to_string(),
            "source texture is not valid"
        );
    }
}
