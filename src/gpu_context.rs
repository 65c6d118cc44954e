//! Rendering context owned by the render thread
//!
//! `RenderContext` wraps the wgpu device and queue together with the
//! host-side state that OpenGL keeps implicitly: which program is current,
//! and which texture/program handles are alive. The context is neither
//! `Send` nor `Sync`, so every GPU call made through it happens on the thread
//! that created it.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::thread::ThreadId;

use crate::shaders::FULLSCREEN_VERTEX_SHADER;

/// Opaque identifier of a GPU texture owned by a `Texture`/`Framebuffer`.
///
/// Identifiers are never reused within one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

/// Opaque identifier of a compiled `ShaderProgram`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Errors raised while creating a rendering context
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to request GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Bookkeeping for GPU handles handed out by the context
#[derive(Debug, Default)]
struct ResourceTracker {
    next_texture: u32,
    next_program: u32,
    textures: HashSet<TextureHandle>,
    programs: HashSet<ProgramId>,
}

/// GPU device, queue and per-thread GL-like state.
pub struct RenderContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    /// Full-screen triangle shared by every program
    vertex_module: wgpu::ShaderModule,
    owner: ThreadId,
    current_program: Cell<Option<ProgramId>>,
    resources: RefCell<ResourceTracker>,
    _not_send: PhantomData<*const ()>,
}

impl RenderContext {
    /// Create a context on the calling thread without any presentation surface.
    pub fn new_headless() -> Result<Self, ContextError> {
        pollster::block_on(Self::request_headless())
    }

    async fn request_headless() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ContextError::NoAdapter)?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Spectaculum Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self::from_parts(device, queue))
    }

    /// Wrap an existing device and queue (e.g. one shared with a window surface).
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fullscreen Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_VERTEX_SHADER.into()),
        });

        Self {
            device,
            queue,
            vertex_module,
            owner: std::thread::current().id(),
            current_program: Cell::new(None),
            resources: RefCell::new(ResourceTracker::default()),
            _not_send: PhantomData,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub(crate) fn vertex_module(&self) -> &wgpu::ShaderModule {
        &self.vertex_module
    }

    /// Whether the caller runs on the thread that created this context.
    pub fn is_render_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }

    /// Assert (in debug builds) that the caller is on the render thread.
    #[track_caller]
    pub fn ensure_render_thread(&self) {
        debug_assert!(
            self.is_render_thread(),
            "RenderContext used outside its render thread"
        );
    }

    /// Block until all submitted GPU work has completed.
    ///
    /// Called before tearing down resources that an in-flight frame may still
    /// reference.
    pub fn wait_idle(&self) {
        self.ensure_render_thread();
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Begin a command encoder for one frame or capture.
    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.ensure_render_thread();
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submit a finished encoder to the queue.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    // ---- current program -------------------------------------------------

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program.get()
    }

    pub(crate) fn set_current_program(&self, program: Option<ProgramId>) {
        self.current_program.set(program);
    }

    /// Unbind whatever program is current.
    pub fn clear_current_program(&self) {
        self.current_program.set(None);
    }

    // ---- resource tracking -----------------------------------------------

    pub(crate) fn register_texture(&self) -> TextureHandle {
        let mut resources = self.resources.borrow_mut();
        resources.next_texture += 1;
        let handle = TextureHandle(resources.next_texture);
        resources.textures.insert(handle);
        handle
    }

    /// Returns false if the handle was not alive.
    pub(crate) fn release_texture(&self, handle: TextureHandle) -> bool {
        self.resources.borrow_mut().textures.remove(&handle)
    }

    pub(crate) fn register_program(&self) -> ProgramId {
        let mut resources = self.resources.borrow_mut();
        resources.next_program += 1;
        let id = ProgramId(resources.next_program);
        resources.programs.insert(id);
        id
    }

    pub(crate) fn release_program(&self, id: ProgramId) -> bool {
        if self.current_program.get() == Some(id) {
            self.current_program.set(None);
        }
        self.resources.borrow_mut().programs.remove(&id)
    }

    /// Number of texture handles currently alive
    pub fn live_textures(&self) -> usize {
        self.resources.borrow().textures.len()
    }

    /// Number of compiled programs currently alive
    pub fn live_programs(&self) -> usize {
        self.resources.borrow().programs.len()
    }

    pub fn is_texture_alive(&self, handle: TextureHandle) -> bool {
        self.resources.borrow().textures.contains(&handle)
    }
}
