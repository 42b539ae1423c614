//! GPU buffer ownership.
//!
//! A [`GpuBuffer`] owns exactly one native buffer and releases it when it is
//! dropped. Components that hold GPU data store `GpuBuffer`s by value, so
//! removing the component, destroying its entity or overwriting it with
//! `emplace_or_replace` frees the old buffer before anything else can observe
//! it.

use wgpu::util::DeviceExt;

use crate::error::RenderError;

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Instance,
}

/// Backend side of a [`GpuBuffer`].
pub trait BufferHandle {
    fn size(&self) -> u64;

    fn write(&self, offset: u64, data: &[u8]);

    /// Frees the native resource. Called exactly once, from `GpuBuffer::drop`.
    fn release(&mut self);

    /// The wgpu buffer behind this handle, for backends that bind it.
    fn native(&self) -> Option<&wgpu::Buffer> {
        None
    }
}

pub struct GpuBuffer {
    label: String,
    usage: BufferUsage,
    handle: Box<dyn BufferHandle>,
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("label", &self.label)
            .field("usage", &self.usage)
            .field("size", &self.handle.size())
            .finish()
    }
}

impl GpuBuffer {
    pub fn new(label: impl Into<String>, usage: BufferUsage, handle: Box<dyn BufferHandle>) -> Self {
        Self {
            label: label.into(),
            usage,
            handle,
        }
    }

    pub fn native(&self) -> Option<&wgpu::Buffer> {
        self.handle.native()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn size(&self) -> u64 {
        self.handle.size()
    }

    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), RenderError> {
        let len = data.len() as u64;
        if offset + len > self.size() {
            return Err(RenderError::BufferOverflow {
                offset,
                len,
                size: self.size(),
            });
        }
        self.handle.write(offset, data);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        log::debug!("releasing {:?} buffer {}", self.usage, self.label);
        self.handle.release();
    }
}

/// Capability to create buffers on the active graphics device.
pub trait GpuAllocator {
    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<GpuBuffer, RenderError>;
}

struct WgpuBuffer {
    buffer: wgpu::Buffer,
    queue: wgpu::Queue,
}

impl BufferHandle for WgpuBuffer {
    fn size(&self) -> u64 {
        self.buffer.size()
    }

    fn write(&self, offset: u64, data: &[u8]) {
        self.queue.write_buffer(&self.buffer, offset, data);
    }

    fn release(&mut self) {
        self.buffer.destroy();
    }

    fn native(&self) -> Option<&wgpu::Buffer> {
        Some(&self.buffer)
    }
}

/// Device and queue of a wgpu backend.
///
/// Surface, swapchain and pipelines belong to the presentation layer; this
/// type only allocates and fills buffers.
#[derive(Debug, Clone)]
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl WgpuContext {
    /// Request a device without a surface.
    pub async fn new() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Adapter(e.to_string()))?;
        log::info!("using adapter {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("rockflow device"),
                ..Default::default()
            })
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;
        Ok(Self { device, queue })
    }

    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

impl GpuAllocator for WgpuContext {
    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<GpuBuffer, RenderError> {
        let flags = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
            BufferUsage::Instance => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: flags,
            });
        let handle = WgpuBuffer {
            buffer,
            queue: self.queue.clone(),
        };
        Ok(GpuBuffer::new(label, usage, Box::new(handle)))
    }
}
