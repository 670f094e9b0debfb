//! GPU buffer ownership.
//!
//! The viewer only ever needs to create, update and destroy buffers, so the
//! device surface is kept that small. [`HeadlessDevice`] keeps allocation
//! accounting without a GPU; [`WgpuDevice`] backs buffers with `wgpu`.

mod headless;
mod wgpu_device;

use std::fmt;
use std::sync::Arc;

use crate::error::GpuError;

pub use headless::HeadlessDevice;
pub use wgpu_device::WgpuDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Per-splat records read by the splat shader.
    Storage,
    /// Small per-renderer constants.
    Uniform,
}

/// Counters kept by every device implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub created: u64,
    pub destroyed: u64,
    pub live: usize,
    pub live_bytes: u64,
    pub writes: u64,
}

pub trait GpuDevice: Send + Sync {
    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> Result<BufferId, GpuError>;

    /// Overwrites part of an existing buffer. Never allocates.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]);

    /// Releases the buffer. Unknown ids are ignored.
    fn destroy_buffer(&self, id: BufferId);

    fn stats(&self) -> DeviceStats;
}

impl<T> GpuDevice for Arc<T>
where
    T: GpuDevice + ?Sized,
{
    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> Result<BufferId, GpuError> {
        (**self).create_buffer(label, kind, contents)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) {
        (**self).write_buffer(id, offset, data)
    }

    fn destroy_buffer(&self, id: BufferId) {
        (**self).destroy_buffer(id)
    }

    fn stats(&self) -> DeviceStats {
        (**self).stats()
    }
}
