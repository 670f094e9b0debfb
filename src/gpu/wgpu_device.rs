use std::collections::HashMap;

use log::{info, warn};
use parking_lot::Mutex;
use wgpu::util::DeviceExt;

use super::{BufferId, BufferKind, DeviceStats, GpuDevice};
use crate::error::GpuError;

/// Buffers backed by a real `wgpu` device.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_buffer_size: u64,
    state: Mutex<WgpuState>,
}

#[derive(Default)]
struct WgpuState {
    next_id: u64,
    buffers: HashMap<BufferId, (wgpu::Buffer, u64)>,
    stats: DeviceStats,
}

impl WgpuDevice {
    /// Acquires an adapter and device without a surface.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        let info = adapter.get_info();
        info!("using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("splat-viewer-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|err| GpuError::Device(err.to_string()))?;
        let max_buffer_size = device.limits().max_buffer_size;

        Ok(Self {
            device,
            queue,
            max_buffer_size,
            state: Mutex::new(WgpuState::default()),
        })
    }

    pub fn new_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }
}

impl GpuDevice for WgpuDevice {
    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> Result<BufferId, GpuError> {
        let size = contents.len() as u64;
        if size > self.max_buffer_size {
            return Err(GpuError::BufferTooLarge {
                label: label.to_string(),
                size,
                limit: self.max_buffer_size,
            });
        }
        let usage = match kind {
            BufferKind::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });

        let mut state = self.state.lock();
        state.next_id += 1;
        let id = BufferId::new(state.next_id);
        state.buffers.insert(id, (buffer, size));
        state.stats.created += 1;
        state.stats.live += 1;
        state.stats.live_bytes += size;
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        match state.buffers.get(&id) {
            Some((buffer, _)) => self.queue.write_buffer(buffer, offset, data),
            None => {
                warn!("write to unknown {id}");
                return;
            }
        }
        state.stats.writes += 1;
    }

    fn destroy_buffer(&self, id: BufferId) {
        let mut state = self.state.lock();
        match state.buffers.remove(&id) {
            Some((buffer, size)) => {
                state.stats.destroyed += 1;
                state.stats.live -= 1;
                state.stats.live_bytes -= size;
                buffer.destroy();
            }
            None => warn!("destroy of unknown {id}"),
        }
    }

    fn stats(&self) -> DeviceStats {
        self.state.lock().stats
    }
}
