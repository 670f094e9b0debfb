use std::collections::HashMap;

use log::warn;
use parking_lot::Mutex;

use super::{BufferId, BufferKind, DeviceStats, GpuDevice};
use crate::error::GpuError;

/// Device that tracks buffers in memory without touching a GPU.
#[derive(Debug)]
pub struct HeadlessDevice {
    max_buffer_size: u64,
    state: Mutex<HeadlessState>,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    buffers: HashMap<BufferId, (String, BufferKind, u64)>,
    stats: DeviceStats,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::with_limit(u64::MAX)
    }

    /// Rejects buffers larger than `max_buffer_size` bytes.
    pub fn with_limit(max_buffer_size: u64) -> Self {
        Self {
            max_buffer_size,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Labels of the live buffers, sorted.
    pub fn live_labels(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut labels: Vec<String> = state
            .buffers
            .values()
            .map(|(label, _, _)| label.clone())
            .collect();
        labels.sort();
        labels
    }
}

impl GpuDevice for HeadlessDevice {
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
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = BufferId::new(state.next_id);
        state.buffers.insert(id, (label.to_string(), kind, size));
        state.stats.created += 1;
        state.stats.live += 1;
        state.stats.live_bytes += size;
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        let Some((label, _, size)) = state.buffers.get(&id) else {
            warn!("write to unknown {id}");
            return;
        };
        if offset + data.len() as u64 > *size {
            warn!("write of {} bytes at {offset} overflows {label}", data.len());
            return;
        }
        state.stats.writes += 1;
    }

    fn destroy_buffer(&self, id: BufferId) {
        let mut state = self.state.lock();
        match state.buffers.remove(&id) {
            Some((_, _, size)) => {
                state.stats.destroyed += 1;
                state.stats.live -= 1;
                state.stats.live_bytes -= size;
            }
            None => warn!("destroy of unknown {id}"),
        }
    }

    fn stats(&self) -> DeviceStats {
        self.state.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_allocations() {
        let device = HeadlessDevice::new();
        let a = device.create_buffer("a", BufferKind::Storage, &[0; 64]).unwrap();
        let b = device.create_buffer("b", BufferKind::Uniform, &[0; 16]).unwrap();
        device.write_buffer(b, 0, &[1; 16]);
        device.destroy_buffer(a);
        device.destroy_buffer(a);
        let stats = device.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.destroyed, 1);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.live_bytes, 16);
        assert_eq!(stats.writes, 1);
        assert_eq!(device.live_labels(), vec!["b".to_string()]);
    }

    #[test]
    fn enforces_limit() {
        let device = HeadlessDevice::with_limit(8);
        let err = device
            .create_buffer("big", BufferKind::Storage, &[0; 9])
            .unwrap_err();
        assert!(matches!(err, GpuError::BufferTooLarge { size: 9, .. }));
        assert_eq!(device.stats().created, 0);
    }
}
