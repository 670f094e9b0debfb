use std::sync::Arc;

use bytemuck::{bytes_of, Pod, Zeroable};
use glam::UVec2;
use log::{debug, warn};

use crate::camera::{aspect_ratio, Camera, CameraParams};
use crate::config::RendererOptions;
use crate::error::GpuError;
use crate::gpu::{BufferId, BufferKind, GpuDevice};
use crate::scene_graph::{NodeId, NodeKind, SceneNode};
use crate::transform::Transform;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct RendererUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    render_size: [f32; 2],
    focal_adjustment: f32,
    blur_amount: f32,
}

/// The per-viewer splat renderer.
///
/// It is attached to the scene once per mount, follows the host camera and
/// keeps its render size in step with the drawing buffer. All of its GPU
/// state lives in one uniform buffer released by [`dispose`](Self::dispose).
pub struct RendererHandle {
    node: NodeId,
    device: Arc<dyn GpuDevice>,
    uniform: BufferId,
    options: RendererOptions,
    render_size: UVec2,
    camera: Option<CameraParams>,
    disposed: bool,
}

impl RendererHandle {
    pub fn create(device: Arc<dyn GpuDevice>, options: RendererOptions) -> Result<Self, GpuError> {
        let initial = RendererUniform {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            camera_position: [0.0; 4],
            render_size: [0.0; 2],
            focal_adjustment: options.focal_adjustment,
            blur_amount: options.blur_amount,
        };
        let uniform = device.create_buffer("splat-renderer", BufferKind::Uniform, bytes_of(&initial))?;
        Ok(Self {
            node: NodeId::fresh(),
            device,
            uniform,
            options,
            render_size: UVec2::ZERO,
            camera: None,
            disposed: false,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn scene_node(&self) -> SceneNode {
        SceneNode {
            id: self.node,
            name: "splat-renderer".to_string(),
            kind: NodeKind::Renderer,
            transform: Transform::IDENTITY,
        }
    }

    pub fn options(&self) -> RendererOptions {
        self.options
    }

    pub fn render_size(&self) -> UVec2 {
        self.render_size
    }

    pub fn camera(&self) -> Option<CameraParams> {
        self.camera
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Records the drawing-buffer size. Zero-area buffers are ignored.
    /// Returns `true` when the size changed.
    pub fn sync_render_size(&mut self, size: UVec2) -> bool {
        if self.disposed || size.x == 0 || size.y == 0 || size == self.render_size {
            return false;
        }
        self.render_size = size;
        self.upload();
        true
    }

    /// Follows the host camera. Returns `true` when the view changed.
    pub fn sync_camera(&mut self, camera: &Camera) -> bool {
        if self.disposed {
            return false;
        }
        let params = camera.params(aspect_ratio(self.render_size.x, self.render_size.y));
        if self.camera == Some(params) {
            return false;
        }
        self.camera = Some(params);
        self.upload();
        true
    }

    fn upload(&self) {
        let camera = self.camera.unwrap_or(CameraParams {
            view_proj: glam::Mat4::IDENTITY,
            position: glam::Vec3::ZERO,
        });
        let uniform = RendererUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            render_size: self.render_size.as_vec2().to_array(),
            focal_adjustment: self.options.focal_adjustment,
            blur_amount: self.options.blur_amount,
        };
        self.device.write_buffer(self.uniform, 0, bytes_of(&uniform));
    }

    /// Releases the uniform buffer. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            warn!("splat renderer {} disposed twice", self.node);
            return;
        }
        self.disposed = true;
        self.device.destroy_buffer(self.uniform);
        debug!("splat renderer {} disposed", self.node);
    }
}

impl Drop for RendererHandle {
    fn drop(&mut self) {
        if !self.disposed {
            self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn uniform_layout_has_no_padding() {
        assert_eq!(std::mem::size_of::<RendererUniform>(), 96);
    }

    #[test]
    fn render_size_only_updates_on_change() {
        let device = Arc::new(HeadlessDevice::new());
        let mut renderer = RendererHandle::create(device.clone(), RendererOptions::default()).unwrap();
        assert!(renderer.sync_render_size(UVec2::new(800, 600)));
        assert!(!renderer.sync_render_size(UVec2::new(800, 600)));
        assert!(!renderer.sync_render_size(UVec2::new(0, 600)));
        assert_eq!(renderer.render_size(), UVec2::new(800, 600));
        assert_eq!(device.stats().writes, 1);
        assert_eq!(device.stats().created, 1);
    }

    #[test]
    fn dispose_is_idempotent_and_drop_releases() {
        let device = Arc::new(HeadlessDevice::new());
        let mut renderer = RendererHandle::create(device.clone(), RendererOptions::default()).unwrap();
        renderer.dispose();
        renderer.dispose();
        assert_eq!(device.stats().live, 0);
        assert!(!renderer.sync_camera(&Camera::default()));

        let dropped = RendererHandle::create(device.clone(), RendererOptions::default()).unwrap();
        assert_eq!(device.stats().live, 1);
        drop(dropped);
        assert_eq!(device.stats().live, 0);
    }
}
