use glam::UVec2;

use crate::camera::Camera;
use crate::factory::AssetHandle;
use crate::renderer::RendererHandle;
use crate::scene_graph::SceneGraph;
use crate::transform::TransformState;

/// Host inputs borrowed for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub camera: &'a Camera,
    pub drawing_buffer: UVec2,
}

/// What a frame tick changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub resized: bool,
    pub camera_moved: bool,
    pub transform_applied: bool,
    /// The asset had uploaded splats this frame.
    pub drawable: bool,
}

/// Per-frame reconciliation of already-owned objects.
///
/// Only writes existing buffers and node transforms; it never creates GPU
/// resources and never touches the network state.
pub fn synchronize(
    scene: &dyn SceneGraph,
    renderer: &mut RendererHandle,
    asset: Option<&mut AssetHandle>,
    transform: Option<&TransformState>,
    frame: &FrameContext<'_>,
) -> FrameReport {
    let mut report = FrameReport {
        resized: renderer.sync_render_size(frame.drawing_buffer),
        camera_moved: false,
        transform_applied: false,
        drawable: false,
    };
    // Aspect depends on the render size, so the camera goes second.
    report.camera_moved = renderer.sync_camera(frame.camera) || report.resized;

    if let Some(asset) = asset {
        report.drawable = asset.is_ready();
        if let Some(state) = transform {
            let next = state.apply(asset.transform());
            if next != asset.transform() {
                asset.set_transform(next);
                scene.set_transform(asset.node_id(), next);
                report.transform_applied = true;
            }
        }
    }
    report
}
