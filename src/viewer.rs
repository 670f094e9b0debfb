use std::sync::Arc;

use glam::UVec2;
use log::debug;

use crate::camera::Camera;
use crate::config::ViewerConfig;
use crate::controls::OrbitControls;
use crate::error::ViewerError;
use crate::frame_sync::{FrameContext, FrameReport};
use crate::gpu::GpuDevice;
use crate::input::InputState;
use crate::manager::{SceneAttachmentManager, ViewerCallbacks, ViewerState};
use crate::scene_graph::HostScene;
use crate::transform::TransformState;
use crate::transport::Transport;

/// A splat viewer wired to its own host scene, camera and pointer controls.
///
/// The embedding host forwards pointer events into [`input`](Self::input),
/// reports drawing-buffer changes through [`resize`](Self::resize) and calls
/// [`update`](Self::update) once per rendered frame.
pub struct SplatViewer {
    scene: HostScene,
    camera: Camera,
    controls: OrbitControls,
    input: Arc<InputState>,
    manager: SceneAttachmentManager,
    drawing_buffer: UVec2,
    transform: Option<TransformState>,
}

impl SplatViewer {
    pub fn new(
        config: &ViewerConfig,
        transport: Arc<dyn Transport>,
        device: Arc<dyn GpuDevice>,
    ) -> Self {
        Self::with_scene(HostScene::new(), config, transport, device)
    }

    /// Builds a viewer that attaches into an existing host scene.
    pub fn with_scene(
        scene: HostScene,
        config: &ViewerConfig,
        transport: Arc<dyn Transport>,
        device: Arc<dyn GpuDevice>,
    ) -> Self {
        let camera = Camera::from_config(&config.camera);
        let manager = SceneAttachmentManager::new(
            Arc::new(scene.clone()),
            device,
            transport,
            config.renderer,
            config.decode_on_worker,
        );
        Self {
            scene,
            controls: OrbitControls::from_camera(&camera),
            camera,
            input: Arc::new(InputState::new()),
            manager,
            drawing_buffer: UVec2::ZERO,
            transform: None,
        }
    }

    pub fn set_callbacks(&mut self, callbacks: ViewerCallbacks) {
        self.manager.set_callbacks(callbacks);
    }

    /// Mounts the renderer and starts loading `url`. An empty URL mounts a
    /// renderer-only view.
    pub fn mount(&mut self, url: &str, drawing_buffer: UVec2) -> Result<(), ViewerError> {
        self.drawing_buffer = drawing_buffer;
        self.manager.mount(&self.camera, drawing_buffer)?;
        self.set_url(url);
        Ok(())
    }

    pub fn set_url(&mut self, url: &str) {
        if url.is_empty() {
            self.manager.clear_asset();
        } else {
            self.manager.request_asset(url);
        }
    }

    /// Replaces the declared transform applied to the asset every frame.
    pub fn set_transform(&mut self, transform: Option<TransformState>) {
        self.transform = transform;
    }

    pub fn resize(&mut self, drawing_buffer: UVec2) {
        self.drawing_buffer = drawing_buffer;
    }

    /// Gives up on an unfinished load; see
    /// [`SceneAttachmentManager::cancel_load`].
    pub fn cancel_load(&mut self) -> bool {
        self.manager.cancel_load()
    }

    /// One host frame: controls, pending fetch results, then renderer and
    /// asset reconciliation.
    pub fn update(&mut self) -> FrameReport {
        if self.controls.update(&self.input, &mut self.camera) {
            debug!("camera moved to {:?}", self.camera.position);
        }
        self.manager.poll();
        let frame = FrameContext {
            camera: &self.camera,
            drawing_buffer: self.drawing_buffer,
        };
        self.manager.tick(&frame, self.transform.as_ref())
    }

    pub fn unmount(&mut self) {
        self.manager.unmount();
    }

    pub fn input(&self) -> Arc<InputState> {
        Arc::clone(&self.input)
    }

    pub fn scene(&self) -> &HostScene {
        &self.scene
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn manager(&self) -> &SceneAttachmentManager {
        &self.manager
    }

    pub fn state(&self) -> ViewerState {
        self.manager.state()
    }
}
