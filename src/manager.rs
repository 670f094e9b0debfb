//! Lifetime of the renderer and the current asset inside the host scene.
//!
//! The manager runs on the host thread. Transports and decoders may work on
//! other threads, but their results only reach the scene when the host calls
//! [`SceneAttachmentManager::poll`]; every such result carries the
//! [`Generation`] of the request that produced it and is dropped unless that
//! generation is still current.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use glam::UVec2;
use log::{debug, info, warn};

use crate::camera::Camera;
use crate::config::RendererOptions;
use crate::error::ViewerError;
use crate::factory::{AssetHandle, GpuResourceFactory, ReadySignal};
use crate::frame_sync::{self, FrameContext, FrameReport};
use crate::gpu::GpuDevice;
use crate::renderer::RendererHandle;
use crate::request::{AssetRequest, Generation, LoadProgress, ProgressGate};
use crate::scene_graph::SceneGraph;
use crate::transform::TransformState;
use crate::transport::{CancelHandle, FetchEvent, FetchEventKind, FetchSink, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerState {
    Unmounted,
    RendererAttaching,
    RendererReady,
    /// A fetch is in flight, or the asset is attached but still decoding.
    AssetLoading,
    AssetReady,
    Disposing,
}

impl ViewerState {
    pub fn is_mounted(self) -> bool {
        matches!(
            self,
            ViewerState::RendererReady | ViewerState::AssetLoading | ViewerState::AssetReady
        )
    }
}

/// Host notifications. Every callback is optional.
#[derive(Default)]
pub struct ViewerCallbacks {
    on_progress: Option<Box<dyn FnMut(f32)>>,
    on_load: Option<Box<dyn FnMut()>>,
    on_error: Option<Box<dyn FnMut(&ViewerError)>>,
}

impl ViewerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives load progress as a percentage in `0..=100`.
    pub fn on_progress(mut self, callback: impl FnMut(f32) + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn on_load(mut self, callback: impl FnMut() + 'static) -> Self {
        self.on_load = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnMut(&ViewerError) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ViewerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewerCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_load", &self.on_load.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

struct InFlight {
    request: AssetRequest,
    cancel: CancelHandle,
}

/// Owns one renderer and at most one asset inside a host scene graph.
pub struct SceneAttachmentManager {
    scene: Arc<dyn SceneGraph>,
    device: Arc<dyn GpuDevice>,
    transport: Arc<dyn Transport>,
    factory: GpuResourceFactory,
    options: RendererOptions,
    callbacks: ViewerCallbacks,
    state: ViewerState,
    generation: Generation,
    current: Option<AssetRequest>,
    in_flight: Option<InFlight>,
    renderer: Option<RendererHandle>,
    asset: Option<AssetHandle>,
    ready: Option<ReadySignal>,
    progress: ProgressGate,
    events_tx: Sender<FetchEvent>,
    events: Receiver<FetchEvent>,
    last_error: Option<ViewerError>,
}

impl SceneAttachmentManager {
    pub fn new(
        scene: Arc<dyn SceneGraph>,
        device: Arc<dyn GpuDevice>,
        transport: Arc<dyn Transport>,
        options: RendererOptions,
        decode_on_worker: bool,
    ) -> Self {
        let (events_tx, events) = mpsc::channel();
        let factory = GpuResourceFactory::new(Arc::clone(&device), decode_on_worker);
        Self {
            scene,
            device,
            transport,
            factory,
            options,
            callbacks: ViewerCallbacks::default(),
            state: ViewerState::Unmounted,
            generation: Generation::NONE,
            current: None,
            in_flight: None,
            renderer: None,
            asset: None,
            ready: None,
            progress: ProgressGate::default(),
            events_tx,
            events,
            last_error: None,
        }
    }

    pub fn with_callbacks(mut self, callbacks: ViewerCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn set_callbacks(&mut self, callbacks: ViewerCallbacks) {
        self.callbacks = callbacks;
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// URL of the most recent request, if any is active.
    pub fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(AssetRequest::url)
    }

    pub fn renderer(&self) -> Option<&RendererHandle> {
        self.renderer.as_ref()
    }

    pub fn asset(&self) -> Option<&AssetHandle> {
        self.asset.as_ref()
    }

    pub fn last_error(&self) -> Option<&ViewerError> {
        self.last_error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.state == ViewerState::AssetLoading
    }

    /// Creates the renderer and attaches it to the scene.
    pub fn mount(&mut self, camera: &Camera, drawing_buffer: UVec2) -> Result<(), ViewerError> {
        if self.state != ViewerState::Unmounted {
            warn!("mount called while {:?}; ignoring", self.state);
            return Ok(());
        }
        self.state = ViewerState::RendererAttaching;
        let mut renderer = match RendererHandle::create(Arc::clone(&self.device), self.options) {
            Ok(renderer) => renderer,
            Err(err) => {
                self.state = ViewerState::Unmounted;
                let err = ViewerError::from(err);
                self.report_error(err.clone());
                return Err(err);
            }
        };
        self.scene.add(renderer.scene_node());
        renderer.sync_render_size(drawing_buffer);
        renderer.sync_camera(camera);
        debug!("splat renderer {} attached", renderer.node_id());
        self.renderer = Some(renderer);
        self.state = ViewerState::RendererReady;
        Ok(())
    }

    /// Starts loading `url`, replacing whatever asset is current.
    ///
    /// Re-requesting the URL that is already loading or loaded does nothing;
    /// re-requesting it after a failure fetches it again.
    pub fn request_asset(&mut self, url: &str) {
        if !self.state.is_mounted() {
            warn!("asset request for {url} while {:?}; ignoring", self.state);
            return;
        }
        let active = matches!(
            self.state,
            ViewerState::AssetLoading | ViewerState::AssetReady
        );
        if active && self.current_url() == Some(url) {
            debug!("{url} is already current");
            return;
        }

        self.abandon_current();
        let request = AssetRequest::new(url, self.generation);
        let sink = FetchSink::new(request.generation(), self.events_tx.clone());
        let cancel = self.transport.fetch(url, sink);
        info!("loading {url} ({})", request.generation());
        self.in_flight = Some(InFlight {
            request: request.clone(),
            cancel,
        });
        self.current = Some(request);
        self.state = ViewerState::AssetLoading;
    }

    /// Drops the current asset, returning to a renderer-only view.
    pub fn clear_asset(&mut self) {
        if !self.state.is_mounted() {
            return;
        }
        self.abandon_current();
        self.current = None;
        self.state = ViewerState::RendererReady;
    }

    /// Gives up on a load that has not finished, as a URL change would.
    ///
    /// This is the hook for timeouts composed by the host. Returns `false`
    /// when nothing was loading.
    pub fn cancel_load(&mut self) -> bool {
        if self.state != ViewerState::AssetLoading {
            return false;
        }
        if let Some(request) = &self.current {
            info!("cancelled loading {} ({})", request.url(), request.generation());
        }
        self.clear_asset();
        true
    }

    /// Applies fetch and decode results that arrived since the last call.
    pub fn poll(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if self.state.is_mounted() {
                self.handle_fetch_event(event);
            } else {
                debug!("discarding fetch event {} while unmounted", event.generation);
            }
        }
        if self.state.is_mounted() {
            self.poll_ready();
        }
    }

    /// Per-frame reconciliation; see [`frame_sync::synchronize`].
    pub fn tick(&mut self, frame: &FrameContext<'_>, transform: Option<&TransformState>) -> FrameReport {
        if !self.state.is_mounted() {
            return FrameReport::default();
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return FrameReport::default();
        };
        frame_sync::synchronize(
            self.scene.as_ref(),
            renderer,
            self.asset.as_mut(),
            transform,
            frame,
        )
    }

    /// Cancels any fetch and releases every resource this manager attached.
    /// Calling it again is a no-op.
    pub fn unmount(&mut self) {
        if self.state == ViewerState::Unmounted {
            debug!("unmount called while unmounted");
            return;
        }
        self.state = ViewerState::Disposing;
        self.abandon_current();
        self.current = None;
        if let Some(mut renderer) = self.renderer.take() {
            if !self.scene.remove(renderer.node_id()) {
                warn!("splat renderer {} was not attached", renderer.node_id());
            }
            renderer.dispose();
        }
        let dropped = self.events.try_iter().count();
        if dropped > 0 {
            debug!("dropped {dropped} pending fetch events on unmount");
        }
        self.state = ViewerState::Unmounted;
        debug!("viewer unmounted");
    }

    /// Invalidates the current generation: cancels the fetch and detaches
    /// the asset.
    fn abandon_current(&mut self) {
        self.generation = self.generation.next();
        if let Some(in_flight) = self.in_flight.take() {
            debug!(
                "cancelling fetch of {} ({})",
                in_flight.request.url(),
                in_flight.request.generation()
            );
            in_flight.cancel.cancel();
        }
        self.detach_asset();
        self.progress.reset();
    }

    fn detach_asset(&mut self) {
        self.ready = None;
        if let Some(mut asset) = self.asset.take() {
            if !self.scene.remove(asset.node_id()) {
                warn!("asset {} was not attached", asset.name());
            }
            asset.dispose();
        }
    }

    fn handle_fetch_event(&mut self, event: FetchEvent) {
        let current = self
            .in_flight
            .as_ref()
            .map(|in_flight| in_flight.request.generation());
        if current != Some(event.generation) {
            debug!("discarding stale fetch event {}", event.generation);
            return;
        }
        match event.kind {
            FetchEventKind::Progress(progress) => self.report_progress(progress),
            FetchEventKind::Complete(bytes) => {
                let Some(in_flight) = self.in_flight.take() else {
                    return;
                };
                self.report_progress(LoadProgress::complete());
                self.attach(&in_flight.request, bytes);
            }
            FetchEventKind::Failed(err) => {
                self.in_flight = None;
                self.state = ViewerState::RendererReady;
                if let Some(request) = &self.current {
                    warn!("failed to load {}: {err}", request.url());
                }
                self.report_error(err.into());
            }
        }
    }

    fn attach(&mut self, request: &AssetRequest, bytes: Vec<u8>) {
        let size = bytes.len();
        match self.factory.build(request, bytes) {
            Ok((handle, signal)) => {
                debug!(
                    "attaching {} ({size} bytes, {:?})",
                    handle.name(),
                    handle.format()
                );
                self.scene.add(handle.scene_node());
                self.asset = Some(handle);
                self.ready = Some(signal);
            }
            Err(err) => {
                self.state = ViewerState::RendererReady;
                warn!("failed to load {}: {err}", request.url());
                self.report_error(err.into());
            }
        }
    }

    fn poll_ready(&mut self) {
        let Some(signal) = self.ready.as_mut() else {
            return;
        };
        let Some(result) = signal.poll() else {
            return;
        };
        let generation = signal.generation();
        self.ready = None;

        let Some(asset) = self.asset.as_mut() else {
            debug!("decode result {generation} has no asset");
            return;
        };
        if asset.generation() != generation {
            debug!("discarding stale decode result {generation}");
            return;
        }
        match asset.resolve(result) {
            Ok(()) => {
                info!("loaded {} ({} splats)", asset.name(), asset.splat_count());
                self.state = ViewerState::AssetReady;
                if let Some(on_load) = self.callbacks.on_load.as_mut() {
                    on_load();
                }
            }
            Err(err) => {
                warn!("failed to decode {}: {err}", asset.name());
                self.detach_asset();
                self.state = ViewerState::RendererReady;
                self.report_error(err.into());
            }
        }
    }

    fn report_progress(&mut self, progress: LoadProgress) {
        if let Some(progress) = self.progress.admit(progress) {
            if let Some(on_progress) = self.callbacks.on_progress.as_mut() {
                on_progress(progress.percent());
            }
        }
    }

    fn report_error(&mut self, err: ViewerError) {
        if let Some(on_error) = self.callbacks.on_error.as_mut() {
            on_error(&err);
        }
        self.last_error = Some(err);
    }
}

impl Drop for SceneAttachmentManager {
    fn drop(&mut self) {
        if self.state != ViewerState::Unmounted {
            self.unmount();
        }
    }
}
