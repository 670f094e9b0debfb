//! Core of a streaming splat viewer.
//!
//! A viewer fetches one binary splat asset at a time, turns it into GPU
//! buffers, attaches it to a host scene graph next to a per-viewer renderer
//! and keeps both in step with the host camera every frame. URL changes and
//! teardown release everything the viewer created, and results of
//! superseded requests are discarded by generation.
//!
//! The host scene graph, the GPU device and the network transport are
//! traits so the crate runs headless in tools and tests.

pub mod camera;
pub mod config;
pub mod controls;
pub mod error;
pub mod factory;
pub mod frame_sync;
pub mod gpu;
pub mod input;
pub mod manager;
pub mod renderer;
pub mod request;
pub mod scene_graph;
pub mod splat;
pub mod transform;
pub mod transport;
pub mod viewer;

pub use camera::{Camera, CameraParams};
pub use config::{CameraConfig, RendererOptions, TransportConfig, ViewerConfig};
pub use controls::OrbitControls;
pub use error::{GpuError, ParseError, TransportError, ViewerError};
pub use factory::{AssetContent, AssetHandle, GpuResourceFactory, ReadySignal, SplatResource};
pub use frame_sync::{synchronize, FrameContext, FrameReport};
pub use gpu::{BufferId, BufferKind, DeviceStats, GpuDevice, HeadlessDevice, WgpuDevice};
pub use input::{InputState, MouseButton};
pub use manager::{SceneAttachmentManager, ViewerCallbacks, ViewerState};
pub use renderer::RendererHandle;
pub use request::{AssetRequest, Generation, LoadProgress};
pub use scene_graph::{HostScene, NodeId, NodeKind, SceneGraph, SceneNode};
pub use splat::{Bounds, SplatCloud, SplatFormat, SplatRecord};
pub use transform::{Transform, TransformState};
pub use transport::{
    CancelHandle, FetchEvent, FetchEventKind, FetchSink, HttpTransport, ManualTransport, Transport,
};
pub use viewer::SplatViewer;
