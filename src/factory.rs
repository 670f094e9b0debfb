//! Turns fetched bytes into splat assets.
//!
//! [`GpuResourceFactory::build`] returns an [`AssetHandle`] that can be
//! attached to the scene straight away together with a [`ReadySignal`].
//! Once the signal yields, [`AssetHandle::resolve`] uploads the decoded
//! splats and the handle's content moves from `Pending` to `Ready` (or
//! `Failed`).

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};

use crate::error::ParseError;
use crate::gpu::{BufferId, BufferKind, GpuDevice};
use crate::request::{AssetRequest, Generation};
use crate::scene_graph::{NodeId, NodeKind, SceneNode};
use crate::splat::{self, Bounds, SplatCloud, SplatFormat};
use crate::transform::Transform;

/// GPU side of a ready asset.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatResource {
    pub buffer: BufferId,
    pub splat_count: usize,
    pub byte_len: u64,
    pub bounds: Option<Bounds>,
}

/// Readiness of an attached asset.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetContent {
    Pending,
    Ready(SplatResource),
    Failed(ParseError),
}

/// Completion signal of a build.
#[derive(Debug)]
pub struct ReadySignal {
    generation: Generation,
    source: ReadySource,
}

#[derive(Debug)]
enum ReadySource {
    Inline(Option<Result<SplatCloud, ParseError>>),
    Worker(Receiver<Result<SplatCloud, ParseError>>),
}

impl ReadySignal {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Non-blocking. Yields the decode result exactly once.
    pub fn poll(&mut self) -> Option<Result<SplatCloud, ParseError>> {
        match &mut self.source {
            ReadySource::Inline(result) => result.take(),
            ReadySource::Worker(receiver) => match receiver.try_recv() {
                Ok(result) => {
                    self.source = ReadySource::Inline(None);
                    Some(result)
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    self.source = ReadySource::Inline(None);
                    Some(Err(ParseError::DecoderLost))
                }
            },
        }
    }
}

/// Splat object owned by the viewer.
pub struct AssetHandle {
    node: NodeId,
    generation: Generation,
    name: String,
    format: SplatFormat,
    transform: Transform,
    content: AssetContent,
    device: Arc<dyn GpuDevice>,
    disposed: bool,
}

impl AssetHandle {
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn scene_node(&self) -> SceneNode {
        SceneNode {
            id: self.node,
            name: self.name.clone(),
            kind: NodeKind::Asset,
            transform: self.transform,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &SplatFormat {
        &self.format
    }

    pub fn content(&self) -> &AssetContent {
        &self.content
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.content, AssetContent::Ready(_))
    }

    pub fn splat_count(&self) -> usize {
        match &self.content {
            AssetContent::Ready(resource) => resource.splat_count,
            _ => 0,
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Applies the decode result, uploading the splats on success.
    pub fn resolve(&mut self, result: Result<SplatCloud, ParseError>) -> Result<(), ParseError> {
        if self.disposed {
            debug!("ignoring decode result for disposed {}", self.name);
            return Ok(());
        }
        if !matches!(self.content, AssetContent::Pending) {
            warn!("{} resolved twice", self.name);
            return Ok(());
        }
        match result.and_then(|cloud| self.upload(&cloud)) {
            Ok(resource) => {
                self.content = AssetContent::Ready(resource);
                Ok(())
            }
            Err(err) => {
                self.content = AssetContent::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn upload(&self, cloud: &SplatCloud) -> Result<SplatResource, ParseError> {
        if cloud.is_empty() {
            return Err(ParseError::Empty);
        }
        let bytes = cloud.as_bytes();
        let buffer = self
            .device
            .create_buffer(&self.name, BufferKind::Storage, bytes)?;
        Ok(SplatResource {
            buffer,
            splat_count: cloud.len(),
            byte_len: bytes.len() as u64,
            bounds: cloud.bounds(),
        })
    }

    /// Releases GPU memory. The handle must already be detached from the
    /// scene. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            warn!("asset {} ({}) disposed twice", self.name, self.generation);
            return;
        }
        self.disposed = true;
        if let AssetContent::Ready(resource) = &self.content {
            self.device.destroy_buffer(resource.buffer);
        }
        debug!("asset {} ({}) disposed", self.name, self.generation);
    }
}

impl Drop for AssetHandle {
    fn drop(&mut self) {
        if !self.disposed {
            self.dispose();
        }
    }
}

/// Builds [`AssetHandle`]s on a shared device.
pub struct GpuResourceFactory {
    device: Arc<dyn GpuDevice>,
    decode_on_worker: bool,
}

impl GpuResourceFactory {
    pub fn new(device: Arc<dyn GpuDevice>, decode_on_worker: bool) -> Self {
        Self {
            device,
            decode_on_worker,
        }
    }

    /// Validates `bytes` and returns a pending handle plus its signal.
    ///
    /// Format and header problems are reported here; body problems come
    /// through the signal.
    pub fn build(
        &self,
        request: &AssetRequest,
        bytes: Vec<u8>,
    ) -> Result<(AssetHandle, ReadySignal), ParseError> {
        let name = request.file_name_hint().to_string();
        let payload = splat::prepare(bytes, &name)?;
        let format = payload.format();

        let source = if self.decode_on_worker {
            let (sender, receiver) = mpsc::channel();
            let spawned = thread::Builder::new()
                .name(format!("splat-decode-{}", request.generation().value()))
                .spawn(move || {
                    // The receiver is gone when the asset was replaced mid-decode.
                    let _ = sender.send(payload.decode());
                });
            if let Err(err) = spawned {
                warn!("failed to spawn decoder for {name}: {err}");
            }
            ReadySource::Worker(receiver)
        } else {
            ReadySource::Inline(Some(payload.decode()))
        };

        let handle = AssetHandle {
            node: NodeId::fresh(),
            generation: request.generation(),
            name,
            format,
            transform: Transform::IDENTITY,
            content: AssetContent::Pending,
            device: Arc::clone(&self.device),
            disposed: false,
        };
        let signal = ReadySignal {
            generation: request.generation(),
            source,
        };
        Ok((handle, signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use crate::splat::fixtures::splat_bytes;
    use std::time::{Duration, Instant};

    fn request(url: &str) -> AssetRequest {
        AssetRequest::new(url, Generation::new(1))
    }

    #[test]
    fn build_is_pending_until_resolved() {
        let device = Arc::new(HeadlessDevice::new());
        let factory = GpuResourceFactory::new(device.clone(), false);
        let (mut handle, mut signal) = factory.build(&request("/m/a.splat"), splat_bytes(4)).unwrap();
        assert_eq!(handle.name(), "a.splat");
        assert_eq!(handle.content(), &AssetContent::Pending);
        assert_eq!(device.stats().created, 0);

        let result = signal.poll().unwrap();
        assert!(signal.poll().is_none());
        handle.resolve(result).unwrap();
        assert!(handle.is_ready());
        assert_eq!(handle.splat_count(), 4);
        assert_eq!(device.stats().live_bytes, 128);

        handle.dispose();
        handle.dispose();
        assert_eq!(device.stats().live, 0);
    }

    #[test]
    fn malformed_bytes_fail_synchronously_or_via_signal() {
        let device = Arc::new(HeadlessDevice::new());
        let factory = GpuResourceFactory::new(device.clone(), false);
        assert!(matches!(
            factory.build(&request("a.spz"), vec![1, 2, 3]),
            Err(ParseError::Compressed(_))
        ));

        let (mut handle, mut signal) = factory.build(&request("a.splat"), vec![0; 33]).unwrap();
        let err = handle.resolve(signal.poll().unwrap()).unwrap_err();
        assert!(matches!(err, ParseError::Truncated { .. }));
        assert!(matches!(handle.content(), AssetContent::Failed(_)));
        assert_eq!(device.stats().created, 0);
    }

    #[test]
    fn worker_decode_eventually_signals() {
        let device = Arc::new(HeadlessDevice::new());
        let factory = GpuResourceFactory::new(device, true);
        let (mut handle, mut signal) = factory.build(&request("a.splat"), splat_bytes(2)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = loop {
            if let Some(result) = signal.poll() {
                break result;
            }
            assert!(Instant::now() < deadline, "decoder never signalled");
            thread::sleep(Duration::from_millis(1));
        };
        handle.resolve(result).unwrap();
        assert_eq!(handle.splat_count(), 2);
    }

    #[test]
    fn upload_failure_marks_asset_failed() {
        let device = Arc::new(HeadlessDevice::with_limit(32));
        let factory = GpuResourceFactory::new(device, false);
        let (mut handle, mut signal) = factory.build(&request("a.splat"), splat_bytes(2)).unwrap();
        let err = handle.resolve(signal.poll().unwrap()).unwrap_err();
        assert!(matches!(err, ParseError::Upload(_)));
    }
}
