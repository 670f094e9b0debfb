use thiserror::Error;

/// Failure reported by a transport for a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("request was aborted")]
    Aborted,
    #[error("response body was empty")]
    EmptyPayload,
}

/// Failure turning fetched bytes into a renderable splat cloud.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("asset payload is empty")]
    Empty,
    #[error("compressed splat container `{0}` is not supported")]
    Compressed(String),
    #[error("payload of {len} bytes is not a whole number of {stride}-byte records")]
    Truncated { len: usize, stride: usize },
    #[error("invalid ply header: {0}")]
    PlyHeader(String),
    #[error("ply body holds {actual} bytes, expected {expected}")]
    PlyBody { expected: usize, actual: usize },
    #[error("gpu upload failed: {0}")]
    Upload(String),
    #[error("decoder thread exited without a result")]
    DecoderLost,
}

/// Failure reported by a [`GpuDevice`](crate::gpu::GpuDevice).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter")]
    NoAdapter,
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("buffer `{label}` of {size} bytes exceeds the device limit of {limit}")]
    BufferTooLarge { label: String, size: u64, limit: u64 },
}

/// Error surfaced to the host through the viewer's error callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl From<GpuError> for ParseError {
    fn from(err: GpuError) -> Self {
        ParseError::Upload(err.to_string())
    }
}
