use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::thread;

use log::{debug, warn};

use super::{CancelHandle, FetchSink, Transport};
use crate::config::TransportConfig;
use crate::error::TransportError;

/// Upper bound on the buffer reserved up front from a reported length.
const MAX_PREALLOCATION: u64 = 256 * 1024 * 1024;

/// Streams assets on a worker thread per request.
///
/// `http://` and `https://` URLs go through `ureq`; `file://` URLs and bare
/// paths are read from disk, relative paths resolved against the configured
/// base directory.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    chunk_size: usize,
    base_dir: Option<PathBuf>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            chunk_size: config.chunk_size.max(1),
            base_dir: config.base_dir.clone(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, sink: FetchSink) -> CancelHandle {
        let cancel = sink.cancel_handle();
        let source = match Source::parse(url, self.base_dir.as_deref()) {
            Ok(source) => source,
            Err(err) => {
                sink.fail(err);
                return cancel;
            }
        };
        let agent = self.agent.clone();
        let chunk_size = self.chunk_size;
        let spawned = thread::Builder::new()
            .name(format!("splat-fetch-{}", sink.generation().value()))
            .spawn(move || run_fetch(&agent, source, chunk_size, sink));
        if let Err(err) = spawned {
            // The sink went down with the closure and has already reported.
            warn!("failed to spawn fetch worker for {url}: {err}");
        }
        cancel
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Http(String),
    File(PathBuf),
}

impl Source {
    fn parse(url: &str, base_dir: Option<&Path>) -> Result<Self, TransportError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(TransportError::InvalidUrl(url.to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(Self::Http(trimmed.to_string()));
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            return Ok(Self::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(TransportError::InvalidUrl(format!(
                "{trimmed} (unsupported scheme `{scheme}`)"
            )));
        }
        let path = Path::new(trimmed.trim_start_matches('/'));
        let resolved = match base_dir {
            Some(base) if !Path::new(trimmed).is_absolute() || trimmed.starts_with('/') => {
                base.join(path)
            }
            _ => PathBuf::from(trimmed),
        };
        Ok(Self::File(resolved))
    }
}

type Body = (Box<dyn Read + Send>, Option<u64>);

fn run_fetch(agent: &ureq::Agent, source: Source, chunk_size: usize, sink: FetchSink) {
    let opened = match &source {
        Source::Http(url) => open_http(agent, url),
        Source::File(path) => open_file(path),
    };
    let (reader, total) = match opened {
        Ok(body) => body,
        Err(err) => return sink.fail(err),
    };
    match read_body(reader, total, chunk_size, &sink) {
        Ok(Some(bytes)) => sink.complete(bytes),
        Ok(None) => debug!("fetch {} aborted", sink.generation()),
        Err(err) => sink.fail(err),
    }
}

fn open_http(agent: &ureq::Agent, url: &str) -> Result<Body, TransportError> {
    let response = agent.get(url).call().map_err(|err| match err {
        ureq::Error::Status(code, _) => TransportError::Status(code),
        ureq::Error::Transport(transport) => TransportError::Network(transport.to_string()),
    })?;
    let total = response
        .header("Content-Length")
        .and_then(|value| value.trim().parse::<u64>().ok());
    Ok((Box::new(response.into_reader()), total))
}

fn open_file(path: &Path) -> Result<Body, TransportError> {
    let file = File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => TransportError::Status(404),
        _ => TransportError::Network(format!("{}: {err}", path.display())),
    })?;
    let total = file.metadata().ok().map(|meta| meta.len());
    Ok((Box::new(file), total))
}

/// Reads the whole body, reporting progress per chunk. Returns `None` when
/// the fetch was cancelled mid-transfer.
fn read_body(
    mut reader: Box<dyn Read + Send>,
    total: Option<u64>,
    chunk_size: usize,
    sink: &FetchSink,
) -> Result<Option<Vec<u8>>, TransportError> {
    let capacity = total.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
    let mut bytes = Vec::with_capacity(capacity);
    let mut chunk = vec![0u8; chunk_size];
    loop {
        if sink.is_cancelled() {
            return Ok(None);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Network(err.to_string())),
        };
        bytes.extend_from_slice(&chunk[..read]);
        sink.progress(bytes.len() as u64, total);
    }
    Ok(Some(bytes))
}
