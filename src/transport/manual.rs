use parking_lot::Mutex;

use super::{CancelHandle, FetchSink, Transport};
use crate::error::TransportError;
use crate::request::Generation;

/// Transport driven by the host instead of a network stack.
///
/// Requests are parked until the host calls [`complete`](Self::complete) or
/// [`fail`](Self::fail). Useful for embedding hosts that already own their
/// network layer, and for exercising out-of-order delivery.
#[derive(Debug, Default)]
pub struct ManualTransport {
    pending: Mutex<Vec<ParkedFetch>>,
    history: Mutex<Vec<String>>,
    leaky: bool,
}

#[derive(Debug)]
struct ParkedFetch {
    url: String,
    sink: FetchSink,
    cancel: CancelHandle,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose cancellation does not stop delivery.
    pub fn leaky() -> Self {
        Self {
            leaky: true,
            ..Self::default()
        }
    }

    /// Every URL fetched so far, in issue order.
    pub fn requests(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    /// Parked fetches as `(url, generation, cancelled)`.
    pub fn pending(&self) -> Vec<(String, Generation, bool)> {
        self.pending
            .lock()
            .iter()
            .map(|fetch| {
                (
                    fetch.url.clone(),
                    fetch.sink.generation(),
                    fetch.cancel.is_cancelled(),
                )
            })
            .collect()
    }

    /// Reports progress on the oldest parked fetch for `url`.
    pub fn progress(&self, url: &str, loaded: u64, total: Option<u64>) -> bool {
        let pending = self.pending.lock();
        match pending.iter().find(|fetch| fetch.url == url) {
            Some(fetch) => {
                fetch.sink.progress(loaded, total);
                true
            }
            None => false,
        }
    }

    pub fn complete(&self, url: &str, bytes: Vec<u8>) -> bool {
        self.take(url).map(|sink| sink.complete(bytes)).is_some()
    }

    pub fn fail(&self, url: &str, error: TransportError) -> bool {
        self.take(url).map(|sink| sink.fail(error)).is_some()
    }

    fn take(&self, url: &str) -> Option<FetchSink> {
        let mut pending = self.pending.lock();
        let index = pending.iter().position(|fetch| fetch.url == url)?;
        Some(pending.remove(index).sink)
    }
}

impl Transport for ManualTransport {
    fn fetch(&self, url: &str, sink: FetchSink) -> CancelHandle {
        let sink = if self.leaky {
            sink.ignoring_cancellation()
        } else {
            sink
        };
        let cancel = sink.cancel_handle();
        self.history.lock().push(url.to_string());
        self.pending.lock().push(ParkedFetch {
            url: url.to_string(),
            sink,
            cancel: cancel.clone(),
        });
        cancel
    }
}
