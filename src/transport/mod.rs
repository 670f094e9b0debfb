//! Binary asset fetching.
//!
//! A [`Transport`] streams one URL per call and reports through a
//! [`FetchSink`]. The sink forwards everything as generation-tagged
//! [`FetchEvent`]s into a channel that the owning viewer drains on its own
//! thread, so transports are free to run on worker threads.

mod http;
mod manual;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use log::debug;

use crate::error::TransportError;
use crate::request::{Generation, LoadProgress};

pub use http::HttpTransport;
pub use manual::ManualTransport;

/// Cancellable streaming fetch primitive.
pub trait Transport: Send + Sync {
    /// Starts streaming `url`. Exactly one terminal call is made on `sink`
    /// unless the returned handle is cancelled first.
    fn fetch(&self, url: &str, sink: FetchSink) -> CancelHandle;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn fetch(&self, url: &str, sink: FetchSink) -> CancelHandle {
        (**self).fetch(url, sink)
    }
}

/// Shared abort flag for one fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Event produced by a fetch, tagged with the generation that issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchEvent {
    pub generation: Generation,
    pub kind: FetchEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchEventKind {
    Progress(LoadProgress),
    Complete(Vec<u8>),
    Failed(TransportError),
}

/// Callback bundle handed to a transport for a single fetch.
///
/// `complete` and `fail` consume the sink. A sink dropped without either
/// reports a network failure, unless the fetch was cancelled.
#[derive(Debug)]
pub struct FetchSink {
    generation: Generation,
    events: Sender<FetchEvent>,
    cancel: CancelHandle,
    honor_cancel: bool,
    finished: bool,
}

impl FetchSink {
    pub fn new(generation: Generation, events: Sender<FetchEvent>) -> Self {
        Self {
            generation,
            events,
            cancel: CancelHandle::new(),
            honor_cancel: true,
            finished: false,
        }
    }

    /// Keeps delivering after cancellation, like a network layer whose
    /// callbacks were already queued when the abort arrived.
    pub fn ignoring_cancellation(mut self) -> Self {
        self.honor_cancel = false;
        self
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Reports bytes received so far. Nothing is emitted when the total is
    /// unknown.
    pub fn progress(&self, loaded: u64, total: Option<u64>) {
        if self.suppressed() {
            return;
        }
        if let Some(progress) = total.and_then(|total| LoadProgress::from_bytes(loaded, total)) {
            self.send(FetchEventKind::Progress(progress));
        }
    }

    pub fn complete(mut self, bytes: Vec<u8>) {
        self.finished = true;
        if self.suppressed() {
            return;
        }
        if bytes.is_empty() {
            self.send(FetchEventKind::Failed(TransportError::EmptyPayload));
        } else {
            self.send(FetchEventKind::Complete(bytes));
        }
    }

    pub fn fail(mut self, error: TransportError) {
        self.finished = true;
        if self.suppressed() {
            return;
        }
        self.send(FetchEventKind::Failed(error));
    }

    fn suppressed(&self) -> bool {
        self.honor_cancel && self.is_cancelled()
    }

    fn send(&self, kind: FetchEventKind) {
        let event = FetchEvent {
            generation: self.generation,
            kind,
        };
        if self.events.send(event).is_err() {
            debug!("fetch {} finished after its viewer went away", self.generation);
        }
    }
}

impl Drop for FetchSink {
    fn drop(&mut self) {
        if !self.finished && !self.suppressed() {
            self.send(FetchEventKind::Failed(TransportError::Network(
                "transport dropped the request without a result".into(),
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    fn drain(rx: &std::sync::mpsc::Receiver<FetchEvent>) -> Vec<FetchEventKind> {
        rx.try_iter().map(|event| event.kind).collect()
    }

    #[test]
    fn progress_needs_total() {
        let (tx, rx) = channel();
        let sink = FetchSink::new(Generation::new(1), tx);
        sink.progress(10, None);
        sink.progress(10, Some(40));
        sink.complete(vec![1, 2, 3]);
        let events = drain(&rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            FetchEventKind::Progress(LoadProgress::from_fraction(0.25))
        );
        assert_eq!(events[1], FetchEventKind::Complete(vec![1, 2, 3]));
    }

    #[test]
    fn empty_body_is_a_failure() {
        let (tx, rx) = channel();
        FetchSink::new(Generation::new(1), tx).complete(Vec::new());
        assert_eq!(
            drain(&rx),
            vec![FetchEventKind::Failed(TransportError::EmptyPayload)]
        );
    }

    #[test]
    fn cancelled_sink_stays_silent() {
        let (tx, rx) = channel();
        let sink = FetchSink::new(Generation::new(3), tx);
        sink.cancel_handle().cancel();
        sink.progress(1, Some(2));
        sink.complete(vec![9]);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn dropped_sink_reports_failure_once() {
        let (tx, rx) = channel();
        drop(FetchSink::new(Generation::new(2), tx));
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].generation, Generation::new(2));
        assert!(matches!(
            events[0].kind,
            FetchEventKind::Failed(TransportError::Network(_))
        ));
    }

    #[test]
    fn leaky_sink_delivers_after_cancel() {
        let (tx, rx) = channel();
        let sink = FetchSink::new(Generation::new(4), tx).ignoring_cancellation();
        sink.cancel_handle().cancel();
        sink.complete(vec![7]);
        assert_eq!(drain(&rx), vec![FetchEventKind::Complete(vec![7])]);
    }
}
