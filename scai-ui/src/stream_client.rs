//! Push-event stream client
//!
//! One connection per run. [`StreamClient::open`] spawns a reader task that pulls the
//! backend's byte stream, decodes SSE frames and forwards them in arrival order. The
//! caller gets two halves:
//! - [`StreamHandle`] owns the connection and closes it (idempotent)
//! - [`StreamSubscription`] yields deliveries until the stream ends or is closed
//!
//! The reader stops after forwarding a terminal event (`complete`/`error`) or a
//! transport failure, so nothing is delivered after either.

use crate::backend::{Backend, RunId};
use futures::StreamExt;
use scai_common::events::{DecodeReport, SseFrameDecoder, DEFAULT_MAX_FRAME_BYTES};
use scai_common::StreamEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DELIVERY_QUEUE_DEPTH: usize = 256;

/// One item forwarded from the connection
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelivery {
    /// Well-formed event envelope
    Event(StreamEvent),
    /// Frame that failed to decode; dropped, connection kept
    Malformed(String),
    /// Connection failed or ended before a terminal event; last delivery
    TransportFailed(String),
}

impl StreamDelivery {
    /// Whether nothing can follow this delivery
    pub fn is_final(&self) -> bool {
        match self {
            StreamDelivery::Event(event) => event.is_terminal(),
            StreamDelivery::Malformed(_) => false,
            StreamDelivery::TransportFailed(_) => true,
        }
    }
}

/// Opens event streams against a backend
#[derive(Clone)]
pub struct StreamClient {
    backend: Arc<dyn Backend>,
    max_frame_bytes: usize,
}

impl StreamClient {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Open the event stream for `run_id`
    ///
    /// Returns immediately; connecting happens in the reader task, and a connect
    /// failure arrives as [`StreamDelivery::TransportFailed`]. Must be called from
    /// within a tokio runtime.
    pub fn open(&self, run_id: RunId) -> (StreamHandle, StreamSubscription) {
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_DEPTH);
        let cancel = CancellationToken::new();

        let reader = StreamReader {
            backend: Arc::clone(&self.backend),
            run_id: run_id.clone(),
            max_frame_bytes: self.max_frame_bytes,
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(reader.run());

        info!(run_id = %run_id, "Event stream opened");

        let handle = StreamHandle {
            run_id: run_id.clone(),
            cancel: cancel.clone(),
            task,
        };
        let subscription = StreamSubscription { run_id, rx, cancel };
        (handle, subscription)
    }
}

/// Owner of one live connection
///
/// Dropping the handle closes the connection.
pub struct StreamHandle {
    run_id: RunId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Close the connection; no delivery is observed afterwards
    ///
    /// Safe to call repeatedly and after the stream ended on its own.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            debug!(run_id = %self.run_id, "Closing event stream");
            self.cancel.cancel();
        }
    }

    /// Closed explicitly, or the reader finished on its own
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Receiving half of a connection
pub struct StreamSubscription {
    run_id: RunId,
    rx: mpsc::Receiver<StreamDelivery>,
    cancel: CancellationToken,
}

impl StreamSubscription {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Next delivery in arrival order
    ///
    /// Returns None once the stream has ended, or as soon as the handle is closed
    /// (buffered deliveries are discarded).
    pub async fn next(&mut self) -> Option<StreamDelivery> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            delivery = self.rx.recv() => delivery,
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

struct StreamReader {
    backend: Arc<dyn Backend>,
    run_id: RunId,
    max_frame_bytes: usize,
    tx: mpsc::Sender<StreamDelivery>,
    cancel: CancellationToken,
}

impl StreamReader {
    async fn run(self) {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return,
            opened = self.backend.open_event_stream(&self.run_id) => opened,
        };

        let mut bytes = match opened {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(run_id = %self.run_id, error = %e, "Failed to open event stream");
                self.deliver(StreamDelivery::TransportFailed(e.to_string())).await;
                return;
            }
        };

        let mut decoder = SseFrameDecoder::<StreamEvent>::new(self.max_frame_bytes);
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(run_id = %self.run_id, "Event stream reader cancelled");
                    return;
                }
                next = bytes.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if let Flow::Stop = self.forward(decoder.push_chunk(&chunk)).await {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(run_id = %self.run_id, error = %e, "Event stream read failed");
                    self.deliver(StreamDelivery::TransportFailed(e.to_string())).await;
                    return;
                }
                None => {
                    if let Flow::Stop = self.forward(decoder.finish()).await {
                        return;
                    }
                    warn!(run_id = %self.run_id, "Event stream ended before a terminal event");
                    self.deliver(StreamDelivery::TransportFailed(
                        "stream ended before completion".to_string(),
                    ))
                    .await;
                    return;
                }
            }
        }
    }

    /// Forward a chunk's frames and errors in stream order, stopping after a terminal event
    async fn forward(&self, report: DecodeReport<StreamEvent>) -> Flow {
        for item in report {
            let (delivery, terminal) = match item {
                Ok(event) => {
                    debug!(run_id = %self.run_id, kind = event.kind(), "Stream event received");
                    let terminal = event.is_terminal();
                    (StreamDelivery::Event(event), terminal)
                }
                Err(error) => {
                    warn!(run_id = %self.run_id, error = %error, "Dropping malformed stream frame");
                    (StreamDelivery::Malformed(error.to_string()), false)
                }
            };
            if !self.deliver(delivery).await || terminal {
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Send one delivery; false when the subscriber is gone or the handle was closed
    async fn deliver(&self, delivery: StreamDelivery) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(delivery) => sent.is_ok(),
        }
    }
}
