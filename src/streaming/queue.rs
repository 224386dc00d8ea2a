//! Bounded streaming queue and worker pool.
//!
//! Streaming work (provider synthesis + transcoding + transport sends) is
//! the expensive part of a session, so it flows through a bounded FIFO
//! drained by a fixed pool of workers started at boot. Enqueueing is
//! non-blocking: a full queue rejects immediately and the transport
//! handler reports the overload to the client.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::GatewayMetrics;
use crate::transport::{StreamFrame, StreamTransport, close_code};

use super::pipeline::TtsService;

/// One queued streaming job. Owns the client transport; whoever ends up
/// with the item is responsible for closing it.
pub struct SessionWorkItem {
    pub session_id: String,
    pub transport: Box<dyn StreamTransport>,
    /// Fired when the client disconnects or the stream is cancelled
    /// out-of-band.
    pub cancel: CancellationToken,
}

/// Sending half of the streaming queue.
#[derive(Clone)]
pub struct StreamingQueue {
    tx: mpsc::Sender<SessionWorkItem>,
    metrics: Arc<GatewayMetrics>,
}

impl StreamingQueue {
    pub fn new(
        maxsize: usize,
        metrics: Arc<GatewayMetrics>,
    ) -> (Self, mpsc::Receiver<SessionWorkItem>) {
        let (tx, rx) = mpsc::channel(maxsize);
        GatewayMetrics::set(&metrics.queue_maxsize, maxsize as u64);
        (Self { tx, metrics }, rx)
    }

    /// Non-blocking enqueue. On rejection the item is handed back so the
    /// caller can report the overload on its transport.
    pub fn try_enqueue(&self, item: SessionWorkItem) -> Result<(), SessionWorkItem> {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.note_depth();
                Ok(())
            }
            Err(TrySendError::Full(item)) => {
                warn!(
                    session_id = %item.session_id,
                    maxsize = self.tx.max_capacity(),
                    "session queue full, rejecting stream request"
                );
                GatewayMetrics::inc(&self.metrics.queue_full_total);
                Err(item)
            }
            Err(TrySendError::Closed(item)) => {
                warn!(session_id = %item.session_id, "session queue closed");
                Err(item)
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub(crate) fn note_depth(&self) {
        GatewayMetrics::set(&self.metrics.queue_depth, self.depth() as u64);
    }
}

/// Fixed pool of streaming workers draining the queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    receiver: Arc<Mutex<mpsc::Receiver<SessionWorkItem>>>,
}

impl WorkerPool {
    pub fn spawn(
        worker_count: usize,
        receiver: mpsc::Receiver<SessionWorkItem>,
        queue: StreamingQueue,
        service: Arc<TtsService>,
        metrics: Arc<GatewayMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        GatewayMetrics::set(&metrics.workers_total, worker_count as u64);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (1..=worker_count)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let queue = queue.clone();
                let service = Arc::clone(&service);
                let metrics = Arc::clone(&metrics);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    info!(worker_id, "streaming worker started");
                    loop {
                        let item = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            item = async { receiver.lock().await.recv().await } => {
                                match item {
                                    Some(item) => item,
                                    None => break,
                                }
                            }
                        };
                        queue.note_depth();
                        GatewayMetrics::inc(&metrics.workers_busy);
                        GatewayMetrics::inc(&metrics.active_streams);
                        service.run(item).await;
                        GatewayMetrics::dec(&metrics.active_streams);
                        GatewayMetrics::dec(&metrics.workers_busy);
                    }
                    info!(worker_id, "streaming worker stopped");
                })
            })
            .collect();

        Self { handles, receiver }
    }

    /// Wait for workers to finish, then tell any still-queued clients the
    /// gateway is going away.
    pub async fn shutdown(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
        let mut receiver = self.receiver.lock().await;
        while let Ok(mut item) = receiver.try_recv() {
            let _ = item
                .transport
                .send(StreamFrame::error(503, "shutting_down"))
                .await;
            item.transport.close(close_code::TRY_AGAIN_LATER).await;
        }
    }
}
