// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay queue for requests waiting on interactive re-authentication.
//!
//! One queue per [`Session`](crate::session::Session): entries from every
//! client land here in arrival order, and each carries the replay that sends
//! it through the client that queued it.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::reauth::ReauthBridge;
use crate::request::{OutgoingRequest, Response};

type Responder = oneshot::Sender<Result<Response, PipelineError>>;

/// Sends a queued request once more through the client that queued it.
pub type Replay =
    Box<dyn FnOnce(OutgoingRequest) -> BoxFuture<'static, Result<Response, PipelineError>> + Send>;

/// A deferred request and the caller waiting on it.
struct QueueEntry {
    id: Uuid,
    request: OutgoingRequest,
    replay: Replay,
    responder: Responder,
    enqueued_at: Instant,
    ttl: Duration,
    /// Cancels this entry's TTL timer once the entry leaves the queue.
    timer: CancellationToken,
}

/// The caller's side of a queued request.
pub struct Pending {
    id: Uuid,
    rx: oneshot::Receiver<Result<Response, PipelineError>>,
}

impl Pending {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait until the queue replays, abandons, or expires this request.
    pub async fn wait(self) -> Result<Response, PipelineError> {
        self.rx.await.unwrap_or_else(|_| Err(PipelineError::auth_expired("request queue dropped")))
    }
}

/// FIFO buffer of requests whose refresh failed.
///
/// Re-arms the bridge whenever the outstanding prompt is settled: on flush,
/// on abandon, and when expiry empties the queue.
pub struct RequestQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    bridge: ReauthBridge,
    shutdown: CancellationToken,
}

impl RequestQueue {
    pub fn new(bridge: ReauthBridge, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self { entries: Mutex::new(VecDeque::new()), bridge, shutdown })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Defer `request` until [`flush`](Self::flush) or [`abandon`](Self::abandon),
    /// or until `ttl` elapses.
    ///
    /// A request that was already queued once is rejected immediately.
    pub fn enqueue(
        self: &Arc<Self>,
        mut request: OutgoingRequest,
        ttl: Duration,
        replay: Replay,
    ) -> Pending {
        let id = Uuid::new_v4();
        let (responder, rx) = oneshot::channel();

        if !request.mark_queued() {
            tracing::warn!(method = %request.method, url = %request.url, "request was already queued once, rejecting");
            let _ = responder.send(Err(PipelineError::auth_expired("request already queued")));
            return Pending { id, rx };
        }

        let timer = self.shutdown.child_token();
        tracing::debug!(%id, method = %request.method, url = %request.url, "request queued for re-authentication");
        self.entries.lock().push_back(QueueEntry {
            id,
            request,
            replay,
            responder,
            enqueued_at: Instant::now(),
            ttl,
            timer: timer.clone(),
        });

        let queue = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(ttl) => expire(queue, id),
                _ = timer.cancelled() => {}
            }
        });

        Pending { id, rx }
    }

    /// Replay every queued request in enqueue order.
    ///
    /// Each replay is awaited before the next starts. Entries whose caller
    /// has gone away are dropped without being sent. Returns the number of
    /// requests replayed.
    pub async fn flush(&self) -> usize {
        self.bridge.resolved();
        let drained: Vec<QueueEntry> = self.entries.lock().drain(..).collect();
        let mut replayed = 0;
        for entry in drained {
            entry.timer.cancel();
            if entry.responder.is_closed() {
                tracing::debug!(id = %entry.id, "queued caller gone, skipping replay");
                continue;
            }
            let waited = entry.enqueued_at.elapsed();
            let result = (entry.replay)(entry.request).await;
            tracing::debug!(id = %entry.id, waited_ms = waited.as_millis() as u64, ok = result.is_ok(), "queued request replayed");
            let _ = entry.responder.send(result);
            replayed += 1;
        }
        replayed
    }

    /// Reject every queued request with `AuthExpired`. Returns how many.
    pub fn abandon(&self, reason: &str) -> usize {
        self.bridge.resolved();
        let drained: Vec<QueueEntry> = self.entries.lock().drain(..).collect();
        let count = drained.len();
        for entry in drained {
            entry.timer.cancel();
            let _ = entry.responder.send(Err(PipelineError::auth_expired(reason)));
        }
        if count > 0 {
            tracing::info!(count, reason, "queued requests abandoned");
        }
        count
    }
}

fn expire(queue: Weak<RequestQueue>, id: Uuid) {
    let Some(queue) = queue.upgrade() else {
        return;
    };
    let (entry, drained) = {
        let mut entries = queue.entries.lock();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return;
        };
        let entry = entries.remove(pos);
        (entry, entries.is_empty())
    };
    // Nobody answered the prompt in time; let the next failure ask again.
    if drained {
        queue.bridge.resolved();
    }
    if let Some(entry) = entry {
        tracing::warn!(%id, url = %entry.request.url, ttl_ms = entry.ttl.as_millis() as u64, "queued request expired");
        let _ = entry.responder.send(Err(PipelineError::auth_expired(format!(
            "queued request expired after {:?}",
            entry.ttl
        ))));
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
