// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Re-authentication signal between the pipeline and whatever UI hosts it.
//!
//! The pipeline only ever calls [`ReauthBridge::signal`]. A UI layer
//! subscribes, shows one prompt, and answers by flushing or abandoning the
//! session's queue, which re-arms the bridge.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// "Authentication required now." Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReauthEvent;

struct BridgeInner {
    tx: broadcast::Sender<ReauthEvent>,
    /// Set while a prompt is outstanding; further signals coalesce.
    pending: AtomicBool,
    published: AtomicU64,
}

/// Injectable publish/subscribe primitive for re-auth prompts.
#[derive(Clone)]
pub struct ReauthBridge {
    inner: Arc<BridgeInner>,
}

impl Default for ReauthBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ReauthBridge {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(BridgeInner {
                tx,
                pending: AtomicBool::new(false),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Ask the UI for re-authentication.
    ///
    /// Returns `true` if an event was published, `false` if a prompt is
    /// already outstanding or nobody is listening.
    pub fn signal(&self) -> bool {
        if self.inner.pending.swap(true, Ordering::AcqRel) {
            tracing::debug!("re-auth already pending, signal coalesced");
            return false;
        }
        match self.inner.tx.send(ReauthEvent) {
            Ok(receivers) => {
                self.inner.published.fetch_add(1, Ordering::Relaxed);
                tracing::info!(receivers, "re-authentication required");
                true
            }
            Err(_) => {
                // Nobody to prompt; stay armed for a later subscriber.
                self.inner.pending.store(false, Ordering::Release);
                tracing::warn!("re-authentication required but no subscriber is listening");
                false
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReauthEvent> {
        self.inner.tx.subscribe()
    }

    /// Run `handler` for every published event until the bridge is dropped.
    pub fn on_signal<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(ReauthEvent) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        })
    }

    /// The outstanding prompt was answered (login or dismissal).
    pub fn resolved(&self) {
        self.inner.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Number of events actually delivered to subscribers.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "reauth_tests.rs"]
mod tests;
