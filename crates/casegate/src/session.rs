// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-wide auth state shared by every backend client.

use std::sync::Arc;

use reqwest::cookie::Jar;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::queue::RequestQueue;
use crate::reauth::ReauthBridge;
use crate::refresh::{RefreshCoordinator, RefreshState};
use crate::token_store::TokenStore;

struct Shared {
    refresh: RefreshCoordinator,
    queue: Arc<RequestQueue>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The credential store, re-auth bridge, cookie jar, refresh slot, and
/// replay queue one application shares across all of its
/// [`AuthClient`](crate::client::AuthClient)s.
///
/// At most one refresh is in flight per session, and one re-auth prompt
/// answers every client: [`flush`](Self::flush) replays the queued requests
/// of all clients in arrival order.
#[derive(Clone)]
pub struct Session {
    pub store: TokenStore,
    pub bridge: ReauthBridge,
    pub jar: Arc<Jar>,
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(store: TokenStore, bridge: ReauthBridge, jar: Arc<Jar>) -> Self {
        let shutdown = CancellationToken::new();
        let shared = Shared {
            refresh: RefreshCoordinator::new(store.clone()),
            queue: RequestQueue::new(bridge.clone(), shutdown.clone()),
            shutdown,
        };
        Self { store, bridge, jar, shared: Arc::new(shared) }
    }

    /// Full backend chain for `config` (files under the state directory).
    pub fn standard(config: &ClientConfig) -> Self {
        let jar = Arc::new(Jar::default());
        let store = TokenStore::standard(config, Arc::clone(&jar));
        Self::new(store, ReauthBridge::new(), jar)
    }

    /// In-process only; nothing touches disk.
    pub fn in_memory() -> Self {
        Self::new(TokenStore::in_memory(), ReauthBridge::new(), Arc::new(Jar::default()))
    }

    pub(crate) fn refresher(&self) -> &RefreshCoordinator {
        &self.shared.refresh
    }

    pub(crate) fn queue(&self) -> &Arc<RequestQueue> {
        &self.shared.queue
    }

    /// Refresh calls sent over the network by any client of this session.
    pub fn refresh_calls(&self) -> u64 {
        self.shared.refresh.calls()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.shared.refresh.state()
    }

    /// Requests currently waiting for re-authentication, across all clients.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Re-authentication succeeded: replay every queued request in FIFO
    /// order, each through the client that queued it, with the now-current
    /// credential. Returns how many were replayed.
    pub async fn flush(&self) -> usize {
        let replayed = self.shared.queue.flush().await;
        tracing::info!(replayed, "re-auth queue flushed");
        replayed
    }

    /// Re-authentication was declined: reject every queued request with
    /// `AuthExpired`.
    pub fn abandon(&self, reason: &str) -> usize {
        self.shared.queue.abandon(reason)
    }

    /// Reject queued requests and stop their TTL timers.
    pub fn shutdown(&self) {
        self.shared.queue.abandon("session shut down");
        self.shared.shutdown.cancel();
    }

    pub fn logout(&self) {
        self.store.clear();
        tracing::info!("session cleared");
    }
}
