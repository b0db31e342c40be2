// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP client: one instance per backend service.
//!
//! Every call goes through the same pipeline: attach the bearer credential,
//! send, and on 401/403 refresh once (single-flight across the session) and
//! retry once. When the refresh itself fails the call is parked in the
//! session's replay queue and the re-auth bridge is signalled; the caller
//! keeps waiting until the UI flushes or abandons the queue.

use std::sync::{Arc, Once, Weak};

use futures_util::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{join_url, ClientConfig};
use crate::error::PipelineError;
use crate::queue::Replay;
use crate::reauth::ReauthBridge;
use crate::redact;
use crate::refresh::{extract_credential, RefreshPolicy, RESPONSE_TOKEN_FIELDS};
use crate::request::{attach_credential, OutgoingRequest, Response};
use crate::session::Session;
use crate::token_store::TokenStore;

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

struct ClientInner {
    config: ClientConfig,
    http: reqwest::Client,
    policy: RefreshPolicy,
    session: Session,
}

#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<ClientInner>,
}

impl AuthClient {
    /// Build a client for `config.base_url` on top of a shared [`Session`].
    pub fn new(config: ClientConfig, session: &Session) -> Result<Self, PipelineError> {
        ensure_crypto();
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .cookie_provider(Arc::clone(&session.jar))
            .build()?;
        let policy = RefreshPolicy::from_config(&config);
        debug!(base_url = %config.base_url, "authenticated client created");
        Ok(Self { inner: Arc::new(ClientInner { config, http, policy, session: session.clone() }) })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.session.store
    }

    pub fn bridge(&self) -> &ReauthBridge {
        &self.inner.session.bridge
    }

    /// Send `req` through the pipeline.
    pub async fn request(&self, req: OutgoingRequest) -> Result<Response, PipelineError> {
        self.execute(req).await
    }

    /// Like [`request`](Self::request), but gives up with
    /// [`PipelineError::Cancelled`] as soon as `cancel` fires, including while
    /// the request is waiting in the re-auth queue.
    pub async fn request_with_cancel(
        &self,
        req: OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<Response, PipelineError> {
        let (method, url) = (req.method.clone(), req.url.clone());
        tokio::select! {
            result = self.execute(req) => result,
            _ = cancel.cancelled() => {
                debug!(%method, %url, "request cancelled");
                Err(PipelineError::Cancelled)
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<Response, PipelineError> {
        self.request(OutgoingRequest::get(path)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, PipelineError> {
        self.request(OutgoingRequest::post(path).json(body)?).await
    }

    async fn execute(&self, mut req: OutgoingRequest) -> Result<Response, PipelineError> {
        let session = &self.inner.session;
        let sent_with = attach_credential(&mut req, &session.store);
        let response = self.send(&req).await?;

        if !self.inner.policy.is_auth_failure(response.status) {
            return finish(response);
        }
        if req.is_retried() || req.is_queued() {
            debug!(url = %req.url, status = %response.status, "auth failure after retry, giving up");
            return Err(PipelineError::from_response(response));
        }
        req.mark_retried();
        debug!(method = %req.method, url = %req.url, status = %response.status, "authentication failed, refreshing");

        // Another request may have rotated the credential while this one was
        // in flight; reuse it instead of refreshing again.
        let fresh = match session.store.get() {
            Some(current) if Some(&current) != sent_with.as_ref() => Ok(current),
            _ => session.refresher().refresh(&self.inner.http, &self.inner.policy).await,
        };

        match fresh {
            Ok(_) => self.replay(req).await,
            Err(err) => {
                warn!(url = %req.url, err = %err, "refresh failed, deferring request until re-authentication");
                let pending =
                    session.queue().enqueue(req, self.inner.config.queue_ttl(), self.deferred());
                session.bridge.signal();
                pending.wait().await
            }
        }
    }

    /// Replay for a queued request. Holds the client weakly so a queued
    /// entry never keeps a dropped client alive.
    fn deferred(&self) -> Replay {
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        Box::new(move |req: OutgoingRequest| {
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Err(PipelineError::auth_expired("client dropped before replay"));
                };
                AuthClient { inner }.replay(req).await
            }
            .boxed()
        })
    }

    /// Send once more with the current credential. Never refreshes.
    async fn replay(&self, mut req: OutgoingRequest) -> Result<Response, PipelineError> {
        req.mark_retried();
        attach_credential(&mut req, &self.inner.session.store);
        let response = self.send(&req).await?;
        finish(response)
    }

    async fn send(&self, req: &OutgoingRequest) -> Result<Response, PipelineError> {
        let url = join_url(&self.inner.config.base_url, &req.url);
        let mut builder =
            self.inner.http.request(req.method.clone(), url.as_str()).headers(req.headers.clone());
        if let Some(body) = &req.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_builder() {
                PipelineError::InvalidRequest(e.to_string())
            } else {
                debug!(method = %req.method, %url, err = %e, "request failed");
                PipelineError::Network(e)
            }
        })?;
        let response = Response::from_reqwest(resp).await?;
        debug!(method = %req.method, %url, status = %response.status, retried = req.is_retried(), "response");

        if response.is_success() {
            self.absorb_credential(&response);
        }
        Ok(response)
    }

    /// Persist a credential handed back by any successful response.
    fn absorb_credential(&self, response: &Response) {
        let Some(credential) =
            extract_credential(&response.headers, &response.body, RESPONSE_TOKEN_FIELDS)
        else {
            return;
        };
        let store = &self.inner.session.store;
        if store.get().as_ref() != Some(&credential) {
            store.set(&credential);
            info!(token = %redact::mask(credential.as_str()), "credential updated from response");
        }
    }
}

fn finish(response: Response) -> Result<Response, PipelineError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(PipelineError::from_response(response))
    }
}
