// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session refresh with single-flight coalescing.
//!
//! One coordinator lives in each [`Session`](crate::session::Session), so
//! every client sharing the session shares the slot. A request that fails
//! authentication while a refresh is running joins that refresh instead of
//! starting its own. The slot is cleared once the attempt settles, so a
//! later failure starts a fresh attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::PipelineError;
use crate::redact;
use crate::token_store::{Credential, TokenStore};

/// Response header carrying a rotated credential.
pub const X_AUTH_TOKEN: &str = "x-auth-token";

/// JSON body fields read from ordinary responses.
pub const RESPONSE_TOKEN_FIELDS: &[&str] = &["token"];

/// JSON body fields read from the refresh endpoint.
pub const REFRESH_TOKEN_FIELDS: &[&str] = &["token", "access_token"];

/// Where and how to refresh, and which statuses count as auth failures.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub refresh_url: String,
    pub timeout: Duration,
    pub refresh_on_forbidden: bool,
}

impl RefreshPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            refresh_url: config.refresh_url(),
            timeout: config.refresh_timeout(),
            refresh_on_forbidden: config.refresh_on_forbidden,
        }
    }

    pub fn is_auth_failure(&self, status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED
            || (self.refresh_on_forbidden && status == StatusCode::FORBIDDEN)
    }
}

/// Lifecycle of the most recent refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    InFlight,
    Succeeded,
    Failed,
}

type Attempt = Shared<BoxFuture<'static, Result<Credential, String>>>;

struct Slot {
    generation: u64,
    attempt: Option<Attempt>,
    state: RefreshState,
}

pub struct RefreshCoordinator {
    store: TokenStore,
    slot: Mutex<Slot>,
    calls: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            slot: Mutex::new(Slot { generation: 0, attempt: None, state: RefreshState::Idle }),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.slot.lock().state
    }

    /// Refresh calls actually sent over the network.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Obtain a fresh credential, joining an in-flight attempt if one exists.
    ///
    /// `http` and `policy` are only used when this call starts the attempt;
    /// joiners share whatever the starter sent. On success the credential
    /// has already been written to the store.
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        policy: &RefreshPolicy,
    ) -> Result<Credential, PipelineError> {
        let (generation, attempt) = {
            let mut slot = self.slot.lock();
            match slot.attempt.clone() {
                Some(attempt) => {
                    tracing::debug!(generation = slot.generation, "joining in-flight refresh");
                    (slot.generation, attempt)
                }
                None => {
                    slot.generation += 1;
                    let attempt = do_refresh(
                        http.clone(),
                        policy.clone(),
                        self.store.clone(),
                        Arc::clone(&self.calls),
                    )
                    .boxed()
                    .shared();
                    slot.attempt = Some(attempt.clone());
                    slot.state = RefreshState::InFlight;
                    (slot.generation, attempt)
                }
            }
        };

        let outcome = attempt.await;

        {
            let mut slot = self.slot.lock();
            if slot.generation == generation && slot.attempt.is_some() {
                slot.attempt = None;
                slot.state =
                    if outcome.is_ok() { RefreshState::Succeeded } else { RefreshState::Failed };
            }
        }

        outcome.map_err(PipelineError::RefreshFailure)
    }
}

/// Perform a single refresh request.
///
/// Authenticated only by the ambient session cookie; no bearer header and no
/// body are sent.
async fn do_refresh(
    http: reqwest::Client,
    policy: RefreshPolicy,
    store: TokenStore,
    calls: Arc<AtomicU64>,
) -> Result<Credential, String> {
    calls.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(url = %policy.refresh_url, "refreshing session");

    let resp = http
        .post(&policy.refresh_url)
        .timeout(policy.timeout)
        .send()
        .await
        .map_err(|e| format!("refresh request failed: {e}"))?;

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.bytes().await.map_err(|e| format!("refresh body unreadable: {e}"))?;

    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        let err = format!("refresh failed ({status}): {}", redact::redact_bearer(text.trim()));
        tracing::warn!(url = %policy.refresh_url, %status, "session refresh rejected");
        return Err(err);
    }

    let credential = extract_credential(&headers, &body, REFRESH_TOKEN_FIELDS)
        .ok_or_else(|| format!("refresh succeeded ({status}) but returned no credential"))?;
    store.set(&credential);
    tracing::info!(token = %redact::mask(credential.as_str()), "session refreshed");
    Ok(credential)
}

/// Pull a credential out of a response: `Authorization` or `X-Auth-Token`
/// header first, then the first string among `fields` in a JSON object body.
pub fn extract_credential(headers: &HeaderMap, body: &[u8], fields: &[&str]) -> Option<Credential> {
    let from_header = |name: &str| {
        let value = headers.get(name)?.to_str().ok()?;
        let value = match value.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
            _ => value,
        };
        Credential::new(value)
    };
    if let Some(c) = from_header(AUTHORIZATION.as_str()).or_else(|| from_header(X_AUTH_TOKEN)) {
        return Some(c);
    }

    let first = body.iter().find(|b| !b.is_ascii_whitespace())?;
    if *first != b'{' {
        return None;
    }
    let json: Value = serde_json::from_slice(body).ok()?;
    let object = json.as_object()?;
    fields.iter().find_map(|field| object.get(*field)?.as_str().and_then(Credential::new))
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
