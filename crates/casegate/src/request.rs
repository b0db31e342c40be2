// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outgoing request and buffered response types, plus the credential
//! interceptor applied to every call.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::PipelineError;
use crate::token_store::{Credential, TokenStore};

/// A request about to pass through the pipeline.
///
/// `retried` and `queued` are one-way flags: once set they stay set, which
/// is what stops a request from cycling through refresh more than once.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Absolute URL, or a path resolved against the client's base URL.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    retried: bool,
    queued: bool,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
            queued: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Add a header. Fails on names or values that are not valid HTTP.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, PipelineError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PipelineError::InvalidRequest(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PipelineError::InvalidRequest(format!("header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Result<Self, PipelineError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| PipelineError::InvalidRequest(format!("json body: {e}")))?;
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Set the retried flag. Returns `false` if it was already set.
    pub fn mark_retried(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }

    /// Set the queued flag. Returns `false` if it was already set.
    pub fn mark_queued(&mut self) -> bool {
        !std::mem::replace(&mut self.queued, true)
    }

    /// Bearer token currently carried by the request, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
    }
}

/// Attach the current credential as `Authorization: Bearer <token>`.
///
/// Never fails: with no credential (or one that cannot be encoded as a
/// header) the request goes out unauthenticated and the server decides.
/// Returns the credential that was attached.
pub fn attach_credential(req: &mut OutgoingRequest, store: &TokenStore) -> Option<Credential> {
    let credential = store.get()?;
    match HeaderValue::from_str(&format!("Bearer {}", credential.as_str())) {
        Ok(mut value) => {
            value.set_sensitive(true);
            req.headers.insert(AUTHORIZATION, value);
            Some(credential)
        }
        Err(_) => {
            tracing::warn!(url = %req.url, "stored credential is not a valid header value, sending unauthenticated");
            None
        }
    }
}

/// A fully buffered HTTP response.
#[derive(Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub(crate) async fn from_reqwest(resp: reqwest::Response) -> Result<Self, PipelineError> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        Ok(Self { status, headers, body })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success() || self.status.is_redirection()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Debug for Response {
    // Headers can carry rotated credentials; keep them out of debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
