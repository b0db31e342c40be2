// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential storage: a fixed-priority chain of backends.
//!
//! Reads walk the chain from the primary secure slot down to the legacy
//! session key-value store and return the first non-empty value, so sessions
//! stored under older schemes keep working. Writes go to the primary and are
//! mirrored into every legacy location that accepts writes.

pub mod cookie;
pub mod file;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use crate::config::ClientConfig;

pub use cookie::{NamedCookies, RawCookies};
pub use file::TokenFile;
pub use memory::{KeyValueStore, SecureSlot};

/// Cookie names consulted for legacy credentials, in lookup order.
pub const LEGACY_COOKIE_NAMES: &[&str] =
    &["authToken", "auth_token", "token", "access_token", "jwt", "session"];

/// Key-value store keys consulted for legacy credentials, in lookup order.
pub const STORAGE_KEYS: &[&str] = &["token", "authToken", "auth_token", "jwt"];

/// An opaque bearer credential. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token. Blank values are not credentials.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(REDACTED)")
    }
}

/// Storage backends, ordered by read priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendKind {
    SecureStore,
    TokenService,
    LegacyCookie,
    RawCookie,
    LocalStorage,
    SessionStorage,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecureStore => "secure_store",
            Self::TokenService => "token_service",
            Self::LegacyCookie => "legacy_cookie",
            Self::RawCookie => "raw_cookie",
            Self::LocalStorage => "local_storage",
            Self::SessionStorage => "session_storage",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One place a credential may live.
///
/// Backends swallow their own I/O errors: a read failure is "no value", a
/// write failure is logged and skipped. A missing credential is never an
/// error.
pub trait TokenBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn load(&self) -> Option<String>;

    /// Persist `token`. Read-only backends ignore this.
    fn store(&self, token: &str);

    fn remove(&self);
}

/// The single owner of credential state, shared by every client.
#[derive(Clone)]
pub struct TokenStore {
    backends: Arc<Vec<Box<dyn TokenBackend>>>,
}

impl TokenStore {
    /// Build a store from arbitrary backends. They are sorted into the
    /// fixed priority order regardless of the order given here.
    pub fn new(mut backends: Vec<Box<dyn TokenBackend>>) -> Self {
        backends.sort_by_key(|b| b.kind());
        Self { backends: Arc::new(backends) }
    }

    /// A store with only in-process backends (primary slot + session map).
    pub fn in_memory() -> Self {
        Self::new(vec![
            Box::new(SecureSlot::new()),
            Box::new(KeyValueStore::in_memory(BackendKind::SessionStorage)),
        ])
    }

    /// The full six-backend chain for `config`, sharing the HTTP cookie jar.
    pub fn standard(config: &ClientConfig, jar: Arc<reqwest::cookie::Jar>) -> Self {
        let mut backends: Vec<Box<dyn TokenBackend>> = vec![
            Box::new(SecureSlot::new()),
            Box::new(TokenFile::new(config.token_file())),
            Box::new(NamedCookies::new()),
            Box::new(KeyValueStore::file(BackendKind::LocalStorage, config.local_store())),
            Box::new(KeyValueStore::in_memory(BackendKind::SessionStorage)),
        ];
        match RawCookies::new(jar, &config.base_url) {
            Ok(raw) => backends.push(Box::new(raw)),
            Err(e) => {
                tracing::warn!(base_url = %config.base_url, err = %e, "raw cookie lookup disabled")
            }
        }
        Self::new(backends)
    }

    /// The authoritative credential: first non-empty value in priority order.
    pub fn get(&self) -> Option<Credential> {
        self.lookup().map(|(_, credential)| credential)
    }

    /// Like [`get`](Self::get), also naming the backend that produced it.
    pub fn lookup(&self) -> Option<(BackendKind, Credential)> {
        self.backends
            .iter()
            .find_map(|b| b.load().and_then(Credential::new).map(|c| (b.kind(), c)))
    }

    /// Write to the primary store and mirror into legacy locations.
    pub fn set(&self, credential: &Credential) {
        for backend in self.backends.iter() {
            backend.store(credential.as_str());
        }
        tracing::debug!(backends = self.backends.len(), "credential stored");
    }

    /// Remove the credential from every backend.
    pub fn clear(&self) {
        for backend in self.backends.iter() {
            backend.remove();
        }
        tracing::debug!("credential cleared");
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").field("backends", &self.kinds()).finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
