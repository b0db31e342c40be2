// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy cookie locations.
//!
//! [`NamedCookies`] holds cookies by name. [`RawCookies`] reads the `Cookie`
//! header the HTTP client would send to the base URL and parses it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

use super::{BackendKind, TokenBackend, LEGACY_COOKIE_NAMES};
use crate::error::PipelineError;

#[derive(Default)]
pub struct NamedCookies {
    cookies: RwLock<HashMap<String, String>>,
}

impl NamedCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, value: &str) {
        self.cookies.write().insert(name.to_owned(), value.to_owned());
    }
}

impl TokenBackend for NamedCookies {
    fn kind(&self) -> BackendKind {
        BackendKind::LegacyCookie
    }

    fn load(&self) -> Option<String> {
        let cookies = self.cookies.read();
        LEGACY_COOKIE_NAMES
            .iter()
            .filter_map(|name| cookies.get(*name))
            .find(|value| !value.trim().is_empty())
            .cloned()
    }

    fn store(&self, token: &str) {
        self.insert(LEGACY_COOKIE_NAMES[0], token);
    }

    fn remove(&self) {
        let mut cookies = self.cookies.write();
        for name in LEGACY_COOKIE_NAMES {
            cookies.remove(*name);
        }
    }
}

/// Read-only view over the client's cookie jar.
pub struct RawCookies {
    jar: Arc<Jar>,
    url: Url,
}

impl RawCookies {
    pub fn new(jar: Arc<Jar>, base_url: &str) -> Result<Self, PipelineError> {
        let url = Url::parse(base_url)
            .map_err(|e| PipelineError::InvalidRequest(format!("base url {base_url:?}: {e}")))?;
        Ok(Self { jar, url })
    }
}

impl TokenBackend for RawCookies {
    fn kind(&self) -> BackendKind {
        BackendKind::RawCookie
    }

    fn load(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        let header = header.to_str().ok()?;
        LEGACY_COOKIE_NAMES.iter().find_map(|name| parse_cookie(header, name))
    }

    fn store(&self, _token: &str) {}

    fn remove(&self) {
        for name in LEGACY_COOKIE_NAMES {
            self.jar.add_cookie_str(&format!("{name}=; Max-Age=0; Path=/"), &self.url);
        }
    }
}

/// Find `name` in a `Cookie` header value (`a=1; b=2`).
pub fn parse_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key.trim() != name {
            return None;
        }
        let value = value.trim().trim_matches('"');
        if value.is_empty() {
            None
        } else {
            Some(value.to_owned())
        }
    })
}
