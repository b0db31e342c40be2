// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one authenticated backend client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the backend service (e.g. `https://api.example.com`).
    #[arg(long, env = "CASEGATE_BASE_URL", default_value = "http://127.0.0.1:8080")]
    pub base_url: String,

    /// Path of the session refresh endpoint, relative to the base URL.
    #[arg(long, env = "CASEGATE_REFRESH_PATH", default_value = "/auth/refresh")]
    pub refresh_path: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "CASEGATE_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Refresh call timeout in milliseconds. Falls back to `--timeout-ms`.
    #[arg(long, env = "CASEGATE_REFRESH_TIMEOUT_MS")]
    pub refresh_timeout_ms: Option<u64>,

    /// How long a request may wait in the re-auth queue before it is rejected.
    #[arg(long, default_value_t = 300_000, env = "CASEGATE_QUEUE_TTL_MS")]
    pub queue_ttl_ms: u64,

    /// Treat 403 like 401 and attempt a refresh.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "CASEGATE_REFRESH_ON_FORBIDDEN"
    )]
    pub refresh_on_forbidden: bool,

    /// Token service file. Defaults to `<state dir>/token.json`.
    #[arg(long, env = "CASEGATE_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Persistent key-value store file. Defaults to `<state dir>/local.json`.
    #[arg(long, env = "CASEGATE_LOCAL_STORE")]
    pub local_store: Option<PathBuf>,
}

impl ClientConfig {
    /// Config pointing at `base_url` with every other field at its default.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_path: "/auth/refresh".to_owned(),
            timeout_ms: 30_000,
            refresh_timeout_ms: None,
            queue_ttl_ms: 300_000,
            refresh_on_forbidden: true,
            token_file: None,
            local_store: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms.unwrap_or(self.timeout_ms))
    }

    pub fn queue_ttl(&self) -> Duration {
        Duration::from_millis(self.queue_ttl_ms)
    }

    pub fn token_file(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| state_dir().join("token.json"))
    }

    pub fn local_store(&self) -> PathBuf {
        self.local_store.clone().unwrap_or_else(|| state_dir().join("local.json"))
    }

    /// Absolute URL of the refresh endpoint.
    pub fn refresh_url(&self) -> String {
        join_url(&self.base_url, &self.refresh_path)
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Resolve the state directory for persisted credentials.
///
/// Checks `CASEGATE_STATE_DIR`, then `$XDG_STATE_HOME/casegate`,
/// then `$HOME/.local/state/casegate`.
pub fn state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

fn state_dir_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = env("CASEGATE_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = env("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("casegate");
    }
    if let Some(home) = env("HOME") {
        return PathBuf::from(home).join(".local/state/casegate");
    }
    PathBuf::from(".casegate")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
