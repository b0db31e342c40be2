// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dedicated token service: a single credential persisted to a JSON file.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{BackendKind, TokenBackend};
use crate::persist;

/// On-disk shape of the token file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Last write as epoch seconds.
    #[serde(default)]
    pub updated_at: u64,
}

pub struct TokenFile {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TokenFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenBackend for TokenFile {
    fn kind(&self) -> BackendKind {
        BackendKind::TokenService
    }

    fn load(&self) -> Option<String> {
        let _guard = self.lock.lock();
        match persist::load::<PersistedToken>(&self.path) {
            Ok(persisted) => persisted.token,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "unreadable token file");
                None
            }
        }
    }

    fn store(&self, token: &str) {
        let _guard = self.lock.lock();
        let persisted = PersistedToken { token: Some(token.to_owned()), updated_at: epoch_secs() };
        if let Err(e) = persist::save(&self.path, &persisted) {
            tracing::warn!(path = %self.path.display(), err = %e, "failed to persist token file");
        }
    }

    fn remove(&self) {
        let _guard = self.lock.lock();
        if let Err(e) = persist::remove(&self.path) {
            tracing::warn!(path = %self.path.display(), err = %e, "failed to remove token file");
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}
