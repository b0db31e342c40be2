// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::BTreeMap;
use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};

use super::{BackendKind, TokenBackend, STORAGE_KEYS};
use crate::persist;

/// Primary in-process credential slot.
#[derive(Default)]
pub struct SecureSlot {
    value: RwLock<Option<String>>,
}

impl SecureSlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenBackend for SecureSlot {
    fn kind(&self) -> BackendKind {
        BackendKind::SecureStore
    }

    fn load(&self) -> Option<String> {
        self.value.read().clone()
    }

    fn store(&self, token: &str) {
        *self.value.write() = Some(token.to_owned());
    }

    fn remove(&self) {
        *self.value.write() = None;
    }
}

type Entries = BTreeMap<String, String>;

enum Backing {
    Memory(Mutex<Entries>),
    /// The mutex serializes read-modify-write cycles on the file.
    File { path: PathBuf, lock: Mutex<()> },
}

/// A string key-value store searched under [`STORAGE_KEYS`].
///
/// Used for both the persistent ("local") and per-process ("session")
/// legacy stores. Writes land under the `token` key.
pub struct KeyValueStore {
    kind: BackendKind,
    backing: Backing,
}

impl KeyValueStore {
    pub fn in_memory(kind: BackendKind) -> Self {
        Self { kind, backing: Backing::Memory(Mutex::new(Entries::new())) }
    }

    pub fn file(kind: BackendKind, path: PathBuf) -> Self {
        Self { kind, backing: Backing::File { path, lock: Mutex::new(()) } }
    }

    /// Set an arbitrary key, e.g. to seed a legacy value.
    pub fn insert(&self, key: &str, value: &str) {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        });
    }

    fn update(&self, f: impl FnOnce(&mut Entries)) {
        match &self.backing {
            Backing::Memory(entries) => f(&mut entries.lock()),
            Backing::File { path, lock } => {
                let _guard = lock.lock();
                let mut entries: Entries = match persist::load(path) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), err = %e, "discarding unreadable key-value store");
                        Entries::new()
                    }
                };
                f(&mut entries);
                if let Err(e) = persist::save(path, &entries) {
                    tracing::warn!(path = %path.display(), err = %e, "failed to persist key-value store");
                }
            }
        }
    }

    fn snapshot(&self) -> Entries {
        match &self.backing {
            Backing::Memory(entries) => entries.lock().clone(),
            Backing::File { path, lock } => {
                let _guard = lock.lock();
                persist::load(path).unwrap_or_else(|e| {
                    tracing::warn!(path = %path.display(), err = %e, "unreadable key-value store");
                    Entries::new()
                })
            }
        }
    }
}

impl TokenBackend for KeyValueStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn load(&self) -> Option<String> {
        let entries = self.snapshot();
        STORAGE_KEYS
            .iter()
            .filter_map(|key| entries.get(*key))
            .find(|value| !value.trim().is_empty())
            .cloned()
    }

    fn store(&self, token: &str) {
        self.insert(STORAGE_KEYS[0], token);
    }

    fn remove(&self) {
        self.update(|entries| {
            for key in STORAGE_KEYS {
                entries.remove(*key);
            }
        });
    }
}
