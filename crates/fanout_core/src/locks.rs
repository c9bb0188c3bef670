/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, Weak},
};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

pub const DEFAULT_SHARDS: usize = 16;

type Shard = Mutex<HashMap<String, Weak<TokioMutex<()>>>>;

/// Process-wide mutexes keyed by string, created on first use.
///
/// Entries are weak: once the last guard and waiter for a key are gone the
/// slot is dead and gets pruned the next time its shard inserts.
pub struct KeyedLocks {
    shards: Vec<Shard>,
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl KeyedLocks {
    pub fn new(shards: usize) -> Self {
        let n = shards.clamp(1, 1024);
        Self {
            shards: (0..n).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &str) -> &Shard {
        let digest = Sha256::digest(key.as_bytes());
        let mut b = [0u8; 8];
        b.copy_from_slice(&digest[..8]);
        let idx = (u64::from_le_bytes(b) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    fn handle(&self, key: &str) -> Arc<TokioMutex<()>> {
        let mut map = self
            .shard(key)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(live) = map.get(key).and_then(Weak::upgrade) {
            return live;
        }
        map.retain(|_, w| w.strong_count() > 0);
        let m = Arc::new(TokioMutex::new(()));
        map.insert(key.to_string(), Arc::downgrade(&m));
        m
    }

    /// Waits for exclusive ownership of `key`. Dropping the guard releases it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        self.handle(key).lock_owned().await
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Keys that currently have a holder or a waiter.
    pub fn live_keys(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .filter(|w| w.strong_count() > 0)
                    .count()
            })
            .sum()
    }
}
