//! Named async locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Entries no longer held by anyone are pruned once the map grows past this.
const PRUNE_AT: usize = 1024;

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let cell = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() >= PRUNE_AT {
                map.retain(|_, cell| Arc::strong_count(cell) > 1);
            }
            map.entry(key.to_string()).or_default().clone()
        };
        cell.lock_owned().await
    }
}
