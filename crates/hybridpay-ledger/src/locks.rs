//! Keyed async locks.
//!
//! Serializes work per key (wallet owner, order id) across `.await` points
//! such as collaborator calls. Entries are created on first use and removed
//! when the last holder or waiter goes away, so the map only holds keys that
//! are currently contended.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use hybridpay_types::{HybridPayError, Result};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// A map of per-key async mutexes with a bounded acquire timeout.
pub struct KeyedLocks<K> {
    registry: Registry<K>,
    timeout: Duration,
    label: &'static str,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + std::fmt::Display,
{
    /// `label` names the key space in conflict errors ("wallet", "order").
    #[must_use]
    pub fn new(label: &'static str, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            label,
        }
    }

    /// Wait for exclusive access to `key`.
    ///
    /// # Errors
    /// Returns `ConcurrencyConflict` if the lock is not obtained within the
    /// configured timeout.
    pub async fn acquire(&self, key: K) -> Result<KeyedGuard<K>> {
        let lock = {
            let mut map = self.registry.lock();
            Arc::clone(map.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(KeyedGuard {
                key,
                guard: Some(guard),
                registry: Arc::clone(&self.registry),
            }),
            Err(_) => {
                // Our clone is gone once we return; let the registry forget the key
                // if nobody else is interested.
                release_entry(&self.registry, &key);
                tracing::warn!(
                    label = self.label,
                    %key,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "lock wait timed out"
                );
                Err(HybridPayError::ConcurrencyConflict {
                    reason: format!("{} {key} is busy", self.label),
                })
            }
        }
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while the keyed section runs. Dropping it releases the key.
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry<K>,
}

impl<K: Eq + Hash> KeyedGuard<K> {
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_entry(&self.registry, &self.key);
    }
}

/// Remove `key` if the registry holds the only remaining reference.
fn release_entry<K: Eq + Hash>(registry: &Registry<K>, key: &K) {
    let mut map = registry.lock();
    if map.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        map.remove(key);
    }
}
