//! Per-record mutual exclusion.
//!
//! A push holds the lock of the record it is pushing, so the same record is
//! never sent twice concurrently (an immediate push after a save and a
//! coordinator pass, for example). Unrelated records never wait on each
//! other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use campus_types::EntityId;

/// Keyed set of async locks. Entries are dropped once no guard holds them.
#[derive(Debug, Default)]
pub(crate) struct RecordLocks {
    locks: Mutex<HashMap<EntityId, Weak<AsyncMutex<()>>>>,
}

/// Held lock on one record. Released on drop.
#[derive(Debug)]
pub(crate) struct RecordGuard {
    _guard: OwnedMutexGuard<()>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: EntityId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(&id).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(id, Arc::downgrade(&lock));
        lock
    }

    /// Wait for the lock on `id`.
    #[cfg(test)]
    pub async fn lock(&self, id: EntityId) -> RecordGuard {
        let guard = self.entry(id).lock_owned().await;
        RecordGuard { _guard: guard }
    }

    /// Take the lock on `id` if nobody holds it.
    pub fn try_lock(&self, id: EntityId) -> Option<RecordGuard> {
        let guard = self.entry(id).try_lock_owned().ok()?;
        Some(RecordGuard { _guard: guard })
    }

    /// Number of records currently locked (or being waited on).
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_record_is_exclusive() {
        let locks = RecordLocks::new();
        let guard = locks.lock(1).await;
        assert!(locks.try_lock(1).is_none());

        drop(guard);
        assert!(locks.try_lock(1).is_some());
    }

    #[tokio::test]
    async fn test_unrelated_records_do_not_block() {
        let locks = RecordLocks::new();
        let _one = locks.lock(1).await;
        assert!(locks.try_lock(2).is_some());
    }

    #[tokio::test]
    async fn test_entries_are_released() {
        let locks = RecordLocks::new();
        {
            let _a = locks.lock(1).await;
            let _b = locks.lock(2).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let locks = Arc::new(RecordLocks::new());
        let guard = locks.lock(7).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(7).await;
                locks.len()
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), 1);
    }
}
