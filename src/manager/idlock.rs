//! Reference-counted per-id lock table.
//!
//! Serializes concurrent status polls on the same operation id without
//! growing without bound: each id's mutex is created lazily on first
//! acquire and removed once the last holder's guard drops. The table's
//! own lock is held only for the map bookkeeping, never while waiting on
//! a per-id mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

#[derive(Debug)]
struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    refs: usize,
}

/// Table of per-id async mutexes with refcounted cleanup.
#[derive(Debug, Default)]
pub struct IdLocks {
    entries: Mutex<HashMap<String, Entry>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`, waiting if another caller holds it.
    ///
    /// The returned guard releases the lock and drops the table entry
    /// (at refcount zero) when dropped.
    pub async fn acquire(self: &Arc<Self>, id: &str) -> IdGuard {
        let lock = {
            let mut entries = self.lock_entries();
            let entry = entries.entry(id.to_string()).or_insert_with(|| Entry {
                lock: Arc::new(tokio::sync::Mutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.lock)
        };

        let guard = lock.lock_owned().await;
        IdGuard {
            _guard: guard,
            table: Arc::clone(self),
            id: id.to_string(),
        }
    }

    /// Number of ids currently tracked (held or contended).
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &str) {
        let mut entries = self.lock_entries();
        if let Some(entry) = entries.get_mut(id) {
            entry.refs -= 1;
            if entry.refs == 0 {
                entries.remove(id);
            }
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// RAII guard for one id's lock.
#[must_use = "dropping the guard releases the per-id lock"]
pub struct IdGuard {
    _guard: OwnedMutexGuard<()>,
    table: Arc<IdLocks>,
    id: String,
}

impl Drop for IdGuard {
    fn drop(&mut self) {
        self.table.release(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entry_removed_after_last_release() {
        let locks = Arc::new(IdLocks::new());
        let guard = locks.acquire("op-1").await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn distinct_ids_do_not_contend() {
        let locks = Arc::new(IdLocks::new());
        let g1 = locks.acquire("op-1").await;
        let _g2 = locks.acquire("op-2").await;
        assert_eq!(locks.len(), 2);
        drop(g1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn same_id_serializes_critical_sections() {
        let locks = Arc::new(IdLocks::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("shared").await;
                let current = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1, "lock must serialize");
        assert!(locks.is_empty(), "table must drain after all guards drop");
    }
}
