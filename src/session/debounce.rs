//! Per-key cancellable delayed actions
//!
//! Used for the per-file reindex debounce and the resume fallback timer. At
//! most one entry is live per key: scheduling again cancels the previous one.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct DebounceEntry {
    id: u64,
    token: CancellationToken,
}

struct DebouncerInner<K> {
    delay: Duration,
    next_id: AtomicU64,
    entries: Mutex<HashMap<K, DebounceEntry>>,
}

#[derive(Clone)]
pub struct KeyedDebouncer<K> {
    inner: Arc<DebouncerInner<K>>,
}

impl<K> KeyedDebouncer<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(DebouncerInner {
                delay,
                next_id: AtomicU64::new(1),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `action` after the delay unless `key` is scheduled or cancelled again first
    ///
    /// The entry is removed before `action` runs, so [`pending`](Self::pending)
    /// is false while it executes and a new schedule for the same key is not
    /// affected by it.
    pub fn schedule<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            let mut entries = self.inner.entries.lock().unwrap();
            if let Some(previous) = entries.insert(
                key.clone(),
                DebounceEntry {
                    id,
                    token: token.clone(),
                },
            ) {
                previous.token.cancel();
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(inner.delay) => {}
            }

            {
                let mut entries = inner.entries.lock().unwrap();
                match entries.get(&key) {
                    Some(current) if current.id == id => {
                        entries.remove(&key);
                    }
                    // Superseded between the timer firing and taking the lock
                    _ => return,
                }
            }

            action().await;
        });
    }

    /// Cancel the pending action for `key`; returns whether one was pending
    pub fn cancel(&self, key: &K) -> bool {
        let Some(entry) = self.inner.entries.lock().unwrap().remove(key) else {
            return false;
        };
        entry.token.cancel();
        true
    }

    pub fn pending(&self, key: &K) -> bool {
        self.inner.entries.lock().unwrap().contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    /// Cancel every pending action
    pub fn dispose(&self) {
        for (_, entry) in self.inner.entries.lock().unwrap().drain() {
            entry.token.cancel();
        }
    }
}
