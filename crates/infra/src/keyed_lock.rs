//! Per-key async mutual exclusion.
//!
//! Operations on different keys proceed concurrently; operations on the same
//! key are serialized. Entries are dropped once the last holder/waiter goes
//! away so the map stays proportional to in-flight work.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;
type SlotMap<K> = Arc<Mutex<HashMap<K, Slot>>>;

pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    slots: SlotMap<K>,
}

impl<K> Clone for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`.
    ///
    /// Dropping the returned future before it resolves gives up the place in
    /// line and releases the slot if nobody else wants it.
    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let slot = {
            let mut slots = lock_slots(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        Acquire {
            key: Some(key),
            slots: Arc::clone(&self.slots),
            pending: Some(Box::pin(slot.lock_owned())),
        }
        .await
    }

    /// Number of keys currently held or awaited.
    pub fn in_use(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

fn lock_slots<K>(slots: &Mutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    // The map is only touched in short non-panicking sections.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Remove the slot for `key` once the map holds the only reference to it.
///
/// Callers must have dropped their own clone of the slot first.
fn release_if_unused<K>(slots: &Mutex<HashMap<K, Slot>>, key: &K)
where
    K: Eq + Hash,
{
    let mut slots = lock_slots(slots);
    if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        slots.remove(key);
    }
}

type PendingGuard = Pin<Box<dyn Future<Output = OwnedMutexGuard<()>> + Send>>;

/// A place in line for one key.
struct Acquire<K>
where
    K: Eq + Hash + Clone,
{
    key: Option<K>,
    slots: SlotMap<K>,
    pending: Option<PendingGuard>,
}

// `K` is never pinned; the only pinned state lives behind the box.
impl<K> Unpin for Acquire<K> where K: Eq + Hash + Clone {}

impl<K> Future for Acquire<K>
where
    K: Eq + Hash + Clone,
{
    type Output = KeyGuard<K>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(pending) = this.pending.as_mut() else {
            return Poll::Pending;
        };
        let guard = ready!(pending.as_mut().poll(cx));
        this.pending = None;
        Poll::Ready(KeyGuard {
            key: this.key.take(),
            guard: Some(guard),
            slots: Arc::clone(&this.slots),
        })
    }
}

impl<K> Drop for Acquire<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        // Still set only when the wait was abandoned.
        let Some(key) = self.key.take() else {
            return;
        };
        self.pending = None;
        release_if_unused(&self.slots, &key);
    }
}

/// Held for the duration of a keyed critical section.
pub struct KeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    key: Option<K>,
    guard: Option<OwnedMutexGuard<()>>,
    slots: SlotMap<K>,
}

impl<K> Drop for KeyGuard<K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        drop(self.guard.take());
        release_if_unused(&self.slots, &key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = KeyedLocks::<String>::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _g = locks.lock("M1".to_string()).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.in_use(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::<String>::new();
        let _a = locks.lock("M1".to_string()).await;

        let b = tokio::time::timeout(Duration::from_millis(200), locks.lock("M2".to_string())).await;
        assert!(b.is_ok());
        assert_eq!(locks.in_use(), 2);
    }

    #[tokio::test]
    async fn slot_is_released_after_last_holder() {
        let locks = KeyedLocks::<u32>::new();
        {
            let _g = locks.lock(1).await;
            assert_eq!(locks.in_use(), 1);
        }
        assert_eq!(locks.in_use(), 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_releases_the_slot() {
        let locks = KeyedLocks::<u32>::new();
        let holder = locks.lock(7).await;

        let mut waiter = Box::pin(locks.lock(7));
        let early = tokio::time::timeout(Duration::from_millis(10), waiter.as_mut()).await;
        assert!(early.is_err());

        // The waiter is next in line but gives up before it is polled again.
        drop(holder);
        assert_eq!(locks.in_use(), 1);
        drop(waiter);
        assert_eq!(locks.in_use(), 0);

        let again = tokio::time::timeout(Duration::from_millis(200), locks.lock(7)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn timed_out_waiter_leaves_the_holder_in_place() {
        let locks = KeyedLocks::<u32>::new();
        let holder = locks.lock(7).await;

        let waited = tokio::time::timeout(Duration::from_millis(10), locks.lock(7)).await;
        assert!(waited.is_err());
        assert_eq!(locks.in_use(), 1);

        drop(holder);
        assert_eq!(locks.in_use(), 0);
    }
}
