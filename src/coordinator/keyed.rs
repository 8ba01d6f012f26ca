// ABOUTME: Per-key serialization for in-process stores.
// ABOUTME: Each key owns a fair async mutex; idle keys are evicted so the map stays bounded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::clock::Clock;

/// Smallest map size that triggers a sweep of idle keys.
const MIN_SWEEP: usize = 64;

/// Per-key state that can tell when it no longer holds anything live.
pub(crate) trait Idle {
    fn is_idle(&self, now_ms: u64) -> bool;
}

type Slot<T> = Arc<tokio::sync::Mutex<T>>;

struct Slots<T> {
    map: HashMap<String, Slot<T>>,
    next_sweep: usize,
}

/// State partitioned by key, where every key is guarded by its own FIFO queue.
///
/// The outer map lock is only held long enough to look up (or create) the
/// slot for a key; it is never held while an operation runs, so different
/// keys proceed independently.
///
/// A key whose state is idle and which no other task is holding is dropped
/// after each operation on it. Keys that go idle without being touched again
/// are swept whenever the map doubles in size.
pub(crate) struct KeyedState<T> {
    clock: Arc<dyn Clock>,
    slots: Mutex<Slots<T>>,
}

impl<T: Default + Idle> KeyedState<T> {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                next_sweep: MIN_SWEEP,
            }),
        }
    }

    fn slot(&self, key: &str) -> Slot<T> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.map.get(key) {
            return Arc::clone(slot);
        }

        if slots.map.len() >= slots.next_sweep {
            let now = self.clock.now_ms();
            slots.map.retain(|_, slot| !unused_and_idle(slot, now));
            slots.next_sweep = (slots.map.len() * 2).max(MIN_SWEEP);
        }

        let slot = Slot::<T>::default();
        slots.map.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    fn existing_slot(&self, key: &str) -> Option<Slot<T>> {
        self.slots.lock().map.get(key).cloned()
    }

    // `slot` is the caller's handle; the map holds the other reference.
    fn evict_if_idle(&self, key: &str, slot: Slot<T>) {
        let mut slots = self.slots.lock();
        let current = slots.map.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot));
        if !current || Arc::strong_count(&slot) != 2 {
            return;
        }
        let idle = slot
            .try_lock()
            .is_ok_and(|state| state.is_idle(self.clock.now_ms()));
        if idle {
            slots.map.remove(key);
        }
    }

    /// Run `op` against the state for `key` once every earlier operation on
    /// that key has finished.
    pub(crate) async fn with_key<R>(&self, key: &str, op: impl FnOnce(&mut T) -> R) -> R {
        let slot = self.slot(key);
        let result = {
            let mut state = slot.lock().await;
            op(&mut state)
        };
        self.evict_if_idle(key, slot);
        result
    }

    /// Like [`with_key`](Self::with_key) but returns `None` without creating
    /// a slot when the key has never been seen.
    pub(crate) async fn with_existing<R>(
        &self,
        key: &str,
        op: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let slot = self.existing_slot(key)?;
        let result = {
            let mut state = slot.lock().await;
            op(&mut state)
        };
        self.evict_if_idle(key, slot);
        Some(result)
    }

    /// Drop all keys.
    pub(crate) fn clear(&self) {
        let mut slots = self.slots.lock();
        slots.map.clear();
        slots.next_sweep = MIN_SWEEP;
    }

    /// Number of keys currently tracked.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().map.len()
    }
}

// Only the map holds the slot and nobody is mid-operation on it.
fn unused_and_idle<T: Idle>(slot: &Slot<T>, now_ms: u64) -> bool {
    Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|state| state.is_idle(now_ms))
}
