use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use super::SlotId;
use crate::error::SlotError;

/// A fixed-capacity id allocator for concurrent sequences.
///
/// The pool hands out ids `0..capacity` from a FIFO free list and remembers
/// which occupant holds each id. Every operation runs under one lock, so the
/// pool can be queried from any thread while the scheduler mutates it.
///
/// Invariant: `occupied_count() + free_count() == capacity()` after every call.
pub struct SlotPool<T> {
    capacity: usize,
    inner: Mutex<PoolState<T>>,
}

struct PoolState<T> {
    free: VecDeque<SlotId>,
    occupied: BTreeMap<SlotId, T>,
}

impl<T> SlotPool<T> {
    /// Creates a pool with every id in `0..capacity` free.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(PoolState {
                free: (0..capacity).map(SlotId).collect(),
                occupied: BTreeMap::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_free_slot(&self) -> bool {
        !self.inner.lock().free.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.inner.lock().occupied.len()
    }

    /// Binds `occupant` to the next free id.
    ///
    /// Fails with [`SlotError::NoFreeSlot`] instead of waiting; callers check
    /// [`has_free_slot`](Self::has_free_slot) first.
    pub fn acquire(&self, occupant: T) -> Result<SlotId, SlotError> {
        let mut state = self.inner.lock();
        let id = state.free.pop_front().ok_or(SlotError::NoFreeSlot)?;
        state.occupied.insert(id, occupant);
        Ok(id)
    }

    /// Frees `id` and hands back its occupant.
    pub fn release(&self, id: SlotId) -> Result<T, SlotError> {
        let mut state = self.inner.lock();
        let occupant = state.occupied.remove(&id).ok_or(SlotError::UnknownSlot(id))?;
        state.free.push_back(id);
        Ok(occupant)
    }

    /// Frees every slot whose occupant matches `predicate`, returning them in id order.
    pub fn release_where<F>(&self, mut predicate: F) -> Vec<(SlotId, T)>
    where
        F: FnMut(SlotId, &T) -> bool,
    {
        let mut state = self.inner.lock();
        let matching: Vec<SlotId> = state
            .occupied
            .iter()
            .filter(|(id, occupant)| predicate(**id, occupant))
            .map(|(id, _)| *id)
            .collect();

        let mut released = Vec::with_capacity(matching.len());
        for id in matching {
            if let Some(occupant) = state.occupied.remove(&id) {
                state.free.push_back(id);
                released.push((id, occupant));
            }
        }
        released
    }
}

impl<T: Clone> SlotPool<T> {
    /// Copies the current occupancy out from under the lock, in id order.
    pub fn snapshot(&self) -> Vec<(SlotId, T)> {
        self.inner
            .lock()
            .occupied
            .iter()
            .map(|(id, occupant)| (*id, occupant.clone()))
            .collect()
    }

    /// Visits a point-in-time snapshot; `f` may call back into the pool.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SlotId, &T),
    {
        for (id, occupant) in self.snapshot() {
            f(id, &occupant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_conserved<T>(pool: &SlotPool<T>) {
        assert_eq!(pool.occupied_count() + pool.free_count(), pool.capacity());
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let pool = SlotPool::new(3);
        let ids: Vec<SlotId> = (0..3).map(|i| pool.acquire(i).unwrap()).collect();

        assert_eq!(ids, vec![SlotId(0), SlotId(1), SlotId(2)]);
        assert!(!pool.has_free_slot());
        assert_eq!(pool.acquire(99), Err(SlotError::NoFreeSlot));
        assert_conserved(&pool);
    }

    #[test]
    fn test_over_acquire_does_not_corrupt_free_list() {
        let pool = SlotPool::new(1);
        let id = pool.acquire("a").unwrap();
        for _ in 0..5 {
            assert_eq!(pool.acquire("b"), Err(SlotError::NoFreeSlot));
        }
        assert_eq!(pool.release(id), Ok("a"));
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.acquire("c"), Ok(SlotId(0)));
        assert_conserved(&pool);
    }

    #[test]
    fn test_release_unknown_slot() {
        let pool: SlotPool<u8> = SlotPool::new(2);
        assert_eq!(pool.release(SlotId(0)), Err(SlotError::UnknownSlot(SlotId(0))));
        assert_eq!(pool.release(SlotId(7)), Err(SlotError::UnknownSlot(SlotId(7))));

        let id = pool.acquire(1).unwrap();
        pool.release(id).unwrap();
        // double release
        assert_eq!(pool.release(id), Err(SlotError::UnknownSlot(id)));
        assert_conserved(&pool);
    }

    #[test]
    fn test_released_ids_are_reused_fifo() {
        let pool = SlotPool::new(3);
        let a = pool.acquire('a').unwrap();
        let b = pool.acquire('b').unwrap();
        pool.release(a).unwrap();
        pool.release(b).unwrap();

        // slot 2 was never handed out, so it comes first
        assert_eq!(pool.acquire('c').unwrap(), SlotId(2));
        assert_eq!(pool.acquire('d').unwrap(), a);
        assert_eq!(pool.acquire('e').unwrap(), b);
    }

    #[test]
    fn test_release_where() {
        let pool = SlotPool::new(4);
        for value in [10, 11, 12, 13] {
            pool.acquire(value).unwrap();
        }

        let released = pool.release_where(|_, v| v % 2 == 0);
        assert_eq!(released, vec![(SlotId(0), 10), (SlotId(2), 12)]);
        assert_eq!(pool.occupied_count(), 2);
        assert_conserved(&pool);
    }

    #[test]
    fn test_for_each_allows_reentrant_mutation() {
        let pool = SlotPool::new(3);
        for value in 0..3 {
            pool.acquire(value).unwrap();
        }

        let mut seen = vec![];
        pool.for_each(|id, value| {
            seen.push(*value);
            pool.release(id).unwrap();
        });

        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_conservation_across_threads() {
        let pool = Arc::new(SlotPool::new(4));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        if let Ok(id) = pool.acquire((t, i)) {
                            assert_eq!(pool.release(id).unwrap(), (t, i));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.free_count(), 4);
        assert_conserved(&pool);
    }
}
