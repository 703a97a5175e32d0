//! Bounded FIFO history, the one data structure every component in this
//! workspace needs: trust score history, scaling events, partition
//! history, per-agent metric samples. The source system reached for
//! `collections.deque(maxlen=N)` for all of these; `VecDeque` plus a
//! capacity check on push is the direct Rust equivalent.
//!
//! This type carries no internal locking. Single-writer ownership is
//! assigned per ring (pool owns the
//! scaling-event ring, engine owns partition history, monitor owns
//! metric history) — callers wrap a `BoundedHistory` in the same
//! `parking_lot::Mutex`/`tokio::sync::RwLock` they already hold for the
//! owning struct rather than duplicating a lock here.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Serialize for BoundedHistory<T>
where
    T: Serialize,
{
    /// Persisted as a plain array of the current items, oldest-first —
    /// the capacity itself is never written to disk.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.items.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for BoundedHistory<T>
where
    T: Deserialize<'de> + Clone,
{
    /// Reconstructs from a plain array, same as `FromIterator` below:
    /// the configured capacity isn't on the wire, so it is set to the
    /// loaded length (never zero) rather than assumed.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(items.into_iter().collect())
    }
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "bounded history capacity must be positive");
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Push a new item, evicting the oldest if at capacity (FIFO).
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }

    /// Most recently pushed item, if any.
    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Up to `n` most recent items, oldest-first.
    pub fn recent(&self, n: usize) -> Vec<&T>
    where
        T: Sized,
    {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).collect()
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// A consistent, truncated snapshot for readers that should not
    /// hold the owning lock while iterating (: "readers may
    /// observe a consistent truncated snapshot").
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T: Clone> FromIterator<T> for BoundedHistory<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: VecDeque<T> = iter.into_iter().collect();
        let capacity = items.len().max(1);
        Self { items, capacity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_over_capacity() {
        let mut h = BoundedHistory::new(3);
        for i in 0..10 {
            h.push(i);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.snapshot(), vec![7, 8, 9]);
    }

    #[test]
    fn never_exceeds_capacity_after_n_pushes() {
        let mut h: BoundedHistory<u32> = BoundedHistory::new(5);
        for i in 0..100u32 {
            h.push(i);
            assert!(h.len() <= 5);
        }
    }

    #[test]
    fn recent_returns_oldest_first_suffix() {
        let mut h = BoundedHistory::new(10);
        for i in 0..5 {
            h.push(i);
        }
        let recent = h.recent(2);
        assert_eq!(recent, vec![&3, &4]);
    }

    #[test]
    fn serializes_as_a_plain_array() {
        let mut h = BoundedHistory::new(5);
        h.push(1);
        h.push(2);
        h.push(3);
        assert_eq!(serde_json::to_string(&h).unwrap(), "[1,2,3]");
    }

    #[test]
    fn json_round_trips_through_a_plain_array() {
        let mut h = BoundedHistory::new(5);
        for i in 0..3 {
            h.push(i);
        }
        let json = serde_json::to_string(&h).unwrap();
        let restored: BoundedHistory<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.snapshot(), h.snapshot());
    }
}
