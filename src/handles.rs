//! Thread-safe handle registry for native resources
//!
//! Native pointers never leave the backend that created them. Callers get a
//! numeric handle instead; a handle that was removed (or never issued) simply
//! fails to resolve, so a stale handle cannot reach freed native memory.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

/// Registry mapping numeric handles to owned values.
///
/// Handles are auto-incrementing and never reissued within one registry.
pub struct HandleRegistry<T> {
    map: DashMap<u64, T>,
    next_id: AtomicU64,
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            map: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a value and return its handle.
    pub fn insert(
        &self,
        value: T,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.map.insert(id, value);
        id
    }

    pub fn get(
        &self,
        id: u64,
    ) -> Option<dashmap::mapref::one::Ref<'_, u64, T>> {
        self.map.get(&id)
    }

    pub fn get_mut(
        &self,
        id: u64,
    ) -> Option<dashmap::mapref::one::RefMut<'_, u64, T>> {
        self.map.get_mut(&id)
    }

    /// Remove a value by handle, returning it. A second removal yields `None`.
    pub fn remove(
        &self,
        id: u64,
    ) -> Option<T> {
        self.map.remove(&id).map(|(_, value)| value)
    }

    /// Remove every live value, handing ownership back to the caller.
    pub fn drain(&self) -> Vec<(u64, T)> {
        let ids: Vec<u64> = self.map.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.map.remove(&id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
