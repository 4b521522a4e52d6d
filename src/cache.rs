//! Type-keyed cache over the lock-free tree slot.
//!
//! This module provides [`TypeCache`], a cache keyed by `TypeId` that many
//! threads populate racily: each thread computes a candidate value for a
//! type and publishes it through the lock-free slot, with the first
//! committed value winning. It depends only on the public slot surface.
//!
//! # Examples
//!
//! ```rust
//! use persistree::cache::TypeCache;
//!
//! struct Widget;
//!
//! let cache: TypeCache<String> = TypeCache::new();
//! let name = cache.get_or_insert_with::<Widget>(|| "Widget".to_string());
//! assert_eq!(name, "Widget");
//!
//! // Subsequent lookups hit the cached value
//! assert_eq!(cache.get::<Widget>(), Some("Widget".to_string()));
//! ```

use std::any::TypeId;
use std::fmt;

use crate::concurrent::ConcurrentSlot;

/// A cache of values keyed by type, safe to populate from many threads.
///
/// Threads may race to compute the value for the same type; the first value
/// to be published wins and every racer observes that committed value. A
/// losing thread's computation is discarded, so the initializer should be
/// side-effect free.
///
/// # Examples
///
/// ```rust
/// use persistree::cache::TypeCache;
///
/// let cache: TypeCache<usize> = TypeCache::new();
///
/// let size = cache.get_or_insert_with::<u64>(|| std::mem::size_of::<u64>());
/// assert_eq!(size, 8);
/// assert_eq!(cache.len(), 1);
/// ```
pub struct TypeCache<V> {
    slot: ConcurrentSlot<TypeId, V>,
}

impl<V: Clone> TypeCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: ConcurrentSlot::new(),
        }
    }

    /// Returns a clone of the cached value for type `T`, if present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::cache::TypeCache;
    ///
    /// let cache: TypeCache<i32> = TypeCache::new();
    /// assert_eq!(cache.get::<String>(), None);
    /// ```
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<V> {
        self.slot.get(&TypeId::of::<T>())
    }

    /// Returns the cached value for type `T`, computing and publishing it
    /// if absent.
    ///
    /// The first value committed for a type wins: if another thread
    /// publishes between this thread's lookup and its publish attempt, the
    /// freshly computed candidate is discarded and the already-committed
    /// value is returned instead.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::cache::TypeCache;
    ///
    /// let cache: TypeCache<&'static str> = TypeCache::new();
    ///
    /// let first = cache.get_or_insert_with::<i32>(|| "first");
    /// let second = cache.get_or_insert_with::<i32>(|| "second");
    ///
    /// assert_eq!(first, "first");
    /// assert_eq!(second, "first"); // Cached value wins
    /// ```
    pub fn get_or_insert_with<T: 'static>(&self, init: impl FnOnce() -> V) -> V {
        let key = TypeId::of::<T>();
        if let Some(existing) = self.slot.get(&key) {
            return existing;
        }

        let candidate = init();
        self.slot
            .insert_with(key, candidate, |existing, _candidate| existing.clone())
    }

    /// Returns the number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slot.len()
    }

    /// Returns `true` if nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.is_empty()
    }
}

impl<V: Clone> Default for TypeCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + fmt::Debug> fmt::Debug for TypeCache<V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TypeCache")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
