//! A shared slot for lock-free tree publication.
//!
//! The slot is the only mutable shared state in this crate. It holds an
//! `Arc` to the current tree version; the trees themselves are immutable,
//! so a reader holding a snapshot can never observe a half-built node no
//! matter how many versions are published after it.
//!
//! # Protocol
//!
//! Each write attempt:
//! 1. loads the slot's current tree `Tc`,
//! 2. computes `Tn = Tc.insert(..)` (purely functional, `Tc` unchanged),
//! 3. compare-and-swaps the slot from `Tc` to `Tn`,
//! 4. on conflict discards `Tn`, re-reads the slot, and retries from step 2.
//!
//! The protocol is lock-free: a failed compare-and-swap means another
//! thread's publish succeeded, so system-wide progress is guaranteed even
//! though an individual writer may retry arbitrarily many times under
//! contention. No blocking primitive is involved anywhere.
//!
//! # Examples
//!
//! ```rust
//! use persistree::concurrent::ConcurrentSlot;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let slot = Arc::new(ConcurrentSlot::new());
//!
//! let handles: Vec<_> = (0..8)
//!     .map(|index| {
//!         let slot = Arc::clone(&slot);
//!         thread::spawn(move || slot.insert(index, index * index))
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap().unwrap();
//! }
//!
//! // No update was lost
//! let snapshot = slot.snapshot();
//! assert_eq!(snapshot.len(), 8);
//! assert_eq!(snapshot.get(&3), Some(&9));
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::persistent::{ImmutableHashTree, KeyExistsError};

/// A shared mutable slot holding the current version of an
/// [`ImmutableHashTree`], updated lock-free.
///
/// Many threads may race to populate the same slot. Writers go through the
/// compare-and-swap retry loop in [`insert`](Self::insert) and
/// [`insert_with`](Self::insert_with); readers call
/// [`snapshot`](Self::snapshot) (or the [`get`](Self::get) convenience) and
/// work against a fixed immutable version, unaffected by later publishes.
///
/// # Examples
///
/// ```rust
/// use persistree::concurrent::ConcurrentSlot;
///
/// let slot = ConcurrentSlot::new();
/// slot.insert("key".to_string(), 42)?;
/// assert_eq!(slot.get("key"), Some(42));
/// # Ok::<(), persistree::persistent::KeyExistsError>(())
/// ```
pub struct ConcurrentSlot<K, V> {
    /// The current tree version.
    tree: ArcSwap<ImmutableHashTree<K, V>>,
}

impl<K, V> ConcurrentSlot<K, V> {
    /// Creates a slot holding the empty tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::concurrent::ConcurrentSlot;
    ///
    /// let slot: ConcurrentSlot<String, i32> = ConcurrentSlot::new();
    /// assert!(slot.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: ArcSwap::from_pointee(ImmutableHashTree::new()),
        }
    }

    /// Creates a slot holding an existing tree version.
    #[must_use]
    pub fn from_tree(tree: ImmutableHashTree<K, V>) -> Self {
        Self {
            tree: ArcSwap::from_pointee(tree),
        }
    }

    /// Returns the current tree version.
    ///
    /// The snapshot is immutable: enumerating it while other threads keep
    /// publishing new versions is safe and sees exactly the entries that
    /// were committed when the snapshot was taken.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::concurrent::ConcurrentSlot;
    ///
    /// let slot = ConcurrentSlot::new();
    /// slot.insert("a".to_string(), 1)?;
    ///
    /// let snapshot = slot.snapshot();
    /// slot.insert("b".to_string(), 2)?;
    ///
    /// assert_eq!(snapshot.len(), 1); // Unaffected by the later publish
    /// assert_eq!(slot.snapshot().len(), 2);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    #[must_use]
    pub fn snapshot(&self) -> Arc<ImmutableHashTree<K, V>> {
        self.tree.load_full()
    }

    /// Returns the number of entries in the current version.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.load().len()
    }

    /// Returns `true` if the current version contains no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.load().is_empty()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> ConcurrentSlot<K, V> {
    /// Returns a clone of the value for the key in the current version.
    ///
    /// Reads never participate in the compare-and-swap protocol and never
    /// block.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::concurrent::ConcurrentSlot;
    ///
    /// let slot = ConcurrentSlot::new();
    /// slot.insert("key".to_string(), 42)?;
    ///
    /// assert_eq!(slot.get("key"), Some(42));
    /// assert_eq!(slot.get("missing"), None);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.tree.load().get(key).cloned()
    }

    /// Inserts a key-value pair into the shared slot, lock-free.
    ///
    /// Applies the publish protocol: the compare-and-swap is retried with
    /// the freshly re-read tree until it lands. Retries are invisible to
    /// the caller; on return the slot holds a version containing the entry.
    ///
    /// # Errors
    ///
    /// Returns [`KeyExistsError`] if the key is present in the version the
    /// attempt ran against. A structural error is a programmer error and is
    /// never retried: of two threads racing to insert the same key into one
    /// slot, exactly one succeeds and the other gets this error rather than
    /// a silent overwrite.
    pub fn insert(&self, key: K, value: V) -> Result<(), KeyExistsError> {
        loop {
            let current = self.tree.load_full();
            let next = Arc::new(current.insert(key.clone(), value.clone())?);
            let previous = self.tree.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                return Ok(());
            }
        }
    }

    /// Inserts a key-value pair into the shared slot, merging with any
    /// existing value, and returns the committed value.
    ///
    /// On each attempt the committed value is recomputed against the
    /// freshly read version (`merge(existing, value)` when the key is
    /// present, `value` otherwise), so concurrent merges accumulate without
    /// lost updates. The returned value is the one the winning
    /// compare-and-swap actually published for this call.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::concurrent::ConcurrentSlot;
    ///
    /// let slot = ConcurrentSlot::new();
    /// slot.insert("count".to_string(), 1)?;
    ///
    /// let committed = slot.insert_with("count".to_string(), 2, |old, new| old + new);
    /// assert_eq!(committed, 3);
    /// assert_eq!(slot.get("count"), Some(3));
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    pub fn insert_with<F>(&self, key: K, value: V, merge: F) -> V
    where
        F: Fn(&V, V) -> V,
    {
        loop {
            let current = self.tree.load_full();
            let committed = match current.get(&key) {
                Some(existing) => merge(existing, value.clone()),
                None => value.clone(),
            };
            let next = Arc::new(current.insert_with(key.clone(), committed.clone(), |_, new| new));
            let previous = self.tree.compare_and_swap(&current, next);
            if Arc::ptr_eq(&previous, &current) {
                return committed;
            }
        }
    }
}

impl<K, V> Default for ConcurrentSlot<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug for ConcurrentSlot<K, V> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("ConcurrentSlot")
            .field(&self.snapshot())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
