//! Persistent (immutable) data structures.
//!
//! This module provides immutable data structures that use structural
//! sharing to minimize copying:
//!
//! - [`ImmutableHashTree`]: Persistent hash tree (balanced by key hash)
//! - [`ImmutableLinkedList`]: Persistent singly-linked list
//!
//! # Structural Sharing
//!
//! All data structures in this module use structural sharing: operations
//! like inserting, removing, or prepending create new versions that reuse
//! every unaffected node of the previous version by reference. A version
//! handed to another thread stays valid and unchanged no matter how many
//! newer versions are derived from it.
//!
//! # Examples
//!
//! ## `ImmutableHashTree`
//!
//! ```rust
//! use persistree::persistent::ImmutableHashTree;
//!
//! let tree = ImmutableHashTree::new()
//!     .insert("one".to_string(), 1)?
//!     .insert("two".to_string(), 2)?;
//! assert_eq!(tree.get("one"), Some(&1));
//!
//! // Structural sharing: the original tree is preserved
//! let merged = tree.insert_with("one".to_string(), 100, |_, new| new);
//! assert_eq!(tree.get("one"), Some(&1));     // Original unchanged
//! assert_eq!(merged.get("one"), Some(&100)); // New version
//! # Ok::<(), persistree::persistent::KeyExistsError>(())
//! ```
//!
//! ## `ImmutableLinkedList`
//!
//! ```rust
//! use persistree::persistent::ImmutableLinkedList;
//!
//! let list = ImmutableLinkedList::new().cons(3).cons(2).cons(1);
//! assert_eq!(list.head(), Some(&1));
//!
//! // Structural sharing: the original list is preserved
//! let extended = list.cons(0);
//! assert_eq!(list.len(), 3);     // Original unchanged
//! assert_eq!(extended.len(), 4); // New list
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// Always `std::sync::Arc`: tree versions are published across threads
/// through [`crate::concurrent::ConcurrentSlot`], so a node may be owned by
/// both the old and new roots during a race window and reclamation must be
/// thread-safe.
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

mod hash_tree;
mod linked_list;

pub use hash_tree::ImmutableHashTree;
pub use hash_tree::ImmutableHashTreeIntoIterator;
pub use hash_tree::ImmutableHashTreeIterator;
pub use hash_tree::KeyExistsError;
pub use linked_list::ImmutableLinkedList;
pub use linked_list::ImmutableLinkedListIntoIterator;
pub use linked_list::ImmutableLinkedListIterator;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod reference_counter_tests {
    use super::ReferenceCounter;
    use rstest::rstest;

    #[rstest]
    fn test_reference_counter_clone() {
        let reference_counter: ReferenceCounter<i32> = ReferenceCounter::new(42);
        let reference_counter_clone = reference_counter.clone();
        assert_eq!(*reference_counter, *reference_counter_clone);
    }

    #[rstest]
    fn test_reference_counter_strong_count() {
        let reference_counter: ReferenceCounter<i32> = ReferenceCounter::new(42);
        assert_eq!(ReferenceCounter::strong_count(&reference_counter), 1);
        let reference_counter_clone = reference_counter.clone();
        assert_eq!(ReferenceCounter::strong_count(&reference_counter), 2);
        drop(reference_counter_clone);
        assert_eq!(ReferenceCounter::strong_count(&reference_counter), 1);
    }
}
