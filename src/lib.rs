//! # persistree
//!
//! A persistent (immutable) hash tree with structural sharing and a
//! lock-free protocol for publishing new tree versions across threads.
//!
//! ## Overview
//!
//! This library provides a small family of immutable data structures built
//! around one core type, [`persistent::ImmutableHashTree`]:
//!
//! - **Persistent Hash Tree**: a height-balanced binary tree keyed by the
//!   hash of the logical key, with collision chaining inside each node.
//!   Every mutating operation returns a new tree; the previous version
//!   remains valid and unchanged.
//! - **Lock-Free Publication**: [`concurrent::ConcurrentSlot`] holds the
//!   current tree version in an atomic slot. Writers apply a pure insert and
//!   publish the result with compare-and-swap, retrying on conflict; readers
//!   take immutable snapshots and never block.
//! - **Persistent Linked List**: [`persistent::ImmutableLinkedList`], a
//!   cons-list with O(1) prepend used for small ordered chains.
//! - **Collaborators**: [`cache::TypeCache`], a type-keyed cache populated
//!   racily by many threads, and [`filter::FilterGroup`], an AND/OR
//!   combinator over a persistent list of predicates.
//!
//! ## Example
//!
//! ```rust
//! use persistree::prelude::*;
//!
//! let tree = ImmutableHashTree::new()
//!     .insert("x".to_string(), 1)?
//!     .insert("y".to_string(), 2)?;
//!
//! // Structural sharing: the original tree is preserved
//! let removed = tree.remove("y");
//! assert_eq!(tree.get("y"), Some(&2));
//! assert_eq!(removed.get("y"), None);
//! # Ok::<(), persistree::persistent::KeyExistsError>(())
//! ```
//!
//! ## Concurrency
//!
//! ```rust
//! use persistree::concurrent::ConcurrentSlot;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let slot = Arc::new(ConcurrentSlot::new());
//! let handles: Vec<_> = (0..4)
//!     .map(|index| {
//!         let slot = Arc::clone(&slot);
//!         thread::spawn(move || slot.insert(index, index * 10))
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap().unwrap();
//! }
//! assert_eq!(slot.snapshot().len(), 4);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types.
///
/// # Usage
///
/// ```rust
/// use persistree::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::TypeCache;
    pub use crate::concurrent::ConcurrentSlot;
    pub use crate::filter::FilterGroup;
    pub use crate::persistent::{ImmutableHashTree, ImmutableLinkedList, KeyExistsError};
}

pub mod cache;
pub mod concurrent;
pub mod filter;
pub mod persistent;
