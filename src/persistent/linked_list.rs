//! Persistent (immutable) singly-linked list.
//!
//! This module provides [`ImmutableLinkedList`], an immutable singly-linked
//! list that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `ImmutableLinkedList` is a cons-list. It provides:
//!
//! - O(1) prepend (`cons`)
//! - O(1) head access
//! - O(1) tail access
//! - O(n) index access
//! - O(n) reverse
//!
//! All operations return new lists without modifying the original,
//! and structural sharing ensures memory efficiency. It has no concurrency
//! machinery of its own; share a list across threads by value, like any
//! other immutable datum.
//!
//! # Examples
//!
//! ```rust
//! use persistree::persistent::ImmutableLinkedList;
//!
//! // Build a list using cons
//! let list = ImmutableLinkedList::new().cons(3).cons(2).cons(1);
//! assert_eq!(list.head(), Some(&1));
//! assert_eq!(list.len(), 3);
//!
//! // Structural sharing: the original list is preserved
//! let extended = list.cons(0);
//! assert_eq!(list.len(), 3);     // Original unchanged
//! assert_eq!(extended.len(), 4); // New list with prepended element
//!
//! // Build from an iterator
//! let list: ImmutableLinkedList<i32> = (1..=5).collect();
//! assert_eq!(list.iter().sum::<i32>(), 15);
//! ```
//!
//! # Structural Sharing
//!
//! When you create a new list by prepending an element with `cons`, the new
//! list shares all nodes with the original list:
//!
//! ```text
//! list1: 1 -> 2 -> 3 -> nil
//! list2 = list1.cons(0): 0 -> [1 -> 2 -> 3 -> nil]  // shares [1, 2, 3] with list1
//! ```
//!
//! This makes `cons` an O(1) operation both in time and additional space.

use super::ReferenceCounter;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

/// Internal node structure for the persistent list.
///
/// Each node contains an element and an optional reference to the next node.
struct Node<T> {
    /// The element stored in this node.
    element: T,
    /// Reference to the next node (if any).
    next: Option<ReferenceCounter<Self>>,
}

/// A persistent (immutable) singly-linked list.
///
/// `ImmutableLinkedList` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns.
///
/// # Time Complexity
///
/// | Operation | Complexity |
/// |-----------|------------|
/// | `new`     | O(1)       |
/// | `cons`    | O(1)       |
/// | `head`    | O(1)       |
/// | `tail`    | O(1)       |
/// | `len`     | O(1)       |
/// | `get`     | O(n)       |
/// | `reverse` | O(n)       |
///
/// # Examples
///
/// ```rust
/// use persistree::persistent::ImmutableLinkedList;
///
/// let list = ImmutableLinkedList::singleton(42);
/// assert_eq!(list.head(), Some(&42));
/// ```
#[derive(Clone)]
pub struct ImmutableLinkedList<T> {
    /// Reference to the head node (if any).
    head: Option<ReferenceCounter<Node<T>>>,
    /// Cached length for O(1) access.
    length: usize,
}

impl<T> ImmutableLinkedList<T> {
    /// Creates a new empty list.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list: ImmutableLinkedList<i32> = ImmutableLinkedList::new();
    /// assert!(list.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            length: 0,
        }
    }

    /// Creates a list containing a single element.
    ///
    /// # Arguments
    ///
    /// * `element` - The element to store in the list
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::singleton(42);
    /// assert_eq!(list.head(), Some(&42));
    /// assert_eq!(list.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self::new().cons(element)
    }

    /// Builds a list from a Vec efficiently.
    ///
    /// Uses `Vec::pop()` to consume elements from the end, which is O(1),
    /// avoiding the need for reverse iteration.
    fn build_from_vec(mut elements: Vec<T>) -> Self {
        let length = elements.len();
        if length == 0 {
            return Self::new();
        }

        // Build from end to start using Vec::pop()
        let mut head: Option<ReferenceCounter<Node<T>>> = None;
        while let Some(element) = elements.pop() {
            head = Some(ReferenceCounter::new(Node {
                element,
                next: head,
            }));
        }

        Self { head, length }
    }

    /// Returns the number of elements in the list.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the list contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Prepends an element to the front of the list.
    ///
    /// The new list shares every existing node with this one.
    ///
    /// # Arguments
    ///
    /// * `element` - The element to prepend
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::new().cons(2).cons(1);
    /// assert_eq!(list.head(), Some(&1));
    /// assert_eq!(list.len(), 2);
    /// ```
    #[must_use]
    pub fn cons(&self, element: T) -> Self {
        Self {
            head: Some(ReferenceCounter::new(Node {
                element,
                next: self.head.clone(),
            })),
            length: self.length + 1,
        }
    }

    /// Returns a reference to the first element.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::singleton(1);
    /// assert_eq!(list.head(), Some(&1));
    ///
    /// let empty: ImmutableLinkedList<i32> = ImmutableLinkedList::new();
    /// assert_eq!(empty.head(), None);
    /// ```
    #[must_use]
    pub fn head(&self) -> Option<&T> {
        self.head.as_ref().map(|node| &node.element)
    }

    /// Returns the list without its first element.
    ///
    /// Returns an empty list when called on an empty list.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::new().cons(2).cons(1);
    /// let tail = list.tail();
    /// assert_eq!(tail.head(), Some(&2));
    /// assert_eq!(tail.len(), 1);
    /// ```
    #[must_use]
    pub fn tail(&self) -> Self {
        self.head.as_ref().map_or_else(Self::new, |node| Self {
            head: node.next.clone(),
            length: self.length - 1,
        })
    }

    /// Splits the list into its head and tail.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::new().cons(2).cons(1);
    /// let (head, tail) = list.uncons().unwrap();
    /// assert_eq!(head, &1);
    /// assert_eq!(tail.head(), Some(&2));
    /// ```
    #[must_use]
    pub fn uncons(&self) -> Option<(&T, Self)> {
        self.head.as_ref().map(|node| {
            (
                &node.element,
                Self {
                    head: node.next.clone(),
                    length: self.length - 1,
                },
            )
        })
    }

    /// Returns a reference to the element at the given index.
    ///
    /// # Complexity
    ///
    /// O(n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::new().cons(3).cons(2).cons(1);
    /// assert_eq!(list.get(1), Some(&2));
    /// assert_eq!(list.get(9), None);
    /// ```
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.iter().nth(index)
    }

    /// Returns an iterator over the elements, front to back.
    #[must_use]
    pub fn iter(&self) -> ImmutableLinkedListIterator<'_, T> {
        ImmutableLinkedListIterator {
            current: self.head.as_deref(),
            remaining: self.length,
        }
    }
}

impl<T: PartialEq> ImmutableLinkedList<T> {
    /// Returns `true` if the list contains the given element.
    ///
    /// # Complexity
    ///
    /// O(n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list: ImmutableLinkedList<i32> = (1..=3).collect();
    /// assert!(list.contains(&2));
    /// assert!(!list.contains(&9));
    /// ```
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.iter().any(|candidate| candidate == element)
    }
}

impl<T: Clone> ImmutableLinkedList<T> {
    /// Builds a list from a slice, preserving order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list = ImmutableLinkedList::from_slice(&[1, 2, 3]);
    /// assert_eq!(list.head(), Some(&1));
    /// assert_eq!(list.len(), 3);
    /// ```
    #[must_use]
    pub fn from_slice(slice: &[T]) -> Self {
        Self::build_from_vec(slice.to_vec())
    }

    /// Returns the list with its elements in reverse order.
    ///
    /// # Complexity
    ///
    /// O(n)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableLinkedList;
    ///
    /// let list: ImmutableLinkedList<i32> = (1..=3).collect();
    /// let reversed = list.reverse();
    /// assert_eq!(reversed.head(), Some(&3));
    /// ```
    #[must_use]
    pub fn reverse(&self) -> Self {
        let mut reversed = Self::new();
        for element in self.iter() {
            reversed = reversed.cons(element.clone());
        }
        reversed
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// A borrowing iterator over the elements of an [`ImmutableLinkedList`].
pub struct ImmutableLinkedListIterator<'a, T> {
    current: Option<&'a Node<T>>,
    remaining: usize,
}

impl<'a, T> Iterator for ImmutableLinkedListIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.next.as_deref();
        self.remaining = self.remaining.saturating_sub(1);
        Some(&node.element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for ImmutableLinkedListIterator<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over the elements of an [`ImmutableLinkedList`].
pub struct ImmutableLinkedListIntoIterator<T> {
    elements: std::vec::IntoIter<T>,
}

impl<T> Iterator for ImmutableLinkedListIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.elements.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.elements.size_hint()
    }
}

impl<T> ExactSizeIterator for ImmutableLinkedListIntoIterator<T> {
    fn len(&self) -> usize {
        self.elements.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T> Default for ImmutableLinkedList<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for ImmutableLinkedList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::build_from_vec(iter.into_iter().collect())
    }
}

impl<T: Clone> IntoIterator for ImmutableLinkedList<T> {
    type Item = T;
    type IntoIter = ImmutableLinkedListIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        let elements: Vec<T> = self.iter().cloned().collect();
        ImmutableLinkedListIntoIterator {
            elements: elements.into_iter(),
        }
    }
}

impl<'a, T> IntoIterator for &'a ImmutableLinkedList<T> {
    type Item = &'a T;
    type IntoIter = ImmutableLinkedListIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq> PartialEq for ImmutableLinkedList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for ImmutableLinkedList<T> {}

impl<T: Hash> Hash for ImmutableLinkedList<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for element in self.iter() {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ImmutableLinkedList<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_list().entries(self.iter()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
