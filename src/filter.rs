//! Predicate combinators over a persistent filter chain.
//!
//! This module provides [`FilterGroup`], which combines a list of
//! predicates into a single predicate with AND (all must match) or OR (any
//! may match) semantics. The predicates live in an
//! [`crate::persistent::ImmutableLinkedList`], so a group captured as a
//! predicate keeps the chain it was built from even if the group is
//! extended afterwards.
//!
//! # Examples
//!
//! ```rust
//! use persistree::filter::FilterGroup;
//!
//! let mut group: FilterGroup<i32> = FilterGroup::new();
//! group.push(|value| *value > 0);
//! group.push(|value| value % 2 == 0);
//!
//! assert!(group.matches(&4));
//! assert!(!group.matches(&3));  // odd
//! assert!(!group.matches(&-2)); // not positive
//! ```

use std::fmt;

use crate::persistent::{ImmutableLinkedList, ReferenceCounter};

/// A stored predicate.
type Predicate<T> = ReferenceCounter<dyn Fn(&T) -> bool + Send + Sync>;

/// Combines a chain of predicates with AND or OR semantics.
///
/// By default every filter must accept a value (`AND`); with
/// [`set_use_or`](Self::set_use_or) a single accepting filter suffices
/// (`OR`). An empty group matches everything in either mode.
///
/// # Examples
///
/// ```rust
/// use persistree::filter::FilterGroup;
///
/// let mut group: FilterGroup<&str> = FilterGroup::new();
/// group.set_use_or(true);
/// group.push(|name: &&str| name.starts_with("img_"));
/// group.push(|name: &&str| name.ends_with(".png"));
///
/// assert!(group.matches(&"img_001.jpg"));
/// assert!(group.matches(&"chart.png"));
/// assert!(!group.matches(&"notes.txt"));
/// ```
pub struct FilterGroup<T> {
    filters: ImmutableLinkedList<Predicate<T>>,
    use_or: bool,
}

impl<T> FilterGroup<T> {
    /// Creates an empty group with AND semantics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filters: ImmutableLinkedList::new(),
            use_or: false,
        }
    }

    /// Creates a group from an iterator of predicates.
    #[must_use]
    pub fn from_filters<I, F>(filters: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let mut group = Self::new();
        for filter in filters {
            group.push(filter);
        }
        group
    }

    /// Adds a filter to the group.
    pub fn push<F>(&mut self, filter: F)
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filters = self.filters.cons(ReferenceCounter::new(filter));
    }

    /// Switches between OR (`true`) and AND (`false`) combination.
    pub fn set_use_or(&mut self, use_or: bool) {
        self.use_or = use_or;
    }

    /// Returns `true` if the group combines its filters with OR.
    #[must_use]
    pub const fn use_or(&self) -> bool {
        self.use_or
    }

    /// Returns the number of filters in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the group has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Applies the combined filter to a value.
    ///
    /// AND mode: every filter must accept. OR mode: any filter may accept.
    /// An empty group accepts everything in both modes.
    #[must_use]
    pub fn matches(&self, value: &T) -> bool {
        if self.use_or {
            return self.filters.is_empty() || self.filters.iter().any(|filter| filter(value));
        }
        self.filters.iter().all(|filter| filter(value))
    }

    /// Converts the group into a standalone predicate.
    ///
    /// The predicate captures the group's current filter chain; pushing
    /// more filters into a clone of the group later does not affect it.
    #[must_use]
    pub fn into_predicate(self) -> impl Fn(&T) -> bool {
        move |value| self.matches(value)
    }
}

impl<T> Default for FilterGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FilterGroup<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            use_or: self.use_or,
        }
    }
}

impl<T> fmt::Debug for FilterGroup<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FilterGroup")
            .field("filters", &self.filters.len())
            .field("use_or", &self.use_or)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
