//! Persistent (immutable) hash tree based on an AVL tree keyed by hash.
//!
//! This module provides [`ImmutableHashTree`], an immutable associative
//! container that uses structural sharing for efficient operations.
//!
//! # Overview
//!
//! `ImmutableHashTree` is a height-balanced binary search tree ordered by
//! the hash of the logical key. Distinct keys that share a hash are chained
//! inside a single node and disambiguated by equality.
//!
//! - O(log N) get
//! - O(log N) insert
//! - O(log N) remove
//! - O(1) len and `is_empty`
//!
//! All operations return new trees without modifying the original,
//! and structural sharing ensures memory efficiency.
//!
//! # Examples
//!
//! ```rust
//! use persistree::persistent::ImmutableHashTree;
//!
//! let tree = ImmutableHashTree::new()
//!     .insert("one".to_string(), 1)?
//!     .insert("two".to_string(), 2)?;
//!
//! assert_eq!(tree.get("one"), Some(&1));
//! assert_eq!(tree.get("two"), Some(&2));
//!
//! // Structural sharing: the original tree is preserved
//! let merged = tree.insert_with("one".to_string(), 100, |_, new| new);
//! assert_eq!(tree.get("one"), Some(&1));     // Original unchanged
//! assert_eq!(merged.get("one"), Some(&100)); // New version
//! # Ok::<(), persistree::persistent::KeyExistsError>(())
//! ```
//!
//! # Internal Structure
//!
//! The tree maintains the following invariants:
//! 1. Binary-search-tree property over the key hash
//! 2. AVL balance: the heights of a node's subtrees differ by at most 1
//! 3. Within a node's entry chain, keys are pairwise distinct by equality
//! 4. No logical key appears more than once anywhere in one tree
//!
//! Nodes are never mutated after construction. Every mutating operation
//! rebuilds the path from root to the affected node and shares all other
//! subtrees by reference, so previously returned trees stay valid even
//! while new versions are being published from other threads.

use super::ReferenceCounter;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

use smallvec::SmallVec;

// =============================================================================
// Hash computation
// =============================================================================

/// Computes the hash of a key using `DefaultHasher`.
fn compute_hash<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Error Definition
// =============================================================================

/// Error returned by [`ImmutableHashTree::insert`] when the key is already
/// present and no merge function was supplied.
///
/// The insert is purely functional, so the tree the caller holds is
/// unchanged; no partial mutation can be observed.
///
/// # Examples
///
/// ```rust
/// use persistree::persistent::{ImmutableHashTree, KeyExistsError};
///
/// let tree = ImmutableHashTree::singleton("key".to_string(), 1);
/// assert_eq!(tree.insert("key".to_string(), 2).unwrap_err(), KeyExistsError);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyExistsError;

impl fmt::Display for KeyExistsError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("key already exists in immutable hash tree")
    }
}

impl Error for KeyExistsError {}

// =============================================================================
// Node Definition
// =============================================================================

/// Entry chain for a single hash value.
///
/// Normally holds exactly one entry; longer only when distinct keys collide
/// on the same hash, so the single-entry case stays inline in the node.
type EntryChain<K, V> = SmallVec<[(K, V); 1]>;

/// Internal node structure for the hash tree.
///
/// One node represents one distinct hash value's bucket plus its links.
#[derive(Clone)]
struct Node<K, V> {
    /// Hash of every key in `entries`; the tree's ordering key.
    hash: u64,
    /// Entries sharing this hash, pairwise distinct by key equality.
    entries: EntryChain<K, V>,
    /// Height of the subtree rooted here (leaf = 1).
    height: u32,
    left: Option<ReferenceCounter<Self>>,
    right: Option<ReferenceCounter<Self>>,
}

/// Height of an optional subtree link (absent = 0).
fn link_height<K, V>(node: Option<&ReferenceCounter<Node<K, V>>>) -> u32 {
    node.map_or(0, |node_ref| node_ref.height)
}

impl<K, V> Node<K, V> {
    /// Creates a node, computing its height from the supplied children.
    fn make(
        hash: u64,
        entries: EntryChain<K, V>,
        left: Option<ReferenceCounter<Self>>,
        right: Option<ReferenceCounter<Self>>,
    ) -> Self {
        let height = 1 + link_height(left.as_ref()).max(link_height(right.as_ref()));
        Self {
            hash,
            entries,
            height,
            left,
            right,
        }
    }

    /// Creates a leaf node holding a single entry.
    fn leaf(hash: u64, key: K, value: V) -> Self {
        Self {
            hash,
            entries: SmallVec::from_iter([(key, value)]),
            height: 1,
            left: None,
            right: None,
        }
    }

    /// Difference between the left and right subtree heights.
    fn balance_factor(&self) -> i64 {
        i64::from(link_height(self.left.as_ref())) - i64::from(link_height(self.right.as_ref()))
    }
}

impl<K: Clone, V: Clone> Node<K, V> {
    /// Creates a copy of this node with new children, recomputing the height.
    fn with_children(
        &self,
        left: Option<ReferenceCounter<Self>>,
        right: Option<ReferenceCounter<Self>>,
    ) -> Self {
        Self::make(self.hash, self.entries.clone(), left, right)
    }

    /// Creates a copy of this node with a new entry chain, keeping children.
    fn with_entries(&self, entries: EntryChain<K, V>) -> Self {
        Self {
            hash: self.hash,
            entries,
            height: self.height,
            left: self.left.clone(),
            right: self.right.clone(),
        }
    }
}

// =============================================================================
// ImmutableHashTree Definition
// =============================================================================

/// A persistent (immutable) hash tree.
///
/// `ImmutableHashTree` is an immutable data structure that uses structural
/// sharing to efficiently support functional programming patterns. It is
/// ordered internally by key hash, which makes iteration order
/// implementation-defined (some total order over entries, not insertion
/// order).
///
/// Unlike a conventional map, [`insert`](Self::insert) fails with
/// [`KeyExistsError`] when the key is already present; replacing or merging
/// an existing value must be requested explicitly through
/// [`insert_with`](Self::insert_with). This makes lost updates in racing
/// code paths detectable instead of silent.
///
/// # Time Complexity
///
/// | Operation      | Complexity        |
/// |----------------|-------------------|
/// | `new`          | O(1)              |
/// | `get`          | O(log N + c)      |
/// | `insert`       | O(log N)          |
/// | `insert_with`  | O(log N)          |
/// | `remove`       | O(log N)          |
/// | `contains_key` | O(log N + c)      |
/// | `len`          | O(1)              |
/// | `is_empty`     | O(1)              |
///
/// where c is the collision-chain length at the key's hash (expected 1).
///
/// # Examples
///
/// ```rust
/// use persistree::persistent::ImmutableHashTree;
///
/// let tree = ImmutableHashTree::singleton("key".to_string(), 42);
/// assert_eq!(tree.get("key"), Some(&42));
/// ```
#[derive(Clone)]
pub struct ImmutableHashTree<K, V> {
    /// Root node of the tree; `None` is the empty tree.
    root: Option<ReferenceCounter<Node<K, V>>>,
    /// Number of entries
    length: usize,
}

impl<K, V> ImmutableHashTree<K, V> {
    /// Creates a new empty tree.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree: ImmutableHashTree<String, i32> = ImmutableHashTree::new();
    /// assert!(tree.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            length: 0,
        }
    }

    /// Returns the number of entries in the tree.
    ///
    /// # Complexity
    ///
    /// O(1)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::new()
    ///     .insert("a".to_string(), 1)?
    ///     .insert("b".to_string(), 2)?;
    /// assert_eq!(tree.len(), 2);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if the tree contains no entries.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let empty: ImmutableHashTree<String, i32> = ImmutableHashTree::new();
    /// assert!(empty.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the height of the tree (0 for the empty tree).
    ///
    /// The AVL balance invariant keeps this within O(log N) of the number of
    /// distinct hash buckets; exposed as a diagnostic.
    #[must_use]
    pub fn height(&self) -> u32 {
        link_height(self.root.as_ref())
    }
}

impl<K: Clone + Hash + Eq, V: Clone> ImmutableHashTree<K, V> {
    /// Creates a tree containing a single key-value pair.
    ///
    /// # Arguments
    ///
    /// * `key` - The key
    /// * `value` - The value
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::singleton("key".to_string(), 42);
    /// assert_eq!(tree.len(), 1);
    /// assert_eq!(tree.get("key"), Some(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        let hash = compute_hash(&key);
        Self {
            root: Some(ReferenceCounter::new(Node::leaf(hash, key, value))),
            length: 1,
        }
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the tree's key type, but `Hash`
    /// and `Eq` on the borrowed form must match those for the key type.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to look up
    ///
    /// # Complexity
    ///
    /// O(log N + c)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::singleton("hello".to_string(), 42);
    ///
    /// // Can use &str to look up String keys
    /// assert_eq!(tree.get("hello"), Some(&42));
    /// assert_eq!(tree.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = compute_hash(key);
        let mut node = self.root.as_deref();
        while let Some(node_ref) = node {
            match hash.cmp(&node_ref.hash) {
                Ordering::Less => node = node_ref.left.as_deref(),
                Ordering::Greater => node = node_ref.right.as_deref(),
                Ordering::Equal => {
                    return node_ref
                        .entries
                        .iter()
                        .find(|(entry_key, _)| entry_key.borrow() == key)
                        .map(|(_, value)| value);
                }
            }
        }
        None
    }

    /// Returns a clone of the value for the key, or the default value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::singleton("key".to_string(), 42);
    /// assert_eq!(tree.get_or_default("key"), 42);
    /// assert_eq!(tree.get_or_default("missing"), 0);
    /// ```
    #[must_use]
    pub fn get_or_default<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Default,
    {
        self.get(key).cloned().unwrap_or_default()
    }

    /// Returns `true` if the tree contains a value for the specified key.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to check
    ///
    /// # Complexity
    ///
    /// O(log N + c)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::singleton("key".to_string(), 42);
    ///
    /// assert!(tree.contains_key("key"));
    /// assert!(!tree.contains_key("other"));
    /// ```
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Inserts a key-value pair, failing if the key is already present.
    ///
    /// Returns the new tree; the original is never modified. On
    /// [`KeyExistsError`] the caller's tree is unchanged, since the
    /// operation is purely functional and only yields a new root on full
    /// success.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to insert
    /// * `value` - The value to insert
    ///
    /// # Errors
    ///
    /// Returns [`KeyExistsError`] if an entry with an equal key exists.
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::new().insert("key".to_string(), 1)?;
    ///
    /// assert_eq!(tree.get("key"), Some(&1));
    /// assert!(tree.insert("key".to_string(), 2).is_err());
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    pub fn insert(&self, key: K, value: V) -> Result<Self, KeyExistsError> {
        let hash = compute_hash(&key);
        let new_root = Self::insert_into_node(
            self.root.as_ref(),
            key,
            value,
            hash,
            None::<fn(&V, V) -> V>,
        )?;

        Ok(Self {
            root: Some(new_root),
            length: self.length + 1,
        })
    }

    /// Inserts a key-value pair, merging with any existing value.
    ///
    /// When an entry with an equal key exists, its value is replaced by
    /// `merge(existing, value)`; otherwise the pair is inserted as by
    /// [`insert`](Self::insert). Everything outside the path from the root
    /// to the affected node is shared with the original tree.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to insert
    /// * `value` - The value to insert
    /// * `merge` - Combines the existing value with the new one
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::singleton("a".to_string(), 1)
    ///     .insert_with("a".to_string(), 2, |old, new| old + new);
    ///
    /// assert_eq!(tree.get("a"), Some(&3));
    /// ```
    #[must_use]
    pub fn insert_with<F>(&self, key: K, value: V, merge: F) -> Self
    where
        F: FnOnce(&V, V) -> V,
    {
        let hash = compute_hash(&key);
        let mut merged = false;
        let merge_once = |existing: &V, incoming: V| {
            merged = true;
            merge(existing, incoming)
        };
        // Cannot fail: the merge closure absorbs the existing-key case.
        let new_root =
            Self::insert_into_node(self.root.as_ref(), key, value, hash, Some(merge_once));

        match new_root {
            Ok(root) => Self {
                root: Some(root),
                length: if merged { self.length } else { self.length + 1 },
            },
            Err(KeyExistsError) => self.clone(),
        }
    }

    /// Recursive helper for insert.
    ///
    /// Rebuilds the path from `node` down to the insertion point, applying
    /// rotations on the way back up; subtrees off the path are shared by
    /// reference. `merge` resolves an existing equal key; without it the
    /// existing key is a [`KeyExistsError`].
    fn insert_into_node<F>(
        node: Option<&ReferenceCounter<Node<K, V>>>,
        key: K,
        value: V,
        hash: u64,
        merge: Option<F>,
    ) -> Result<ReferenceCounter<Node<K, V>>, KeyExistsError>
    where
        F: FnOnce(&V, V) -> V,
    {
        let Some(node_ref) = node else {
            return Ok(ReferenceCounter::new(Node::leaf(hash, key, value)));
        };

        match hash.cmp(&node_ref.hash) {
            Ordering::Less => {
                let new_left =
                    Self::insert_into_node(node_ref.left.as_ref(), key, value, hash, merge)?;
                let new_node = node_ref.with_children(Some(new_left), node_ref.right.clone());
                Ok(ReferenceCounter::new(Self::rebalance(new_node)))
            }
            Ordering::Greater => {
                let new_right =
                    Self::insert_into_node(node_ref.right.as_ref(), key, value, hash, merge)?;
                let new_node = node_ref.with_children(node_ref.left.clone(), Some(new_right));
                Ok(ReferenceCounter::new(Self::rebalance(new_node)))
            }
            Ordering::Equal => Self::insert_into_chain(node_ref, key, value, merge),
        }
    }

    /// Resolves an insert that landed on an existing hash bucket.
    ///
    /// An equal key is merged (or rejected when no merge function was
    /// given); a distinct key is appended to the collision chain. Children
    /// and height are unaffected either way.
    fn insert_into_chain<F>(
        node_ref: &ReferenceCounter<Node<K, V>>,
        key: K,
        value: V,
        merge: Option<F>,
    ) -> Result<ReferenceCounter<Node<K, V>>, KeyExistsError>
    where
        F: FnOnce(&V, V) -> V,
    {
        let position = node_ref
            .entries
            .iter()
            .position(|(entry_key, _)| *entry_key == key);

        let new_entries = match position {
            Some(index) => {
                let Some(merge) = merge else {
                    return Err(KeyExistsError);
                };
                let mut entries = node_ref.entries.clone();
                entries[index].1 = merge(&node_ref.entries[index].1, value);
                entries
            }
            None => {
                // Hash collision between distinct keys: extend the chain.
                let mut entries = node_ref.entries.clone();
                entries.push((key, value));
                entries
            }
        };

        Ok(ReferenceCounter::new(node_ref.with_entries(new_entries)))
    }

    /// Removes a key from the tree.
    ///
    /// Returns a new tree without the key. If the key doesn't exist,
    /// returns a clone of the original tree; absence is an expected
    /// outcome, not an error.
    ///
    /// When the key's entry chain still has other members, only that node's
    /// chain is replaced; when the chain empties, the node is spliced out of
    /// the tree (promoting its in-order successor if it has two children)
    /// and the path is rebalanced.
    ///
    /// # Arguments
    ///
    /// * `key` - The key to remove
    ///
    /// # Complexity
    ///
    /// O(log N)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::new()
    ///     .insert("a".to_string(), 1)?
    ///     .insert("b".to_string(), 2)?;
    /// let removed = tree.remove("a");
    ///
    /// assert_eq!(tree.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1);  // New version
    /// assert_eq!(removed.get("a"), None);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.contains_key(key) {
            return self.clone();
        }

        let hash = compute_hash(key);
        let new_root = Self::remove_from_node(self.root.as_ref(), key, hash);

        Self {
            root: new_root,
            length: self.length.saturating_sub(1),
        }
    }

    /// Recursive helper for remove.
    ///
    /// Only called on paths known to contain the key.
    fn remove_from_node<Q>(
        node: Option<&ReferenceCounter<Node<K, V>>>,
        key: &Q,
        hash: u64,
    ) -> Option<ReferenceCounter<Node<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let node_ref = node?;

        match hash.cmp(&node_ref.hash) {
            Ordering::Less => {
                let new_left = Self::remove_from_node(node_ref.left.as_ref(), key, hash);
                let new_node = node_ref.with_children(new_left, node_ref.right.clone());
                Some(ReferenceCounter::new(Self::rebalance(new_node)))
            }
            Ordering::Greater => {
                let new_right = Self::remove_from_node(node_ref.right.as_ref(), key, hash);
                let new_node = node_ref.with_children(node_ref.left.clone(), new_right);
                Some(ReferenceCounter::new(Self::rebalance(new_node)))
            }
            Ordering::Equal => {
                if node_ref.entries.len() > 1 {
                    // Collision chain survives; the node stays in place.
                    let entries: EntryChain<K, V> = node_ref
                        .entries
                        .iter()
                        .filter(|(entry_key, _)| entry_key.borrow() != key)
                        .cloned()
                        .collect();
                    return Some(ReferenceCounter::new(node_ref.with_entries(entries)));
                }
                Self::splice_out(node_ref)
            }
        }
    }

    /// Removes a whole node from the tree (its chain is empty).
    fn splice_out(node_ref: &ReferenceCounter<Node<K, V>>) -> Option<ReferenceCounter<Node<K, V>>> {
        match (&node_ref.left, &node_ref.right) {
            (None, None) => None,
            (Some(left), None) => Some(left.clone()),
            (None, Some(right)) => Some(right.clone()),
            (Some(left), Some(right)) => {
                // Promote the in-order successor (minimum of the right subtree).
                let (new_right, successor_hash, successor_entries) = Self::take_min(right);
                let new_node = Node::make(
                    successor_hash,
                    successor_entries,
                    Some(left.clone()),
                    new_right,
                );
                Some(ReferenceCounter::new(Self::rebalance(new_node)))
            }
        }
    }

    /// Detaches the minimum node of a subtree.
    ///
    /// Returns the rebuilt subtree together with the detached node's hash
    /// and entry chain, rebalancing the search path on the way back up.
    fn take_min(
        node_ref: &ReferenceCounter<Node<K, V>>,
    ) -> (
        Option<ReferenceCounter<Node<K, V>>>,
        u64,
        EntryChain<K, V>,
    ) {
        match &node_ref.left {
            None => (
                node_ref.right.clone(),
                node_ref.hash,
                node_ref.entries.clone(),
            ),
            Some(left) => {
                let (new_left, min_hash, min_entries) = Self::take_min(left);
                let new_node = node_ref.with_children(new_left, node_ref.right.clone());
                (
                    Some(ReferenceCounter::new(Self::rebalance(new_node))),
                    min_hash,
                    min_entries,
                )
            }
        }
    }

    // =========================================================================
    // AVL rebalancing
    // =========================================================================

    /// Restores the AVL invariant at `node` after an insert or remove.
    ///
    /// Purely functional: rotations build new nodes for the rotated path and
    /// reuse every untouched subtree by reference.
    fn rebalance(node: Node<K, V>) -> Node<K, V> {
        let balance = node.balance_factor();

        if balance > 1 {
            if let Some(left) = &node.left {
                if left.balance_factor() < 0 {
                    // Left-Right: rotate the left child left, then this node right.
                    let new_left = Self::rotate_left((**left).clone());
                    let new_node = node
                        .with_children(Some(ReferenceCounter::new(new_left)), node.right.clone());
                    return Self::rotate_right(new_node);
                }
                return Self::rotate_right(node);
            }
        } else if balance < -1 {
            if let Some(right) = &node.right {
                if right.balance_factor() > 0 {
                    // Right-Left: rotate the right child right, then this node left.
                    let new_right = Self::rotate_right((**right).clone());
                    let new_node = node
                        .with_children(node.left.clone(), Some(ReferenceCounter::new(new_right)));
                    return Self::rotate_left(new_node);
                }
                return Self::rotate_left(node);
            }
        }

        node
    }

    /// Rotates the tree to the right around the given node.
    fn rotate_right(node: Node<K, V>) -> Node<K, V> {
        if let Some(left) = node.left {
            let new_right = Node::make(node.hash, node.entries, left.right.clone(), node.right);
            Node::make(
                left.hash,
                left.entries.clone(),
                left.left.clone(),
                Some(ReferenceCounter::new(new_right)),
            )
        } else {
            node
        }
    }

    /// Rotates the tree to the left around the given node.
    fn rotate_left(node: Node<K, V>) -> Node<K, V> {
        if let Some(right) = node.right {
            let new_left = Node::make(node.hash, node.entries, node.left, right.left.clone());
            Node::make(
                right.hash,
                right.entries.clone(),
                Some(ReferenceCounter::new(new_left)),
                right.right.clone(),
            )
        } else {
            node
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Returns an iterator over key-value pairs.
    ///
    /// The traversal is in-order by key hash, expanding each node's entry
    /// chain in encounter order; the resulting total order is
    /// implementation-defined and in particular is not insertion order. The
    /// iterator borrows one immutable snapshot, so it is unaffected by new
    /// versions derived from this tree while it runs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::new()
    ///     .insert("a".to_string(), 1)?
    ///     .insert("b".to_string(), 2)?;
    ///
    /// let total: i32 = tree.iter().map(|(_, value)| value).sum();
    /// assert_eq!(total, 3);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    #[must_use]
    pub fn iter(&self) -> ImmutableHashTreeIterator<'_, K, V> {
        let mut iterator = ImmutableHashTreeIterator {
            stack: Vec::new(),
            chain: std::slice::Iter::default(),
            remaining: self.length,
        };
        iterator.push_left_spine(self.root.as_deref());
        iterator
    }

    /// Returns an iterator over keys.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::new()
    ///     .insert("a".to_string(), 1)?
    ///     .insert("b".to_string(), 2)?;
    ///
    /// assert_eq!(tree.keys().count(), 2);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use persistree::persistent::ImmutableHashTree;
    ///
    /// let tree = ImmutableHashTree::new()
    ///     .insert("a".to_string(), 1)?
    ///     .insert("b".to_string(), 2)?;
    ///
    /// let sum: i32 = tree.values().sum();
    /// assert_eq!(sum, 3);
    /// # Ok::<(), persistree::persistent::KeyExistsError>(())
    /// ```
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

#[cfg(test)]
impl<K, V> ImmutableHashTree<K, V> {
    /// Root pointer for structural-sharing assertions in tests.
    fn root_ptr(&self) -> Option<*const ()> {
        self.root
            .as_ref()
            .map(|root| ReferenceCounter::as_ptr(root).cast())
    }

    /// Addresses of every node in this tree, for sharing assertions in tests.
    fn node_ptrs(&self) -> Vec<*const ()> {
        fn walk<K, V>(node: Option<&ReferenceCounter<Node<K, V>>>, out: &mut Vec<*const ()>) {
            if let Some(node_ref) = node {
                out.push(ReferenceCounter::as_ptr(node_ref).cast());
                walk(node_ref.left.as_ref(), out);
                walk(node_ref.right.as_ref(), out);
            }
        }
        let mut out = Vec::new();
        walk(self.root.as_ref(), &mut out);
        out
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

/// An in-order iterator over key-value pairs of an [`ImmutableHashTree`].
///
/// Lazy: nodes are visited as the iterator advances, holding at most one
/// root-to-leaf path on an explicit stack.
pub struct ImmutableHashTreeIterator<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    chain: std::slice::Iter<'a, (K, V)>,
    remaining: usize,
}

impl<'a, K, V> ImmutableHashTreeIterator<'a, K, V> {
    /// Pushes `node` and its chain of left descendants onto the stack.
    fn push_left_spine(&mut self, mut node: Option<&'a Node<K, V>>) {
        while let Some(node_ref) = node {
            self.stack.push(node_ref);
            node = node_ref.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for ImmutableHashTreeIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, value)) = self.chain.next() {
                self.remaining = self.remaining.saturating_sub(1);
                return Some((key, value));
            }
            let node = self.stack.pop()?;
            self.chain = node.entries.iter();
            self.push_left_spine(node.right.as_deref());
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for ImmutableHashTreeIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over key-value pairs of an [`ImmutableHashTree`].
pub struct ImmutableHashTreeIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for ImmutableHashTreeIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ImmutableHashTreeIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V> Default for ImmutableHashTree<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Hash + Eq, V: Clone> FromIterator<(K, V)> for ImmutableHashTree<K, V> {
    /// Builds a tree from pairs; a repeated key keeps its last value.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        for (key, value) in iter {
            tree = tree.insert_with(key, value, |_, new| new);
        }
        tree
    }
}

impl<K: Clone + Hash + Eq, V: Clone> IntoIterator for ImmutableHashTree<K, V> {
    type Item = (K, V);
    type IntoIter = ImmutableHashTreeIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        ImmutableHashTreeIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V> IntoIterator for &'a ImmutableHashTree<K, V>
where
    K: Clone + Hash + Eq,
    V: Clone,
{
    type Item = (&'a K, &'a V);
    type IntoIter = ImmutableHashTreeIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: Clone + Hash + Eq, V: Clone + PartialEq> PartialEq for ImmutableHashTree<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.length != other.length {
            return false;
        }

        for (key, value) in self {
            match other.get(key) {
                Some(other_value) if other_value == value => {}
                _ => return false,
            }
        }

        true
    }
}

impl<K: Clone + Hash + Eq, V: Clone + Eq> Eq for ImmutableHashTree<K, V> {}

impl<K: Clone + Hash + Eq + fmt::Debug, V: Clone + fmt::Debug> fmt::Debug
    for ImmutableHashTree<K, V>
{
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Key whose hash is its bucket only, forcing collisions between
    /// distinct keys that share a bucket.
    #[derive(Clone, PartialEq, Eq, Debug)]
    struct CollidingKey {
        bucket: u64,
        tag: u32,
    }

    impl Hash for CollidingKey {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.bucket.hash(state);
        }
    }

    fn colliding(bucket: u64, tag: u32) -> CollidingKey {
        CollidingKey { bucket, tag }
    }

    #[rstest]
    fn test_new_creates_empty() {
        let tree: ImmutableHashTree<String, i32> = ImmutableHashTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.height(), 0);
    }

    #[rstest]
    fn test_singleton() {
        let tree = ImmutableHashTree::singleton("key".to_string(), 42);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("key"), Some(&42));
        assert_eq!(tree.height(), 1);
    }

    #[rstest]
    fn test_insert_and_get() {
        let tree = ImmutableHashTree::new()
            .insert("one".to_string(), 1)
            .unwrap()
            .insert("two".to_string(), 2)
            .unwrap();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get("one"), Some(&1));
        assert_eq!(tree.get("two"), Some(&2));
        assert_eq!(tree.get("three"), None);
    }

    #[rstest]
    fn test_insert_existing_key_fails() {
        let tree = ImmutableHashTree::singleton("key".to_string(), 1);
        let result = tree.insert("key".to_string(), 2);

        assert_eq!(result.unwrap_err(), KeyExistsError);
        // Failed insert leaves the caller's tree untouched
        assert_eq!(tree.get("key"), Some(&1));
        assert_eq!(tree.len(), 1);
    }

    #[rstest]
    fn test_insert_with_merges_existing() {
        let tree = ImmutableHashTree::singleton("a".to_string(), 1)
            .insert_with("a".to_string(), 2, |old, new| old + new);

        assert_eq!(tree.get("a"), Some(&3));
        assert_eq!(tree.len(), 1);
    }

    #[rstest]
    fn test_insert_with_absent_key_inserts() {
        let tree = ImmutableHashTree::new().insert_with("a".to_string(), 7, |old, new| old + new);

        assert_eq!(tree.get("a"), Some(&7));
        assert_eq!(tree.len(), 1);
    }

    #[rstest]
    fn test_insert_with_replace_semantics() {
        let tree = ImmutableHashTree::singleton("a".to_string(), 1)
            .insert_with("a".to_string(), 9, |_, new| new);

        assert_eq!(tree.get("a"), Some(&9));
    }

    #[rstest]
    fn test_versions_are_independent() {
        let tree1 = ImmutableHashTree::singleton("key".to_string(), 1);
        let tree2 = tree1.insert_with("key".to_string(), 2, |_, new| new);

        assert_eq!(tree1.get("key"), Some(&1));
        assert_eq!(tree2.get("key"), Some(&2));
    }

    #[rstest]
    fn test_remove() {
        let tree = ImmutableHashTree::new()
            .insert("a".to_string(), 1)
            .unwrap()
            .insert("b".to_string(), 2)
            .unwrap();
        let removed = tree.remove("a");

        assert_eq!(removed.len(), 1);
        assert_eq!(removed.get("a"), None);
        assert_eq!(removed.get("b"), Some(&2));
        assert_eq!(tree.len(), 2);
    }

    #[rstest]
    fn test_remove_absent_key_is_noop() {
        let tree = ImmutableHashTree::singleton("a".to_string(), 1);
        let removed = tree.remove("missing");

        assert_eq!(removed, tree);
    }

    #[rstest]
    fn test_remove_all_sequentially() {
        let mut tree: ImmutableHashTree<i32, i32> = (0..64).map(|index| (index, index)).collect();

        for index in 0..64 {
            tree = tree.remove(&index);
            assert_eq!(tree.get(&index), None);
            assert_eq!(tree.len(), (63 - index) as usize);
        }

        assert!(tree.is_empty());
        assert_eq!(tree.height(), 0);
    }

    #[rstest]
    fn test_get_or_default() {
        let tree = ImmutableHashTree::singleton("key".to_string(), 42);

        assert_eq!(tree.get_or_default("key"), 42);
        assert_eq!(tree.get_or_default("missing"), 0);
    }

    #[rstest]
    fn test_collision_chain_insert_and_get() {
        let tree = ImmutableHashTree::new()
            .insert(colliding(7, 1), "first")
            .unwrap()
            .insert(colliding(7, 2), "second")
            .unwrap()
            .insert(colliding(7, 3), "third")
            .unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(&colliding(7, 1)), Some(&"first"));
        assert_eq!(tree.get(&colliding(7, 2)), Some(&"second"));
        assert_eq!(tree.get(&colliding(7, 3)), Some(&"third"));
        // All three share one node
        assert_eq!(tree.height(), 1);
    }

    #[rstest]
    fn test_collision_chain_duplicate_key_fails() {
        let tree = ImmutableHashTree::singleton(colliding(7, 1), 1)
            .insert(colliding(7, 2), 2)
            .unwrap();

        assert!(tree.insert(colliding(7, 2), 3).is_err());
    }

    #[rstest]
    fn test_collision_chain_remove_keeps_others() {
        let tree = ImmutableHashTree::new()
            .insert(colliding(7, 1), 1)
            .unwrap()
            .insert(colliding(7, 2), 2)
            .unwrap();
        let removed = tree.remove(&colliding(7, 1));

        assert_eq!(removed.len(), 1);
        assert_eq!(removed.get(&colliding(7, 1)), None);
        assert_eq!(removed.get(&colliding(7, 2)), Some(&2));
    }

    #[rstest]
    fn test_collision_chain_merge() {
        let tree = ImmutableHashTree::singleton(colliding(7, 1), 10)
            .insert(colliding(7, 2), 20)
            .unwrap()
            .insert_with(colliding(7, 1), 5, |old, new| old + new);

        assert_eq!(tree.get(&colliding(7, 1)), Some(&15));
        assert_eq!(tree.get(&colliding(7, 2)), Some(&20));
    }

    #[rstest]
    fn test_remove_node_with_two_children() {
        // Enough keys that interior nodes with two children must exist.
        let tree: ImmutableHashTree<i32, i32> = (0..128).map(|index| (index, index * 3)).collect();

        let mut current = tree.clone();
        for index in (0..128).step_by(2) {
            current = current.remove(&index);
        }

        assert_eq!(current.len(), 64);
        for index in 0..128 {
            if index % 2 == 0 {
                assert_eq!(current.get(&index), None);
            } else {
                assert_eq!(current.get(&index), Some(&(index * 3)));
            }
        }
        // Original still intact
        assert_eq!(tree.len(), 128);
    }

    #[rstest]
    #[case(16)]
    #[case(256)]
    #[case(4096)]
    fn test_balance_bound(#[case] count: i32) {
        let tree: ImmutableHashTree<i32, i32> = (0..count).map(|index| (index, index)).collect();

        // AVL height is at most ~1.44 * log2(n) + 2
        let log2 = (f64::from(count)).log2();
        let bound = (1.45 * log2 + 2.0).ceil() as u32;
        assert!(
            tree.height() <= bound,
            "height {} exceeds bound {} for {} entries",
            tree.height(),
            bound,
            count
        );
    }

    #[rstest]
    fn test_structural_sharing_on_insert() {
        let tree: ImmutableHashTree<i32, i32> = (0..512).map(|index| (index, index)).collect();
        let updated = tree.insert(10_000, 0).unwrap();

        // One insert rebuilds the root-to-leaf path (plus at most one
        // rotation); every other node is shared by reference.
        let old_ptrs: std::collections::HashSet<*const ()> =
            tree.node_ptrs().into_iter().collect();
        let new_ptrs = updated.node_ptrs();
        let fresh = new_ptrs
            .iter()
            .filter(|pointer| !old_ptrs.contains(*pointer))
            .count();

        assert!(
            fresh <= 2 * tree.height() as usize + 4,
            "insert rebuilt {fresh} nodes in a tree of height {}",
            tree.height()
        );
        assert_eq!(tree.len(), 512);
        assert_eq!(updated.len(), 513);
    }

    #[rstest]
    fn test_structural_sharing_on_remove() {
        let tree: ImmutableHashTree<i32, i32> = (0..512).map(|index| (index, index)).collect();
        let removed = tree.remove(&100);

        let old_ptrs: std::collections::HashSet<*const ()> =
            tree.node_ptrs().into_iter().collect();
        let fresh = removed
            .node_ptrs()
            .iter()
            .filter(|pointer| !old_ptrs.contains(*pointer))
            .count();

        assert!(fresh <= 2 * tree.height() as usize + 4);
    }

    #[rstest]
    fn test_clone_shares_root() {
        let tree: ImmutableHashTree<i32, i32> = (0..16).map(|index| (index, index)).collect();
        let cloned = tree.clone();

        assert_eq!(tree.root_ptr(), cloned.root_ptr());
    }

    #[rstest]
    fn test_iter_in_hash_order() {
        let tree: ImmutableHashTree<i32, i32> = (0..64).map(|index| (index, index)).collect();

        let hashes: Vec<u64> = tree.keys().map(|key| compute_hash(key)).collect();
        let mut sorted = hashes.clone();
        sorted.sort_unstable();
        assert_eq!(hashes, sorted);
    }

    #[rstest]
    fn test_iter_completeness() {
        let tree: ImmutableHashTree<i32, i32> = (0..100).map(|index| (index, index)).collect();

        let mut keys: Vec<i32> = tree.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..100).collect::<Vec<_>>());
    }

    #[rstest]
    fn test_iter_is_exact_size() {
        let tree: ImmutableHashTree<i32, i32> = (0..10).map(|index| (index, index)).collect();

        let mut iterator = tree.iter();
        assert_eq!(iterator.len(), 10);
        iterator.next();
        assert_eq!(iterator.len(), 9);
    }

    #[rstest]
    fn test_from_iter_last_value_wins() {
        let tree: ImmutableHashTree<String, i32> =
            vec![("a".to_string(), 1), ("a".to_string(), 2)].into_iter().collect();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("a"), Some(&2));
    }

    #[rstest]
    fn test_into_iter() {
        let tree: ImmutableHashTree<i32, i32> = (0..5).map(|index| (index, index * 2)).collect();

        let mut pairs: Vec<(i32, i32)> = tree.into_iter().collect();
        pairs.sort_unstable();
        assert_eq!(pairs, vec![(0, 0), (1, 2), (2, 4), (3, 6), (4, 8)]);
    }

    #[rstest]
    fn test_eq_ignores_build_order() {
        let tree1 = ImmutableHashTree::new()
            .insert("a".to_string(), 1)
            .unwrap()
            .insert("b".to_string(), 2)
            .unwrap();
        let tree2 = ImmutableHashTree::new()
            .insert("b".to_string(), 2)
            .unwrap()
            .insert("a".to_string(), 1)
            .unwrap();

        assert_eq!(tree1, tree2);
    }

    #[rstest]
    fn test_debug_formats_as_map() {
        let tree = ImmutableHashTree::singleton("a".to_string(), 1);
        let rendered = format!("{tree:?}");
        assert!(rendered.contains("\"a\": 1"));
    }

    #[rstest]
    fn test_key_exists_error_display() {
        let message = format!("{KeyExistsError}");
        assert_eq!(message, "key already exists in immutable hash tree");
    }
}
