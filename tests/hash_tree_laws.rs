//! Property-based tests for `ImmutableHashTree`.
//!
//! This module verifies that `ImmutableHashTree` satisfies its laws and
//! invariants using proptest.

use persistree::persistent::ImmutableHashTree;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Strategy for generating test data
// =============================================================================

fn arbitrary_key() -> impl Strategy<Value = String> {
    "[a-z]{1,10}"
}

fn arbitrary_value() -> impl Strategy<Value = i32> {
    any::<i32>()
}

fn arbitrary_entry() -> impl Strategy<Value = (String, i32)> {
    (arbitrary_key(), arbitrary_value())
}

fn arbitrary_entries() -> impl Strategy<Value = Vec<(String, i32)>> {
    prop::collection::vec(arbitrary_entry(), 0..50)
}

// =============================================================================
// Get-Insert Law: tree.insert_with(k, v, replace).get(&k) == Some(&v)
// =============================================================================

proptest! {
    #[test]
    fn prop_get_insert_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let tree: ImmutableHashTree<String, i32> = entries.into_iter().collect();
        let inserted = tree.insert_with(key.clone(), value, |_, new| new);

        prop_assert_eq!(inserted.get(&key), Some(&value));
    }
}

// =============================================================================
// Get-Insert-Other Law: k1 != k2 => tree.insert(k1, v).get(&k2) == tree.get(&k2)
// =============================================================================

proptest! {
    #[test]
    fn prop_get_insert_other_law(
        entries in arbitrary_entries(),
        key1 in arbitrary_key(),
        key2 in arbitrary_key(),
        value in arbitrary_value()
    ) {
        prop_assume!(key1 != key2);

        let tree: ImmutableHashTree<String, i32> = entries.into_iter().collect();
        let inserted = tree.insert_with(key1, value, |_, new| new);

        prop_assert_eq!(inserted.get(&key2), tree.get(&key2));
    }
}

// =============================================================================
// Insert uniqueness: inserting a present key fails and changes nothing
// =============================================================================

proptest! {
    #[test]
    fn prop_insert_existing_key_fails(
        entries in arbitrary_entries(),
        value in arbitrary_value()
    ) {
        prop_assume!(!entries.is_empty());

        let tree: ImmutableHashTree<String, i32> = entries.clone().into_iter().collect();
        let existing_key = entries[0].0.clone();
        let before = tree.get(&existing_key).copied();

        prop_assert!(tree.insert(existing_key.clone(), value).is_err());
        prop_assert_eq!(tree.get(&existing_key).copied(), before);
    }
}

// =============================================================================
// Remove Law: tree.remove(&k).get(&k) == None, other keys unaffected
// =============================================================================

proptest! {
    #[test]
    fn prop_remove_law(entries in arbitrary_entries(), key in arbitrary_key()) {
        let tree: ImmutableHashTree<String, i32> = entries.into_iter().collect();
        let removed = tree.remove(&key);

        prop_assert_eq!(removed.get(&key), None);
        for (other_key, value) in tree.iter() {
            if *other_key != key {
                prop_assert_eq!(removed.get(other_key), Some(value));
            }
        }
    }
}

// =============================================================================
// Immutability Law: deriving new versions never changes the original
// =============================================================================

proptest! {
    #[test]
    fn prop_immutability_law(
        entries in arbitrary_entries(),
        key in arbitrary_key(),
        value in arbitrary_value()
    ) {
        let tree: ImmutableHashTree<String, i32> = entries.into_iter().collect();
        let expected: HashMap<String, i32> =
            tree.iter().map(|(k, v)| (k.clone(), *v)).collect();

        let _inserted = tree.insert_with(key.clone(), value, |_, new| new);
        let _removed = tree.remove(&key);

        prop_assert_eq!(tree.len(), expected.len());
        for (k, v) in &expected {
            prop_assert_eq!(tree.get(k), Some(v));
        }
    }
}

// =============================================================================
// Enumeration completeness: iteration yields each key exactly once
// =============================================================================

proptest! {
    #[test]
    fn prop_enumeration_completeness(entries in arbitrary_entries()) {
        let tree: ImmutableHashTree<String, i32> = entries.clone().into_iter().collect();
        let expected: HashSet<String> = entries.into_iter().map(|(key, _)| key).collect();

        let enumerated: Vec<String> = tree.keys().cloned().collect();
        let enumerated_set: HashSet<String> = enumerated.iter().cloned().collect();

        prop_assert_eq!(enumerated.len(), enumerated_set.len()); // no duplicates
        prop_assert_eq!(enumerated_set, expected);               // no omissions
        prop_assert_eq!(tree.len(), enumerated.len());
    }
}

// =============================================================================
// Balance Law: height stays logarithmic in the number of entries
// =============================================================================

proptest! {
    #[test]
    fn prop_balance_law(keys in prop::collection::hash_set(any::<i64>(), 1..500)) {
        let count = keys.len();
        let tree: ImmutableHashTree<i64, i64> =
            keys.into_iter().map(|key| (key, key)).collect();

        let bound = (1.45 * (count as f64).log2() + 2.0).ceil() as u32;
        prop_assert!(tree.height() <= bound.max(1));
    }
}

// =============================================================================
// Merge Law: insert_with accumulates like a fold over duplicates
// =============================================================================

proptest! {
    #[test]
    fn prop_merge_accumulates(
        key in arbitrary_key(),
        values in prop::collection::vec(-1000i32..1000, 1..20)
    ) {
        let mut tree: ImmutableHashTree<String, i32> = ImmutableHashTree::new();
        for value in &values {
            tree = tree.insert_with(key.clone(), *value, |old, new| old + new);
        }

        let total: i32 = values.iter().sum();
        prop_assert_eq!(tree.get(&key), Some(&total));
        prop_assert_eq!(tree.len(), 1);
    }
}
