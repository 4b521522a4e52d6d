//! Integration tests for `ImmutableHashTree`.

use persistree::persistent::{ImmutableHashTree, KeyExistsError};
use rstest::rstest;

// =============================================================================
// Basic Scenario
// =============================================================================

#[rstest]
fn test_insert_lookup_remove_scenario() {
    let tree = ImmutableHashTree::new()
        .insert("x".to_string(), 1)
        .unwrap()
        .insert("y".to_string(), 2)
        .unwrap()
        .insert("z".to_string(), 3)
        .unwrap();

    assert_eq!(tree.get("y"), Some(&2));

    let removed = tree.remove("y");
    assert_eq!(removed.get("y"), None);
    assert_eq!(removed.get_or_default("y"), 0);

    let mut keys: Vec<String> = removed.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, vec!["x".to_string(), "z".to_string()]);

    // The original version still holds all three entries
    assert_eq!(tree.len(), 3);
    assert_eq!(tree.get("y"), Some(&2));
}

#[rstest]
fn test_round_trip() {
    let tree: ImmutableHashTree<String, i32> = ImmutableHashTree::new();
    let inserted = tree.insert("k".to_string(), 7).unwrap();

    assert_eq!(inserted.get("k"), Some(&7));
}

#[rstest]
fn test_uniqueness() {
    let tree = ImmutableHashTree::singleton("k".to_string(), 7);

    assert_eq!(tree.insert("k".to_string(), 8), Err(KeyExistsError));
    assert_eq!(tree.get("k"), Some(&7));
}

#[rstest]
fn test_update_delegate_merge() {
    let tree = ImmutableHashTree::new()
        .insert_with("a".to_string(), 1, |_, new| new)
        .insert_with("a".to_string(), 2, |old, new| old + new);

    assert_eq!(tree.get("a"), Some(&3));
}

// =============================================================================
// Immutability across versions
// =============================================================================

#[rstest]
fn test_every_version_stays_intact() {
    let mut versions: Vec<ImmutableHashTree<i32, i32>> = vec![ImmutableHashTree::new()];
    for index in 0..50 {
        let next = versions
            .last()
            .unwrap()
            .insert(index, index * 10)
            .unwrap();
        versions.push(next);
    }

    for (version_index, version) in versions.iter().enumerate() {
        assert_eq!(version.len(), version_index);
        for index in 0..version_index as i32 {
            assert_eq!(version.get(&index), Some(&(index * 10)));
        }
    }
}

#[rstest]
fn test_removal_does_not_disturb_old_version() {
    let full: ImmutableHashTree<i32, i32> = (0..100).map(|index| (index, index)).collect();

    let mut shrinking = full.clone();
    for index in 0..100 {
        shrinking = shrinking.remove(&index);
    }

    assert!(shrinking.is_empty());
    assert_eq!(full.len(), 100);
    for index in 0..100 {
        assert_eq!(full.get(&index), Some(&index));
    }
}

// =============================================================================
// Balance
// =============================================================================

#[rstest]
#[case::ascending((0..1024).collect::<Vec<i32>>())]
#[case::descending((0..1024).rev().collect::<Vec<i32>>())]
fn test_balance_bound_for_insert_orders(#[case] keys: Vec<i32>) {
    let count = keys.len();
    let tree: ImmutableHashTree<i32, i32> = keys.into_iter().map(|key| (key, key)).collect();

    let bound = (1.45 * (count as f64).log2() + 2.0).ceil() as u32;
    assert!(tree.height() <= bound);
}

#[rstest]
fn test_balance_survives_interleaved_removal() {
    let mut tree: ImmutableHashTree<i32, i32> = (0..2048).map(|key| (key, key)).collect();

    // Remove three quarters of the entries
    for key in 0..2048 {
        if key % 4 != 0 {
            tree = tree.remove(&key);
        }
    }

    assert_eq!(tree.len(), 512);
    let bound = (1.45 * 512f64.log2() + 2.0).ceil() as u32;
    assert!(tree.height() <= bound, "height {} after removal", tree.height());
}

// =============================================================================
// Enumeration
// =============================================================================

#[rstest]
fn test_enumeration_completeness() {
    let tree: ImmutableHashTree<i32, i32> = (0..500).map(|key| (key, key + 1)).collect();

    let mut pairs: Vec<(i32, i32)> = tree.iter().map(|(key, value)| (*key, *value)).collect();
    assert_eq!(pairs.len(), 500);
    pairs.sort_unstable();
    pairs.dedup();
    assert_eq!(pairs.len(), 500);
    assert_eq!(pairs[0], (0, 1));
    assert_eq!(pairs[499], (499, 500));
}

#[rstest]
fn test_keys_values_agree_with_iter() {
    let tree: ImmutableHashTree<i32, i32> = (0..20).map(|key| (key, key * 2)).collect();

    let from_iter: Vec<(i32, i32)> = tree.iter().map(|(key, value)| (*key, *value)).collect();
    let keys: Vec<i32> = tree.keys().copied().collect();
    let values: Vec<i32> = tree.values().copied().collect();

    assert_eq!(keys, from_iter.iter().map(|(key, _)| *key).collect::<Vec<_>>());
    assert_eq!(
        values,
        from_iter.iter().map(|(_, value)| *value).collect::<Vec<_>>()
    );
}

#[rstest]
fn test_enumeration_is_restartable() {
    let tree: ImmutableHashTree<i32, i32> = (0..10).map(|key| (key, key)).collect();

    let first: Vec<i32> = tree.keys().copied().collect();
    let second: Vec<i32> = tree.keys().copied().collect();
    assert_eq!(first, second);
}
