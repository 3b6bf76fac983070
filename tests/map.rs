mod common;

use pretty_assertions::assert_eq;
use wavl_rank::{Error, WavlMap};

use common::{init_tracing, map_of};

#[test]
fn four_inserts_promote_without_rotating() {
    init_tracing();

    let mut map = WavlMap::new();
    let ops: Vec<usize> = [10, 20, 5, 6]
        .into_iter()
        .map(|key| map.insert(key, key * 10).unwrap())
        .collect();

    assert_eq!(ops, [0, 1, 0, 2]);
    assert_eq!(map.keys_in_order(), [5, 6, 10, 20]);
    assert_eq!(map.size(), 4);
    assert_eq!(map.min(), Some(&50));
    assert_eq!(map.max(), Some(&200));
    assert_eq!(map.root_rank(), Some(2));
    assert_eq!(
        map.shape(),
        [(5, 1, 2), (6, 0, 1), (10, 2, 4), (20, 0, 1)]
    );
    map.assert_invariants();
}

#[test]
fn deleting_the_root_twice() {
    init_tracing();

    let mut map = WavlMap::new();
    let ops: Vec<usize> = [56, 51, 27, 70, 35]
        .into_iter()
        .map(|key| map.insert(key, key * 10).unwrap())
        .collect();
    assert_eq!(ops, [0, 1, 2, 2, 1]);

    // 51 is replaced by its successor 56 without any rank changes.
    assert_eq!(map.delete(&51), Ok(0));
    map.assert_invariants();

    // 56 leaves a missing 3-child below 70, fixed by a double rotation around 35.
    assert_eq!(map.delete(&56), Ok(2));
    map.assert_invariants();

    assert_eq!(map.keys_in_order(), [27, 35, 70]);
    assert_eq!(map.shape(), [(27, 0, 1), (35, 2, 3), (70, 0, 1)]);
}

#[test]
fn round_trip_to_empty() {
    init_tracing();

    let keys = [8, 3, 12, 1, 5, 10, 14, 4, 6];
    let mut map = map_of(&keys);
    assert_eq!(map.len(), keys.len());

    for key in keys {
        assert!(map.delete(&key).is_ok());
        map.assert_invariants();
        assert!(!map.contains_key(&key));
    }

    assert!(map.is_empty());
    assert_eq!(map.len(), 0);
    assert_eq!(map.root_rank(), None);
    assert_eq!(map.min(), None);
    assert_eq!(map.max(), None);
    assert_eq!(map.keys_in_order(), Vec::<i64>::new());
}

#[test]
fn duplicate_insert_is_rejected_unchanged() {
    init_tracing();

    let mut map = map_of(&[4, 2, 6, 1]);
    let before = map.shape();

    assert_eq!(map.insert(2, -1), Err(Error::DuplicateKey));

    assert_eq!(map.shape(), before);
    assert_eq!(map.get(&2), Some(&20));
    assert_eq!(map.len(), 4);
}

#[test]
fn missing_delete_is_rejected_unchanged() {
    init_tracing();

    let mut map = map_of(&[4, 2, 6, 1]);
    let before = map.shape();

    assert_eq!(map.delete(&3), Err(Error::KeyNotFound));
    assert_eq!(map.remove(&3), None);

    assert_eq!(map.shape(), before);

    let mut empty: WavlMap<i64, i64> = WavlMap::new();
    assert_eq!(empty.delete(&0), Err(Error::KeyNotFound));
}

#[test]
fn select_and_rank_of_agree() {
    init_tracing();

    let keys: Vec<i64> = (0..50).map(|i| (i * 37) % 101).collect();
    let map = map_of(&keys);

    let mut sorted = keys.clone();
    sorted.sort_unstable();

    for (pos, key) in (1..).zip(&sorted) {
        assert_eq!(map.select(pos), Ok(&(key * 10)));
        assert_eq!(map.select_key_value(pos), Ok((key, &(key * 10))));
        assert_eq!(map.rank_of(key), Some(pos));
    }

    assert_eq!(
        map.select(0),
        Err(Error::IndexOutOfRange { index: 0, len: 50 })
    );
    assert_eq!(
        map.select(51),
        Err(Error::IndexOutOfRange { index: 51, len: 50 })
    );
    assert_eq!(map.rank_of(&-1), None);
}

#[test]
fn select_on_empty_map() {
    let map: WavlMap<i64, i64> = WavlMap::new();

    assert_eq!(
        map.select(1),
        Err(Error::IndexOutOfRange { index: 1, len: 0 })
    );
    assert_eq!(
        Error::IndexOutOfRange { index: 1, len: 0 }.to_string(),
        "index 1 out of range for map of length 0"
    );
}

#[test]
fn values_follow_key_order() {
    let map = map_of(&[3, -7, 12, 0]);

    assert_eq!(map.values_in_order(), [-70, 0, 30, 120]);
    assert_eq!(
        map.iter().rev().map(|(&key, _)| key).collect::<Vec<_>>(),
        [12, 3, 0, -7]
    );
    assert_eq!(map.iter().len(), 4);
}

#[test]
fn search_and_get_mut() {
    let mut map = map_of(&[1, 2, 3]);

    assert_eq!(map.search(&2), Some(&20));
    assert_eq!(map.search(&4), None);

    *map.get_mut(&2).unwrap() += 5;
    assert_eq!(map.get(&2), Some(&25));
    assert!(map.get_mut(&4).is_none());
}

#[test]
fn pop_from_both_ends() {
    let mut map = map_of(&[5, 1, 9, 3, 7]);

    assert_eq!(map.first_key_value(), Some((&1, &10)));
    assert_eq!(map.last_key_value(), Some((&9, &90)));

    assert_eq!(map.pop_first(), Some((1, 10)));
    assert_eq!(map.pop_last(), Some((9, 90)));
    map.assert_invariants();

    assert_eq!(map.keys_in_order(), [3, 5, 7]);
}

#[test]
fn from_iter_keeps_first_value() {
    let map: WavlMap<i64, &str> = [(2, "a"), (1, "b"), (2, "c")].into_iter().collect();

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&2), Some(&"a"));
    assert_eq!(format!("{map:?}"), r#"{1: "b", 2: "a"}"#);
}

#[test]
fn clear_then_reuse() {
    let mut map = map_of(&[1, 2, 3, 4, 5]);

    map.clear();
    assert!(map.is_empty());

    assert_eq!(map.insert(9, 90), Ok(0));
    assert_eq!(map.keys_in_order(), [9]);
}

#[test]
fn sequential_inserts_stay_balanced_and_cheap() {
    init_tracing();

    const N: i64 = 10_000;
    let mut map = WavlMap::new();

    let mut insert_ops = 0;
    for key in 1..=N {
        insert_ops += map.insert(key, ()).unwrap();
    }
    // Checks the height bound along with the rank rule.
    map.assert_invariants();
    assert!(map.root_rank().unwrap() <= 2 * 14);

    let mut delete_ops = 0;
    for key in 1..=N {
        delete_ops += map.delete(&key).unwrap();
    }
    assert!(map.is_empty());

    let insert_mean = insert_ops as f64 / N as f64;
    let delete_mean = delete_ops as f64 / N as f64;
    assert!(insert_mean < 4.0, "mean insert ops {insert_mean}");
    assert!(delete_mean < 2.0, "mean delete ops {delete_mean}");
}

#[test]
fn scattered_keys_stay_balanced_and_cheap() {
    init_tracing();

    const N: i64 = 10_007;
    // 7919 is coprime to N, so this visits every residue once.
    let keys: Vec<i64> = (0..N).map(|i| (i * 7919) % N - N / 2).collect();
    let mut map = WavlMap::new();

    let mut insert_ops = 0;
    for &key in &keys {
        insert_ops += map.insert(key, key).unwrap();
    }
    map.assert_invariants();
    assert_eq!(map.len(), keys.len());

    let mut delete_ops = 0;
    for key in keys.iter().rev().step_by(2) {
        delete_ops += map.delete(key).unwrap();
    }
    map.assert_invariants();

    let deleted = keys.len().div_ceil(2);
    assert_eq!(map.len(), keys.len() - deleted);

    let insert_mean = insert_ops as f64 / keys.len() as f64;
    let delete_mean = delete_ops as f64 / deleted as f64;
    assert!(insert_mean < 4.0, "mean insert ops {insert_mean}");
    assert!(delete_mean < 2.0, "mean delete ops {delete_mean}");
}
