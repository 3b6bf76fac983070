extern crate std;

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{Error, Links, TreeNode, WavlMap};

/// An intrusive node for exercising [`WavlTree`](crate::WavlTree) directly.
#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: i64,
}

impl TestNode {
    pub fn new(key: i64) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(r))
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = i64;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(i64),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in -1000i64..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Search(ItemValue),
    Delete(ItemValue),
    RankOf(ItemValue),
    Select(usize),
    Min,
    PopFirst,
    Max,
    PopLast,
}

impl Op {
    fn finalize(self, sorted: &[i64]) -> FinalOp {
        // Index values pick an existing key, so that searches and deletions hit often.
        fn get_value(v: &[i64], i: ItemValue) -> i64 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as i64
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::Search(item) => FinalOp::Search(get_value(sorted, item)),
            Op::Delete(item) => FinalOp::Delete(get_value(sorted, item)),
            Op::RankOf(item) => FinalOp::RankOf(get_value(sorted, item)),
            // Allows one past either end so that out-of-range selections are exercised.
            Op::Select(index) => FinalOp::Select(index % (sorted.len() + 2)),
            Op::Min => FinalOp::Min,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Max => FinalOp::Max,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(i64),
    Search(i64),
    Delete(i64),
    RankOf(i64),
    Select(usize),
    Min,
    PopFirst,
    Max,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        3 => value_strategy().prop_map(Op::Insert),
        1 => value_strategy().prop_map(Op::Search),
        2 => value_strategy().prop_map(Op::Delete),
        1 => value_strategy().prop_map(Op::RankOf),
        1 => (0usize..1000).prop_map(Op::Select),
        1 => Just(Op::Min),
        1 => Just(Op::PopFirst),
        1 => Just(Op::Max),
        1 => Just(Op::PopLast),
    ]
}

// Values are derived from keys so that a mismatched node is caught by value comparisons too.
fn value_of(key: i64) -> u64 {
    key.unsigned_abs().wrapping_mul(3) ^ u64::from(key < 0)
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut sorted_keys = Vec::with_capacity(ops.len());
    let mut btree = BTreeMap::new();
    let mut wavl: WavlMap<i64, u64> = WavlMap::new();

    fn insert_sorted(v: &mut Vec<i64>, key: i64) {
        if let Err(idx) = v.binary_search(&key) {
            v.insert(idx, key);
        }
    }

    fn remove_sorted(v: &mut Vec<i64>, key: i64) {
        if let Ok(idx) = v.binary_search(&key) {
            v.remove(idx);
        }
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_keys);

        match final_op {
            FinalOp::Insert(key) => {
                let from_btree = if btree.contains_key(&key) {
                    Err(Error::DuplicateKey)
                } else {
                    btree.insert(key, value_of(key));
                    Ok(())
                };
                insert_sorted(&mut sorted_keys, key);

                let from_wavl = wavl.insert(key, value_of(key)).map(|_| ());

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Search(key) => {
                let from_btree = btree.get(&key);
                let from_wavl = wavl.search(&key);

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Delete(key) => {
                let from_btree = btree.remove(&key).map(|_| ()).ok_or(Error::KeyNotFound);
                remove_sorted(&mut sorted_keys, key);

                let from_wavl = wavl.delete(&key).map(|_| ());

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::RankOf(key) => {
                let from_sorted = sorted_keys.binary_search(&key).ok().map(|idx| idx + 1);
                let from_wavl = wavl.rank_of(&key);

                assert_eq!(from_sorted, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Select(index) => {
                let from_sorted = index
                    .checked_sub(1)
                    .and_then(|idx| sorted_keys.get(idx))
                    .map(|&key| (key, value_of(key)))
                    .ok_or(Error::IndexOutOfRange {
                        index,
                        len: sorted_keys.len(),
                    });
                let from_wavl = wavl
                    .select_key_value(index)
                    .map(|(&key, &value)| (key, value));

                assert_eq!(from_sorted, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Min => {
                let from_btree = btree.first_key_value().map(|(_, value)| value);
                let from_wavl = wavl.min();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                if from_btree.is_some() {
                    sorted_keys.remove(0);
                }
                let from_wavl = wavl.pop_first();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Max => {
                let from_btree = btree.last_key_value().map(|(_, value)| value);
                let from_wavl = wavl.max();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                sorted_keys.pop();
                let from_wavl = wavl.pop_last();

                assert_eq!(from_btree, from_wavl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        wavl.assert_invariants();
        assert_eq!(btree.len(), wavl.len());
        assert_eq!(btree.is_empty(), wavl.is_empty());
        assert!(btree.keys().copied().eq(wavl.keys_in_order()));
    }
}
