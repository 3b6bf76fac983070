extern crate alloc;

use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;
use tracing::debug;

use crate::{Entry, Error, Links, Result, TreeNode, WavlTree};

/// An ordered map based on a [WAVL tree], with order statistics.
///
/// Insertions and deletions report how many rebalancing operations they performed. Positions used
/// by [`select`](WavlMap::select) and [`rank_of`](WavlMap::rank_of) count from 1.
///
/// ```
/// use wavl_rank::WavlMap;
///
/// let mut map = WavlMap::new();
/// for key in [10, 20, 5, 6] {
///     map.insert(key, key * 100).unwrap();
/// }
///
/// assert_eq!(map.keys_in_order(), [5, 6, 10, 20]);
/// assert_eq!(map.select(2), Ok(&600));
/// assert_eq!(map.rank_of(&20), Some(4));
/// ```
///
/// [WAVL tree]: https://en.wikipedia.org/wiki/WAVL_tree
pub struct WavlMap<K: Ord + fmt::Debug, V> {
    tree: WavlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord + fmt::Debug, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

// SAFETY: the map exclusively owns every node, and nodes are only reachable through it.
unsafe impl<K: Ord + fmt::Debug + Send, V: Send> Send for WavlMap<K, V> {}
unsafe impl<K: Ord + fmt::Debug + Sync, V: Sync> Sync for WavlMap<K, V> {}

impl<K: Ord + fmt::Debug, V> WavlMap<K, V> {
    /// Creates a new, empty `WavlMap`.
    pub const fn new() -> Self {
        Self {
            tree: WavlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the number of elements in the map.
    ///
    /// Same as [`len`](WavlMap::len).
    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns a reference to the value associated with `key`.
    ///
    /// Same as [`get`](WavlMap::get).
    #[inline]
    pub fn search<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get(key)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        // SAFETY: Pinning is not structural for `node.value`, and neither links nor key change.
        unsafe {
            self.tree
                .get_mut(key)
                .map(|node| &mut node.get_unchecked_mut().value)
        }
    }

    /// Inserts `value` at `key`, returning the number of rebalancing operations performed.
    ///
    /// If the map already contains `key`, returns [`Error::DuplicateKey`] without modifying the
    /// map.
    pub fn insert(&mut self, key: K, value: V) -> Result<usize> {
        // The position is found before anything is allocated, so a duplicate costs nothing.
        let slot = match self.tree.entry(&key) {
            Entry::Occupied(_) => {
                debug!(?key, "insert rejected: duplicate key");
                return Err(Error::DuplicateKey);
            }
            Entry::Vacant(vacant) => vacant.into_slot(),
        };

        let node = Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        });

        let ops = unsafe { self.tree.insert_at(slot, MapNode::into_ptr(node)) };
        debug!(ops, len = self.len(), "inserted");

        Ok(ops)
    }

    /// Removes `key` from the map, returning the number of rebalancing operations performed.
    ///
    /// If the map does not contain `key`, returns [`Error::KeyNotFound`] without modifying the
    /// map.
    pub fn delete<Q>(&mut self, key: &Q) -> Result<usize>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some((node, ops)) = self.tree.remove_counted(key) else {
            debug!("delete rejected: key not found");
            return Err(Error::KeyNotFound);
        };

        debug!(key = ?node.key, ops, len = self.len(), "deleted");

        Ok(ops)
    }

    /// Removes the value associated with `key` from the map.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|node| node.value)
    }

    /// Returns the value associated with the minimum key in the map.
    #[inline]
    pub fn min(&self) -> Option<&V> {
        self.first_key_value().map(|(_, value)| value)
    }

    /// Returns the value associated with the maximum key in the map.
    #[inline]
    pub fn max(&self) -> Option<&V> {
        self.last_key_value().map(|(_, value)| value)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(|node| {
            let MapNode { key, value, .. } = *node;
            (key, value)
        })
    }

    /// Returns the value associated with the `index`-th smallest key, counting from 1.
    ///
    /// `select(1)` is the value of the minimum key and `select(len)` that of the maximum. Any other
    /// index returns [`Error::IndexOutOfRange`].
    pub fn select(&self, index: usize) -> Result<&V> {
        self.select_key_value(index).map(|(_, value)| value)
    }

    /// Returns the key-value pair with the `index`-th smallest key, counting from 1.
    pub fn select_key_value(&self, index: usize) -> Result<(&K, &V)> {
        let node = self.tree.select(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let node = node.get_ref();
        Ok((&node.key, &node.value))
    }

    /// Returns the position of `key` among the map's keys, counting from 1.
    pub fn rank_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.tree.rank_of(key)
    }

    /// Returns the rank of the root node, or `None` if the map is empty.
    pub fn root_rank(&self) -> Option<i8> {
        self.tree.root_rank()
    }

    /// Returns an iterator over the key-value pairs of the map, in ascending key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns all keys in ascending order.
    pub fn keys_in_order(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Returns all values, ordered by their keys.
    pub fn values_in_order(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().map(|(_, value)| value.clone()).collect()
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }

    #[doc(hidden)]
    pub fn shape(&self) -> Vec<(K, i8, usize)>
    where
        K: Clone,
    {
        self.tree
            .shape()
            .into_iter()
            .map(|(node, rank, size)| (node.key.clone(), rank, size))
            .collect()
    }
}

impl<K: Ord + fmt::Debug, V> Default for WavlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for WavlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Keeps the first value seen for each key.
impl<K: Ord + fmt::Debug, V> Extend<(K, V)> for WavlMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            // Later duplicates are dropped, matching `insert`.
            let _ = self.insert(key, value);
        }
    }
}

impl<K: Ord + fmt::Debug, V> FromIterator<(K, V)> for WavlMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = WavlMap::new();
        map.extend(iter);
        map
    }
}
