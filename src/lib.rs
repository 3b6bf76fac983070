//! An intrusive weak AVL tree, or WAVL tree, augmented with subtree sizes.
//!
//! The owning, map-like front end is [`WavlMap`]; [`WavlTree`] is the intrusive engine it is built
//! on. Both report how many rebalancing operations (promotions, demotions and rotations) each
//! insertion or deletion needed.

// Conventions used in comments are from Hauepler, Sen and Tarjan:
// - The rank of a node `x` is denoted `r(x)`.
// - The parent of a node `x` is denoted `p(x)`.
// - The rank difference of a node `x` is given by `r(p(x)) - r(x)`.
// - A node `x` is an `i`-child if its rank difference is `i`.
// - A node is `i,j` if one of its children is an `i`-child and the other is a `j`-child.
// - A missing child is an external leaf with rank -1 and size 0.
//
// The fundamental invariants of a WAVL tree are:
// 1. All rank differences are either 1 or 2.
// 2. All leaves have rank 0.
//
// Corollaries:
// 3. All ancestors of a leaf have rank at least one.
//
//    Proof:
//    a. The parent of a leaf has rank 1 or 2 (by (1) and (2)).
//    b. All ancestors of a node have a rank greater than it (by (1)).
//    QED by (a) and (b)
//
// 4. All unary nodes are 1,2 with rank 1.
//
//    Proof:
//    a. A unary node `n` has one missing child with rank -1, so `r(n) ∈ {0, 1}` (by (1)).
//    b. `n` is not a leaf, so `r(n) = 1` (by (3)).
//    c. `n`'s one child `c` has `r(c) ≥ 0`, so `r(c) = 0` and `c` is a 1-child.
//    QED by (a), (b) and (c)
//
// On top of the ranks every node stores the number of nodes in its subtree, which makes `select`
// and `rank_of` logarithmic.

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not, pin::Pin,
    ptr::NonNull,
};
use std::borrow::Borrow;

use cordyceps::Linked;
use tracing::trace;

mod entry;
mod error;
mod iter;
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
mod rebalance;


pub use entry::{Entry, OccupiedEntry, VacantEntry};
pub use error::{Error, Result};
pub use iter::Iter;
pub use map::WavlMap;

use entry::InsertAs;
use rebalance::{DeleteCase, InsertCase, RemovalShape};

/// The rank of a missing child.
pub const EXTERNAL_RANK: i8 = -1;

/// The subtree size of a missing child.
pub const EXTERNAL_SIZE: usize = 0;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive weak AVL tree, or WAVL tree.
///
/// Implementation based on the paper [Rank-Balanced Trees] by Hauepler, Sen and Tarjan.
///
/// [Rank-Balanced Trees]: http://arks.princeton.edu/ark:/88435/pr1nz5z
pub struct WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    rank: i8,
    size: usize,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> WavlTree<T> {
        WavlTree { root: None }
    }

    /// Returns `true` if the tree contains no elements.
    pub fn is_empty(&self) -> bool {
        let empty = self.root.is_none();

        debug_assert_eq!(empty, self.len() == 0);

        empty
    }

    /// Returns the number of elements in the tree.
    ///
    /// This is the subtree size of the root, so it completes in _O(1)_ time.
    pub fn len(&self) -> usize {
        unsafe { self.size(self.root) }
    }

    /// Returns the rank of the root, or `None` if the tree is empty.
    pub fn root_rank(&self) -> Option<i8> {
        self.root.map(|root| unsafe { self.links(root).rank() })
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            return;
        };

        unsafe {
            assert_eq!(self.links(root).parent(), None, "root has a parent");

            let height = self.assert_invariants_at(root);

            // The rank rule bounds the height by twice the logarithm of the size.
            let bound = 2.0 * ((self.len() + 1) as f64).log2();
            assert!(
                height as f64 <= bound,
                "height {height} exceeds {bound} for {} nodes",
                self.len()
            );
        }

        let mut iter = self.iter();
        if let Some(mut prev) = iter.next() {
            for cur in iter {
                assert!(prev.key() < cur.key(), "keys out of order");
                prev = cur;
            }
        }
    }

    // Checks the subtree rooted at `node` and returns its height in nodes.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) -> usize {
        unsafe {
            let rank = self.links(node).rank();

            // Ensure all leaves have rank 0.
            if self.links(node).is_leaf() {
                assert_eq!(rank, 0);
            }

            let mut size = 1;
            let mut height = 0;

            for dir in [Dir::Left, Dir::Right] {
                let child = self.links(node).child(dir);

                // Ensure all rank differences are 1 or 2, counting missing children.
                let rank_diff = rank - self.rank(child);
                assert!(
                    [1, 2].contains(&rank_diff),
                    "rank difference {rank_diff} below {:?}",
                    node.as_ref().key()
                );

                if let Some(child) = child {
                    // Ensure child's parent link points to this node.
                    let parent = self
                        .links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    let ordering = child.as_ref().key().cmp(node.as_ref().key());
                    let expected = match dir {
                        Dir::Left => Ordering::Less,
                        Dir::Right => Ordering::Greater,
                    };
                    assert_eq!(ordering, expected, "child on the wrong side");

                    height = height.max(self.assert_invariants_at(child));
                    size += self.links(child).size();
                }
            }

            assert_eq!(self.links(node).size(), size, "stale subtree size");

            height + 1
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// # Safety
    ///
    /// The caller must not modify the links or the key of the returned node.
    pub unsafe fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns `true` if the tree contains a node corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = self.links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = self.links(cur).right(),
                }
            }
        }
    }

    /// Returns the entry for `key`.
    ///
    /// A vacant entry records the node that would become the parent of a node inserted at `key`,
    /// so inserting through it does not search the tree a second time.
    pub fn entry<'tree, 'key, Q>(&'tree mut self, key: &'key Q) -> Entry<'tree, 'key, T, Q>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return unsafe { Entry::vacant_root(self, key) };
        };

        loop {
            let dir = match key.cmp(unsafe { cur.as_ref().key().borrow() }) {
                Ordering::Less => Dir::Left,
                Ordering::Equal => return unsafe { Entry::occupied(self, cur) },
                Ordering::Greater => Dir::Right,
            };

            match unsafe { self.links(cur).child(dir) } {
                Some(child) => cur = child,
                None => return unsafe { Entry::vacant_child(self, key, cur, dir) },
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let first = self.first_raw()?;
        unsafe { Some(Pin::new_unchecked(first.as_ref())) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let last = self.last_raw()?;
        unsafe { Some(Pin::new_unchecked(last.as_ref())) }
    }

    fn first_raw(&self) -> Link<T> {
        self.root.map(|root| unsafe { self.min_in_subtree(root).0 })
    }

    fn last_raw(&self) -> Link<T> {
        self.root.map(|root| unsafe { self.max_in_subtree(root) })
    }

    /// Returns the `index`-th smallest element of the tree, counting from 1.
    ///
    /// Returns `None` unless `1 <= index <= self.len()`. This operation completes in _O(log(n))_
    /// time.
    pub fn select(&self, index: usize) -> Option<Pin<&T>> {
        let node = self.select_raw(index)?;
        unsafe { Some(Pin::new_unchecked(node.as_ref())) }
    }

    fn select_raw(&self, index: usize) -> Link<T> {
        // A node's position within its own subtree is the size of its left subtree plus one.
        let mut remaining = index;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                let left = self.links(cur).left();
                let here = self.size(left) + 1;

                match remaining.cmp(&here) {
                    Ordering::Less => opt_cur = left,
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => {
                        remaining -= here;
                        opt_cur = self.links(cur).right();
                    }
                }
            }
        }

        None
    }

    /// Returns the position of `key` in the tree, counting from 1, so that
    /// `select(rank_of(key))` is the element at `key`.
    pub fn rank_of<Q>(&self, key: &Q) -> Option<usize>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut preceding = 0;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                let left = self.links(cur).left();

                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = left,
                    Ordering::Equal => return Some(preceding + self.size(left) + 1),
                    Ordering::Greater => {
                        preceding += self.size(left) + 1;
                        opt_cur = self.links(cur).right();
                    }
                }
            }
        }

        None
    }

    /// Returns an iterator over the elements of the tree in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    #[doc(hidden)]
    pub fn shape(&self) -> Vec<(&T, i8, usize)> {
        let mut shape = Vec::with_capacity(self.len());
        let mut opt_cur = self.first_raw();

        while let Some(cur) = opt_cur {
            unsafe {
                let links = self.links(cur);
                shape.push((cur.as_ref(), links.rank(), links.size()));
                opt_cur = self.successor_raw(cur);
            }
        }

        shape
    }

    // Returns the node with the least key greater than `node`'s key.
    unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe {
            if let Some(right) = self.links(node).right() {
                return Some(self.min_in_subtree(right).0);
            }

            // Climb until arriving from a left child. Arriving at the root from the right means
            // `node` was the maximum.
            let mut cur = node;
            loop {
                let parent = self.links(cur).parent()?;

                if self.which_child(parent, cur) == Dir::Left {
                    return Some(parent);
                }

                cur = parent;
            }
        }
    }

    // Returns the node with the greatest key less than `node`'s key.
    unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe {
            if let Some(left) = self.links(node).left() {
                return Some(self.max_in_subtree(left));
            }

            let mut cur = node;
            loop {
                let parent = self.links(cur).parent()?;

                if self.which_child(parent, cur) == Dir::Right {
                    return Some(parent);
                }

                cur = parent;
            }
        }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Option<NonNull<T>>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert_eq!(
                self.links(parent).child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );
            debug_assert!(
                new_child.is_none() || self.links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            self.links_mut(parent).set_child(dir, new_child);
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // Subtree sizes are updated; ranks are not.
    fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) {
        unsafe {
            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = if self.links(down).right() == Some(up) {
                Dir::Left
            } else {
                Dir::Right
            };

            debug_assert_ne!(self.root, Some(up), "cannot rotate the root upward");

            let across = self.links(up).child(dir);
            self.links_mut(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            self.links_mut(up).set_child(dir, Some(down));
            let parent = self.links_mut(down).set_parent(Some(up));
            self.links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            // `up` now holds exactly the nodes `down` used to, so sizes above it are unchanged.
            self.update_size(down);
            self.update_size(up);
        }
    }

    // Performs a double rotation at the non-root node `up`, moving it above both its parent
    // `down_first` and its grandparent `down_second`.
    //
    // Subtree sizes are updated; ranks are not.
    fn rotate_twice_at(&mut self, down_second: NonNull<T>, down_first: NonNull<T>, up: NonNull<T>) {
        unsafe {
            let dir = if self.links(down_first).right() == Some(up) {
                Dir::Right
            } else {
                Dir::Left
            };

            let across_first = self.links(up).child(!dir);
            let across_second = self.links(up).child(dir);

            self.maybe_set_parent(across_first, Some(down_first));

            self.links_mut(down_first).set_child(dir, across_first);
            self.links_mut(down_first).set_parent(Some(up));

            self.maybe_set_parent(across_second, Some(down_second));

            self.links_mut(down_second).set_child(!dir, across_second);
            let parent = self.links_mut(down_second).set_parent(Some(up));

            self.links_mut(up).set_parent(parent);
            self.links_mut(up).set_child(!dir, Some(down_first));
            self.links_mut(up).set_child(dir, Some(down_second));

            self.replace_child_or_set_root(parent, down_second, Some(up));

            self.update_size(down_first);
            self.update_size(down_second);
            self.update_size(up);
        }
    }

    /// Inserts an item into the tree.
    ///
    /// Returns the number of rebalancing operations performed, or gives `item` back untouched if
    /// the tree already contains its key.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> core::result::Result<usize, T::Handle> {
        let ptr = T::into_ptr(item);

        // SAFETY: `ptr` is not linked into the tree, so nothing below moves or frees it.
        let key = unsafe { ptr.as_ref().key() };

        let slot = match self.entry(key) {
            Entry::Occupied(_) => return Err(unsafe { T::from_ptr(ptr) }),
            Entry::Vacant(vacant) => vacant.into_slot(),
        };

        Ok(unsafe { self.insert_at(slot, ptr) })
    }

    // Links `ptr` into the position described by `slot` and rebalances.
    //
    // # Safety
    //
    // `slot` must have been produced by `entry` for `ptr`'s key, and the tree must not have been
    // modified since.
    pub(crate) unsafe fn insert_at(&mut self, slot: InsertAs<T>, ptr: NonNull<T>) -> usize {
        unsafe { self.links_mut(ptr).reset() };

        let InsertAs::Child { parent, dir } = slot else {
            // Tree is empty. Set `ptr` as the root and return.
            debug_assert!(self.root.is_none());
            self.root = Some(ptr);
            return 0;
        };

        unsafe {
            debug_assert_eq!(self.links(parent).child(dir), None);

            self.links_mut(parent).set_child(dir, Some(ptr));
            self.links_mut(ptr).set_parent(Some(parent));
        }

        // Every subtree on the path to the root gained one node.
        let mut opt_cur = Some(parent);
        while let Some(cur) = opt_cur {
            unsafe {
                let links = self.links_mut(cur);
                links.set_size(links.size() + 1);
                opt_cur = links.parent();
            }
        }

        self.rebalance_inserted(ptr)
    }

    // Performs a bottom-up rebalance of the tree after the insertion of the leaf `node`, returning
    // the number of rebalancing operations.
    //
    // Invariants:
    // - `node` has no children and is thus rank 0 and 1,1.
    // - The only possible violation is a 0-child, which starts out as `node` and moves up with
    //   each promotion.
    fn rebalance_inserted(&mut self, node: NonNull<T>) -> usize {
        debug_assert_eq!(unsafe { self.links(node).rank() }, 0);

        let mut ops = 0;
        let mut x = node;

        unsafe {
            while let Some(parent) = self.links(x).parent() {
                let dir = self.which_child(parent, x);
                let inner = self.links(x).child(!dir);

                let x_rank = self.links(x).rank();
                let parent_rank = self.links(parent).rank();
                let sibling_rank = self.rank(self.links(parent).child(!dir));
                let inner_rank = self.rank(inner);

                let case = rebalance::insert_case(x_rank, parent_rank, sibling_rank, inner_rank);
                trace!(?case, x_rank, parent_rank, sibling_rank, inner_rank, "insert step");
                ops += case.ops();

                match case {
                    InsertCase::Balanced => break,

                    // The parent is 0,1: promote it and continue one level up.
                    InsertCase::Promote => {
                        self.promote(parent);
                        x = parent;
                    }

                    // The parent is 0,2 and `x`'s inner child is a 2-child (or missing).
                    InsertCase::Rotate => {
                        self.rotate_at(parent, x);
                        self.demote(parent);
                        break;
                    }

                    // The parent is 0,2 and `x`'s inner child is a 1-child.
                    InsertCase::RotateTwice => {
                        let y = inner.expect("inner 1-child must exist");
                        self.rotate_twice_at(parent, x, y);
                        self.promote(y);
                        self.demote(x);
                        self.demote(parent);
                        break;
                    }
                }
            }
        }

        ops
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { self.links(cur).left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    #[inline]
    unsafe fn max_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(right) = unsafe { self.links(cur).right() } {
            cur = right;
        }

        cur
    }

    /// Removes the node corresponding to `key` from the tree.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.remove_counted(key).map(|(node, _)| node)
    }

    /// Removes the node corresponding to `key` from the tree, also returning the number of
    /// rebalancing operations performed.
    pub fn remove_counted<Q>(&mut self, key: &Q) -> Option<(T::Handle, usize)>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first_raw()?;
        Some(unsafe { self.remove_at(first).0 })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last_raw()?;
        Some(unsafe { self.remove_at(last).0 })
    }

    /// Removes an arbitrary node from the tree, returning it along with the number of rebalancing
    /// operations performed.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> (T::Handle, usize) {
        // There are three possible cases:
        //
        // 1. `node` has two children.
        //
        //    In this case `node`'s successor[^1] is removed from its own position and assumes
        //    `node`'s place, rank and size. The successor's right child is elevated to replace it.
        //
        //    The successor by definition has no left child, so its own removal matches case 2 or 3.
        //
        // 2. `node` has one child.
        //
        //    The child is elevated into `node`'s place. If `node` was a 2-child, its child becomes
        //    a 3-child.
        //
        // 3. `node` is a leaf.
        //
        //    The slot becomes an external leaf. If `node` was a 2-child, the external leaf is a
        //    3-child; if `node`'s parent was unary, the parent becomes a 2,2 leaf.
        //
        // Thus, after removal and elevation, the only node that may violate the rank rule is the
        // parent of the vacated slot, and the deletion walk starts there.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            let parent = self.links(node).parent();
            let left = self.links(node).left();
            let right = self.links(node).right();

            let vacated_parent = match (left, right) {
                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = self.min_in_subtree(right);

                    if let Some(successor_parent) = successor_parent {
                        // Elevate the successor's right child to replace it.
                        let successor_right = self.links(successor).right();
                        self.replace_child(successor_parent, successor, successor_right);
                        self.maybe_set_parent(successor_right, Some(successor_parent));

                        self.links_mut(successor).set_right(Some(right));
                        self.links_mut(right).set_parent(Some(successor));
                    }
                    // Otherwise the successor is `right` and keeps its right child.

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    // Transfer the rank and size of `node` to `successor`.
                    let node_rank = self.links(node).rank();
                    let node_size = self.links(node).size();

                    let successor_links = self.links_mut(successor);
                    successor_links.set_parent(parent);
                    successor_links.set_rank(node_rank);
                    successor_links.set_size(node_size);
                    successor_links.set_left(Some(left));

                    self.links_mut(left).set_parent(Some(successor));

                    Some(successor_parent.unwrap_or(successor))
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    self.links_mut(child).set_parent(parent);
                    parent
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);
                    parent
                }
            };

            // Every subtree on the path from the vacated slot to the root lost one node.
            let mut opt_cur = vacated_parent;
            while let Some(cur) = opt_cur {
                let links = self.links_mut(cur);
                links.set_size(links.size() - 1);
                opt_cur = links.parent();
            }

            let ops = vacated_parent
                .map(|start| self.rebalance_removed(start))
                .unwrap_or(0);

            self.links_mut(node).reset();

            (T::from_ptr(node), ops)
        }
    }

    // Performs a bottom-up rebalance starting at `start`, the parent of the slot vacated by a
    // removal. Returns the number of rebalancing operations.
    //
    // At each step, the node under examination `z` is either valid (the walk stops), a 2,2 leaf,
    // or the parent of a 3-child. Demotions move the violation up one level; rotations end the
    // walk.
    unsafe fn rebalance_removed(&mut self, start: NonNull<T>) -> usize {
        let mut ops = 0;
        let mut opt_z = Some(start);

        unsafe {
            while let Some(z) = opt_z {
                let z_rank = self.links(z).rank();
                let left_rank = self.rank(self.links(z).left());
                let right_rank = self.rank(self.links(z).right());

                let shape = rebalance::removal_shape(z_rank, left_rank, right_rank);
                ops += shape.ops();

                let dir = match shape {
                    RemovalShape::Balanced => break,

                    RemovalShape::TwoTwoLeaf => {
                        trace!(z_rank, "demote 2,2 leaf");
                        self.demote(z);
                        opt_z = self.links(z).parent();
                        continue;
                    }

                    RemovalShape::ThreeChild(dir) => dir,
                };

                // Here we give up on descriptive names entirely and just use the names from the
                // paper: `x` is the 3-child, `y` its sibling.
                let x = self.links(z).child(dir);
                let y = self
                    .links(z)
                    .child(!dir)
                    .expect("sibling of a 3-child must exist");
                let y_near = self.links(y).child(dir);
                let y_far = self.links(y).child(!dir);

                let case = rebalance::delete_case(
                    z_rank,
                    self.rank(x),
                    self.links(y).rank(),
                    self.rank(y_near),
                    self.rank(y_far),
                );
                trace!(?case, z_rank, "delete step");
                ops += case.ops();

                match case {
                    DeleteCase::Demote => {
                        self.demote(z);
                        opt_z = self.links(z).parent();
                    }

                    DeleteCase::DoubleDemote => {
                        self.demote(y);
                        self.demote(z);
                        opt_z = self.links(z).parent();
                    }

                    DeleteCase::Rotate { leaf } => {
                        self.rotate_at(z, y);
                        self.promote(y);

                        if leaf {
                            debug_assert!(self.links(z).is_leaf());
                            self.demote_twice(z);
                        } else {
                            self.demote(z);
                        }

                        break;
                    }

                    DeleteCase::RotateTwice => {
                        let v = y_near.expect("inner 1-child must exist");
                        self.rotate_twice_at(z, y, v);
                        self.promote_twice(v);
                        self.demote(y);
                        self.demote_twice(z);
                        break;
                    }
                }
            }
        }

        ops
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| self.links(cur).parent());

                let right = self.links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                self.links_mut(cur).reset();
                drop(T::from_ptr(cur));

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    #[inline]
    unsafe fn update_size(&mut self, node: NonNull<T>) {
        unsafe {
            let size = self.size(self.links(node).left()) + self.size(self.links(node).right()) + 1;
            self.links_mut(node).set_size(size);
        }
    }

    #[inline]
    unsafe fn promote(&mut self, node: NonNull<T>) {
        unsafe { self.links_mut(node).shift_rank(1) };
    }

    #[inline]
    unsafe fn promote_twice(&mut self, node: NonNull<T>) {
        unsafe { self.links_mut(node).shift_rank(2) };
    }

    #[inline]
    unsafe fn demote(&mut self, node: NonNull<T>) {
        unsafe { self.links_mut(node).shift_rank(-1) };
    }

    #[inline]
    unsafe fn demote_twice(&mut self, node: NonNull<T>) {
        unsafe { self.links_mut(node).shift_rank(-2) };
    }

    /// Returns the rank of the pointed-to node.
    unsafe fn rank(&self, node: Link<T>) -> i8 {
        node.map(|n| unsafe { self.links(n).rank() })
            .unwrap_or(EXTERNAL_RANK)
    }

    /// Returns the subtree size of the pointed-to node.
    unsafe fn size(&self, node: Link<T>) -> usize {
        node.map(|n| unsafe { self.links(n).size() })
            .unwrap_or(EXTERNAL_SIZE)
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { self.links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for WavlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                rank: 0,
                size: 1,
                _unpin: PhantomPinned,
            }),
        }
    }

    // Returns the links to the state of a detached leaf.
    #[inline]
    fn reset(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.rank = 0;
        inner.size = 1;
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    fn rank(&self) -> i8 {
        unsafe { (*self.inner.get()).rank }
    }

    #[inline]
    fn size(&self) -> usize {
        unsafe { (*self.inner.get()).size }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_rank(&mut self, rank: i8) {
        self.inner.get_mut().rank = rank;
    }

    #[inline]
    fn shift_rank(&mut self, delta: i8) {
        let inner = self.inner.get_mut();
        inner.rank = inner.rank.checked_add(delta).expect("rank overflow");
        debug_assert!(inner.rank >= 0, "rank of a node dropped below zero");
    }

    #[inline]
    fn set_size(&mut self, size: usize) {
        self.inner.get_mut().size = size;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}
