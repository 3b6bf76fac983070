use core::{borrow::Borrow, pin::Pin, ptr::NonNull};

use crate::{Dir, Links, TreeNode, WavlTree};

/// A view into a single entry in a [`WavlTree`], which may be either vacant or occupied.
pub enum Entry<'tree, 'key, T, Q>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
{
    Vacant(VacantEntry<'tree, 'key, T, Q>),
    Occupied(OccupiedEntry<'tree, T>),
}

impl<'tree, 'key, T, Q> Entry<'tree, 'key, T, Q>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
{
    pub(crate) unsafe fn vacant_root(tree: &'tree mut WavlTree<T>, key: &'key Q) -> Self {
        Entry::Vacant(VacantEntry {
            tree,
            key,
            insert_as: InsertAs::Root,
        })
    }

    pub(crate) unsafe fn vacant_child(
        tree: &'tree mut WavlTree<T>,
        key: &'key Q,
        parent: NonNull<T>,
        dir: Dir,
    ) -> Self {
        Entry::Vacant(VacantEntry {
            tree,
            key,
            insert_as: InsertAs::Child { parent, dir },
        })
    }

    pub(crate) unsafe fn occupied(tree: &'tree mut WavlTree<T>, node: NonNull<T>) -> Self {
        Entry::Occupied(OccupiedEntry { tree, node })
    }

    /// Returns `true` if the tree already holds an item at this entry's key.
    pub fn is_occupied(&self) -> bool {
        matches!(self, Entry::Occupied(_))
    }
}

/// Where a new node attaches: as the root of an empty tree, or as the `dir` child of `parent`.
pub(crate) enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

pub struct VacantEntry<'tree, 'key, T, Q>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
{
    pub(crate) tree: &'tree mut WavlTree<T>,
    pub(crate) key: &'key Q,
    pub(crate) insert_as: InsertAs<T>,
}

impl<'tree, 'key, T, Q> VacantEntry<'tree, 'key, T, Q>
where
    T: TreeNode<Links<T>> + ?Sized,
    T::Key: Borrow<Q> + Ord,
    Q: Ord + ?Sized,
{
    /// Returns the key this entry was looked up with.
    pub fn key(&self) -> &'key Q {
        self.key
    }

    /// Returns the existing item that would become the parent of an item inserted here, or `None`
    /// if the tree is empty.
    pub fn parent(&self) -> Option<&T> {
        match self.insert_as {
            InsertAs::Root => None,
            InsertAs::Child { parent, .. } => Some(unsafe { parent.as_ref() }),
        }
    }

    /// Inserts `item` at the key associated with this entry.
    ///
    /// Returns the inserted item and the number of rebalancing operations performed.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the key returned by `item.key()` is equal to the key used to
    /// retrieve this entry.
    pub unsafe fn insert(self, item: T::Handle) -> (Pin<&'tree mut T>, usize) {
        let mut ptr = T::into_ptr(item);

        let ops = unsafe { self.tree.insert_at(self.insert_as, ptr) };

        (unsafe { Pin::new_unchecked(ptr.as_mut()) }, ops)
    }

    // Gives up the borrows of the tree and the key, keeping only the attachment point.
    pub(crate) fn into_slot(self) -> InsertAs<T> {
        self.insert_as
    }
}

pub struct OccupiedEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    pub(crate) tree: &'tree mut WavlTree<T>,
    pub(crate) node: NonNull<T>,
}

impl<'tree, T> OccupiedEntry<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a reference to the item in the entry.
    pub fn get(&self) -> &T {
        // SAFETY: `self.tree` is mutably borrowed for `'tree`
        unsafe { self.node.as_ref() }
    }

    /// Returns a pinned mutable reference to the item in the entry.
    ///
    /// # Safety
    ///
    /// The caller must ensure that neither the links nor the key of the mutably borrowed item are
    /// modified, as doing so may result in undefined behavior.
    pub unsafe fn get_mut(&mut self) -> Pin<&mut T> {
        // SAFETY: `self.tree` is mutably borrowed for `'tree`, and `self.node` is guaranteed pinned
        // by contract with `Linked`.
        unsafe { Pin::new_unchecked(self.node.as_mut()) }
    }

    /// Removes and returns the item pointed to by this entry, along with the number of rebalancing
    /// operations performed.
    pub fn remove(self) -> (T::Handle, usize) {
        unsafe { self.tree.remove_at(self.node) }
    }
}
