use core::iter::FusedIterator;

use crate::{Link, Links, TreeNode, WavlTree};

/// An in-order iterator over the elements of a [`WavlTree`].
///
/// Each step follows child and parent links, so a full traversal visits every edge twice and
/// completes in _O(n)_ time.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree WavlTree<T>,

    front: Link<T>,
    back: Link<T>,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree WavlTree<T>) -> Self {
        Iter {
            tree,

            front: tree.first_raw(),
            back: tree.last_raw(),
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        // `front` and `back` cross once every element has been yielded, so `len` decides when to
        // stop rather than either pointer.
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.front = unsafe { self.tree.successor_raw(cur) };
        self.len -= 1;

        Some(unsafe { cur.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.back = unsafe { self.tree.predecessor_raw(cur) };
        self.len -= 1;

        Some(unsafe { cur.as_ref() })
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'tree, T> {}
