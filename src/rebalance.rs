//! Rebalancing decisions as pure functions of local rank shapes.
//!
//! The tree engine reads the ranks around the node under examination, asks one of these functions
//! which case applies, and then performs that case's rotations and rank changes. Missing children
//! are passed as [`EXTERNAL_RANK`](crate::EXTERNAL_RANK).

use crate::Dir;

/// A step of the bottom-up walk following an insertion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum InsertCase {
    /// The rank rule holds at the parent. The walk stops.
    Balanced,
    /// The parent is 0,1. Promote it and continue from the parent.
    Promote,
    /// The parent is 0,2 and the inner child of `x` is a 2-child. Rotate `x` up and demote the
    /// old parent. The walk stops.
    Rotate,
    /// The parent is 0,2 and the inner child of `x` is a 1-child. Rotate the inner child up twice,
    /// promote it and demote both `x` and the old parent. The walk stops.
    RotateTwice,
}

impl InsertCase {
    /// Returns the number of rebalancing operations this case counts as.
    pub(crate) fn ops(self) -> usize {
        match self {
            InsertCase::Balanced => 0,
            InsertCase::Promote | InsertCase::Rotate => 1,
            InsertCase::RotateTwice => 2,
        }
    }
}

/// Decides the insertion step for `x`, whose rank may equal its parent's.
///
/// `sibling` is the rank of the parent's other child and `inner` the rank of `x`'s child on the
/// side facing that sibling.
pub(crate) fn insert_case(x: i8, parent: i8, sibling: i8, inner: i8) -> InsertCase {
    if parent != x {
        InsertCase::Balanced
    } else if parent - sibling == 1 {
        InsertCase::Promote
    } else if x - inner == 2 {
        debug_assert_eq!(parent - sibling, 2);
        InsertCase::Rotate
    } else {
        debug_assert_eq!(parent - sibling, 2);
        debug_assert_eq!(x - inner, 1);
        InsertCase::RotateTwice
    }
}

/// The shape of a node on the walk following a deletion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum RemovalShape {
    /// Both rank differences are 1 or 2 and the node is not a 2,2 leaf. The walk stops.
    Balanced,
    /// The node is a leaf of rank 1. Demote it and continue from its parent.
    TwoTwoLeaf,
    /// The child in the given direction is a 3-child.
    ThreeChild(Dir),
}

impl RemovalShape {
    /// Returns the number of rebalancing operations this shape costs by itself.
    pub(crate) fn ops(self) -> usize {
        match self {
            RemovalShape::TwoTwoLeaf => 1,
            RemovalShape::Balanced | RemovalShape::ThreeChild(_) => 0,
        }
    }
}

/// Classifies a node of rank `rank` with children of ranks `left` and `right`.
pub(crate) fn removal_shape(rank: i8, left: i8, right: i8) -> RemovalShape {
    let (left_diff, right_diff) = (rank - left, rank - right);

    debug_assert!((1..=3).contains(&left_diff), "left rank difference {left_diff}");
    debug_assert!((1..=3).contains(&right_diff), "right rank difference {right_diff}");

    if left_diff == 3 {
        RemovalShape::ThreeChild(Dir::Left)
    } else if right_diff == 3 {
        RemovalShape::ThreeChild(Dir::Right)
    } else if left == crate::EXTERNAL_RANK && right == crate::EXTERNAL_RANK && rank == 1 {
        RemovalShape::TwoTwoLeaf
    } else {
        RemovalShape::Balanced
    }
}

/// A step of the bottom-up walk following a deletion, at a node `z` with a 3-child `x`.
///
/// `y` is the sibling of `x`; its near child faces `x` and its far child faces away.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum DeleteCase {
    /// `z` is 3,2. Demote `z` and continue from its parent.
    Demote,
    /// `z` is 3,1 and `y` is 2,2. Demote both and continue from the parent of `z`.
    DoubleDemote,
    /// `z` is 3,1 and `y`'s far child is a 1-child. Rotate `y` up, promote it and demote `z`,
    /// once more if `z` is left as a leaf. The walk stops.
    Rotate { leaf: bool },
    /// `z` is 3,1, `y`'s far child is a 2-child and its near child `v` a 1-child. Rotate `v` up
    /// twice, promote it twice, demote `y` once and `z` twice. The walk stops.
    RotateTwice,
}

impl DeleteCase {
    /// Returns the number of rebalancing operations this case counts as.
    pub(crate) fn ops(self) -> usize {
        match self {
            DeleteCase::Demote | DeleteCase::Rotate { leaf: false } => 1,
            DeleteCase::DoubleDemote | DeleteCase::Rotate { leaf: true } | DeleteCase::RotateTwice => 2,
        }
    }
}

/// Decides the deletion step at `z`, whose child of rank `x` is a 3-child.
pub(crate) fn delete_case(z: i8, x: i8, y: i8, y_near: i8, y_far: i8) -> DeleteCase {
    debug_assert_eq!(z - x, 3);

    if z - y == 2 {
        DeleteCase::Demote
    } else if y - y_near == 2 && y - y_far == 2 {
        DeleteCase::DoubleDemote
    } else if y - y_far == 1 {
        // After the rotation `z` keeps `x` and adopts `y_near`. If both are missing, `z` is a
        // leaf and must end at rank 0.
        DeleteCase::Rotate {
            leaf: x == crate::EXTERNAL_RANK && y_near == crate::EXTERNAL_RANK,
        }
    } else {
        debug_assert_eq!(y - y_near, 1);
        DeleteCase::RotateTwice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EXTERNAL_RANK as EXT;

    #[test]
    fn insert_balanced_when_ranks_differ() {
        assert_eq!(insert_case(0, 1, 0, EXT), InsertCase::Balanced);
        assert_eq!(insert_case(1, 3, 2, 0), InsertCase::Balanced);
    }

    #[test]
    fn insert_promotes_0_1_parent() {
        // A leaf inserted below a leaf.
        assert_eq!(insert_case(0, 0, EXT, EXT), InsertCase::Promote);
        assert_eq!(insert_case(2, 2, 1, 0), InsertCase::Promote);
    }

    #[test]
    fn insert_rotates_0_2_parent() {
        // Outer child promoted, inner child missing.
        assert_eq!(insert_case(1, 1, EXT, EXT), InsertCase::Rotate);
        assert_eq!(insert_case(3, 3, 1, 1), InsertCase::Rotate);
    }

    #[test]
    fn insert_rotates_twice_for_inner_1_child() {
        assert_eq!(insert_case(1, 1, EXT, 0), InsertCase::RotateTwice);
        assert_eq!(insert_case(3, 3, 1, 2), InsertCase::RotateTwice);
    }

    #[test]
    fn insert_case_costs() {
        assert_eq!(InsertCase::Balanced.ops(), 0);
        assert_eq!(InsertCase::Promote.ops(), 1);
        assert_eq!(InsertCase::Rotate.ops(), 1);
        assert_eq!(InsertCase::RotateTwice.ops(), 2);
    }

    #[test]
    fn removal_shapes() {
        assert_eq!(removal_shape(0, EXT, EXT), RemovalShape::Balanced);
        assert_eq!(removal_shape(1, EXT, EXT), RemovalShape::TwoTwoLeaf);
        assert_eq!(removal_shape(1, 0, EXT), RemovalShape::Balanced);
        assert_eq!(removal_shape(2, 0, 0), RemovalShape::Balanced);
        assert_eq!(removal_shape(2, EXT, 1), RemovalShape::ThreeChild(Dir::Left));
        assert_eq!(removal_shape(3, 1, 0), RemovalShape::ThreeChild(Dir::Right));
    }

    #[test]
    fn delete_demotes_3_2() {
        assert_eq!(delete_case(3, 0, 1, 0, 0), DeleteCase::Demote);
    }

    #[test]
    fn delete_double_demotes_2_2_sibling() {
        assert_eq!(delete_case(3, 0, 2, 0, 0), DeleteCase::DoubleDemote);
        assert_eq!(DeleteCase::DoubleDemote.ops(), 2);
    }

    #[test]
    fn delete_rotates_for_far_1_child() {
        assert_eq!(
            delete_case(3, 0, 2, 1, 1),
            DeleteCase::Rotate { leaf: false }
        );
        assert_eq!(
            delete_case(3, 0, 2, 0, 1),
            DeleteCase::Rotate { leaf: false }
        );

        // `z` of rank 2 with a missing child, and `y` unary toward the far side.
        let case = delete_case(2, EXT, 1, EXT, 0);
        assert_eq!(case, DeleteCase::Rotate { leaf: true });
        assert_eq!(case.ops(), 2);
    }

    #[test]
    fn delete_rotates_twice_for_far_2_child() {
        assert_eq!(delete_case(3, 0, 2, 1, 0), DeleteCase::RotateTwice);
        assert_eq!(delete_case(2, EXT, 1, 0, EXT), DeleteCase::RotateTwice);
        assert_eq!(DeleteCase::RotateTwice.ops(), 2);
    }
}
