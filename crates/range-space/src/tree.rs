// Copyright (c) 2025 Felix Kahle.
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the
// "Software"), to deal in the Software without restriction, including
// without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so, subject to
// the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE
// LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION
// WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Red-black tree of payload-bearing ranges, augmented with subtree hulls
//! and threaded as a doubly linked list in ascending order.
//!
//! Invariants (always held between public operations of the space):
//!    - tree order and list order agree: ascending `range.min`
//!    - stored ranges are non-empty and pairwise disjoint
//!    - every node's hull is the union of its range and its children's hulls
//!    - the usual red-black coloring rules
//!
//! The hull makes point search prunable: a subtree whose hull misses the
//! target cannot contain a covering range, so descent stops at the miss.
//! The list threading gives the mutation algorithms O(1) neighbors.

use crate::arena::{Arena, NodeId};
use range_space_core::metric::Metric;
use range_space_core::range::DiscreteRange;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Color {
    Red,
    Black,
}

/// Attachment side for positional insertion.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Dir {
    Left,
    Right,
}

/// One entry of a space: a range, its payload, and the subtree hull,
/// plus tree and list linkage.
#[derive(Debug)]
pub(crate) struct Node<M, P> {
    range: DiscreteRange<M>,
    hull: DiscreteRange<M>,
    payload: P,
    color: Color,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

impl<M: Metric, P> Node<M, P> {
    #[inline]
    pub(crate) fn range(&self) -> &DiscreteRange<M> {
        &self.range
    }

    #[inline]
    pub(crate) fn payload(&self) -> &P {
        &self.payload
    }
}

/// The augmented tree plus its in-order list threading and node storage.
#[derive(Debug)]
pub(crate) struct RangeTree<M, P> {
    arena: Arena<Node<M, P>>,
    root: Option<NodeId>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
}

impl<M, P> Default for RangeTree<M, P> {
    #[inline]
    fn default() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
            head: None,
            tail: None,
        }
    }
}

impl<M: Metric, P> RangeTree<M, P> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<NodeId> {
        self.head
    }

    #[inline]
    pub(crate) fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    #[inline]
    pub(crate) fn node(&self, n: NodeId) -> &Node<M, P> {
        self.arena.get(n)
    }

    #[inline]
    pub(crate) fn next(&self, n: NodeId) -> Option<NodeId> {
        self.arena.get(n).next
    }

    #[inline]
    pub(crate) fn prev(&self, n: NodeId) -> Option<NodeId> {
        self.arena.get(n).prev
    }

    #[inline]
    pub(crate) fn range(&self, n: NodeId) -> DiscreteRange<M> {
        self.arena.get(n).range
    }

    #[inline]
    pub(crate) fn payload(&self, n: NodeId) -> &P {
        &self.arena.get(n).payload
    }

    /// Allocates an unlinked node; one of the insertion entry points must
    /// place it before it becomes visible.
    pub(crate) fn make(&mut self, range: DiscreteRange<M>, payload: P) -> NodeId {
        self.arena.make(Node {
            range,
            hull: range,
            payload,
            color: Color::Red,
            parent: None,
            left: None,
            right: None,
            prev: None,
            next: None,
        })
    }

    pub(crate) fn set_payload(&mut self, n: NodeId, payload: P) {
        self.arena.get_mut(n).payload = payload;
    }

    /// Replaces the node's range and ripples hulls to the root.
    pub(crate) fn set_range(&mut self, n: NodeId, range: DiscreteRange<M>) {
        self.arena.get_mut(n).range = range;
        self.ripple_fixup(n);
    }

    /// Moves the node's lower bound and ripples hulls to the root.
    pub(crate) fn set_min(&mut self, n: NodeId, min: M) {
        self.arena.get_mut(n).range.set_min(min);
        self.ripple_fixup(n);
    }

    /// Moves the node's upper bound and ripples hulls to the root.
    pub(crate) fn set_max(&mut self, n: NodeId, max: M) {
        self.arena.get_mut(n).range.set_max(max);
        self.ripple_fixup(n);
    }

    /// Shrinks the node's range by one at the top and ripples hulls.
    pub(crate) fn dec_max(&mut self, n: NodeId) {
        self.arena.get_mut(n).range.clip_max();
        self.ripple_fixup(n);
    }

    /// Drops every node and releases all storage at once.
    pub(crate) fn clear(&mut self) {
        self.arena.clear();
        self.root = None;
        self.head = None;
        self.tail = None;
    }

    /// The rightmost node whose `min` is at or before `target`.
    pub(crate) fn lower_bound(&self, target: M) -> Option<NodeId> {
        let mut cursor = self.root;
        let mut best = None;
        while let Some(c) = cursor {
            let node = self.arena.get(c);
            if target < node.range.min() {
                cursor = node.left;
            } else {
                best = Some(c);
                if node.range.max() < target {
                    cursor = node.right;
                } else {
                    break;
                }
            }
        }
        best
    }

    /// The node covering `metric`, by hull-pruned descent.
    pub(crate) fn find(&self, metric: M) -> Option<NodeId> {
        let mut cursor = self.root;
        while let Some(c) = cursor {
            let node = self.arena.get(c);
            if metric < node.range.min() {
                if node.hull.contains(metric) {
                    cursor = node.left;
                } else {
                    // nothing in this subtree can cover the target
                    return None;
                }
            } else if node.range.max() < metric {
                if node.hull.contains(metric) {
                    cursor = node.right;
                } else {
                    return None;
                }
            } else {
                return Some(c);
            }
        }
        None
    }

    /// Inserts `n` as the new first node.
    pub(crate) fn prepend(&mut self, n: NodeId) {
        match self.head {
            // The first node has no left child, or it would not be first.
            Some(h) => self.attach(h, Dir::Left, n),
            None => self.set_root(n),
        }
        self.link_front(n);
    }

    /// Inserts `n` as the new last node.
    pub(crate) fn append(&mut self, n: NodeId) {
        match self.tail {
            Some(t) => self.attach(t, Dir::Right, n),
            None => self.set_root(n),
        }
        self.link_back(n);
    }

    /// Inserts `n` immediately before `spot` in range order.
    pub(crate) fn insert_before(&mut self, spot: NodeId, n: NodeId) {
        match self.arena.get(spot).left {
            None => self.attach(spot, Dir::Left, n),
            Some(_) => {
                // A left subtree implies a predecessor, and the predecessor
                // is its rightmost node, so it has no right child.
                let pred = self
                    .arena
                    .get(spot)
                    .prev
                    .expect("a left subtree implies a predecessor");
                self.attach(pred, Dir::Right, n);
            }
        }
        self.link_before(spot, n);
    }

    /// Inserts `n` immediately after `spot` in range order.
    pub(crate) fn insert_after(&mut self, spot: NodeId, n: NodeId) {
        match self.arena.get(spot).right {
            None => self.attach(spot, Dir::Right, n),
            Some(_) => {
                // A right subtree implies a successor with no left child.
                let succ = self
                    .arena
                    .get(spot)
                    .next
                    .expect("a right subtree implies a successor");
                self.attach(succ, Dir::Left, n);
            }
        }
        self.link_after(spot, n);
    }

    /// Removes `n` from the tree and the list and destroys it.
    pub(crate) fn remove(&mut self, n: NodeId) {
        self.detach(n);
        self.unlink(n);
        self.arena.destroy(n);
    }

    // --- list threading ---

    fn link_front(&mut self, n: NodeId) {
        match self.head {
            Some(h) => self.link_before(h, n),
            None => {
                self.head = Some(n);
                self.tail = Some(n);
            }
        }
    }

    fn link_back(&mut self, n: NodeId) {
        match self.tail {
            Some(t) => self.link_after(t, n),
            None => {
                self.head = Some(n);
                self.tail = Some(n);
            }
        }
    }

    fn link_before(&mut self, spot: NodeId, n: NodeId) {
        let before = self.arena.get(spot).prev;
        {
            let node = self.arena.get_mut(n);
            node.prev = before;
            node.next = Some(spot);
        }
        self.arena.get_mut(spot).prev = Some(n);
        match before {
            Some(b) => self.arena.get_mut(b).next = Some(n),
            None => self.head = Some(n),
        }
    }

    fn link_after(&mut self, spot: NodeId, n: NodeId) {
        let after = self.arena.get(spot).next;
        {
            let node = self.arena.get_mut(n);
            node.prev = Some(spot);
            node.next = after;
        }
        self.arena.get_mut(spot).next = Some(n);
        match after {
            Some(a) => self.arena.get_mut(a).prev = Some(n),
            None => self.tail = Some(n),
        }
    }

    fn unlink(&mut self, n: NodeId) {
        let (before, after) = {
            let node = self.arena.get(n);
            (node.prev, node.next)
        };
        match before {
            Some(b) => self.arena.get_mut(b).next = after,
            None => self.head = after,
        }
        match after {
            Some(a) => self.arena.get_mut(a).prev = before,
            None => self.tail = before,
        }
        let node = self.arena.get_mut(n);
        node.prev = None;
        node.next = None;
    }

    // --- hull maintenance ---

    fn structure_fixup(&mut self, n: NodeId) {
        let (range, left, right) = {
            let node = self.arena.get(n);
            (node.range, node.left, node.right)
        };
        let mut hull = range;
        if let Some(l) = left {
            let left_hull = self.arena.get(l).hull;
            hull.hull_with(&left_hull);
        }
        if let Some(r) = right {
            let right_hull = self.arena.get(r).hull;
            hull.hull_with(&right_hull);
        }
        self.arena.get_mut(n).hull = hull;
    }

    fn ripple_fixup(&mut self, n: NodeId) {
        let mut cursor = Some(n);
        while let Some(c) = cursor {
            self.structure_fixup(c);
            cursor = self.arena.get(c).parent;
        }
    }

    // --- red-black machinery ---

    fn set_root(&mut self, n: NodeId) {
        self.root = Some(n);
        let node = self.arena.get_mut(n);
        node.color = Color::Black;
        node.hull = node.range;
    }

    fn attach(&mut self, parent: NodeId, dir: Dir, n: NodeId) {
        {
            let slot = match dir {
                Dir::Left => &mut self.arena.get_mut(parent).left,
                Dir::Right => &mut self.arena.get_mut(parent).right,
            };
            debug_assert!(slot.is_none(), "attach over an occupied child slot");
            *slot = Some(n);
        }
        let node = self.arena.get_mut(n);
        node.parent = Some(parent);
        node.color = Color::Red;
        self.ripple_fixup(n);
        self.insert_fixup(n);
    }

    #[inline]
    fn is_red(&self, n: Option<NodeId>) -> bool {
        matches!(n, Some(id) if self.arena.get(id).color == Color::Red)
    }

    #[inline]
    fn is_black(&self, n: Option<NodeId>) -> bool {
        !self.is_red(n)
    }

    #[inline]
    fn set_color(&mut self, n: NodeId, color: Color) {
        self.arena.get_mut(n).color = color;
    }

    fn rotate_left(&mut self, x: NodeId) {
        let y = self
            .arena
            .get(x)
            .right
            .expect("rotate_left without a right child");
        let y_left = self.arena.get(y).left;
        self.arena.get_mut(x).right = y_left;
        if let Some(c) = y_left {
            self.arena.get_mut(c).parent = Some(x);
        }
        let x_parent = self.arena.get(x).parent;
        self.arena.get_mut(y).parent = x_parent;
        match x_parent {
            None => self.root = Some(y),
            Some(p) => {
                let parent = self.arena.get_mut(p);
                if parent.left == Some(x) {
                    parent.left = Some(y);
                } else {
                    parent.right = Some(y);
                }
            }
        }
        self.arena.get_mut(y).left = Some(x);
        self.arena.get_mut(x).parent = Some(y);
        self.structure_fixup(x);
        self.structure_fixup(y);
    }

    fn rotate_right(&mut self, x: NodeId) {
        let y = self
            .arena
            .get(x)
            .left
            .expect("rotate_right without a left child");
        let y_right = self.arena.get(y).right;
        self.arena.get_mut(x).left = y_right;
        if let Some(c) = y_right {
            self.arena.get_mut(c).parent = Some(x);
        }
        let x_parent = self.arena.get(x).parent;
        self.arena.get_mut(y).parent = x_parent;
        match x_parent {
            None => self.root = Some(y),
            Some(p) => {
                let parent = self.arena.get_mut(p);
                if parent.left == Some(x) {
                    parent.left = Some(y);
                } else {
                    parent.right = Some(y);
                }
            }
        }
        self.arena.get_mut(y).right = Some(x);
        self.arena.get_mut(x).parent = Some(y);
        self.structure_fixup(x);
        self.structure_fixup(y);
    }

    fn insert_fixup(&mut self, mut n: NodeId) {
        while let Some(p) = self.arena.get(n).parent {
            if self.arena.get(p).color == Color::Black {
                break;
            }
            // A red parent is never the root, so the grandparent exists.
            let g = self
                .arena
                .get(p)
                .parent
                .expect("red node without a parent");
            if self.arena.get(g).left == Some(p) {
                let uncle = self.arena.get(g).right;
                if self.is_red(uncle) {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle.expect("red uncle"), Color::Black);
                    self.set_color(g, Color::Red);
                    n = g;
                } else {
                    if self.arena.get(p).right == Some(n) {
                        n = p;
                        self.rotate_left(n);
                    }
                    let p = self.arena.get(n).parent.expect("rotated node lost its parent");
                    let g = self.arena.get(p).parent.expect("red node without a parent");
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.arena.get(g).left;
                if self.is_red(uncle) {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle.expect("red uncle"), Color::Black);
                    self.set_color(g, Color::Red);
                    n = g;
                } else {
                    if self.arena.get(p).left == Some(n) {
                        n = p;
                        self.rotate_right(n);
                    }
                    let p = self.arena.get(n).parent.expect("rotated node lost its parent");
                    let g = self.arena.get(p).parent.expect("red node without a parent");
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root.expect("insert fixup on an empty tree");
        self.set_color(root, Color::Black);
    }

    /// Replaces the subtree rooted at `u` with the subtree rooted at `v`.
    fn transplant(&mut self, u: NodeId, v: Option<NodeId>) {
        let u_parent = self.arena.get(u).parent;
        match u_parent {
            None => self.root = v,
            Some(p) => {
                let parent = self.arena.get_mut(p);
                if parent.left == Some(u) {
                    parent.left = v;
                } else {
                    parent.right = v;
                }
            }
        }
        if let Some(v) = v {
            self.arena.get_mut(v).parent = u_parent;
        }
    }

    /// Unhooks `z` from the tree, rebalancing and rippling hulls.
    fn detach(&mut self, z: NodeId) {
        let z_left = self.arena.get(z).left;
        let z_right = self.arena.get(z).right;
        let removed_color;
        let x;
        let x_parent;
        match (z_left, z_right) {
            (None, _) => {
                removed_color = self.arena.get(z).color;
                x = z_right;
                x_parent = self.arena.get(z).parent;
                self.transplant(z, z_right);
            }
            (_, None) => {
                removed_color = self.arena.get(z).color;
                x = z_left;
                x_parent = self.arena.get(z).parent;
                self.transplant(z, z_left);
            }
            (Some(zl), Some(zr)) => {
                // The in-order successor is the leftmost node of the right
                // subtree; the list threading yields it in O(1).
                let y = self
                    .arena
                    .get(z)
                    .next
                    .expect("a right subtree implies a successor");
                removed_color = self.arena.get(y).color;
                x = self.arena.get(y).right;
                if self.arena.get(y).parent == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = self.arena.get(y).parent;
                    self.transplant(y, x);
                    self.arena.get_mut(y).right = Some(zr);
                    self.arena.get_mut(zr).parent = Some(y);
                }
                self.transplant(z, Some(y));
                self.arena.get_mut(y).left = Some(zl);
                self.arena.get_mut(zl).parent = Some(y);
                let z_color = self.arena.get(z).color;
                self.set_color(y, z_color);
            }
        }
        // The path from the splice point to the root lost a range.
        match x_parent {
            Some(start) => self.ripple_fixup(start),
            None => {
                if let Some(root) = self.root {
                    self.structure_fixup(root);
                }
            }
        }
        if removed_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }
        let node = self.arena.get_mut(z);
        node.parent = None;
        node.left = None;
        node.right = None;
    }

    fn delete_fixup(&mut self, mut x: Option<NodeId>, mut parent: Option<NodeId>) {
        while x != self.root && self.is_black(x) {
            let Some(p) = parent else { break };
            if self.arena.get(p).left == x {
                let mut w = self
                    .arena
                    .get(p)
                    .right
                    .expect("double black without a sibling");
                if self.arena.get(w).color == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(p, Color::Red);
                    self.rotate_left(p);
                    w = self
                        .arena
                        .get(p)
                        .right
                        .expect("double black without a sibling");
                }
                let w_left = self.arena.get(w).left;
                let w_right = self.arena.get(w).right;
                if self.is_black(w_left) && self.is_black(w_right) {
                    self.set_color(w, Color::Red);
                    x = Some(p);
                    parent = self.arena.get(p).parent;
                } else {
                    if self.is_black(w_right) {
                        let wl = w_left.expect("case demands a red left nephew");
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self
                            .arena
                            .get(p)
                            .right
                            .expect("double black without a sibling");
                    }
                    let p_color = self.arena.get(p).color;
                    self.set_color(w, p_color);
                    self.set_color(p, Color::Black);
                    if let Some(wr) = self.arena.get(w).right {
                        self.set_color(wr, Color::Black);
                    }
                    self.rotate_left(p);
                    x = self.root;
                    parent = None;
                }
            } else {
                let mut w = self
                    .arena
                    .get(p)
                    .left
                    .expect("double black without a sibling");
                if self.arena.get(w).color == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(p, Color::Red);
                    self.rotate_right(p);
                    w = self
                        .arena
                        .get(p)
                        .left
                        .expect("double black without a sibling");
                }
                let w_left = self.arena.get(w).left;
                let w_right = self.arena.get(w).right;
                if self.is_black(w_left) && self.is_black(w_right) {
                    self.set_color(w, Color::Red);
                    x = Some(p);
                    parent = self.arena.get(p).parent;
                } else {
                    if self.is_black(w_left) {
                        let wr = w_right.expect("case demands a red right nephew");
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self
                            .arena
                            .get(p)
                            .left
                            .expect("double black without a sibling");
                    }
                    let p_color = self.arena.get(p).color;
                    self.set_color(w, p_color);
                    self.set_color(p, Color::Black);
                    if let Some(wl) = self.arena.get(w).left {
                        self.set_color(wl, Color::Black);
                    }
                    self.rotate_right(p);
                    x = self.root;
                    parent = None;
                }
            }
        }
        if let Some(x) = x {
            self.set_color(x, Color::Black);
        }
    }
}

#[cfg(test)]
impl<M: Metric + std::fmt::Debug, P> RangeTree<M, P> {
    /// Audits the list threading, tree order, coloring rules and hulls.
    pub(crate) fn validate(&self) {
        let mut ids = Vec::new();
        let mut prev: Option<NodeId> = None;
        let mut cursor = self.head;
        while let Some(c) = cursor {
            let node = self.arena.get(c);
            assert_eq!(node.prev, prev, "list prev link out of sync");
            assert!(!node.range.is_empty(), "empty range stored in the tree");
            if let Some(p) = prev {
                let prev_range = self.arena.get(p).range;
                assert!(
                    prev_range.max() < node.range.min(),
                    "list not ascending and disjoint: {:?} then {:?}",
                    prev_range,
                    node.range
                );
            }
            ids.push(c);
            prev = cursor;
            cursor = node.next;
        }
        assert_eq!(self.tail, prev, "tail link out of sync");
        assert_eq!(
            self.arena.len(),
            ids.len(),
            "arena live count disagrees with the list"
        );

        let mut inorder = Vec::new();
        if let Some(root) = self.root {
            let node = self.arena.get(root);
            assert_eq!(node.parent, None, "root has a parent");
            assert_eq!(node.color, Color::Black, "root is red");
            self.validate_subtree(root, &mut inorder);
        }
        assert_eq!(inorder, ids, "in-order traversal disagrees with the list");
    }

    /// Returns the black height of the subtree, asserting along the way.
    fn validate_subtree(&self, n: NodeId, inorder: &mut Vec<NodeId>) -> usize {
        let node = self.arena.get(n);
        let mut hull = node.range;
        let left_height = match node.left {
            Some(l) => {
                let left = self.arena.get(l);
                assert_eq!(left.parent, Some(n), "left child parent link out of sync");
                if node.color == Color::Red {
                    assert_eq!(left.color, Color::Black, "red node with a red left child");
                }
                hull.hull_with(&left.hull);
                self.validate_subtree(l, inorder)
            }
            None => 1,
        };
        inorder.push(n);
        let right_height = match node.right {
            Some(r) => {
                let right = self.arena.get(r);
                assert_eq!(right.parent, Some(n), "right child parent link out of sync");
                if node.color == Color::Red {
                    assert_eq!(right.color, Color::Black, "red node with a red right child");
                }
                hull.hull_with(&right.hull);
                self.validate_subtree(r, inorder)
            }
            None => 1,
        };
        assert_eq!(left_height, right_height, "unequal black heights");
        assert_eq!(node.hull, hull, "stale hull at {:?}", node.range);
        left_height + usize::from(node.color == Color::Black)
    }
}
