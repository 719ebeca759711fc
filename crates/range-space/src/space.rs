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

//! `DiscreteSpace`: a partition of a discrete metric domain into disjoint
//! payload-bearing ranges.
//!
//! Invariants (always held after a public operation):
//!    - stored ranges are non-empty and pairwise disjoint
//!    - no two adjacent ranges carry equal payloads (canonical form)
//!    - iteration is in ascending `range.min`
//!    - `len()` equals the number of iterated ranges
//!
//! Complexity:
//!    - `find`: `O(log n)` with hull pruning
//!    - `mark` / `fill` / `erase` / `blend`: `O(log n + k)` for `k`
//!      touched ranges
//!
//! Mutation positions with a tree descent, then resolves overlap along the
//! list threading, reusing nodes in place where it can. Successor and
//! predecessor values are only computed after an ordering test proves they
//! exist, so domains are safe at their extrema.

use crate::arena::NodeId;
use crate::tree::RangeTree;
use range_space_core::metric::Metric;
use range_space_core::range::{DiscreteRange, EdgeRelation};
use tracing::instrument;

/// A mapping of ranges of a discrete metric `M` to payloads `P`.
///
/// Payloads are copied into the space on insertion and dropped exactly
/// once, when their range is erased, merged away or the space goes away.
/// The space is a single-owner structure: no locking, no sharing, and
/// iterators are not stable across mutation.
///
/// # Examples
///
/// ```
/// use range_space::space::DiscreteSpace;
/// use range_space_core::range::DiscreteRange;
///
/// let mut space: DiscreteSpace<u8, char> = DiscreteSpace::new();
/// space.mark(DiscreteRange::new(10, 50), 'a');
/// space.mark(DiscreteRange::new(20, 30), 'b');
/// assert_eq!(space.len(), 3);
/// assert_eq!(space.find(25).map(|(_, p)| *p), Some('b'));
/// assert_eq!(space.find(40).map(|(_, p)| *p), Some('a'));
/// ```
#[derive(Debug)]
pub struct DiscreteSpace<M, P> {
    tree: RangeTree<M, P>,
}

impl<M, P> Default for DiscreteSpace<M, P> {
    #[inline]
    fn default() -> Self {
        Self {
            tree: RangeTree::default(),
        }
    }
}

impl<M: Metric, P> DiscreteSpace<M, P> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of distinct ranges.
    #[inline]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// Drops every range and payload and releases all node storage at once.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// The range and payload covering `metric`, if any.
    ///
    /// Descends the tree, pruning any subtree whose hull cannot contain
    /// the target.
    pub fn find(&self, metric: M) -> Option<(&DiscreteRange<M>, &P)> {
        let id = self.tree.find(metric)?;
        let node = self.tree.node(id);
        Some((node.range(), node.payload()))
    }

    /// Iterates ranges and payloads in ascending order.
    #[inline]
    pub fn iter(&self) -> Iter<'_, M, P> {
        Iter {
            tree: &self.tree,
            cursor: self.tree.head(),
        }
    }
}

impl<M: Metric, P: Clone + PartialEq> DiscreteSpace<M, P> {
    /// Sets `payload` for every value in `range`, replacing whatever was
    /// there, and re-establishes canonical form.
    #[instrument(level = "trace", skip_all)]
    pub fn mark(&mut self, range: DiscreteRange<M>, payload: P) -> &mut Self {
        if range.is_empty() {
            return self;
        }
        let lower = self.tree.lower_bound(range.min());
        let mut x: Option<NodeId> = None;
        let mut n: Option<NodeId>;

        // Left boundary: reuse an existing node where possible instead of
        // allocating, and coalesce into an equal-payload left neighbor.
        if let Some(cur) = lower {
            n = Some(cur);
            let cur_range = self.tree.range(cur);
            if cur_range.min() == range.min() {
                let pred = self.tree.prev(cur);
                // A predecessor implies range.min() is not the domain
                // minimum, so the retreat below is safe.
                let coalesce = pred.is_some_and(|p| {
                    *self.tree.payload(p) == payload
                        && self.tree.range(p).max() == range.min().retreat()
                });
                if coalesce {
                    let p = pred.expect("coalesce without a predecessor");
                    x = Some(p);
                    n = Some(p); // frame of reference moved left
                    self.tree.set_max(p, range.max());
                } else if cur_range.max() <= range.max() {
                    // the landing node is subsumed; take it over in place
                    x = Some(cur);
                    self.tree.set_max(cur, range.max());
                    self.tree.set_payload(cur, payload.clone());
                } else if *self.tree.payload(cur) == payload {
                    return self; // covered by an equal span already
                } else {
                    // the landing node strictly covers the request: clip
                    // it and put the new span in front
                    let node = self.tree.make(range, payload);
                    // safe: cur.max > range.max
                    self.tree.set_min(cur, range.max().advance());
                    self.tree.insert_before(cur, node);
                    return self;
                }
            } else if *self.tree.payload(cur) == payload
                // safe: cur.min < range.min, so range.min is not minimal
                && cur_range.max() >= range.min().retreat()
            {
                // overlap or adjacency on the left with the same payload
                x = Some(cur);
                if cur_range.max() >= range.max() {
                    return self;
                }
                self.tree.set_max(cur, range.max());
            } else if cur_range.max() <= range.max() {
                if cur_range.max() >= range.min() {
                    // left skew overlap with another payload: clip it
                    // safe: cur.min < range.min
                    self.tree.set_max(cur, range.min().retreat());
                } else if let Some(y) = self.tree.next(cur)
                    && self.tree.range(y).max() <= range.max()
                {
                    // the request covers all of the next node; reuse it
                    x = Some(y);
                    self.tree.set_range(y, range);
                    self.tree.set_payload(y, payload.clone());
                    n = Some(y);
                }
            } else {
                // an existing span strictly covers the request with a
                // different payload: split it around the new span
                // safe: cur.max > range.max and cur.min < range.min
                let tail_range = DiscreteRange::new(range.max().advance(), cur_range.max());
                let tail_payload = self.tree.payload(cur).clone();
                let node = self.tree.make(range, payload);
                let tail = self.tree.make(tail_range, tail_payload);
                self.tree.set_max(cur, range.min().retreat());
                self.tree.insert_after(cur, node);
                self.tree.insert_after(node, tail);
                return self;
            }
            // the boundary node is handled; sweep from its successor
            n = self.tree.next(n.expect("mark lost its boundary node"));
            if x.is_none() {
                let node = self.tree.make(range, payload.clone());
                match n {
                    Some(succ) => self.tree.insert_before(succ, node),
                    None => self.tree.append(node),
                }
                x = Some(node);
            }
        } else if let Some(h) = self.tree.head()
            && *self.tree.payload(h) == payload
            && (self.tree.range(h).max() <= range.max()
                // the first test failing proves range.max is not maximal
                || self.tree.range(h).min() <= range.max().advance())
        {
            // every span starts past the request; the head overlaps or is
            // adjacent with the same payload, so stretch it
            x = Some(h);
            n = self.tree.next(h);
            self.tree.set_min(h, range.min());
            if self.tree.range(h).max() < range.max() {
                self.tree.set_max(h, range.max());
            }
        } else {
            let old_head = self.tree.head();
            let node = self.tree.make(range, payload.clone());
            self.tree.prepend(node);
            x = Some(node);
            n = old_head;
        }

        // Forward sweep: x carries the marked span, every span of interest
        // starts at or past it.
        let x = x.expect("mark always lands a node");
        while let Some(c) = n {
            let c_range = self.tree.range(c);
            if c_range.max() <= range.max() {
                // completely covered, drop it
                n = self.tree.next(c);
                self.tree.remove(c);
            } else if range.max().advance() < c_range.min() {
                // safe: the previous branch failing proves range.max is
                // not maximal. Disjoint with a gap, done.
                break;
            } else if *self.tree.payload(c) == payload {
                // skew overlap or adjacency with the same payload: absorb
                self.tree.set_max(x, c_range.max());
                n = self.tree.next(c);
                self.tree.remove(c);
            } else if c_range.min() <= range.max() {
                // trailing skew overlap with another payload: clip it
                self.tree.set_min(c, range.max().advance());
                break;
            } else {
                break;
            }
        }
        self
    }

    /// Sets `payload` for every value in `range` that has no payload yet;
    /// values already in the space keep what they have.
    #[instrument(level = "trace", skip_all)]
    pub fn fill(&mut self, range: DiscreteRange<M>, payload: P) -> &mut Self {
        if range.is_empty() {
            return self;
        }
        let mut n = self.tree.lower_bound(range.min());
        let mut x: Option<NodeId> = None; // carry node, ends just before `min`
        let mut min = range.min();
        let max = range.max();

        // A node of interest strictly left of the request.
        match n {
            Some(cur) if self.tree.range(cur).min() < min => {
                let cur_range = self.tree.range(cur);
                // safe: cur.min < min, so min is not the domain minimum
                if cur_range.max() < min.retreat() {
                    n = self.tree.next(cur); // gap, not even adjacent
                } else if cur_range.max() >= max {
                    return self; // the request is covered, nothing to do
                } else if *self.tree.payload(cur) != payload {
                    // clip the request on the left; safe: cur.max < max
                    min = cur_range.max().advance();
                    n = self.tree.next(cur);
                } else {
                    // overlap or adjacency with the same payload: carry it
                    x = Some(cur);
                    n = self.tree.next(cur);
                }
            }
            Some(_) => {}
            None => n = self.tree.head(),
        }

        // Invariant: every remaining node starts at or past `min`; `max`
        // never changes, so its successor is only taken after a test
        // proves a larger value exists.
        while let Some(c) = n {
            let c_range = self.tree.range(c);
            if *self.tree.payload(c) == payload {
                if let Some(carry) = x {
                    if c_range.max() <= max {
                        // covered, merge it away
                        self.tree.remove(c);
                        n = self.tree.next(carry);
                    } else if c_range.min() <= max.advance() {
                        // safe: c.max > max. Absorb and finish.
                        self.tree.set_max(carry, c_range.max());
                        self.tree.remove(c);
                        return self;
                    } else {
                        self.tree.set_max(carry, max);
                        return self;
                    }
                } else if c_range.max() <= max {
                    // covered node becomes the carry
                    x = Some(c);
                    self.tree.set_min(c, min);
                    n = self.tree.next(c);
                } else if c_range.min() <= max.advance() {
                    // safe: c.max > max. Stretch down and finish.
                    self.tree.set_min(c, min);
                    return self;
                } else {
                    let node = self.tree.make(DiscreteRange::new(min, max), payload);
                    self.tree.insert_before(c, node);
                    return self;
                }
            } else if let Some(carry) = x {
                if max < c_range.min() {
                    self.tree.set_max(carry, max);
                    return self;
                } else if max <= c_range.max() {
                    // close the gap up to just before c; the carry sits
                    // left of c, so c.min is not the domain minimum
                    self.tree.set_max(carry, c_range.min());
                    self.tree.dec_max(carry);
                    return self;
                } else {
                    // c is contained in the request; skip over it
                    self.tree.set_max(carry, c_range.min());
                    self.tree.dec_max(carry);
                    x = None;
                    min = c_range.max().advance(); // safe: c.max < max
                    n = self.tree.next(c);
                }
            } else if max < c_range.min() {
                // the request ends before the next span
                let node = self.tree.make(DiscreteRange::new(min, max), payload);
                self.tree.insert_before(c, node);
                return self;
            } else {
                if min < c_range.min() {
                    // leading gap needs its own node; safe: c.min > min
                    let gap = DiscreteRange::new(min, c_range.min().retreat());
                    let node = self.tree.make(gap, payload.clone());
                    self.tree.insert_before(c, node);
                }
                if max <= c_range.max() {
                    return self;
                }
                min = c_range.max().advance(); // safe: c.max < max
                n = self.tree.next(c);
            }
        }
        // `min` is past every existing span.
        match x {
            Some(carry) => {
                self.tree.set_max(carry, max);
            }
            None => {
                let node = self.tree.make(DiscreteRange::new(min, max), payload);
                self.tree.append(node);
            }
        }
        self
    }

    /// Removes every value in `range` from the space.
    #[instrument(level = "trace", skip_all)]
    pub fn erase(&mut self, range: DiscreteRange<M>) -> &mut Self {
        if range.is_empty() {
            return self;
        }
        let mut n = self.tree.lower_bound(range.min()).or_else(|| self.tree.head());
        while let Some(c) = n {
            let c_range = self.tree.range(c);
            if c_range.min() > range.max() {
                break;
            }
            let next = self.tree.next(c);
            if c_range.max() < range.min() {
                // only the lower bound node can end before the request
                n = next;
                continue;
            }
            if c_range.min() < range.min() {
                if c_range.max() > range.max() {
                    // interior erase: split into two residuals
                    // safe: c.max > range.max and c.min < range.min
                    let tail_range = DiscreteRange::new(range.max().advance(), c_range.max());
                    let tail_payload = self.tree.payload(c).clone();
                    let tail = self.tree.make(tail_range, tail_payload);
                    self.tree.set_max(c, range.min().retreat());
                    self.tree.insert_after(c, tail);
                    return self;
                }
                // clip the covered right edge off; safe: c.min < range.min
                self.tree.set_max(c, range.min().retreat());
            } else if c_range.max() > range.max() {
                // clip the covered left edge off; safe: c.max > range.max
                self.tree.set_min(c, range.max().advance());
                break;
            } else {
                self.tree.remove(c);
            }
            n = next;
        }
        self
    }

    /// Blends `color` into every payload in `range` with `blender`.
    ///
    /// The blender updates its first argument in place and returns whether
    /// the result should be kept; `false` erases the affected region. An
    /// initial probe blends `color` into a default payload: the result is
    /// what fills currently unmapped values, and if the probe itself
    /// returns `false`, unmapped values stay unmapped.
    #[instrument(level = "trace", skip_all)]
    pub fn blend<C, F>(&mut self, range: DiscreteRange<M>, color: C, mut blender: F) -> &mut Self
    where
        P: Default,
        F: FnMut(&mut P, &C) -> bool,
    {
        if range.is_empty() {
            return self;
        }

        let mut plain_color = P::default();
        let plain_p = blender(&mut plain_color, &color);

        let mut n = self.tree.lower_bound(range.min()).or_else(|| self.tree.head());
        // what is still unpainted; shrinks from the left as nodes resolve
        let mut remaining = range;

        while let Some(c) = n {
            if self.tree.range(c).max() < remaining.min() {
                n = self.tree.next(c);
                continue;
            }
            // Invariant: cur.max >= remaining.min
            let mut cur = c;
            let mut pred = self.tree.prev(cur);
            if self.tree.range(cur).min() < remaining.min() {
                // split off the part of cur inside the target
                let stub_range = DiscreteRange::new(remaining.min(), self.tree.range(cur).max());
                let stub_payload = self.tree.payload(cur).clone();
                let stub = self.tree.make(stub_range, stub_payload);
                // safe: cur.min < remaining.min
                self.tree.set_max(cur, remaining.min().retreat());
                self.tree.insert_after(cur, stub);
                pred = Some(cur);
                cur = stub;
            }

            let cur_range = self.tree.range(cur);
            // cur pokes past the right end of the target
            let right_ext_p = cur_range.max() > remaining.max();
            // cur begins inside the target
            let right_overlap_p = remaining.contains(cur_range.min());
            // cur begins exactly one past the end of the target
            let right_adj_p = remaining.is_left_adjacent_to(&cur_range);
            // the predecessor butts up against the unpainted region and
            // already carries the color unmapped values would get
            let pred_plain_p = plain_p
                && pred.is_some_and(|p| {
                    self.tree.range(p).left_edge_relationship(&remaining)
                        == EdgeRelation::Adjacent
                        && *self.tree.payload(p) == plain_color
                });

            if !right_overlap_p {
                // cur lies entirely past the target: paint what remains
                // and stop
                if plain_p && !remaining.is_empty() {
                    let cur_plain_p = *self.tree.payload(cur) == plain_color;
                    if right_adj_p && cur_plain_p {
                        // pull cur left over the remainder
                        self.tree.set_min(cur, remaining.min());
                        if pred_plain_p {
                            let p = pred.expect("adjacent predecessor");
                            let p_min = self.tree.range(p).min();
                            self.tree.remove(p);
                            self.tree.set_min(cur, p_min);
                        }
                    } else if pred_plain_p {
                        // pull the predecessor right over the remainder
                        let p = pred.expect("adjacent predecessor");
                        self.tree.set_max(p, remaining.max());
                    } else {
                        let node = self.tree.make(remaining, plain_color.clone());
                        self.tree.insert_before(cur, node);
                    }
                }
                return self;
            }

            // Invariant: cur begins inside the target. Paint any unmapped
            // gap in front of it.
            let cur_min = cur_range.min();
            if plain_p && remaining.min() < cur_min {
                let gap_max = cur_min.retreat(); // safe: cur.min > remaining.min
                match pred {
                    Some(p) if pred_plain_p => {
                        self.tree.set_max(p, gap_max);
                    }
                    _ => {
                        let gap = DiscreteRange::new(remaining.min(), gap_max);
                        let node = self.tree.make(gap, plain_color.clone());
                        self.tree.insert_before(cur, node);
                    }
                }
            }

            // Blend over the overlap of cur and the target.
            let fill_max = if right_ext_p {
                remaining.max()
            } else {
                cur_range.max()
            };
            let fill_range = DiscreteRange::new(cur_min, fill_max);
            let mut fill_payload = self.tree.payload(cur).clone();
            let keep = blender(&mut fill_payload, &color);
            let next_n = self.tree.next(cur);
            if fill_max < remaining.max() {
                remaining.set_min(fill_max.advance()); // safe: fill_max < remaining.max
            } else {
                // the target is exhausted; never step past its maximum
                remaining.clear();
            }

            // Replace, clip, coalesce or drop cur according to the blend.
            let survivor: Option<NodeId>;
            if keep {
                if right_ext_p {
                    if *self.tree.payload(cur) == fill_payload {
                        // the blend changed nothing; heal a possible split
                        if let Some(p) = self.tree.prev(cur)
                            && self.tree.range(p).is_left_adjacent_to(&self.tree.range(cur))
                            && self.tree.payload(p) == self.tree.payload(cur)
                        {
                            let p_min = self.tree.range(p).min();
                            self.tree.remove(p);
                            self.tree.set_min(cur, p_min);
                        }
                        survivor = Some(cur);
                    } else {
                        // clip cur past the target and put the blended
                        // span in front; safe: cur.max > range.max
                        self.tree.set_min(cur, range.max().advance());
                        let coalesce = self.tree.prev(cur).is_some_and(|p| {
                            self.tree.range(p).is_left_adjacent_to(&fill_range)
                                && *self.tree.payload(p) == fill_payload
                        });
                        if coalesce {
                            let p = self.tree.prev(cur).expect("coalesce target");
                            self.tree.set_max(p, fill_range.max());
                        } else {
                            let node = self.tree.make(fill_range, fill_payload);
                            self.tree.insert_before(cur, node);
                        }
                        return self;
                    }
                } else {
                    let pred2 = self.tree.prev(cur);
                    let coalesce = pred2.is_some_and(|p| {
                        self.tree.range(p).is_left_adjacent_to(&fill_range)
                            && *self.tree.payload(p) == fill_payload
                    });
                    if coalesce {
                        let p = pred2.expect("coalesce target");
                        self.tree.remove(cur);
                        self.tree.set_max(p, fill_range.max());
                        survivor = Some(p);
                    } else if *self.tree.payload(cur) == fill_payload {
                        survivor = Some(cur); // the blend changed nothing
                    } else {
                        let node = self.tree.make(fill_range, fill_payload);
                        self.tree.insert_before(cur, node);
                        self.tree.remove(cur);
                        survivor = Some(node);
                    }
                }
            } else if right_ext_p {
                // drop the overlap, keep the trailing part of cur
                // safe: cur.max > range.max
                self.tree.set_min(cur, range.max().advance());
                return self;
            } else {
                self.tree.remove(cur);
                survivor = None;
            }

            n = next_n;
            if remaining.is_empty() {
                // reached the right edge; restore canonical form across it
                if let (Some(s), Some(after)) = (survivor, n) {
                    let s_range = self.tree.range(s);
                    let after_range = self.tree.range(after);
                    if s_range.is_left_adjacent_to(&after_range)
                        && self.tree.payload(s) == self.tree.payload(after)
                    {
                        let after_max = after_range.max();
                        self.tree.remove(after);
                        self.tree.set_max(s, after_max);
                    }
                }
                return self;
            }
        }

        // No span remains past the target; paint the tail.
        if plain_p && !remaining.is_empty() {
            match self.tree.tail() {
                Some(t)
                    if self.tree.range(t).is_left_adjacent_to(&remaining)
                        && *self.tree.payload(t) == plain_color =>
                {
                    self.tree.set_max(t, remaining.max());
                }
                _ => {
                    let node = self.tree.make(remaining, plain_color);
                    self.tree.append(node);
                }
            }
        }
        self
    }
}

/// Ordered iterator over the ranges of a [`DiscreteSpace`].
#[derive(Debug)]
pub struct Iter<'a, M, P> {
    tree: &'a RangeTree<M, P>,
    cursor: Option<NodeId>,
}

impl<'a, M: Metric, P> Iterator for Iter<'a, M, P> {
    type Item = (&'a DiscreteRange<M>, &'a P);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        self.cursor = self.tree.next(id);
        let node = self.tree.node(id);
        Some((node.range(), node.payload()))
    }
}

impl<'a, M: Metric, P> std::iter::FusedIterator for Iter<'a, M, P> {}

impl<'a, M: Metric, P> IntoIterator for &'a DiscreteSpace<M, P> {
    type Item = (&'a DiscreteRange<M>, &'a P);
    type IntoIter = Iter<'a, M, P>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(min: u8, max: u8) -> DiscreteRange<u8> {
        DiscreteRange::new(min, max)
    }

    fn spans<P: Copy>(space: &DiscreteSpace<u8, P>) -> Vec<(u8, u8, P)> {
        space
            .iter()
            .map(|(range, payload)| (range.min(), range.max(), *payload))
            .collect()
    }

    /// Structural audit plus the canonical-form rules the tree itself does
    /// not know about.
    fn audit<P: PartialEq + std::fmt::Debug>(space: &DiscreteSpace<u8, P>) {
        space.tree.validate();
        let entries: Vec<_> = space.iter().collect();
        assert_eq!(entries.len(), space.len(), "len disagrees with iteration");
        for pair in entries.windows(2) {
            let (left, left_payload) = pair[0];
            let (right, right_payload) = pair[1];
            if left.is_left_adjacent_to(right) {
                assert_ne!(
                    left_payload, right_payload,
                    "adjacent ranges {} and {} share a payload",
                    left, right
                );
            }
        }
    }

    #[test]
    fn test_empty_space() {
        let space: DiscreteSpace<u8, char> = DiscreteSpace::new();
        assert!(space.is_empty());
        assert_eq!(space.len(), 0);
        assert!(space.find(0).is_none());
        assert_eq!(space.iter().count(), 0);
    }

    #[test]
    fn test_empty_range_inputs_are_noops() {
        let mut space: DiscreteSpace<u8, char> = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        let before = spans(&space);
        space.mark(DiscreteRange::empty(), 'z');
        space.fill(r(20, 10), 'z');
        space.erase(DiscreteRange::empty());
        space.blend(DiscreteRange::empty(), 'z', |p, c| {
            *p = *c;
            true
        });
        assert_eq!(spans(&space), before);
        audit(&space);
    }

    #[test]
    fn test_mark_disjoint_spans() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(40, 50), 'b');
        space.mark(r(30, 35), 'c');
        assert_eq!(
            spans(&space),
            vec![(10, 20, 'a'), (30, 35, 'c'), (40, 50, 'b')]
        );
        audit(&space);
    }

    #[test]
    fn test_mark_closing_a_gap_coalesces() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(25, 30), 'a');
        space.mark(r(21, 24), 'a');
        assert_eq!(spans(&space), vec![(10, 30, 'a')]);
        assert_eq!(space.len(), 1);
        audit(&space);
    }

    #[test]
    fn test_mark_splits_a_covering_span() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 50), 'a');
        space.mark(r(20, 30), 'b');
        assert_eq!(
            spans(&space),
            vec![(10, 19, 'a'), (20, 30, 'b'), (31, 50, 'a')]
        );
        assert_eq!(space.len(), 3);
        assert_eq!(space.find(25).map(|(_, p)| *p), Some('b'));
        assert_eq!(space.find(19).map(|(_, p)| *p), Some('a'));
        assert_eq!(space.find(31).map(|(_, p)| *p), Some('a'));
        audit(&space);
    }

    #[test]
    fn test_mark_same_payload_into_covering_span_is_noop() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 50), 'a');
        space.mark(r(20, 30), 'a');
        space.mark(r(10, 40), 'a');
        assert_eq!(spans(&space), vec![(10, 50, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_mark_idempotent() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(30, 40), 'b');
        space.mark(r(15, 35), 'c');
        let once = spans(&space);
        space.mark(r(15, 35), 'c');
        assert_eq!(spans(&space), once);
        audit(&space);
    }

    #[test]
    fn test_mark_overwrites_many_spans() {
        let mut space = DiscreteSpace::new();
        for i in 0..10u8 {
            space.mark(r(i * 20, i * 20 + 9), char::from(b'a' + i));
        }
        space.mark(r(5, 180), 'z');
        assert_eq!(
            spans(&space),
            vec![(0, 4, 'a'), (5, 180, 'z'), (181, 189, 'j')]
        );
        audit(&space);
    }

    #[test]
    fn test_mark_left_coalesce_swallows_landing_node() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 4), 'a');
        space.mark(r(5, 8), 'b');
        space.mark(r(5, 8), 'a');
        assert_eq!(spans(&space), vec![(0, 8, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_mark_extends_adjacent_left_neighbor() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 9), 'a');
        space.mark(r(10, 20), 'a');
        assert_eq!(spans(&space), vec![(0, 20, 'a')]);
        space.mark(r(21, 30), 'b');
        assert_eq!(spans(&space), vec![(0, 20, 'a'), (21, 30, 'b')]);
        audit(&space);
    }

    #[test]
    fn test_mark_maximal_range_never_overflows() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 255), 'a');
        assert_eq!(spans(&space), vec![(0, 255, 'a')]);
        let (range, _) = space.find(255).expect("maximum is covered");
        assert!(range.is_maximal());
        audit(&space);

        // again, over existing content
        let mut space = DiscreteSpace::new();
        space.mark(r(3, 9), 'x');
        space.mark(r(200, 255), 'y');
        space.mark(r(0, 255), 'a');
        assert_eq!(spans(&space), vec![(0, 255, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_mark_at_the_top_of_the_domain() {
        let mut space = DiscreteSpace::new();
        space.mark(r(250, 255), 'a');
        space.mark(r(251, 253), 'b');
        assert_eq!(
            spans(&space),
            vec![(250, 250, 'a'), (251, 253, 'b'), (254, 255, 'a')]
        );
        space.mark(r(254, 255), 'b');
        assert_eq!(spans(&space), vec![(250, 250, 'a'), (251, 255, 'b')]);
        audit(&space);
    }

    #[test]
    fn test_fill_paints_only_gaps() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.fill(r(0, 255), 'z');
        assert_eq!(
            spans(&space),
            vec![(0, 9, 'z'), (10, 20, 'a'), (21, 255, 'z')]
        );
        assert_eq!(space.len(), 3);
        audit(&space);
    }

    #[test]
    fn test_fill_preserves_existing_payloads() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(30, 40), 'b');
        space.fill(r(5, 45), 'z');
        for m in 10..=20u8 {
            assert_eq!(space.find(m).map(|(_, p)| *p), Some('a'));
        }
        for m in 30..=40u8 {
            assert_eq!(space.find(m).map(|(_, p)| *p), Some('b'));
        }
        assert_eq!(
            spans(&space),
            vec![
                (5, 9, 'z'),
                (10, 20, 'a'),
                (21, 29, 'z'),
                (30, 40, 'b'),
                (41, 45, 'z')
            ]
        );
        audit(&space);
    }

    #[test]
    fn test_fill_merges_with_equal_payload_spans() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 12), 'z');
        space.mark(r(31, 40), 'z');
        space.fill(r(0, 30), 'z');
        assert_eq!(spans(&space), vec![(0, 40, 'z')]);
        audit(&space);
    }

    #[test]
    fn test_fill_covered_request_is_noop() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 100), 'a');
        space.fill(r(10, 90), 'z');
        assert_eq!(spans(&space), vec![(0, 100, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_fill_clips_against_left_neighbor() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 9), 'a');
        space.fill(r(5, 20), 'z');
        assert_eq!(spans(&space), vec![(0, 9, 'a'), (10, 20, 'z')]);
        audit(&space);
    }

    #[test]
    fn test_erase_clips_and_splits() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 9), 'a');
        space.mark(r(20, 29), 'b');
        space.mark(r(40, 49), 'c');
        space.erase(r(25, 44));
        assert_eq!(
            spans(&space),
            vec![(0, 9, 'a'), (20, 24, 'b'), (45, 49, 'c')]
        );
        audit(&space);
    }

    #[test]
    fn test_erase_interior_splits_in_two() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 50), 'a');
        space.erase(r(10, 19));
        assert_eq!(spans(&space), vec![(0, 9, 'a'), (20, 50, 'a')]);
        assert!(space.find(15).is_none());
        audit(&space);
    }

    #[test]
    fn test_erase_everything() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(30, 40), 'b');
        space.erase(r(0, 255));
        assert!(space.is_empty());
        audit(&space);
    }

    #[test]
    fn test_erase_exact_span() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(30, 40), 'b');
        space.erase(r(30, 40));
        assert_eq!(spans(&space), vec![(10, 20, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_erase_at_domain_edges() {
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 255), 'a');
        space.erase(r(0, 9));
        space.erase(r(250, 255));
        assert_eq!(spans(&space), vec![(10, 249, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_blend_dropping_blender_erases_region() {
        // keep unless the existing payload is 'x'
        let blender = |payload: &mut char, _color: &char| *payload != 'x';
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 100), 'x');
        space.mark(r(101, 200), 'y');
        space.blend(r(0, 150), '?', blender);
        assert_eq!(spans(&space), vec![(101, 200, 'y')]);
        assert_eq!(space.len(), 1);
        assert!(space.find(50).is_none());
        audit(&space);
    }

    #[test]
    fn test_blend_dropping_blender_respects_the_range() {
        // the same dropping blender, but over a partial overlap: only the
        // affected region of the 'x' span goes away
        let blender = |payload: &mut char, _color: &char| *payload != 'x';
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 100), 'x');
        space.mark(r(101, 200), 'y');
        space.blend(r(50, 150), '?', blender);
        assert_eq!(spans(&space), vec![(0, 49, 'x'), (101, 200, 'y')]);
        assert!(space.find(50).is_none());
        assert!(space.find(100).is_none());
        audit(&space);
    }

    #[test]
    fn test_blend_paints_gaps_with_the_plain_color() {
        let add = |payload: &mut u8, color: &u8| {
            *payload = payload.wrapping_add(*color);
            *payload != 0
        };
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.mark(r(10, 20), 5);
        space.blend(r(0, 30), 1, add);
        assert_eq!(spans(&space), vec![(0, 9, 1), (10, 20, 6), (21, 30, 1)]);
        audit(&space);
    }

    #[test]
    fn test_blend_with_rejected_probe_leaves_gaps_unmapped() {
        let add = |payload: &mut u8, color: &u8| {
            *payload = payload.wrapping_add(*color);
            *payload != 0
        };
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.mark(r(10, 20), 5);
        // color 0 blends a default payload to 0, which the blender rejects
        space.blend(r(0, 30), 0, add);
        assert_eq!(spans(&space), vec![(10, 20, 5)]);
        assert!(space.find(0).is_none());
        audit(&space);
    }

    #[test]
    fn test_blend_merges_everything_it_equalizes() {
        let paint = |payload: &mut u8, color: &u8| {
            *payload = *color;
            true
        };
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.mark(r(10, 20), 1);
        space.blend(r(0, 30), 7, paint);
        assert_eq!(spans(&space), vec![(0, 30, 7)]);
        assert_eq!(space.len(), 1);
        audit(&space);
    }

    #[test]
    fn test_blend_coalesces_across_the_right_edge() {
        let paint = |payload: &mut char, _color: &char| {
            *payload = 'b';
            true
        };
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 10), 'a');
        space.mark(r(11, 20), 'b');
        space.blend(r(0, 10), '?', paint);
        assert_eq!(spans(&space), vec![(0, 20, 'b')]);
        audit(&space);
    }

    #[test]
    fn test_blend_identity_keeps_the_space_intact() {
        let identity = |_payload: &mut char, _color: &char| true;
        let mut space = DiscreteSpace::new();
        space.mark(r(0, 100), 'x');
        space.blend(r(50, 60), '?', identity);
        assert_eq!(spans(&space), vec![(0, 100, 'x')]);
        audit(&space);
    }

    #[test]
    fn test_blend_clips_a_span_poking_past_the_range() {
        let paint = |payload: &mut char, _color: &char| {
            *payload = 'z';
            true
        };
        let mut space = DiscreteSpace::new();
        space.mark(r(50, 100), 'a');
        space.blend(r(40, 60), '?', paint);
        assert_eq!(spans(&space), vec![(40, 60, 'z'), (61, 100, 'a')]);
        audit(&space);
    }

    #[test]
    fn test_blend_idempotent_blender_is_stable() {
        let or_bit = |payload: &mut u8, color: &u8| {
            *payload |= *color;
            true
        };
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.mark(r(10, 20), 0b0001);
        space.mark(r(40, 60), 0b0100);
        space.blend(r(0, 70), 0b0010, or_bit);
        let once = spans(&space);
        audit(&space);
        space.blend(r(0, 70), 0b0010, or_bit);
        assert_eq!(spans(&space), once);
        audit(&space);
    }

    #[test]
    fn test_blend_at_the_top_of_the_domain() {
        let add = |payload: &mut u8, color: &u8| {
            *payload = payload.wrapping_add(*color);
            *payload != 0
        };
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.mark(r(250, 255), 1);
        space.blend(r(250, 255), 1, add);
        assert_eq!(spans(&space), vec![(250, 255, 2)]);
        audit(&space);

        // over an empty space the plain color reaches the maximum
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.blend(r(0, 255), 3, add);
        assert_eq!(spans(&space), vec![(0, 255, 3)]);
        let (range, _) = space.find(255).expect("maximum is covered");
        assert!(range.is_maximal());
        audit(&space);
    }

    #[test]
    fn test_blend_extends_plain_predecessor_over_gap() {
        let add = |payload: &mut u8, color: &u8| {
            *payload = payload.wrapping_add(*color);
            *payload != 0
        };
        // [0,3] already carries what gaps will get; the gap beyond it must
        // merge rather than sit adjacent with an equal payload
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        space.mark(r(0, 3), 2);
        space.mark(r(10, 20), 5);
        space.blend(r(4, 30), 2, add);
        assert_eq!(spans(&space), vec![(0, 9, 2), (10, 20, 7), (21, 30, 2)]);
        audit(&space);
    }

    #[test]
    fn test_find_over_shuffled_singletons() {
        let mut space: DiscreteSpace<u8, u16> = DiscreteSpace::new();
        let mut keys: Vec<u8> = (0..100u8).map(|i| i * 2).collect();
        let mut rng = Lcg::new(0xABCD);
        for i in (1..keys.len()).rev() {
            keys.swap(i, rng.gen_range(i + 1));
        }
        for &k in &keys {
            space.mark(DiscreteRange::singleton(k), u16::from(k) + 1000);
        }
        space.tree.validate();
        assert_eq!(space.len(), 100);
        for m in 0..=255u8 {
            let expected = (m % 2 == 0 && m < 200).then(|| u16::from(m) + 1000);
            assert_eq!(space.find(m).map(|(_, p)| *p), expected, "at {}", m);
        }
    }

    #[test]
    fn test_clear_empties_and_stays_usable() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(30, 40), 'b');
        space.clear();
        assert!(space.is_empty());
        assert!(space.find(15).is_none());
        space.mark(r(0, 5), 'c');
        assert_eq!(spans(&space), vec![(0, 5, 'c')]);
        audit(&space);
    }

    #[test]
    fn test_iterators_agree_with_into_iterator() {
        let mut space = DiscreteSpace::new();
        space.mark(r(10, 20), 'a');
        space.mark(r(30, 40), 'b');
        let via_iter: Vec<_> = space.iter().collect();
        let via_into: Vec<_> = (&space).into_iter().collect();
        assert_eq!(via_iter, via_into);
    }

    #[test]
    fn test_ip_metric_space() {
        use range_space_core::metric::V4Addr;

        let lo = |a, b, c, d| V4Addr::from([a, b, c, d]);
        let mut space: DiscreteSpace<V4Addr, u32> = DiscreteSpace::new();
        space.mark(DiscreteRange::new(lo(10, 0, 0, 0), lo(10, 0, 0, 255)), 1);
        space.mark(DiscreteRange::new(lo(10, 0, 1, 0), lo(10, 0, 1, 255)), 1);
        // the two /24s are adjacent across the octet boundary
        assert_eq!(space.len(), 1);
        assert_eq!(space.find(lo(10, 0, 0, 42)).map(|(_, p)| *p), Some(1));
        space.mark(DiscreteRange::new(lo(10, 0, 0, 128), lo(10, 0, 0, 192)), 2);
        assert_eq!(space.len(), 3);
        assert_eq!(space.find(lo(10, 0, 0, 150)).map(|(_, p)| *p), Some(2));
    }

    // --- randomized model checking, after the berth quay tests ---

    struct Lcg(u64);
    impl Lcg {
        fn new(seed: u64) -> Self {
            Self(seed)
        }
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 16
        }
        fn gen_range(&mut self, upper_bound: usize) -> usize {
            if upper_bound == 0 {
                0
            } else {
                (self.next() as usize) % upper_bound
            }
        }
    }

    /// Dense reference model over the whole `u8` domain.
    struct RefModel {
        cells: Vec<Option<u8>>,
    }

    impl RefModel {
        fn new() -> Self {
            Self {
                cells: vec![None; 256],
            }
        }

        fn mark(&mut self, min: u8, max: u8, payload: u8) {
            for m in min..=max {
                self.cells[m as usize] = Some(payload);
            }
        }

        fn fill(&mut self, min: u8, max: u8, payload: u8) {
            for m in min..=max {
                let cell = &mut self.cells[m as usize];
                if cell.is_none() {
                    *cell = Some(payload);
                }
            }
        }

        fn erase(&mut self, min: u8, max: u8) {
            for m in min..=max {
                self.cells[m as usize] = None;
            }
        }

        fn blend(&mut self, min: u8, max: u8, color: u8) {
            for m in min..=max {
                let blended = self.cells[m as usize].unwrap_or(0).wrapping_add(color);
                self.cells[m as usize] = (blended != 0).then_some(blended);
            }
        }

        fn runs(&self) -> Vec<(u8, u8, u8)> {
            let mut out = Vec::new();
            let mut m = 0usize;
            while m < 256 {
                if let Some(payload) = self.cells[m] {
                    let start = m;
                    while m + 1 < 256 && self.cells[m + 1] == Some(payload) {
                        m += 1;
                    }
                    out.push((start as u8, m as u8, payload));
                }
                m += 1;
            }
            out
        }
    }

    fn assert_matches_model(space: &DiscreteSpace<u8, u8>, model: &RefModel) {
        assert_eq!(spans(space), model.runs(), "runs disagree with the model");
        for m in 0..=255u8 {
            assert_eq!(
                space.find(m).map(|(_, p)| *p),
                model.cells[m as usize],
                "find({}) disagrees with the model",
                m
            );
        }
    }

    #[test]
    fn test_randomized_mark_fill_erase_vs_model() {
        let mut rng = Lcg::new(0xC0FFEE);
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        let mut model = RefModel::new();

        for step in 0..2500usize {
            let a = rng.gen_range(256) as u8;
            let b = rng.gen_range(256) as u8;
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let payload = (rng.gen_range(4) + 1) as u8;
            match rng.gen_range(3) {
                0 => {
                    space.mark(r(min, max), payload);
                    model.mark(min, max, payload);
                }
                1 => {
                    space.fill(r(min, max), payload);
                    model.fill(min, max, payload);
                }
                _ => {
                    space.erase(r(min, max));
                    model.erase(min, max);
                }
            }
            audit(&space);
            if step % 16 == 0 {
                assert_matches_model(&space, &model);
            }
        }
        assert_matches_model(&space, &model);
    }

    #[test]
    fn test_randomized_blend_vs_model() {
        let add = |payload: &mut u8, color: &u8| {
            *payload = payload.wrapping_add(*color);
            *payload != 0
        };
        let mut rng = Lcg::new(0xBADC0DE);
        let mut space: DiscreteSpace<u8, u8> = DiscreteSpace::new();
        let mut model = RefModel::new();

        for step in 0..1200usize {
            let a = rng.gen_range(256) as u8;
            let b = rng.gen_range(256) as u8;
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            match rng.gen_range(4) {
                0 => {
                    let payload = (rng.gen_range(4) + 1) as u8;
                    space.mark(r(min, max), payload);
                    model.mark(min, max, payload);
                }
                1 => {
                    space.erase(r(min, max));
                    model.erase(min, max);
                }
                _ => {
                    // color 0 exercises the rejected-probe path
                    let color = rng.gen_range(4) as u8;
                    space.blend(r(min, max), color, add);
                    model.blend(min, max, color);
                }
            }
            audit(&space);
            if step % 16 == 0 {
                assert_matches_model(&space, &model);
            }
        }
        assert_matches_model(&space, &model);
    }
}
