//! Best-N completion on top of a raisable weight floor.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use super::multiword::{FuzzyMultiwordCompletion, MultiwordCompletion};
use super::prefix::PrefixCompletion;
use super::Match;

/// Matchers that can skip subtrees lighter than a floor.
pub trait WeightFloor {
    /// Skip subtrees whose maximum weight is below `weight`.
    fn raise_floor(&mut self, weight: u32);
}

impl WeightFloor for PrefixCompletion {
    fn raise_floor(&mut self, weight: u32) {
        PrefixCompletion::raise_floor(self, weight)
    }
}

impl WeightFloor for MultiwordCompletion {
    fn raise_floor(&mut self, weight: u32) {
        MultiwordCompletion::raise_floor(self, weight)
    }
}

impl WeightFloor for FuzzyMultiwordCompletion {
    fn raise_floor(&mut self, weight: u32) {
        FuzzyMultiwordCompletion::raise_floor(self, weight)
    }
}

/// A collected match; ranks heavier first, then earlier in traversal order.
struct Ranked {
    weight: u32,
    order: usize,
    item: Match,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// The `n` heaviest matches of `matcher`, heaviest first.
///
/// Matches of equal weight keep their traversal order. Once `n` matches are
/// held the floor is raised above the lightest of them, so only subtrees
/// that can still displace a result are visited.
pub fn top_n<M>(mut matcher: M, n: usize) -> Vec<Match>
where
    M: Iterator<Item = Match> + WeightFloor,
{
    if n == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(n + 1);
    let mut order = 0usize;

    while let Some(item) = matcher.next() {
        let ranked = Ranked {
            weight: item.weight(),
            order,
            item,
        };
        order += 1;

        if heap.len() < n {
            heap.push(Reverse(ranked));
        } else if heap.peek().is_some_and(|Reverse(worst)| ranked > *worst) {
            heap.pop();
            heap.push(Reverse(ranked));
        } else {
            continue;
        }

        if heap.len() == n {
            if let Some(Reverse(worst)) = heap.peek() {
                matcher.raise_floor(worst.weight.saturating_add(1));
            }
        }
    }

    let mut ranked: Vec<Ranked> = heap.into_iter().map(|Reverse(r)| r).collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));
    ranked.into_iter().map(|r| r.item).collect()
}
