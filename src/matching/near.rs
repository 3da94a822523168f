//! Near matching: keys that share the longest possible prefix with a query.
//!
//! Useful for hierarchical keys such as geohashes, where a longer shared
//! prefix means a closer hit.

use super::{matches_at, Attribute, Match};
use crate::dictionary::traverser::{StateTraverser, TargetFirstOrder};
use crate::dictionary::{Dictionary, StateId};

/// Keys sharing a prefix with a query, closest first.
///
/// The first `minimum_exact_prefix` bytes must match. Below that prefix the
/// traversal follows the rest of the query as far as the automaton allows,
/// then falls back to the sibling subtrees. The score of a match is the
/// number of leading bytes it shares with the query.
pub struct NearMatching {
    traverser: Option<StateTraverser<TargetFirstOrder>>,
    prefix: Vec<u8>,
    target: Vec<u8>,
    greedy: bool,
    /// Shared depth of the first group matched; only used when not greedy.
    matched_depth: Option<usize>,
    first: Option<Match>,
    ready: Vec<Match>,
}

impl NearMatching {
    pub(crate) fn new(
        dictionary: Dictionary,
        start: StateId,
        query: &[u8],
        minimum_exact_prefix: usize,
        greedy: bool,
    ) -> Self {
        if query.len() < minimum_exact_prefix {
            return Self::empty();
        }
        let (prefix, rest) = query.split_at(minimum_exact_prefix);

        let automaton = dictionary.automaton();
        let Some(state) = automaton.walk(start, prefix).and_then(|id| automaton.state(id)) else {
            return Self::empty();
        };

        let first = if state.is_final() {
            let score = prefix.len() as f64;
            matches_at(&dictionary, &state, prefix, score)
                .into_iter()
                .last()
                .map(|mut m| {
                    m.set_attribute("shared_prefix", Attribute::Int(prefix.len() as i64));
                    m
                })
        } else {
            None
        };
        let id = state.id();
        let order = TargetFirstOrder {
            target: rest.to_vec(),
        };

        NearMatching {
            traverser: Some(StateTraverser::new(dictionary, id, order)),
            prefix: prefix.to_vec(),
            target: rest.to_vec(),
            greedy,
            matched_depth: None,
            first,
            ready: Vec::new(),
        }
    }

    fn empty() -> Self {
        NearMatching {
            traverser: None,
            prefix: Vec::new(),
            target: Vec::new(),
            greedy: false,
            matched_depth: None,
            first: None,
            ready: Vec::new(),
        }
    }
}

fn shared_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

impl Iterator for NearMatching {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if let Some(m) = self.first.take() {
            return Some(m);
        }
        loop {
            if let Some(m) = self.ready.pop() {
                return Some(m);
            }
            let traverser = self.traverser.as_mut()?;
            let step = traverser.next()?;

            if let Some(depth) = self.matched_depth {
                if step.depth <= depth {
                    self.traverser = None;
                    return None;
                }
            }

            let dictionary = traverser.dictionary();
            let Some(state) = dictionary.automaton().state(step.state) else {
                continue;
            };
            if !state.is_final() {
                continue;
            }

            let path = traverser.path();
            let exact_depth = shared_len(path, &self.target);
            let shared = self.prefix.len() + exact_depth;

            let mut key = self.prefix.clone();
            key.extend_from_slice(path);
            let mut found: Vec<Match> = matches_at(dictionary, &state, &key, shared as f64)
                .into_iter()
                .map(|mut m| {
                    m.set_attribute("shared_prefix", Attribute::Int(shared as i64));
                    m
                })
                .collect();
            // Popped from the back, so oldest value first.
            found.reverse();
            self.ready = found;

            if !self.greedy {
                self.matched_depth = Some(exact_depth);
            }
        }
    }
}
