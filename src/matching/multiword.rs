//! Completion over multiword keys.
//!
//! Multiword dictionaries store, for each phrase, several keys of the form
//! `<tokens>\x1B<display text>`, where `<tokens>` is a sorted subset of the
//! phrase tokens. A query is normalized the same way (all tokens but the last
//! are sorted), so "with 80" finds "80s movie with zombies" through the key
//! `with 80s\x1B80s movie with zombies`. The display text after the separator
//! is what the match reports.

use std::collections::VecDeque;

use super::fuzzy::{prefix_bytes, query_units, FuzzyWalk};
use super::{matches_at, Attribute, Match, MULTIWORD_SEPARATOR};
use crate::dictionary::traverser::{StateTraverser, WeightOrder};
use crate::dictionary::{Dictionary, State, StateId};

/// Normalize a query: sort every token except the last, which may be
/// incomplete. Returns the normalized text and the token count.
///
/// ```rust
/// use fsadict::matching::bag_of_words_partial;
///
/// assert_eq!(bag_of_words_partial("zombies with 8"), ("with zombies 8".to_string(), 3));
/// assert_eq!(bag_of_words_partial("  "), (String::new(), 0));
/// ```
pub fn bag_of_words_partial(query: &str) -> (String, usize) {
    let mut tokens: Vec<&str> = query
        .split(|c| c == ' ' || c == '\t')
        .filter(|t| !t.is_empty())
        .collect();
    let count = tokens.len();
    let Some(last) = tokens.pop() else {
        return (String::new(), 0);
    };
    tokens.sort_unstable();
    tokens.push(last);
    (tokens.join(" "), count)
}

/// The text a multiword match reports: the display part after the
/// separator, or the whole key if it has none.
fn display_text(key: &[u8], boundary: Option<usize>) -> &[u8] {
    match boundary {
        Some(at) => &key[at..],
        None => key,
    }
}

fn emit(
    ready: &mut VecDeque<Match>,
    dictionary: &Dictionary,
    state: &State<'_>,
    matched: &[u8],
    distance: Option<u32>,
) {
    let score = distance.map_or(0.0, f64::from);
    ready.extend(matches_at(dictionary, state, matched, score).into_iter().map(|mut m| {
        if let Some(d) = distance {
            m.set_attribute("distance", Attribute::Int(i64::from(d)));
        }
        m
    }));
}

/// Exact multiword completion, heaviest subtrees first.
pub struct MultiwordCompletion {
    traverser: Option<StateTraverser<WeightOrder>>,
    prefix: Vec<u8>,
    /// Depth of the separator on the current path, 0 if none.
    boundary: usize,
    ready: VecDeque<Match>,
}

impl MultiwordCompletion {
    pub(crate) fn new(dictionary: Dictionary, start: StateId, query: &str) -> Self {
        let (normalized, _) = bag_of_words_partial(query);
        let prefix = normalized.into_bytes();

        let automaton = dictionary.automaton();
        let Some(state) = automaton.walk(start, &prefix).and_then(|id| automaton.state(id)) else {
            return Self::empty();
        };

        let mut ready = VecDeque::new();
        if state.is_final() {
            emit(&mut ready, &dictionary, &state, &prefix, None);
        }
        let id = state.id();

        MultiwordCompletion {
            traverser: Some(StateTraverser::new(dictionary, id, WeightOrder)),
            prefix,
            boundary: 0,
            ready,
        }
    }

    pub(crate) fn empty() -> Self {
        MultiwordCompletion {
            traverser: None,
            prefix: Vec::new(),
            boundary: 0,
            ready: VecDeque::new(),
        }
    }

    /// Skip subtrees whose maximum weight is below `weight`.
    pub fn raise_floor(&mut self, weight: u32) {
        if let Some(traverser) = &mut self.traverser {
            if weight > traverser.min_weight() {
                traverser.set_min_weight(weight);
            }
        }
    }
}

impl Iterator for MultiwordCompletion {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(m) = self.ready.pop_front() {
                return Some(m);
            }
            let traverser = self.traverser.as_mut()?;
            let step = traverser.next()?;

            if step.label == MULTIWORD_SEPARATOR {
                self.boundary = step.depth;
            } else if step.depth <= self.boundary {
                self.boundary = 0;
            }
            if step.label == b' ' && self.boundary == 0 {
                // Only as many tokens as the query has.
                traverser.prune();
                continue;
            }

            let dictionary = traverser.dictionary();
            let Some(state) = dictionary.automaton().state(step.state) else {
                continue;
            };
            if state.is_final() {
                let matched = if self.boundary > 0 {
                    display_text(traverser.path(), Some(self.boundary)).to_vec()
                } else {
                    let mut key = self.prefix.clone();
                    key.extend_from_slice(traverser.path());
                    key
                };
                emit(&mut self.ready, dictionary, &state, &matched, None);
            }
        }
    }
}

/// Multiword completion with approximate matching of the normalized query.
///
/// Only keys with exactly as many tokens before the separator as the query
/// are considered. The distance is fixed once the separator is reached.
pub struct FuzzyMultiwordCompletion {
    walk: Option<FuzzyWalk<WeightOrder>>,
    prefix: Vec<u8>,
    max_distance: u32,
    tokens: usize,
    /// Spaces inside the exactly matched prefix.
    prefix_spaces: usize,
    token_starts: Vec<usize>,
    boundary: usize,
    boundary_distance: u32,
    ready: VecDeque<Match>,
}

impl FuzzyMultiwordCompletion {
    pub(crate) fn new(
        dictionary: Dictionary,
        start: StateId,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
    ) -> Self {
        let (normalized, tokens) = bag_of_words_partial(query);
        let units = query_units(&normalized);
        if units.is_empty() || units.len() < minimum_exact_prefix {
            return Self::empty();
        }
        let exact = minimum_exact_prefix;
        let prefix = &normalized.as_bytes()[..prefix_bytes(&normalized, exact)];

        let automaton = dictionary.automaton();
        let Some(state) = automaton.walk(start, prefix).and_then(|id| automaton.state(id)) else {
            return Self::empty();
        };
        let id = state.id();

        let mut ready = VecDeque::new();
        if exact == units.len() && state.is_final() {
            emit(&mut ready, &dictionary, &state, prefix, Some(0));
        }

        FuzzyMultiwordCompletion {
            walk: Some(FuzzyWalk::new(dictionary, id, &units, exact, WeightOrder)),
            prefix: prefix.to_vec(),
            max_distance,
            tokens,
            prefix_spaces: prefix.iter().filter(|&&b| b == b' ').count(),
            token_starts: Vec::new(),
            boundary: 0,
            boundary_distance: 0,
            ready,
        }
    }

    fn empty() -> Self {
        FuzzyMultiwordCompletion {
            walk: None,
            prefix: Vec::new(),
            max_distance: 0,
            tokens: 0,
            prefix_spaces: 0,
            token_starts: Vec::new(),
            boundary: 0,
            boundary_distance: 0,
            ready: VecDeque::new(),
        }
    }

    /// Skip subtrees whose maximum weight is below `weight`.
    pub fn raise_floor(&mut self, weight: u32) {
        if let Some(walk) = &mut self.walk {
            if weight > walk.traverser.min_weight() {
                walk.traverser.set_min_weight(weight);
            }
        }
    }
}

impl Iterator for FuzzyMultiwordCompletion {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(m) = self.ready.pop_front() {
                return Some(m);
            }
            let walk = self.walk.as_mut()?;
            let at = walk.advance()?;
            let depth = at.step.depth;

            while self.token_starts.last().is_some_and(|&p| depth <= p) {
                self.token_starts.pop();
            }

            if at.step.label == MULTIWORD_SEPARATOR {
                let distance = walk.rows.completion_distance(at.depth - 1);
                let spaces = self.prefix_spaces + self.token_starts.len();
                if spaces + 1 != self.tokens || distance > self.max_distance {
                    walk.traverser.prune();
                    continue;
                }
                self.boundary = depth;
                self.boundary_distance = distance;
            } else if depth <= self.boundary {
                self.boundary = 0;
            }

            if self.boundary == 0 {
                if at.step.label == b' ' {
                    self.token_starts.push(depth);
                    if self.prefix_spaces + self.token_starts.len() >= self.tokens {
                        walk.traverser.prune();
                        continue;
                    }
                }
                let distance = walk.rows.completion_distance(at.depth);
                if distance > self.max_distance
                    && walk.rows.min_in_row(at.depth) > self.max_distance
                {
                    walk.traverser.prune();
                    continue;
                }
            }
            if !at.boundary {
                continue;
            }

            let dictionary = walk.traverser.dictionary();
            let Some(state) = dictionary.automaton().state(at.step.state) else {
                continue;
            };
            if !state.is_final() {
                continue;
            }
            if self.boundary > 0 {
                let matched = display_text(walk.traverser.path(), Some(self.boundary)).to_vec();
                emit(&mut self.ready, dictionary, &state, &matched, Some(self.boundary_distance));
            } else {
                let distance = walk.rows.completion_distance(at.depth);
                let spaces = self.prefix_spaces + self.token_starts.len();
                if distance <= self.max_distance && spaces + 1 == self.tokens {
                    let key = walk.key(&self.prefix);
                    emit(&mut self.ready, dictionary, &state, &key, Some(distance));
                }
            }
        }
    }
}
