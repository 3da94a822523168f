//! Approximate matching and completion.
//!
//! Distances are restricted Damerau-Levenshtein over Unicode codepoints. Keys
//! are stored as bytes, so the walk decodes UTF-8 along the path and only
//! advances the distance matrix when a codepoint is complete. A prefix of the
//! query is matched exactly before any edit is allowed.

use std::collections::VecDeque;

use super::{matches_at, Attribute, Match};
use crate::dictionary::traverser::{ChildOrder, LabelOrder, StateTraverser, Step, WeightOrder};
use crate::dictionary::{Dictionary, StateId};
use crate::distance::EditRows;

/// Unit assigned to bytes that do not decode as UTF-8; above any codepoint.
const INVALID_UNIT_BASE: u32 = 0x11_0000;

fn sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

fn decode_unit(sequence: &[u8]) -> u32 {
    std::str::from_utf8(sequence)
        .ok()
        .and_then(|s| s.chars().next())
        .map(u32::from)
        .unwrap_or(INVALID_UNIT_BASE + u32::from(sequence[0]))
}

/// Query codepoints, with invalid bytes mapped the way key bytes are.
pub(crate) fn query_units(query: &str) -> Vec<u32> {
    query.chars().map(u32::from).collect()
}

/// Byte length of the first `n` codepoints of `query`.
pub(crate) fn prefix_bytes(query: &str, n: usize) -> usize {
    query
        .char_indices()
        .nth(n)
        .map_or(query.len(), |(offset, _)| offset)
}

/// Decodes UTF-8 incrementally along a byte path that grows and shrinks.
#[derive(Debug, Clone)]
pub(crate) struct CodepointTracker {
    /// Complete codepoints in `path[..depth]`, indexed by byte depth.
    counts: Vec<usize>,
    /// Byte depth where the unfinished sequence at `depth` starts.
    pending: Vec<usize>,
}

impl CodepointTracker {
    pub(crate) fn new() -> Self {
        CodepointTracker {
            counts: vec![0],
            pending: vec![0],
        }
    }

    /// Account for the last byte of `path`; returns the codepoint it
    /// completes, if any.
    pub(crate) fn push(&mut self, path: &[u8]) -> Option<u32> {
        let depth = path.len();
        self.counts.truncate(depth);
        self.pending.truncate(depth);

        let start = self.pending[depth - 1];
        let sequence = &path[start..];
        if sequence.len() >= sequence_len(sequence[0]) {
            self.counts.push(self.counts[depth - 1] + 1);
            self.pending.push(depth);
            Some(decode_unit(sequence))
        } else {
            self.counts.push(self.counts[depth - 1]);
            self.pending.push(start);
            None
        }
    }

    /// Complete codepoints up to byte depth `depth`.
    pub(crate) fn codepoints(&self, depth: usize) -> usize {
        self.counts[depth]
    }
}

/// A traversal that keeps an [`EditRows`] matrix in step with the path.
pub(crate) struct FuzzyWalk<O: ChildOrder> {
    pub traverser: StateTraverser<O>,
    pub rows: EditRows,
    tracker: CodepointTracker,
    base: usize,
}

/// Where a [`FuzzyWalk`] step landed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WalkStep {
    pub step: Step,
    /// Codepoints from the dictionary root (exact prefix included).
    pub depth: usize,
    /// The step completed a codepoint.
    pub boundary: bool,
}

impl<O: ChildOrder> FuzzyWalk<O> {
    /// Walk below the state reached after `exact` query codepoints.
    pub(crate) fn new(dictionary: Dictionary, start: StateId, query: &[u32], exact: usize, order: O) -> Self {
        let mut rows = EditRows::new(query);
        for (i, &c) in query[..exact].iter().enumerate() {
            rows.push(i + 1, c);
        }
        FuzzyWalk {
            traverser: StateTraverser::new(dictionary, start, order),
            rows,
            tracker: CodepointTracker::new(),
            base: exact,
        }
    }

    pub(crate) fn advance(&mut self) -> Option<WalkStep> {
        let step = self.traverser.next()?;
        let completed = self.tracker.push(self.traverser.path());
        let depth = self.base + self.tracker.codepoints(step.depth);
        if let Some(c) = completed {
            self.rows.push(depth, c);
        }
        Some(WalkStep {
            step,
            depth,
            boundary: completed.is_some(),
        })
    }

    /// Full key bytes of the last step, given the bytes walked before it.
    pub(crate) fn key(&self, prefix: &[u8]) -> Vec<u8> {
        let mut key = prefix.to_vec();
        key.extend_from_slice(self.traverser.path());
        key
    }
}

fn with_distance(mut m: Match, distance: u32) -> Match {
    m.set_attribute("distance", Attribute::Int(i64::from(distance)));
    m
}

/// Keys with a prefix within `max_distance` edits of the query.
///
/// The score of a match is the smallest distance between the query and any
/// prefix of the key. Results for distance `d` are a subset of the results
/// for `d + 1`.
pub struct FuzzyCompletion {
    walk: Option<FuzzyWalk<WeightOrder>>,
    prefix: Vec<u8>,
    max_distance: u32,
    ready: VecDeque<Match>,
}

impl FuzzyCompletion {
    pub(crate) fn new(
        dictionary: Dictionary,
        start: StateId,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
    ) -> Self {
        let units = query_units(query);
        let exact = minimum_exact_prefix.min(units.len());
        let prefix = &query.as_bytes()[..prefix_bytes(query, exact)];

        let automaton = dictionary.automaton();
        let Some(state) = automaton.walk(start, prefix).and_then(|id| automaton.state(id)) else {
            return Self::empty();
        };
        let id = state.id();

        let walk = FuzzyWalk::new(dictionary.clone(), id, &units, exact, WeightOrder);
        let mut ready = VecDeque::new();
        let distance = walk.rows.completion_distance(exact);
        if state.is_final() && distance <= max_distance {
            ready.extend(
                matches_at(&dictionary, &state, prefix, f64::from(distance))
                    .into_iter()
                    .map(|m| with_distance(m, distance)),
            );
        }
        tracing::trace!(query, max_distance, exact, "fuzzy completion");

        FuzzyCompletion {
            walk: Some(walk),
            prefix: prefix.to_vec(),
            max_distance,
            ready,
        }
    }

    pub(crate) fn empty() -> Self {
        FuzzyCompletion {
            walk: None,
            prefix: Vec::new(),
            max_distance: 0,
            ready: VecDeque::new(),
        }
    }
}

impl Iterator for FuzzyCompletion {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(m) = self.ready.pop_front() {
                return Some(m);
            }
            let walk = self.walk.as_mut()?;
            let at = walk.advance()?;

            let distance = walk.rows.completion_distance(at.depth);
            if distance > self.max_distance {
                if walk.rows.min_in_row(at.depth) > self.max_distance {
                    walk.traverser.prune();
                }
                continue;
            }
            if !at.boundary {
                continue;
            }

            let dictionary = walk.traverser.dictionary();
            let Some(state) = dictionary.automaton().state(at.step.state) else {
                continue;
            };
            if state.is_final() {
                let key = walk.key(&self.prefix);
                self.ready.extend(
                    matches_at(dictionary, &state, &key, f64::from(distance))
                        .into_iter()
                        .map(|m| with_distance(m, distance)),
                );
            }
        }
    }
}

/// Keys within `max_distance` edits of the query as a whole.
pub struct FuzzyMatching {
    walk: Option<FuzzyWalk<LabelOrder>>,
    prefix: Vec<u8>,
    max_distance: u32,
    ready: VecDeque<Match>,
}

impl FuzzyMatching {
    pub(crate) fn new(
        dictionary: Dictionary,
        start: StateId,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
    ) -> Self {
        let units = query_units(query);
        if units.len() < minimum_exact_prefix {
            return Self::empty();
        }
        let exact = minimum_exact_prefix;
        let prefix = &query.as_bytes()[..prefix_bytes(query, exact)];

        let automaton = dictionary.automaton();
        let Some(state) = automaton.walk(start, prefix).and_then(|id| automaton.state(id)) else {
            return Self::empty();
        };
        let id = state.id();

        let walk = FuzzyWalk::new(dictionary.clone(), id, &units, exact, LabelOrder);
        let mut ready = VecDeque::new();
        let distance = walk.rows.distance(exact);
        if state.is_final() && distance <= max_distance {
            ready.extend(
                matches_at(&dictionary, &state, prefix, f64::from(distance))
                    .into_iter()
                    .map(|m| with_distance(m, distance)),
            );
        }

        FuzzyMatching {
            walk: Some(walk),
            prefix: prefix.to_vec(),
            max_distance,
            ready,
        }
    }

    fn empty() -> Self {
        FuzzyMatching {
            walk: None,
            prefix: Vec::new(),
            max_distance: 0,
            ready: VecDeque::new(),
        }
    }
}

impl Iterator for FuzzyMatching {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(m) = self.ready.pop_front() {
                return Some(m);
            }
            let walk = self.walk.as_mut()?;
            let at = walk.advance()?;

            if walk.rows.min_in_row(at.depth) > self.max_distance {
                walk.traverser.prune();
                continue;
            }
            if !at.boundary {
                continue;
            }

            let distance = walk.rows.distance(at.depth);
            if distance > self.max_distance {
                continue;
            }
            let dictionary = walk.traverser.dictionary();
            let Some(state) = dictionary.automaton().state(at.step.state) else {
                continue;
            };
            if state.is_final() {
                let key = walk.key(&self.prefix);
                self.ready.extend(
                    matches_at(dictionary, &state, &key, f64::from(distance))
                        .into_iter()
                        .map(|m| with_distance(m, distance)),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::test_support::{build, keys_of};
    use crate::value::ValueStoreKind;

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn test_tracker_decodes_multibyte() {
        let path = "añ€".as_bytes();
        let mut tracker = CodepointTracker::new();
        let mut units = Vec::new();
        for depth in 1..=path.len() {
            if let Some(c) = tracker.push(&path[..depth]) {
                units.push(char::from_u32(c).unwrap());
            }
        }
        assert_eq!(units, vec!['a', 'ñ', '€']);
        assert_eq!(tracker.codepoints(path.len()), 3);
        assert_eq!(tracker.codepoints(2), 1);
    }

    #[test]
    fn test_prefix_bytes() {
        assert_eq!(prefix_bytes("ñandu", 1), 2);
        assert_eq!(prefix_bytes("abc", 5), 3);
        assert_eq!(prefix_bytes("abc", 0), 0);
    }

    #[test]
    fn test_fuzzy_completion_with_typo() {
        let dict = build(
            ValueStoreKind::IntWithWeights,
            [("aabc", 10u64), ("aabcdef", 5), ("abc", 20), ("xyz", 1)],
        );
        let results = sorted(keys_of(dict.complete_fuzzy("aacb", 1, 2)));
        assert_eq!(results, vec!["aabc", "aabcdef"]);
        assert!(dict.complete_fuzzy("aacb", 0, 2).next().is_none());
    }

    #[test]
    fn test_fuzzy_completion_reports_distance() {
        let dict = build(ValueStoreKind::Int, [("techno fashion", 1u64)]);
        let m = dict.complete_fuzzy("tehno fa", 2, 1).next().unwrap();
        assert_eq!(m.score(), 1.0);
        assert_eq!(m.attribute("distance"), Some(&Attribute::Int(1)));
    }

    #[test]
    fn test_exact_prefix_is_required() {
        let dict = build(ValueStoreKind::Int, [("bcde", 1u64), ("abde", 2)]);
        assert_eq!(keys_of(dict.complete_fuzzy("acde", 1, 1)), vec!["abde"]);
        assert_eq!(
            sorted(keys_of(dict.complete_fuzzy("acde", 1, 0))),
            vec!["abde", "bcde"]
        );
    }

    #[test]
    fn test_match_fuzzy_whole_key() {
        let dict = build(
            ValueStoreKind::Int,
            [("house", 1u64), ("houses", 2), ("mouse", 3), ("housekeeping", 4)],
        );
        let mut results: Vec<_> = dict
            .match_fuzzy("house", 1, 1)
            .map(|m| (m.matched_string(), m.score() as u32))
            .collect();
        results.sort();
        assert_eq!(
            results,
            vec![("house".to_string(), 0), ("houses".to_string(), 1)]
        );
        assert_eq!(
            sorted(keys_of(dict.match_fuzzy("house", 1, 0))),
            vec!["house", "houses", "mouse"]
        );
        assert_eq!(dict.match_fuzzy("h", 3, 2).count(), 0);
    }

    #[test]
    fn test_unicode_distances_count_codepoints() {
        let dict = build(ValueStoreKind::Int, [("müller", 1u64), ("muller", 2)]);
        let mut results: Vec<_> = dict
            .match_fuzzy("muller", 1, 1)
            .map(|m| (m.matched_string(), m.score() as u32))
            .collect();
        results.sort();
        assert_eq!(
            results,
            vec![("muller".to_string(), 0), ("müller".to_string(), 1)]
        );
    }
}
