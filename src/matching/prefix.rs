//! Exact prefix completion.

use std::collections::VecDeque;

use super::{matches_at, Match};
use crate::dictionary::traverser::{StateTraverser, WeightOrder};
use crate::dictionary::{Dictionary, StateId};

/// Keys that start with a query, heaviest subtrees first.
///
/// The key equal to the query, if present, comes first. Call
/// [`PrefixCompletion::raise_floor`] during iteration to skip subtrees whose
/// maximum weight can no longer beat the results collected so far.
pub struct PrefixCompletion {
    traverser: Option<StateTraverser<WeightOrder>>,
    prefix: Vec<u8>,
    ready: VecDeque<Match>,
}

impl PrefixCompletion {
    pub(crate) fn new(dictionary: Dictionary, start: StateId, query: &[u8]) -> Self {
        let automaton = dictionary.automaton();
        let Some(state) = automaton
            .walk(start, query)
            .and_then(|id| automaton.state(id))
        else {
            return Self::empty();
        };

        let ready = if state.is_final() {
            matches_at(&dictionary, &state, query, 0.0).into_iter().collect()
        } else {
            VecDeque::new()
        };
        let id = state.id();

        PrefixCompletion {
            traverser: Some(StateTraverser::new(dictionary, id, WeightOrder)),
            prefix: query.to_vec(),
            ready,
        }
    }

    pub(crate) fn empty() -> Self {
        PrefixCompletion {
            traverser: None,
            prefix: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    /// Skip subtrees whose maximum weight is below `weight`.
    ///
    /// The floor only ever rises; a lower value is ignored.
    pub fn raise_floor(&mut self, weight: u32) {
        if let Some(traverser) = &mut self.traverser {
            if weight > traverser.min_weight() {
                traverser.set_min_weight(weight);
            }
        }
    }
}

impl Iterator for PrefixCompletion {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(m) = self.ready.pop_front() {
                return Some(m);
            }
            let traverser = self.traverser.as_mut()?;
            let step = traverser.next()?;
            let dictionary = traverser.dictionary();
            let Some(state) = dictionary.automaton().state(step.state) else {
                continue;
            };
            if state.is_final() {
                let mut key = self.prefix.clone();
                key.extend_from_slice(traverser.path());
                self.ready.extend(matches_at(dictionary, &state, &key, 0.0));
            }
        }
    }
}
