//! Ordered iteration over every entry of a dictionary.
//!
//! Iteration is a depth-first walk in label order, so keys come out in
//! lexicographic byte order. Paths are copied out only for final states.

use std::collections::VecDeque;

use super::automaton::StateId;
use super::traverser::{LabelOrder, StateTraverser};
use super::Dictionary;
use crate::matching::{matches_at, Match};

/// Final states in key order, paired with their keys.
pub(crate) struct KeyStates {
    traverser: StateTraverser<LabelOrder>,
    root: Option<StateId>,
}

impl KeyStates {
    pub(crate) fn new(dictionary: Dictionary) -> Self {
        let root = dictionary.start_state();
        KeyStates {
            traverser: StateTraverser::new(dictionary, root, LabelOrder),
            root: Some(root),
        }
    }

    pub(crate) fn dictionary(&self) -> &Dictionary {
        self.traverser.dictionary()
    }
}

impl Iterator for KeyStates {
    type Item = (Vec<u8>, StateId);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            let is_final = self
                .dictionary()
                .automaton()
                .state(root)
                .is_some_and(|s| s.is_final());
            if is_final {
                return Some((Vec::new(), root));
            }
        }

        while let Some(step) = self.traverser.next() {
            let is_final = self
                .dictionary()
                .automaton()
                .state(step.state)
                .is_some_and(|s| s.is_final());
            if is_final {
                return Some((self.traverser.path().to_vec(), step.state));
            }
        }
        None
    }
}

/// Iterator over all entries, yielding one [`Match`] per stored value.
pub struct Entries {
    states: KeyStates,
    ready: VecDeque<Match>,
}

impl Entries {
    pub(crate) fn new(dictionary: Dictionary) -> Self {
        Entries {
            states: KeyStates::new(dictionary),
            ready: VecDeque::new(),
        }
    }
}

impl Iterator for Entries {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            if let Some(m) = self.ready.pop_front() {
                return Some(m);
            }
            let (key, id) = self.states.next()?;
            let dictionary = self.states.dictionary();
            if let Some(state) = dictionary.automaton().state(id) {
                self.ready
                    .extend(matches_at(dictionary, &state, &key, 0.0));
            }
        }
    }
}

/// Iterator over all keys in lexicographic byte order.
pub struct Keys {
    states: KeyStates,
}

impl Keys {
    pub(crate) fn new(dictionary: Dictionary) -> Self {
        Keys {
            states: KeyStates::new(dictionary),
        }
    }
}

impl Iterator for Keys {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        self.states.next().map(|(key, _)| key)
    }
}
