//! Dictionary lookups inside running text.

use super::{matches_at, Match};
use crate::dictionary::Dictionary;

/// Longest key that starts at `offset` and ends at the end of `text` or
/// right before a space.
pub(crate) fn lookup(dictionary: &Dictionary, text: &[u8], offset: usize) -> Option<Match> {
    let automaton = dictionary.automaton();
    let mut state = automaton.start_state();
    let mut longest = None;

    for (i, &byte) in text.iter().enumerate().skip(offset) {
        let Some(next) = automaton.transition(state, byte) else {
            break;
        };
        state = next;
        let at_boundary = i + 1 == text.len() || text[i + 1] == b' ';
        if at_boundary && automaton.state(state).is_some_and(|s| s.is_final()) {
            longest = Some((state, i + 1));
        }
    }

    let (state, end) = longest?;
    let state = automaton.state(state)?;
    matches_at(dictionary, &state, &text[offset..end], 0.0)
        .into_iter()
        .last()
        .map(|m| m.with_span(offset, end))
}

/// Runs [`Dictionary::lookup`] at the start of the text and after every
/// space, yielding the hits in text order.
pub struct LookupText {
    dictionary: Dictionary,
    text: Vec<u8>,
    position: Option<usize>,
}

impl LookupText {
    pub(crate) fn new(dictionary: Dictionary, text: &[u8]) -> Self {
        LookupText {
            dictionary,
            text: text.to_vec(),
            position: Some(0),
        }
    }

    fn next_word_start(&self, from: usize) -> Option<usize> {
        self.text
            .iter()
            .skip(from)
            .position(|&b| b == b' ')
            .map(|i| from + i + 1)
            .filter(|&start| start < self.text.len())
    }
}

impl Iterator for LookupText {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        loop {
            let position = self.position?;
            self.position = self.next_word_start(position);
            if let Some(m) = lookup(&self.dictionary, &self.text, position) {
                return Some(m);
            }
        }
    }
}
