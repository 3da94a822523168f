//! Match results and the matchers that produce them.
//!
//! Every matcher is a lazy iterator of [`Match`]. Matchers hold a clone of
//! the dictionary handle, so they are independent of the borrow that created
//! them.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

use crate::dictionary::{Dictionary, State};
use crate::error::Result;
use crate::value::Value;

pub mod fuzzy;
pub mod lookup;
pub mod multiword;
pub mod near;
pub mod prefix;
pub mod top_n;

pub use fuzzy::{FuzzyCompletion, FuzzyMatching};
pub use lookup::LookupText;
pub use multiword::{bag_of_words_partial, FuzzyMultiwordCompletion, MultiwordCompletion};
pub use near::NearMatching;
pub use prefix::PrefixCompletion;
pub use top_n::{top_n, WeightFloor};

/// Separator between the sortable part of a multiword key and its display
/// text.
pub const MULTIWORD_SEPARATOR: u8 = 0x1B;

/// A matcher-specific attribute attached to a [`Match`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Integer attribute.
    Int(i64),
    /// Floating-point attribute.
    Float(f64),
    /// String attribute.
    Str(String),
    /// Boolean attribute.
    Bool(bool),
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Int(n) => write!(f, "{}", n),
            Attribute::Float(x) => write!(f, "{}", x),
            Attribute::Str(s) => f.write_str(s),
            Attribute::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One result of a lookup or matcher.
#[derive(Clone)]
pub struct Match {
    start: usize,
    end: usize,
    matched: Vec<u8>,
    score: f64,
    weight: u32,
    value: Option<(Dictionary, u64)>,
    attributes: BTreeMap<String, Attribute>,
}

impl Match {
    pub(crate) fn new(
        matched: Vec<u8>,
        score: f64,
        weight: u32,
        value: Option<(Dictionary, u64)>,
    ) -> Self {
        Match {
            start: 0,
            end: matched.len(),
            matched,
            score,
            weight,
            value,
            attributes: BTreeMap::new(),
        }
    }

    pub(crate) fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub(crate) fn set_attribute(&mut self, name: &str, value: Attribute) {
        self.attributes.insert(name.to_string(), value);
    }

    /// Matched key bytes.
    pub fn matched(&self) -> &[u8] {
        &self.matched
    }

    /// Matched key, with invalid UTF-8 replaced.
    pub fn matched_string(&self) -> String {
        String::from_utf8_lossy(&self.matched).into_owned()
    }

    /// Start offset in the input text.
    pub fn start(&self) -> usize {
        self.start
    }

    /// End offset in the input text.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Matcher-specific score; edit distance for fuzzy matchers.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Ranking weight of the value, 0 for unweighted dictionaries.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Raw slot reference, if the match refers to a stored value.
    pub fn value_ref(&self) -> Option<u64> {
        self.value.as_ref().map(|(_, r)| *r)
    }

    /// Decode the value.
    ///
    /// Returns [`Value::None`] for matches that carry no value.
    pub fn value(&self) -> Result<Value> {
        match &self.value {
            Some((dictionary, value_ref)) => dictionary.values().decode(*value_ref),
            None => Ok(Value::None),
        }
    }

    /// Decode the value and render it as text.
    pub fn value_as_string(&self) -> Result<String> {
        self.value().map(|v| v.to_display_string())
    }

    /// Attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// All attributes.
    pub fn attributes(&self) -> &BTreeMap<String, Attribute> {
        &self.attributes
    }
}

impl fmt::Debug for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Match")
            .field("matched", &self.matched_string())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("score", &self.score)
            .field("weight", &self.weight)
            .field("value_ref", &self.value_ref())
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl PartialEq for Match {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start
            && self.end == other.end
            && self.matched == other.matched
            && self.score == other.score
            && self.weight == other.weight
            && self.value_ref() == other.value_ref()
            && self.attributes == other.attributes
    }
}

/// One match per value stored on `state`, oldest first.
pub(crate) fn matches_at(
    dictionary: &Dictionary,
    state: &State<'_>,
    matched: &[u8],
    score: f64,
) -> SmallVec<[Match; 1]> {
    let weighted = dictionary.is_weighted();
    state
        .values()
        .map(|value_ref| {
            let weight = if weighted {
                u32::try_from(value_ref).unwrap_or(u32::MAX)
            } else {
                0
            };
            Match::new(
                matched.to_vec(),
                score,
                weight,
                Some((dictionary.clone(), value_ref)),
            )
        })
        .collect()
}
