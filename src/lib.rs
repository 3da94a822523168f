//! # fsadict
//!
//! Immutable key-value dictionaries stored as minimized finite-state
//! automata.
//!
//! A dictionary is compiled once from key/value pairs given in any order,
//! written to a single file, and then memory-mapped for reading. Keys are
//! byte strings; values live in one of several value stores (key-only,
//! integers, weighted integers, strings, JSON, float vectors). Besides exact
//! lookups the automaton supports prefix completion, approximate matching
//! under the Damerau-Levenshtein distance, multiword completion and near
//! matching, all as lazy iterators.
//!
//! ## Example
//!
//! ```rust
//! use fsadict::prelude::*;
//!
//! # fn main() -> fsadict::Result<()> {
//! let mut compiler = DictionaryCompiler::new(ValueStoreKind::IntWithWeights, CompilerParams::default())?;
//! compiler.add("mozart", 30u64)?;
//! compiler.add("mozzarella", 80u64)?;
//! compiler.add("monday", 10u64)?;
//! compiler.compile()?;
//!
//! let mut bytes = Vec::new();
//! compiler.write(&mut bytes)?;
//! let dict = Dictionary::from_bytes(bytes)?;
//!
//! let completions: Vec<String> = dict.complete_prefix("moz").map(|m| m.matched_string()).collect();
//! assert_eq!(completions, vec!["mozzarella", "mozart"]);
//!
//! let fuzzy: Vec<String> = dict.complete_fuzzy("mozat", 1, 2).map(|m| m.matched_string()).collect();
//! assert_eq!(fuzzy, vec!["mozart"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod config;
pub mod dictionary;
pub mod distance;
pub mod error;
pub mod matching;
pub mod merger;
pub mod secondary_key;
pub mod serialization;
mod sort;
pub mod value;

/// Command-line front end
#[cfg(feature = "cli")]
pub mod cli;

pub use compiler::DictionaryCompiler;
pub use config::{CompilerParams, Compression, FloatMode, MergeMode};
pub use dictionary::{Dictionary, Statistics};
pub use error::{DictionaryError, Result};
pub use matching::{Attribute, Match};
pub use merger::{DictionaryMerger, MergeStats};
pub use secondary_key::{SecondaryKeyDictionary, SecondaryKeyDictionaryCompiler};
pub use serialization::LoadingStrategy;
pub use value::{Value, ValueStoreKind};

/// Common imports for convenient usage
pub mod prelude {
    pub use crate::compiler::DictionaryCompiler;
    pub use crate::config::{CompilerParams, Compression, FloatMode, MergeMode};
    pub use crate::dictionary::{Dictionary, Statistics};
    pub use crate::error::{DictionaryError, Result};
    pub use crate::matching::{
        top_n, Attribute, FuzzyCompletion, FuzzyMatching, FuzzyMultiwordCompletion, Match,
        MultiwordCompletion, NearMatching, PrefixCompletion, WeightFloor,
    };
    pub use crate::merger::{DictionaryMerger, MergeStats};
    pub use crate::secondary_key::{SecondaryKeyDictionary, SecondaryKeyDictionaryCompiler};
    pub use crate::serialization::LoadingStrategy;
    pub use crate::value::{Value, ValueStoreKind};
}
