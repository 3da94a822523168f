//! Opened, read-only dictionaries.
//!
//! A [`Dictionary`] is a cheap-to-clone handle over a validated artifact.
//! Clones share the same mapping, and every matcher holds its own clone, so
//! results can outlive the borrow that produced them. The handle is
//! immutable after open and safe to share between threads.

use std::path::Path;
use std::sync::Arc;

use crate::error::{DictionaryError, Result};
use crate::matching::fuzzy::{FuzzyCompletion, FuzzyMatching};
use crate::matching::lookup::{lookup, LookupText};
use crate::matching::multiword::{FuzzyMultiwordCompletion, MultiwordCompletion};
use crate::matching::near::NearMatching;
use crate::matching::prefix::PrefixCompletion;
use crate::matching::top_n::top_n;
use crate::matching::{matches_at, Match};
use crate::serialization::{Artifact, LoadingStrategy};
use crate::value::{Value, ValueStoreInfo, ValueStoreKind, ValueStoreReader};

pub mod automaton;
pub mod builder;
mod iterator;
pub mod statistics;
pub(crate) mod traverser;

pub use automaton::{Automaton, State, StateId};
pub use iterator::{Entries, Keys};
pub use statistics::{GeneralStatistics, PersistenceStatistics, Statistics, ValueStoreStatistics};

pub(crate) use iterator::KeyStates;

struct DictionaryInner {
    artifact: Artifact,
    values: ValueStoreInfo,
    statistics: Statistics,
    start_state: StateId,
}

/// A compiled dictionary opened for reading.
#[derive(Clone)]
pub struct Dictionary {
    inner: Arc<DictionaryInner>,
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("kind", &self.value_store_kind())
            .field("keys", &self.len())
            .finish()
    }
}

impl Dictionary {
    /// Open `path` with [`LoadingStrategy::Lazy`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, LoadingStrategy::default())
    }

    /// Open `path` with an explicit loading strategy.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Io`] if the file cannot be read and
    /// [`DictionaryError::Format`] if it is not a valid dictionary.
    pub fn open_with(path: impl AsRef<Path>, strategy: LoadingStrategy) -> Result<Self> {
        let path = path.as_ref();
        let dictionary = Self::from_artifact(Artifact::open(path, strategy)?)?;
        tracing::info!(
            path = %path.display(),
            keys = dictionary.len(),
            kind = %dictionary.value_store_kind(),
            ?strategy,
            "opened dictionary"
        );
        Ok(dictionary)
    }

    /// Open an artifact held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_artifact(Artifact::from_bytes(bytes)?)
    }

    fn from_artifact(artifact: Artifact) -> Result<Self> {
        let header = *artifact.header();
        let values = ValueStoreReader::parse(artifact.values())?.info().to_owned();
        if values.kind != header.kind {
            return Err(DictionaryError::format(format!(
                "header says {} but the value store is {}",
                header.kind, values.kind
            )));
        }
        let statistics: Statistics = serde_json::from_slice(artifact.statistics())
            .map_err(|e| DictionaryError::format(format!("corrupt statistics section: {}", e)))?;

        let start_state = StateId::try_from(header.start_state)
            .map_err(|_| DictionaryError::format("start state offset out of range"))?;
        if Automaton::new(artifact.automaton(), start_state)
            .state(start_state)
            .is_none()
        {
            return Err(DictionaryError::format("start state record is corrupt"));
        }

        Ok(Dictionary {
            inner: Arc::new(DictionaryInner {
                artifact,
                values,
                statistics,
                start_state,
            }),
        })
    }

    pub(crate) fn automaton(&self) -> Automaton<'_> {
        Automaton::new(self.inner.artifact.automaton(), self.inner.start_state)
    }

    pub(crate) fn values(&self) -> ValueStoreReader<'_> {
        ValueStoreReader::with_info(self.inner.values, self.inner.artifact.values())
    }

    pub(crate) fn start_state(&self) -> StateId {
        self.inner.start_state
    }

    pub(crate) fn extensions(&self) -> &[u8] {
        self.inner.artifact.extensions()
    }

    pub(crate) fn is_weighted(&self) -> bool {
        self.inner.values.kind.is_weighted()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.inner.artifact.header().number_of_keys as usize
    }

    /// True if the dictionary has no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value store flavor.
    pub fn value_store_kind(&self) -> ValueStoreKind {
        self.inner.values.kind
    }

    /// Value store configuration recorded at compile time.
    pub fn value_store_info(&self) -> &ValueStoreInfo {
        &self.inner.values
    }

    /// The opaque manifest bytes set at compile or merge time.
    pub fn manifest(&self) -> &[u8] {
        self.inner.artifact.manifest()
    }

    /// The statistics report.
    pub fn statistics(&self) -> &Statistics {
        &self.inner.statistics
    }

    /// Size of the artifact in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.inner.artifact.len_bytes()
    }

    /// True if `key` is present.
    pub fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        let automaton = self.automaton();
        automaton
            .walk(automaton.start_state(), key.as_ref())
            .and_then(|id| automaton.state(id))
            .is_some_and(|s| s.is_final())
    }

    /// Exact lookup.
    ///
    /// For keys holding several values (append-merged dictionaries) this
    /// returns the most recent one; see [`Dictionary::get_all`].
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<Match> {
        self.get_all(key).pop()
    }

    /// Every value stored under `key`, oldest first.
    pub fn get_all(&self, key: impl AsRef<[u8]>) -> Vec<Match> {
        let key = key.as_ref();
        let automaton = self.automaton();
        automaton
            .walk(automaton.start_state(), key)
            .and_then(|id| automaton.state(id))
            .filter(|s| s.is_final())
            .map(|state| matches_at(self, &state, key, 0.0).into_vec())
            .unwrap_or_default()
    }

    /// Decoded value of `key`, if present.
    pub fn get_value(&self, key: impl AsRef<[u8]>) -> Result<Option<Value>> {
        self.get(key).map(|m| m.value()).transpose()
    }

    /// All entries in lexicographic key order.
    pub fn entries(&self) -> Entries {
        Entries::new(self.clone())
    }

    /// All keys in lexicographic order.
    pub fn keys(&self) -> Keys {
        Keys::new(self.clone())
    }

    /// Longest key starting at `offset` in `text` that ends at the end of
    /// `text` or right before a space.
    pub fn lookup(&self, text: impl AsRef<[u8]>, offset: usize) -> Option<Match> {
        lookup(self, text.as_ref(), offset)
    }

    /// [`Dictionary::lookup`] at every word start of `text`.
    pub fn lookup_text(&self, text: impl AsRef<[u8]>) -> LookupText {
        LookupText::new(self.clone(), text.as_ref())
    }

    /// Every key that starts with `query`, heaviest subtrees first.
    pub fn complete_prefix(&self, query: impl AsRef<[u8]>) -> PrefixCompletion {
        PrefixCompletion::new(self.clone(), self.start_state(), query.as_ref())
    }

    /// The `n` heaviest keys starting with `query`, heaviest first.
    pub fn complete_prefix_top_n(&self, query: impl AsRef<[u8]>, n: usize) -> Vec<Match> {
        top_n(self.complete_prefix(query), n)
    }

    /// Every key with a prefix within `max_distance` edits of `query`.
    ///
    /// The first `minimum_exact_prefix` codepoints of `query` must match
    /// exactly.
    pub fn complete_fuzzy(
        &self,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
    ) -> FuzzyCompletion {
        FuzzyCompletion::new(
            self.clone(),
            self.start_state(),
            query,
            max_distance,
            minimum_exact_prefix,
        )
    }

    /// Every key within `max_distance` edits of `query` as a whole.
    pub fn match_fuzzy(
        &self,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
    ) -> FuzzyMatching {
        FuzzyMatching::new(
            self.clone(),
            self.start_state(),
            query,
            max_distance,
            minimum_exact_prefix,
        )
    }

    /// Completion over multiword keys, independent of the order of all but
    /// the last query token.
    pub fn complete_multiword(&self, query: &str) -> MultiwordCompletion {
        MultiwordCompletion::new(self.clone(), self.start_state(), query)
    }

    /// The `n` heaviest multiword completions of `query`, heaviest first.
    pub fn complete_multiword_top_n(&self, query: &str, n: usize) -> Vec<Match> {
        top_n(self.complete_multiword(query), n)
    }

    /// [`Dictionary::complete_multiword`] with approximate matching.
    pub fn complete_fuzzy_multiword(
        &self,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
    ) -> FuzzyMultiwordCompletion {
        FuzzyMultiwordCompletion::new(
            self.clone(),
            self.start_state(),
            query,
            max_distance,
            minimum_exact_prefix,
        )
    }

    /// Keys sharing the longest prefix with `query`, given that at least
    /// `minimum_exact_prefix` bytes match.
    ///
    /// Non-greedy matching stops after the closest group; greedy matching
    /// continues with progressively shorter shared prefixes.
    pub fn match_near(
        &self,
        query: impl AsRef<[u8]>,
        minimum_exact_prefix: usize,
        greedy: bool,
    ) -> NearMatching {
        NearMatching::new(
            self.clone(),
            self.start_state(),
            query.as_ref(),
            minimum_exact_prefix,
            greedy,
        )
    }
}
