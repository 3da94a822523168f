//! Dictionaries partitioned by secondary keys.
//!
//! Every entry carries a value for each configured secondary key (a user id,
//! a language, ...). Each distinct secondary value is replaced by a varint id
//! and the ids are prefixed to the primary key, so all entries sharing the
//! same secondary values live under one state of the automaton. Queries walk
//! that prefix first and then run the ordinary matchers from there.
//!
//! Id 1 stands for an empty value; real values are numbered from 2 in the
//! order they are first seen. Varints are prefix-free, so the prefix for one
//! filter never matches the start of another.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::compiler::DictionaryCompiler;
use crate::config::CompilerParams;
use crate::dictionary::{Dictionary, StateId};
use crate::error::{DictionaryError, Result};
use crate::matching::{
    matches_at, FuzzyCompletion, Match, MultiwordCompletion, PrefixCompletion,
};
use crate::serialization::varint::encode_varint;
use crate::serialization::LoadingStrategy;
use crate::value::{Value, ValueStoreKind};

const EMPTY_VALUE_ID: u64 = 1;
const FIRST_VALUE_ID: u64 = 2;

/// Secondary-key metadata stored in the extensions section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SecondaryKeyTable {
    secondary_keys: Vec<String>,
    replacements: BTreeMap<String, u64>,
}

fn encoded_id(id: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    encode_varint(id, &mut out);
    out
}

/// Compiles a [`SecondaryKeyDictionary`].
pub struct SecondaryKeyDictionaryCompiler {
    compiler: DictionaryCompiler,
    table: SecondaryKeyTable,
    next_id: u64,
}

impl SecondaryKeyDictionaryCompiler {
    /// Create a compiler for entries partitioned by `secondary_keys`.
    pub fn new<I, S>(kind: ValueStoreKind, secondary_keys: I, params: CompilerParams) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(SecondaryKeyDictionaryCompiler {
            compiler: DictionaryCompiler::new(kind, params)?,
            table: SecondaryKeyTable {
                secondary_keys: secondary_keys.into_iter().map(Into::into).collect(),
                replacements: BTreeMap::new(),
            },
            next_id: FIRST_VALUE_ID,
        })
    }

    /// Add `key` under the given secondary values.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Usage`] if `secondary` lacks one of the configured
    /// secondary keys; otherwise as [`DictionaryCompiler::add`].
    pub fn add(
        &mut self,
        key: impl AsRef<[u8]>,
        secondary: &HashMap<String, String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let mut full_key = Vec::new();
        for name in &self.table.secondary_keys {
            let secondary_value = secondary.get(name).ok_or_else(|| {
                DictionaryError::usage(format!("missing value for secondary key '{}'", name))
            })?;
            let id = if secondary_value.is_empty() {
                EMPTY_VALUE_ID
            } else if let Some(&id) = self.table.replacements.get(secondary_value) {
                id
            } else {
                let id = self.next_id;
                self.next_id += 1;
                self.table.replacements.insert(secondary_value.clone(), id);
                id
            };
            encode_varint(id, &mut full_key);
        }
        full_key.extend_from_slice(key.as_ref());
        self.compiler.add(full_key, value)
    }

    /// See [`DictionaryCompiler::set_manifest`].
    pub fn set_manifest(&mut self, manifest: impl Into<Vec<u8>>) -> Result<()> {
        self.compiler.set_manifest(manifest)
    }

    /// See [`DictionaryCompiler::compile`].
    pub fn compile(&mut self) -> Result<()> {
        self.compiler.compile()
    }

    fn store_table(&mut self) -> Result<()> {
        let extensions = serde_json::to_vec(&self.table)?;
        self.compiler.set_extensions(extensions);
        Ok(())
    }

    /// See [`DictionaryCompiler::write`].
    pub fn write<W: std::io::Write>(&mut self, writer: W) -> Result<()> {
        self.store_table()?;
        self.compiler.write(writer)
    }

    /// See [`DictionaryCompiler::write_to_file`].
    pub fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.store_table()?;
        self.compiler.write_to_file(path)
    }
}

/// A dictionary compiled by [`SecondaryKeyDictionaryCompiler`].
///
/// Every query takes a filter mapping secondary key names to values. A
/// missing or empty filter value selects entries whose secondary value was
/// empty; a value never seen at compile time selects nothing.
#[derive(Debug, Clone)]
pub struct SecondaryKeyDictionary {
    dictionary: Dictionary,
    secondary_keys: Vec<String>,
    replacements: FxHashMap<String, Vec<u8>>,
}

impl SecondaryKeyDictionary {
    /// Open a secondary-key dictionary with the default loading strategy.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_dictionary(Dictionary::open(path)?)
    }

    /// Open a secondary-key dictionary with the given loading strategy.
    pub fn open_with(path: impl AsRef<Path>, strategy: LoadingStrategy) -> Result<Self> {
        Self::from_dictionary(Dictionary::open_with(path, strategy)?)
    }

    /// Wrap an opened dictionary.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Format`] if it carries no secondary-key table.
    pub fn from_dictionary(dictionary: Dictionary) -> Result<Self> {
        if dictionary.extensions().is_empty() {
            return Err(DictionaryError::format(
                "not a secondary-key dictionary (no extensions section)",
            ));
        }
        let table: SecondaryKeyTable = serde_json::from_slice(dictionary.extensions())
            .map_err(|e| DictionaryError::format(format!("corrupt secondary-key table: {}", e)))?;
        let replacements = table
            .replacements
            .into_iter()
            .map(|(value, id)| (value, encoded_id(id)))
            .collect();
        Ok(SecondaryKeyDictionary {
            dictionary,
            secondary_keys: table.secondary_keys,
            replacements,
        })
    }

    /// Names of the secondary keys, in prefix order.
    pub fn secondary_keys(&self) -> &[String] {
        &self.secondary_keys
    }

    /// The underlying dictionary, whose keys include the id prefix.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Total number of entries across all partitions.
    pub fn len(&self) -> usize {
        self.dictionary.len()
    }

    /// True if no entries were compiled.
    pub fn is_empty(&self) -> bool {
        self.dictionary.is_empty()
    }

    /// Opaque manifest bytes.
    pub fn manifest(&self) -> &[u8] {
        self.dictionary.manifest()
    }

    fn filter_prefix(&self, filter: &HashMap<String, String>) -> Option<Vec<u8>> {
        let mut prefix = Vec::new();
        for name in &self.secondary_keys {
            match filter.get(name).filter(|v| !v.is_empty()) {
                None => encode_varint(EMPTY_VALUE_ID, &mut prefix),
                Some(value) => prefix.extend_from_slice(self.replacements.get(value)?),
            }
        }
        Some(prefix)
    }

    /// State below which the entries selected by `filter` live.
    fn partition(&self, filter: &HashMap<String, String>) -> Option<StateId> {
        let prefix = self.filter_prefix(filter)?;
        let automaton = self.dictionary.automaton();
        automaton.walk(automaton.start_state(), &prefix)
    }

    /// True if `key` exists in the partition selected by `filter`.
    pub fn contains(&self, key: impl AsRef<[u8]>, filter: &HashMap<String, String>) -> bool {
        self.get(key, filter).is_some()
    }

    /// Exact lookup within the partition selected by `filter`.
    pub fn get(&self, key: impl AsRef<[u8]>, filter: &HashMap<String, String>) -> Option<Match> {
        let key = key.as_ref();
        let automaton = self.dictionary.automaton();
        let state = automaton.walk(self.partition(filter)?, key)?;
        let state = automaton.state(state).filter(|s| s.is_final())?;
        matches_at(&self.dictionary, &state, key, 0.0).into_iter().last()
    }

    /// See [`Dictionary::complete_prefix`].
    pub fn complete_prefix(
        &self,
        query: impl AsRef<[u8]>,
        filter: &HashMap<String, String>,
    ) -> PrefixCompletion {
        match self.partition(filter) {
            Some(start) => PrefixCompletion::new(self.dictionary.clone(), start, query.as_ref()),
            None => PrefixCompletion::empty(),
        }
    }

    /// See [`Dictionary::complete_multiword`].
    pub fn complete_multiword(
        &self,
        query: &str,
        filter: &HashMap<String, String>,
    ) -> MultiwordCompletion {
        match self.partition(filter) {
            Some(start) => MultiwordCompletion::new(self.dictionary.clone(), start, query),
            None => MultiwordCompletion::empty(),
        }
    }

    /// See [`Dictionary::complete_fuzzy`].
    pub fn complete_fuzzy(
        &self,
        query: &str,
        max_distance: u32,
        minimum_exact_prefix: usize,
        filter: &HashMap<String, String>,
    ) -> FuzzyCompletion {
        match self.partition(filter) {
            Some(start) => FuzzyCompletion::new(
                self.dictionary.clone(),
                start,
                query,
                max_distance,
                minimum_exact_prefix,
            ),
            None => FuzzyCompletion::empty(),
        }
    }
}
