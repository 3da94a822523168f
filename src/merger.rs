//! Merging several compiled dictionaries into one.
//!
//! Inputs are walked in key order side by side; a binary heap picks the
//! smallest key next, and for equal keys the most recently registered input
//! first. Payload records are copied into the output value store, so values
//! are never decoded.
//!
//! An input may come with a deleted-keys sidecar, `<input>.dk`: a JSON array
//! of keys. A key listed in the sidecar of the input that would provide its
//! value is dropped from the output.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::compiler::Output;
use crate::config::{CompilerParams, MergeMode};
use crate::dictionary::builder::FsaBuilder;
use crate::dictionary::{Dictionary, KeyStates, StateId};
use crate::error::{DictionaryError, IoResultExt, Result};
use crate::value::{ValueHandle, ValueStoreWriter};

/// Counters of the last [`DictionaryMerger::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Keys in the output.
    pub number_of_keys: u64,
    /// Keys dropped because of a deleted-keys sidecar.
    pub deleted_keys: u64,
    /// Key occurrences superseded (overwrite) or joined (append) by a more
    /// recent input.
    pub updated_keys: u64,
}

struct Input {
    path: PathBuf,
    dictionary: Dictionary,
    deleted: FxHashSet<Vec<u8>>,
}

/// Path of the deleted-keys sidecar of `input`.
pub fn deleted_keys_path(input: impl AsRef<Path>) -> PathBuf {
    let mut path = input.as_ref().as_os_str().to_owned();
    path.push(".dk");
    PathBuf::from(path)
}

fn load_deleted_keys(input: &Path) -> Result<FxHashSet<Vec<u8>>> {
    let path = deleted_keys_path(input);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FxHashSet::default()),
        Err(e) => return Err(DictionaryError::io(&path, e)),
    };
    let keys: Vec<String> = serde_json::from_slice(&bytes).map_err(|e| {
        DictionaryError::format(format!("{}: not a JSON array of keys: {}", path.display(), e))
    })?;
    tracing::debug!(path = %path.display(), count = keys.len(), "loaded deleted keys");
    Ok(keys.into_iter().map(String::into_bytes).collect())
}

/// A key waiting in the merge heap.
#[derive(PartialEq, Eq)]
struct Cursor {
    key: Vec<u8>,
    state: StateId,
    input: usize,
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.input.cmp(&self.input))
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges dictionaries of the same value store flavor.
///
/// ```rust,no_run
/// use fsadict::{CompilerParams, DictionaryMerger};
///
/// # fn main() -> fsadict::Result<()> {
/// let mut merger = DictionaryMerger::new(CompilerParams::default());
/// merger.add("old.fsa")?;
/// merger.add("new.fsa")?;
/// merger.merge("merged.fsa")?;
/// println!("{} keys", merger.stats().number_of_keys);
/// # Ok(())
/// # }
/// ```
pub struct DictionaryMerger {
    params: CompilerParams,
    inputs: Vec<Input>,
    manifest: Vec<u8>,
    stats: MergeStats,
    merged: bool,
}

impl DictionaryMerger {
    /// Empty merger; `params` configure the output.
    pub fn new(params: CompilerParams) -> Self {
        DictionaryMerger {
            params,
            inputs: Vec::new(),
            manifest: Vec::new(),
            stats: MergeStats::default(),
            merged: false,
        }
    }

    /// Register an input. Later inputs take precedence over earlier ones.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Usage`] if `path` was already added or holds a
    /// different value store flavor than the first input; any error from
    /// opening the input.
    pub fn add(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let canonical = path.canonicalize().with_path(path)?;
        if self.inputs.iter().any(|input| input.path == canonical) {
            return Err(DictionaryError::usage(format!(
                "{} was added twice",
                path.display()
            )));
        }

        let dictionary = Dictionary::open(&canonical)?;
        if let Some(first) = self.inputs.first() {
            let expected = first.dictionary.value_store_kind();
            if dictionary.value_store_kind() != expected {
                return Err(DictionaryError::usage(format!(
                    "{} holds {} values but the merge is over {}",
                    path.display(),
                    dictionary.value_store_kind(),
                    expected
                )));
            }
        }
        let deleted = load_deleted_keys(path)?;

        self.inputs.push(Input {
            path: canonical,
            dictionary,
            deleted,
        });
        Ok(())
    }

    /// Manifest of the output; empty unless set.
    pub fn set_manifest(&mut self, manifest: impl Into<Vec<u8>>) {
        self.manifest = manifest.into();
    }

    /// Counters of the last merge.
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    /// Merge every registered input into `output`.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Usage`] with fewer than two inputs, raised before
    /// anything is written. [`DictionaryError::State`] if this merger has
    /// already written its output.
    pub fn merge(&mut self, output: impl AsRef<Path>) -> Result<()> {
        let output = output.as_ref();
        if self.merged {
            return Err(DictionaryError::state("merge output was already written"));
        }
        if self.inputs.len() < 2 {
            return Err(DictionaryError::usage(format!(
                "merging needs at least two inputs, got {}",
                self.inputs.len()
            )));
        }

        let first = &self.inputs[0].dictionary;
        let kind = first.value_store_kind();
        let mut params = self.params.clone();
        if params.vector_size.is_none() && first.value_store_info().vector_size > 0 {
            params.vector_size = Some(first.value_store_info().vector_size as usize);
        }
        let mut values = ValueStoreWriter::new(kind, &params)?;
        let mut builder = FsaBuilder::new(params.memory_limit, params.minimization);
        let mut stats = MergeStats::default();

        let mut cursors: Vec<KeyStates> = Vec::with_capacity(self.inputs.len());
        let mut heap = BinaryHeap::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            if input.dictionary.is_empty() {
                tracing::debug!(path = %input.path.display(), "skipping empty input");
            }
            let mut states = KeyStates::new(input.dictionary.clone());
            if let Some((key, state)) = states.next() {
                heap.push(Reverse(Cursor {
                    key,
                    state,
                    input: index,
                }));
            }
            cursors.push(states);
        }

        // Inputs holding the current key, most recent first.
        let mut group: SmallVec<[Cursor; 4]> = SmallVec::new();
        let mut handles: SmallVec<[ValueHandle; 4]> = SmallVec::new();

        while let Some(Reverse(head)) = heap.pop() {
            group.clear();
            group.push(head);
            while heap
                .peek()
                .is_some_and(|Reverse(next)| next.key == group[0].key)
            {
                if let Some(Reverse(next)) = heap.pop() {
                    group.push(next);
                }
            }

            for cursor in &group {
                if let Some((key, state)) = cursors[cursor.input].next() {
                    heap.push(Reverse(Cursor {
                        key,
                        state,
                        input: cursor.input,
                    }));
                }
            }

            let winner = &group[0];
            stats.updated_keys += (group.len() - 1) as u64;
            if self.inputs[winner.input].deleted.contains(&winner.key) {
                stats.deleted_keys += 1;
                continue;
            }

            let contributors: &[Cursor] = match self.params.merge_mode {
                MergeMode::Overwrite => &group[..1],
                MergeMode::Append => &group,
            };
            handles.clear();
            // Oldest input first.
            for cursor in contributors.iter().rev() {
                self.copy_values(cursor, &mut values, &mut handles)?;
            }
            builder.insert(&winner.key, &handles)?;
            values.count_stored(handles.len());
        }

        let automaton = builder.build()?;
        values.seal();
        stats.number_of_keys = automaton.number_of_keys;

        Output {
            kind,
            minimized: params.minimization,
            automaton: &automaton,
            values: &values,
            manifest: &self.manifest,
            extensions: &[],
        }
        .write_to_file(output)?;

        tracing::info!(
            inputs = self.inputs.len(),
            keys = stats.number_of_keys,
            updated = stats.updated_keys,
            deleted = stats.deleted_keys,
            output = %output.display(),
            "dictionaries merged"
        );
        self.stats = stats;
        self.merged = true;
        Ok(())
    }

    fn copy_values(
        &self,
        cursor: &Cursor,
        values: &mut ValueStoreWriter,
        handles: &mut SmallVec<[ValueHandle; 4]>,
    ) -> Result<()> {
        let dictionary = &self.inputs[cursor.input].dictionary;
        let state = dictionary
            .automaton()
            .state(cursor.state)
            .ok_or_else(|| DictionaryError::format("unreadable state during merge"))?;
        let reader = dictionary.values();
        let has_payload = dictionary.value_store_kind().has_payload();
        for value_ref in state.values() {
            let record = if has_payload {
                Some(reader.record(value_ref)?)
            } else {
                None
            };
            handles.push(values.add_record(value_ref, record)?);
        }
        Ok(())
    }
}
