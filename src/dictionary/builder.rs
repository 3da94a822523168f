//! Streaming construction of a minimized automaton from sorted keys.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::automaton::{encode_state, StateId};
use crate::error::{DictionaryError, Result};
use crate::value::ValueHandle;

/// Bytes charged per registry entry on top of its record.
const REGISTRY_ENTRY_OVERHEAD: usize = 64;
const MIN_REGISTRY_BYTES: usize = 1 << 20;

/// A state on the active path that can still gain edges.
#[derive(Debug, Default)]
struct UnfrozenState {
    edges: Vec<(u8, StateId)>,
    is_final: bool,
    values: SmallVec<[u64; 1]>,
    max_weight: u32,
}

/// Maps encoded records (states here, value payloads in the value store) to
/// the offset they were written at.
///
/// Two generations bound the memory use: once the current generation holds
/// `budget` bytes it becomes the previous one and the old previous generation
/// is dropped. A record evicted this way may be written twice, which costs
/// space but never correctness.
pub(crate) struct BoundedRegistry<V> {
    current: FxHashMap<Vec<u8>, V>,
    previous: FxHashMap<Vec<u8>, V>,
    current_bytes: usize,
    budget: usize,
}

impl<V: Copy> BoundedRegistry<V> {
    pub fn new(budget: usize) -> Self {
        BoundedRegistry {
            current: FxHashMap::default(),
            previous: FxHashMap::default(),
            current_bytes: 0,
            budget,
        }
    }

    pub fn get(&mut self, record: &[u8]) -> Option<V> {
        if let Some(&id) = self.current.get(record) {
            return Some(id);
        }
        let id = self.previous.remove(record)?;
        self.insert(record.to_vec(), id);
        Some(id)
    }

    pub fn insert(&mut self, record: Vec<u8>, id: V) {
        if self.current_bytes >= self.budget {
            self.previous = std::mem::take(&mut self.current);
            self.current_bytes = 0;
        }
        self.current_bytes += record.len() + REGISTRY_ENTRY_OVERHEAD;
        self.current.insert(record, id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.current.len() + self.previous.len()
    }
}

/// The serialized automaton produced by [`FsaBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltAutomaton {
    /// Automaton section bytes.
    pub bytes: Vec<u8>,
    /// Offset of the start state.
    pub start_state: StateId,
    /// Number of distinct keys inserted.
    pub number_of_keys: u64,
    /// Number of state records written.
    pub number_of_states: u64,
}

/// Builds a minimized acyclic automaton from keys given in sorted order.
///
/// Keys share prefixes through the active path; when a key diverges from its
/// predecessor the suffix of the predecessor is frozen bottom-up, and each
/// frozen state is replaced by an equivalent one already written if one
/// exists.
pub struct FsaBuilder {
    output: Vec<u8>,
    registry: BoundedRegistry<StateId>,
    minimize: bool,
    prev_key: Vec<u8>,
    active_path: Vec<UnfrozenState>,
    number_of_keys: u64,
    number_of_states: u64,
    scratch: Vec<u8>,
}

impl FsaBuilder {
    /// Create a builder whose registry stays roughly within `memory_limit`.
    pub fn new(memory_limit: usize, minimize: bool) -> Self {
        let budget = memory_limit.max(MIN_REGISTRY_BYTES);
        FsaBuilder {
            output: Vec::new(),
            registry: BoundedRegistry::new(budget),
            minimize,
            prev_key: Vec::new(),
            active_path: vec![UnfrozenState::default()],
            number_of_keys: 0,
            number_of_states: 0,
            scratch: Vec::new(),
        }
    }

    /// Add `key` with the values stored on its terminal state.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Usage`] if `key` is not strictly greater than the
    /// previous key, or if the automaton outgrows 32-bit state offsets.
    pub fn insert(&mut self, key: &[u8], values: &[ValueHandle]) -> Result<()> {
        if self.number_of_keys > 0 && key <= self.prev_key.as_slice() {
            return Err(DictionaryError::usage(
                "keys must be inserted in strictly increasing order",
            ));
        }

        let common_prefix_len = self
            .prev_key
            .iter()
            .zip(key.iter())
            .take_while(|(a, b)| a == b)
            .count();

        self.freeze(common_prefix_len)?;

        for _ in common_prefix_len..key.len() {
            self.active_path.push(UnfrozenState::default());
        }

        let weight = values.iter().map(|h| h.weight).max().unwrap_or(0);
        for state in &mut self.active_path {
            state.max_weight = state.max_weight.max(weight);
        }

        if let Some(last) = self.active_path.last_mut() {
            last.is_final = true;
            last.values = values.iter().map(|h| h.value_ref).collect();
        }

        self.prev_key.clear();
        self.prev_key.extend_from_slice(key);
        self.number_of_keys += 1;
        Ok(())
    }

    /// Freeze everything and return the serialized automaton.
    pub fn build(mut self) -> Result<BuiltAutomaton> {
        self.freeze(0)?;
        let root = self
            .active_path
            .pop()
            .ok_or_else(|| DictionaryError::state("builder lost its root state"))?;
        let start_state = self.write_state(&root, false)?;

        tracing::debug!(
            keys = self.number_of_keys,
            states = self.number_of_states,
            bytes = self.output.len(),
            "automaton built"
        );

        Ok(BuiltAutomaton {
            bytes: self.output,
            start_state,
            number_of_keys: self.number_of_keys,
            number_of_states: self.number_of_states,
        })
    }

    /// Freeze the active path down to `down_to_len` labels.
    fn freeze(&mut self, down_to_len: usize) -> Result<()> {
        let keep_len = down_to_len + 1;

        while self.active_path.len() > keep_len {
            let depth = self.active_path.len() - 1;
            let child = match self.active_path.pop() {
                Some(child) => child,
                None => break,
            };
            let id = self.write_state(&child, self.minimize)?;
            let label = self.prev_key[depth - 1];
            if let Some(parent) = self.active_path.last_mut() {
                parent.edges.push((label, id));
            }
        }
        Ok(())
    }

    fn write_state(&mut self, state: &UnfrozenState, share: bool) -> Result<StateId> {
        let mut record = std::mem::take(&mut self.scratch);
        record.clear();
        encode_state(
            state.is_final,
            &state.values,
            state.max_weight,
            &state.edges,
            &mut record,
        );

        if share {
            if let Some(id) = self.registry.get(&record) {
                self.scratch = record;
                return Ok(id);
            }
        }

        let id = StateId::try_from(self.output.len()).map_err(|_| {
            DictionaryError::usage("automaton exceeds the 4 GiB state address space")
        })?;
        self.output.extend_from_slice(&record);
        self.number_of_states += 1;

        if share {
            self.registry.insert(record.clone(), id);
        }
        self.scratch = record;
        Ok(id)
    }
}
