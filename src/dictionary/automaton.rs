//! Read-only view over the serialized automaton.
//!
//! The automaton section is a sequence of state records. A state is
//! identified by the byte offset of its record; children are always written
//! before their parents, so the start state is the last record.
//!
//! ```text
//! flags: u8                       FINAL | WEIGHTED | MULTI_VALUE
//! edge_count: varint
//! [value_count: varint]           MULTI_VALUE only
//! [value_ref: varint]*            FINAL only, value_count times (1 without MULTI_VALUE)
//! [max_weight: varint]            WEIGHTED only
//! labels: [u8; edge_count]        ascending
//! targets: [u32 LE; edge_count]
//! ```

use crate::serialization::varint::{decode_varint, encode_varint};

/// Offset of a state record inside the automaton section.
pub type StateId = u32;

pub(crate) const FLAG_FINAL: u8 = 0b0000_0001;
pub(crate) const FLAG_WEIGHTED: u8 = 0b0000_0010;
pub(crate) const FLAG_MULTI_VALUE: u8 = 0b0000_0100;

/// Below this many edges, transitions use a linear scan.
const LINEAR_SCAN_THRESHOLD: usize = 16;

/// Serialize one state record into `out`.
pub(crate) fn encode_state(
    is_final: bool,
    values: &[u64],
    max_weight: u32,
    edges: &[(u8, StateId)],
    out: &mut Vec<u8>,
) {
    let mut flags = 0;
    if is_final {
        flags |= FLAG_FINAL;
        if values.len() > 1 {
            flags |= FLAG_MULTI_VALUE;
        }
    }
    if max_weight > 0 {
        flags |= FLAG_WEIGHTED;
    }

    out.push(flags);
    encode_varint(edges.len() as u64, out);
    if is_final {
        if values.len() > 1 {
            encode_varint(values.len() as u64, out);
        }
        match values {
            [] => encode_varint(0, out),
            values => {
                for &v in values {
                    encode_varint(v, out);
                }
            }
        }
    }
    if max_weight > 0 {
        encode_varint(u64::from(max_weight), out);
    }
    out.extend(edges.iter().map(|&(label, _)| label));
    for &(_, target) in edges {
        out.extend_from_slice(&target.to_le_bytes());
    }
}

/// The automaton section of an opened dictionary.
#[derive(Clone, Copy)]
pub struct Automaton<'a> {
    bytes: &'a [u8],
    start: StateId,
}

impl<'a> Automaton<'a> {
    /// View `bytes` with the given start state.
    pub fn new(bytes: &'a [u8], start: StateId) -> Self {
        Automaton { bytes, start }
    }

    /// The start (root) state.
    pub fn start_state(&self) -> StateId {
        self.start
    }

    /// Decode the state record at `id`.
    ///
    /// Returns `None` if the record does not fit in the section.
    pub fn state(&self, id: StateId) -> Option<State<'a>> {
        State::parse(self.bytes, id)
    }

    /// Follow the transition labeled `label` out of `id`.
    #[inline]
    pub fn transition(&self, id: StateId, label: u8) -> Option<StateId> {
        self.state(id)?.transition(label)
    }

    /// Follow every byte of `key` starting at `id`.
    pub fn walk(&self, id: StateId, key: &[u8]) -> Option<StateId> {
        key.iter()
            .try_fold(id, |state, &label| self.transition(state, label))
    }

    /// Size of the automaton section in bytes.
    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// A decoded state record.
#[derive(Clone, Copy, Debug)]
pub struct State<'a> {
    id: StateId,
    flags: u8,
    value_count: usize,
    values: &'a [u8],
    max_weight: u32,
    labels: &'a [u8],
    targets: &'a [u8],
}

impl<'a> State<'a> {
    fn parse(bytes: &'a [u8], id: StateId) -> Option<Self> {
        let mut pos = id as usize;
        let flags = *bytes.get(pos)?;
        pos += 1;

        let (edge_count, used) = decode_varint(bytes.get(pos..)?)?;
        pos += used;
        let edge_count = usize::try_from(edge_count).ok().filter(|&n| n <= 256)?;

        let mut value_count = 0;
        if flags & FLAG_FINAL != 0 {
            value_count = 1;
            if flags & FLAG_MULTI_VALUE != 0 {
                let (n, used) = decode_varint(bytes.get(pos..)?)?;
                pos += used;
                value_count = usize::try_from(n).ok()?;
            }
        }
        let values_start = pos;
        for _ in 0..value_count {
            let (_, used) = decode_varint(bytes.get(pos..)?)?;
            pos += used;
        }
        let values = &bytes[values_start..pos];

        let mut max_weight = 0;
        if flags & FLAG_WEIGHTED != 0 {
            let (w, used) = decode_varint(bytes.get(pos..)?)?;
            pos += used;
            max_weight = u32::try_from(w).ok()?;
        }

        let labels = bytes.get(pos..pos + edge_count)?;
        pos += edge_count;
        let targets = bytes.get(pos..pos + edge_count * 4)?;

        Some(State {
            id,
            flags,
            value_count,
            values,
            max_weight,
            labels,
            targets,
        })
    }

    /// Offset of this state.
    pub fn id(&self) -> StateId {
        self.id
    }

    /// True if a key ends here.
    #[inline]
    pub fn is_final(&self) -> bool {
        self.flags & FLAG_FINAL != 0
    }

    /// Largest weight of any value reachable from this state.
    #[inline]
    pub fn max_weight(&self) -> u32 {
        self.max_weight
    }

    /// Number of outgoing transitions.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.labels.len()
    }

    /// Label of the `i`-th transition.
    #[inline]
    pub fn label(&self, i: usize) -> u8 {
        self.labels[i]
    }

    /// Target of the `i`-th transition.
    #[inline]
    pub fn target(&self, i: usize) -> StateId {
        let b = &self.targets[i * 4..i * 4 + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Follow the transition labeled `label`.
    #[inline]
    pub fn transition(&self, label: u8) -> Option<StateId> {
        let index = if self.labels.len() < LINEAR_SCAN_THRESHOLD {
            self.labels.iter().position(|&l| l == label)?
        } else {
            self.labels.binary_search(&label).ok()?
        };
        Some(self.target(index))
    }

    /// Outgoing transitions in label order.
    pub fn edges(&self) -> impl Iterator<Item = (u8, StateId)> + '_ {
        (0..self.edge_count()).map(move |i| (self.label(i), self.target(i)))
    }

    /// Number of values stored on this state (0 unless final).
    pub fn value_count(&self) -> usize {
        self.value_count
    }

    /// Slot references of the values stored on this state, oldest first.
    pub fn values(&self) -> impl Iterator<Item = u64> + 'a {
        let mut rest = self.values;
        std::iter::from_fn(move || {
            let (v, used) = decode_varint(rest)?;
            rest = &rest[used..];
            Some(v)
        })
    }

    /// The most recent value, if final.
    pub fn last_value(&self) -> Option<u64> {
        self.values().last()
    }
}
