//! External-memory sorting of compiler input.
//!
//! Entries are buffered until the estimated buffer size reaches the memory
//! limit; the buffer is then sorted in parallel and spilled to an anonymous
//! temporary file as a run of bincode records. Runs are tiered: once
//! [`MERGE_FAN_IN`] runs of one level pile up they are merged into a single
//! run of the next level, which bounds the number of open files.
//! [`ExternalSorter::finish`] merges the remaining runs and the in-memory
//! tail with a binary heap.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};
use crate::value::ValueHandle;

/// Bookkeeping bytes charged per buffered entry on top of its key.
const ENTRY_OVERHEAD: usize = std::mem::size_of::<SortEntry>() + 16;

/// Runs of one level merged together into a run of the next level.
pub(crate) const MERGE_FAN_IN: usize = 16;

/// One compiler input: a key, its insertion sequence number and the handle
/// of its already-encoded value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SortEntry {
    pub key: Vec<u8>,
    pub seq: u64,
    pub handle: ValueHandle,
}

impl SortEntry {
    fn cost(&self) -> usize {
        self.key.len() + ENTRY_OVERHEAD
    }
}

impl Ord for SortEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for SortEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Run {
    reader: BufReader<File>,
    remaining: u64,
    level: u32,
}

/// Writes one sorted run to an anonymous temporary file.
struct RunWriter<'a> {
    path: &'a Path,
    writer: BufWriter<File>,
    entries: u64,
}

impl<'a> RunWriter<'a> {
    fn new(path: &'a Path) -> Result<Self> {
        let file = tempfile::tempfile_in(path).with_path(path)?;
        Ok(RunWriter {
            path,
            writer: BufWriter::new(file),
            entries: 0,
        })
    }

    fn push(&mut self, entry: &SortEntry) -> Result<()> {
        bincode::serialize_into(&mut self.writer, entry)?;
        self.entries += 1;
        Ok(())
    }

    fn finish(mut self, level: u32) -> Result<Run> {
        self.writer.flush().with_path(self.path)?;
        let mut file = self
            .writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_path(self.path)?;
        file.seek(SeekFrom::Start(0)).with_path(self.path)?;
        Ok(Run {
            reader: BufReader::new(file),
            remaining: self.entries,
            level,
        })
    }
}

/// Sorts entries by `(key, seq)` within a memory budget.
pub(crate) struct ExternalSorter {
    memory_limit: usize,
    temporary_path: PathBuf,
    buffer: Vec<SortEntry>,
    buffered_bytes: usize,
    runs: Vec<Run>,
    spilled: usize,
    len: u64,
}

impl ExternalSorter {
    pub fn new(memory_limit: usize, temporary_path: impl Into<PathBuf>) -> Self {
        ExternalSorter {
            memory_limit,
            temporary_path: temporary_path.into(),
            buffer: Vec::new(),
            buffered_bytes: 0,
            runs: Vec::new(),
            spilled: 0,
            len: 0,
        }
    }

    /// Number of entries pushed.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Number of runs spilled to disk so far.
    pub fn spilled_runs(&self) -> usize {
        self.spilled
    }

    /// Runs currently held open, after tiered merging.
    #[cfg(test)]
    pub fn open_runs(&self) -> usize {
        self.runs.len()
    }

    pub fn push(&mut self, entry: SortEntry) -> Result<()> {
        self.buffered_bytes += entry.cost();
        self.buffer.push(entry);
        self.len += 1;
        if self.buffered_bytes >= self.memory_limit {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.par_sort_unstable();

        let mut writer = RunWriter::new(&self.temporary_path)?;
        for entry in &self.buffer {
            writer.push(entry)?;
        }
        self.runs.push(writer.finish(0)?);
        self.spilled += 1;

        tracing::debug!(
            entries = self.buffer.len(),
            bytes = self.buffered_bytes,
            run = self.spilled,
            "spilled sorted run"
        );
        self.buffer.clear();
        self.buffered_bytes = 0;
        self.merge_full_levels()
    }

    /// Merge trailing runs while [`MERGE_FAN_IN`] of them share a level.
    /// Levels never increase towards the end of `runs`.
    fn merge_full_levels(&mut self) -> Result<()> {
        while let Some(level) = self.runs.last().map(|run| run.level) {
            let same_level = self
                .runs
                .iter()
                .rev()
                .take_while(|run| run.level == level)
                .count();
            if same_level < MERGE_FAN_IN {
                break;
            }

            let batch = self.runs.split_off(self.runs.len() - same_level);
            let mut writer = RunWriter::new(&self.temporary_path)?;
            for entry in SortedEntries::new(batch.into_iter().map(Source::Run).collect())? {
                writer.push(&entry?)?;
            }
            let merged = writer.finish(level + 1)?;
            tracing::debug!(
                level = level + 1,
                entries = merged.remaining,
                "merged sorted runs"
            );
            self.runs.push(merged);
        }
        Ok(())
    }

    /// Stop accepting entries and return them in `(key, seq)` order.
    pub fn finish(mut self) -> Result<SortedEntries> {
        self.buffer.par_sort_unstable();
        let mut sources: Vec<Source> = self.runs.into_iter().map(Source::Run).collect();
        sources.push(Source::Memory(self.buffer.into_iter()));
        SortedEntries::new(sources)
    }
}

enum Source {
    Run(Run),
    Memory(std::vec::IntoIter<SortEntry>),
}

impl Source {
    fn next_entry(&mut self) -> Result<Option<SortEntry>> {
        match self {
            Source::Memory(entries) => Ok(entries.next()),
            Source::Run(run) if run.remaining == 0 => Ok(None),
            Source::Run(run) => {
                run.remaining -= 1;
                Ok(Some(bincode::deserialize_from(&mut run.reader)?))
            }
        }
    }
}

#[derive(PartialEq, Eq)]
struct HeapItem {
    entry: SortEntry,
    source: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry.cmp(&other.entry)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merged output of an [`ExternalSorter`].
pub(crate) struct SortedEntries {
    sources: Vec<Source>,
    heap: BinaryHeap<Reverse<HeapItem>>,
}

impl SortedEntries {
    fn new(mut sources: Vec<Source>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(entry) = source.next_entry()? {
                heap.push(Reverse(HeapItem { entry, source: index }));
            }
        }
        Ok(SortedEntries { sources, heap })
    }
}

impl Iterator for SortedEntries {
    type Item = Result<SortEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(HeapItem { entry, source }) = self.heap.pop()?;
        match self.sources[source].next_entry() {
            Ok(Some(next)) => self.heap.push(Reverse(HeapItem {
                entry: next,
                source,
            })),
            Ok(None) => {}
            Err(e) => return Some(Err(e)),
        }
        Some(Ok(entry))
    }
}
