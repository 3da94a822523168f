//! Turning key/value pairs into a dictionary artifact.
//!
//! ```rust,no_run
//! use fsadict::{CompilerParams, Dictionary, DictionaryCompiler, ValueStoreKind};
//!
//! # fn main() -> fsadict::Result<()> {
//! let mut compiler = DictionaryCompiler::new(ValueStoreKind::Int, CompilerParams::default())?;
//! compiler.add("banana", 2u64)?;
//! compiler.add("apple", 1u64)?;
//! compiler.compile()?;
//! compiler.write_to_file("fruit.fsa")?;
//!
//! let dict = Dictionary::open("fruit.fsa")?;
//! assert!(dict.contains("apple"));
//! # Ok(())
//! # }
//! ```

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::CompilerParams;
use crate::dictionary::builder::{BuiltAutomaton, FsaBuilder};
use crate::dictionary::statistics::{GeneralStatistics, PersistenceStatistics, Statistics};
use crate::error::{DictionaryError, IoResultExt, Result};
use crate::serialization::{write_artifact, ArtifactSections, FORMAT_VERSION};
use crate::sort::{ExternalSorter, SortEntry};
use crate::value::{Value, ValueHandle, ValueStoreKind, ValueStoreWriter};

/// Lifecycle of a compiler: entries are added, then compiled once, then
/// written once.
enum Phase {
    Adding(ExternalSorter),
    /// Transitional; only observed if compilation failed.
    Compiling,
    Compiled(BuiltAutomaton),
    Written(Statistics),
}

/// Builds a dictionary from entries given in any order.
///
/// Values are encoded as they are added; keys go through an external sorter
/// so input larger than `memory_limit` can be compiled. When a key is added
/// more than once, the last value wins.
pub struct DictionaryCompiler {
    kind: ValueStoreKind,
    params: CompilerParams,
    values: ValueStoreWriter,
    phase: Phase,
    next_seq: u64,
    manifest: Vec<u8>,
    extensions: Vec<u8>,
}

impl DictionaryCompiler {
    /// Create a compiler for the `kind` value store.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Usage`] if `params` do not fit `kind`, e.g. a
    /// float-vector store without `vector_size`.
    pub fn new(kind: ValueStoreKind, params: CompilerParams) -> Result<Self> {
        let values = ValueStoreWriter::new(kind, &params)?;
        let sorter = ExternalSorter::new(params.memory_limit, &params.temporary_path);
        Ok(DictionaryCompiler {
            kind,
            params,
            values,
            phase: Phase::Adding(sorter),
            next_seq: 0,
            manifest: Vec::new(),
            extensions: Vec::new(),
        })
    }

    /// Value store flavor.
    pub fn kind(&self) -> ValueStoreKind {
        self.kind
    }

    /// Add one entry.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::State`] after [`DictionaryCompiler::compile`], and
    /// [`DictionaryError::Usage`] if `value` does not fit the value store.
    pub fn add(&mut self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if !matches!(self.phase, Phase::Adding(_)) {
            return Err(DictionaryError::state("cannot add entries after compile"));
        }
        let handle = self.values.add(&value)?;
        self.push(key.as_ref(), handle)
    }

    fn push(&mut self, key: &[u8], handle: ValueHandle) -> Result<()> {
        let Phase::Adding(sorter) = &mut self.phase else {
            return Err(DictionaryError::state("cannot add entries after compile"));
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        sorter.push(SortEntry {
            key: key.to_vec(),
            seq,
            handle,
        })
    }

    /// Opaque bytes stored in the manifest section. May be called before or
    /// after `compile`, but not after `write`.
    pub fn set_manifest(&mut self, manifest: impl Into<Vec<u8>>) -> Result<()> {
        if matches!(self.phase, Phase::Written(_)) {
            return Err(DictionaryError::state("dictionary already written"));
        }
        self.manifest = manifest.into();
        Ok(())
    }

    pub(crate) fn set_extensions(&mut self, extensions: Vec<u8>) {
        self.extensions = extensions;
    }

    /// Sort the entries and build the automaton.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::State`] if called twice.
    pub fn compile(&mut self) -> Result<()> {
        let sorter = match std::mem::replace(&mut self.phase, Phase::Compiling) {
            Phase::Adding(sorter) => sorter,
            other => {
                self.phase = other;
                return Err(DictionaryError::state("dictionary already compiled"));
            }
        };

        let added = sorter.len();
        let runs = sorter.spilled_runs();
        let mut builder = FsaBuilder::new(self.params.memory_limit, self.params.minimization);
        let mut pending: Option<SortEntry> = None;

        for entry in sorter.finish()? {
            let entry = entry?;
            if let Some(previous) = pending.take() {
                if previous.key != entry.key {
                    builder.insert(&previous.key, &[previous.handle])?;
                    self.values.count_stored(1);
                }
            }
            pending = Some(entry);
        }
        if let Some(last) = pending {
            builder.insert(&last.key, &[last.handle])?;
            self.values.count_stored(1);
        }

        let automaton = builder.build()?;
        self.values.seal();
        tracing::info!(
            added,
            keys = automaton.number_of_keys,
            states = automaton.number_of_states,
            spilled_runs = runs,
            "dictionary compiled"
        );
        self.phase = Phase::Compiled(automaton);
        Ok(())
    }

    /// The statistics report the artifact will carry.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::State`] before `compile`.
    pub fn statistics(&self) -> Result<Statistics> {
        match &self.phase {
            Phase::Compiled(automaton) => Ok(self.output(automaton).statistics()),
            Phase::Written(statistics) => Ok(statistics.clone()),
            _ => Err(DictionaryError::state("dictionary not compiled yet")),
        }
    }

    fn output<'a>(&'a self, automaton: &'a BuiltAutomaton) -> Output<'a> {
        Output {
            kind: self.kind,
            minimized: self.params.minimization,
            automaton,
            values: &self.values,
            manifest: &self.manifest,
            extensions: &self.extensions,
        }
    }

    fn compiled(&self) -> Result<&BuiltAutomaton> {
        match &self.phase {
            Phase::Compiled(automaton) => Ok(automaton),
            Phase::Written(_) => Err(DictionaryError::state("dictionary already written")),
            _ => Err(DictionaryError::state("compile must be called before write")),
        }
    }

    /// Write the artifact to `writer`.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::State`] before `compile` or after a previous
    /// successful write.
    pub fn write<W: Write>(&mut self, writer: W) -> Result<()> {
        let statistics = self
            .output(self.compiled()?)
            .write(writer, Path::new("<writer>"))?;
        self.phase = Phase::Written(statistics);
        Ok(())
    }

    /// Write the artifact to `path`.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so a failed write never leaves a truncated dictionary behind.
    pub fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let statistics = self.output(self.compiled()?).write_to_file(path.as_ref())?;
        self.phase = Phase::Written(statistics);
        Ok(())
    }
}

/// Everything that goes into an artifact once the automaton is built.
pub(crate) struct Output<'a> {
    pub kind: ValueStoreKind,
    pub minimized: bool,
    pub automaton: &'a BuiltAutomaton,
    pub values: &'a ValueStoreWriter,
    pub manifest: &'a [u8],
    pub extensions: &'a [u8],
}

impl Output<'_> {
    pub fn statistics(&self) -> Statistics {
        Statistics {
            general: GeneralStatistics {
                version: FORMAT_VERSION,
                number_of_keys: self.automaton.number_of_keys,
                number_of_states: self.automaton.number_of_states,
                start_state: u64::from(self.automaton.start_state),
                minimized: self.minimized,
            },
            persistence: PersistenceStatistics {
                automaton_bytes: self.automaton.bytes.len() as u64,
                value_store_bytes: self.values.section_len(),
                manifest_bytes: self.manifest.len() as u64,
                extensions_bytes: self.extensions.len() as u64,
            },
            value_store: self.values.statistics(),
        }
    }

    /// Write to `writer`; `path` only labels I/O errors.
    pub fn write<W: Write>(&self, writer: W, path: &Path) -> Result<Statistics> {
        let statistics = self.statistics();
        let statistics_bytes = statistics.to_bytes()?;
        write_artifact(
            writer,
            self.kind,
            u64::from(self.automaton.start_state),
            self.automaton.number_of_keys,
            &ArtifactSections {
                automaton: &self.automaton.bytes,
                values: self.values,
                manifest: self.manifest,
                statistics: &statistics_bytes,
                extensions: self.extensions,
            },
        )
        .with_path(path)?;
        Ok(statistics)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<Statistics> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file = tempfile::NamedTempFile::new_in(dir).with_path(path)?;
        let statistics = self.write(BufWriter::new(file.as_file()), path)?;
        file.persist(path)
            .map_err(|e| DictionaryError::io(path, e.error))?;
        tracing::info!(path = %path.display(), keys = self.automaton.number_of_keys, "dictionary written");
        Ok(statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::Dictionary;

    fn compiled(kind: ValueStoreKind) -> DictionaryCompiler {
        let mut compiler = DictionaryCompiler::new(kind, CompilerParams::default()).unwrap();
        compiler.compile().unwrap();
        compiler
    }

    fn to_bytes(compiler: &mut DictionaryCompiler) -> Vec<u8> {
        let mut bytes = Vec::new();
        compiler.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_last_add_wins() {
        let mut compiler =
            DictionaryCompiler::new(ValueStoreKind::String, CompilerParams::default()).unwrap();
        compiler.add("k", "first").unwrap();
        compiler.add("j", "other").unwrap();
        compiler.add("k", "second").unwrap();
        compiler.compile().unwrap();
        let dict = Dictionary::from_bytes(to_bytes(&mut compiler)).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("k").unwrap().value_as_string().unwrap(), "second");
        assert_eq!(dict.statistics().value_store.values, 2);
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut compiler =
            DictionaryCompiler::new(ValueStoreKind::Int, CompilerParams::default()).unwrap();
        assert!(compiler.write(Vec::new()).unwrap_err().is_state());
        assert!(compiler.statistics().unwrap_err().is_state());

        compiler.add("a", 1u64).unwrap();
        compiler.compile().unwrap();
        assert!(compiler.add("b", 2u64).unwrap_err().is_state());
        assert!(compiler.compile().unwrap_err().is_state());

        compiler.write(Vec::new()).unwrap();
        assert!(compiler.write(Vec::new()).unwrap_err().is_state());
        assert!(compiler.set_manifest("late").unwrap_err().is_state());
    }

    #[test]
    fn test_value_flavor_mismatch_is_usage_error() {
        let mut compiler =
            DictionaryCompiler::new(ValueStoreKind::Int, CompilerParams::default()).unwrap();
        assert!(compiler.add("a", "text").unwrap_err().is_usage());
    }

    #[test]
    fn test_manifest_after_compile() {
        let mut compiler = compiled(ValueStoreKind::KeyOnly);
        compiler.set_manifest(b"{\"v\":1}".to_vec()).unwrap();
        let dict = Dictionary::from_bytes(to_bytes(&mut compiler)).unwrap();
        assert_eq!(dict.manifest(), b"{\"v\":1}");
        assert_eq!(dict.statistics().persistence.manifest_bytes, 7);
    }

    #[test]
    fn test_statistics_match_artifact() {
        let mut compiler =
            DictionaryCompiler::new(ValueStoreKind::String, CompilerParams::default()).unwrap();
        compiler.add("one", "1").unwrap();
        compiler.add("two", "2").unwrap();
        compiler.compile().unwrap();
        let before = compiler.statistics().unwrap();
        let dict = Dictionary::from_bytes(to_bytes(&mut compiler)).unwrap();
        assert_eq!(dict.statistics(), &before);
        assert_eq!(before.general.number_of_keys, 2);
        assert_eq!(before.value_store.values, 2);
    }

    #[test]
    fn test_write_into_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut compiler = compiled(ValueStoreKind::Int);
        let err = compiler
            .write_to_file(dir.path().join("missing").join("out.fsa"))
            .unwrap_err();
        assert!(err.is_io());
        // A failed write can be retried.
        compiler.write_to_file(dir.path().join("out.fsa")).unwrap();
    }

    #[test]
    fn test_spilling_compile_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<(String, u64)> =
            (0..500u64).map(|i| (format!("key{:04}", (i * 7919) % 500), i)).collect();

        let mut small = DictionaryCompiler::new(
            ValueStoreKind::Int,
            CompilerParams::default()
                .with_memory_limit(2048)
                .with_temporary_path(dir.path()),
        )
        .unwrap();
        let mut large =
            DictionaryCompiler::new(ValueStoreKind::Int, CompilerParams::default()).unwrap();
        for (key, value) in &entries {
            small.add(key, *value).unwrap();
            large.add(key, *value).unwrap();
        }
        small.compile().unwrap();
        large.compile().unwrap();

        let small = Dictionary::from_bytes(to_bytes(&mut small)).unwrap();
        let large = Dictionary::from_bytes(to_bytes(&mut large)).unwrap();
        assert_eq!(small.len(), 500);
        assert_eq!(
            small.keys().collect::<Vec<_>>(),
            large.keys().collect::<Vec<_>>()
        );
        assert_eq!(small.get_value("key0007").unwrap(), large.get_value("key0007").unwrap());
    }
}
