//! On-disk container for compiled dictionaries.
//!
//! ```text
//! +---------------------------+
//! | header (80 bytes)         |  magic, version, flavor, start state,
//! |                           |  key count, section lengths, header CRC32
//! +---------------------------+
//! | automaton section         |
//! | value store section       |
//! | manifest section          |  opaque caller bytes
//! | statistics section        |  JSON
//! | extensions section        |  JSON, may be empty
//! +---------------------------+
//! | footer (8 bytes)          |  CRC32 of everything above, "TCDF"
//! +---------------------------+
//! ```
//!
//! All integers are little-endian. Opening a file checks the header and the
//! footer and that the section lengths account for every byte, so truncated
//! or padded files are rejected before any section is read.

use std::fs::File;
use std::io::{self, Write};
use std::ops::{Deref, Range};
use std::path::Path;
use std::str::FromStr;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{DictionaryError, IoResultExt, Result};
use crate::value::{ValueStoreKind, ValueStoreWriter};

pub mod varint;

/// File magic.
pub const MAGIC: [u8; 8] = *b"FSADICT\0";

/// Footer magic.
pub const FOOTER_MAGIC: [u8; 4] = *b"TCDF";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 80;

/// Size of the footer.
pub const FOOTER_SIZE: usize = 8;

const HEADER_CRC_OFFSET: usize = 72;

/// How an artifact is brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingStrategy {
    /// Memory-map the file and let pages load on first access. Structural
    /// checks run at open; the payload checksum is not verified.
    #[default]
    Lazy,
    /// Read the whole file into memory and verify the payload checksum.
    Populate,
}

impl FromStr for LoadingStrategy {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lazy" | "mmap" => Ok(LoadingStrategy::Lazy),
            "populate" | "eager" => Ok(LoadingStrategy::Populate),
            other => Err(DictionaryError::usage(format!(
                "unknown loading strategy '{}'",
                other
            ))),
        }
    }
}

/// Lengths of the variable-size sections, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionLengths {
    /// Automaton section.
    pub automaton: u64,
    /// Value store section.
    pub values: u64,
    /// Manifest section.
    pub manifest: u64,
    /// Statistics section.
    pub statistics: u64,
    /// Extensions section.
    pub extensions: u64,
}

impl SectionLengths {
    fn as_array(&self) -> [u64; 5] {
        [
            self.automaton,
            self.values,
            self.manifest,
            self.statistics,
            self.extensions,
        ]
    }

    fn total(&self) -> Option<u64> {
        self.as_array()
            .iter()
            .try_fold(0u64, |acc, &len| acc.checked_add(len))
    }
}

/// The fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version.
    pub version: u16,
    /// Value store flavor.
    pub kind: ValueStoreKind,
    /// Offset of the start state inside the automaton section.
    pub start_state: u64,
    /// Number of keys.
    pub number_of_keys: u64,
    /// Section lengths.
    pub sections: SectionLengths,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&MAGIC);
        out[8..10].copy_from_slice(&self.version.to_le_bytes());
        out[10] = self.kind.code();
        out[16..24].copy_from_slice(&self.start_state.to_le_bytes());
        out[24..32].copy_from_slice(&self.number_of_keys.to_le_bytes());
        for (i, len) in self.sections.as_array().iter().enumerate() {
            let at = 32 + i * 8;
            out[at..at + 8].copy_from_slice(&len.to_le_bytes());
        }
        let crc = crc32fast::hash(&out[..HEADER_CRC_OFFSET]);
        out[HEADER_CRC_OFFSET..HEADER_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DictionaryError::format("file is too short to be a dictionary"));
        }
        if bytes[0..8] != MAGIC {
            return Err(DictionaryError::format("not a dictionary file (bad magic)"));
        }
        let version = u16::from_le_bytes([bytes[8], bytes[9]]);
        if version != FORMAT_VERSION {
            return Err(DictionaryError::format(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        let stored_crc = read_u32(&bytes[HEADER_CRC_OFFSET..]);
        if crc32fast::hash(&bytes[..HEADER_CRC_OFFSET]) != stored_crc {
            return Err(DictionaryError::format("header checksum mismatch"));
        }
        let kind = ValueStoreKind::from_code(bytes[10]).ok_or_else(|| {
            DictionaryError::format(format!("unknown value store type {}", bytes[10]))
        })?;

        let sections = SectionLengths {
            automaton: read_u64(&bytes[32..]),
            values: read_u64(&bytes[40..]),
            manifest: read_u64(&bytes[48..]),
            statistics: read_u64(&bytes[56..]),
            extensions: read_u64(&bytes[64..]),
        };

        Ok(Header {
            version,
            kind,
            start_state: read_u64(&bytes[16..]),
            number_of_keys: read_u64(&bytes[24..]),
            sections,
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Section contents handed to [`write_artifact`].
pub(crate) struct ArtifactSections<'a> {
    pub automaton: &'a [u8],
    pub values: &'a ValueStoreWriter,
    pub manifest: &'a [u8],
    pub statistics: &'a [u8],
    pub extensions: &'a [u8],
}

/// Hashes everything written through it.
struct ChecksumWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write a complete artifact to `writer`.
pub(crate) fn write_artifact<W: Write>(
    writer: W,
    kind: ValueStoreKind,
    start_state: u64,
    number_of_keys: u64,
    sections: &ArtifactSections<'_>,
) -> io::Result<()> {
    let header = Header {
        version: FORMAT_VERSION,
        kind,
        start_state,
        number_of_keys,
        sections: SectionLengths {
            automaton: sections.automaton.len() as u64,
            values: sections.values.section_len(),
            manifest: sections.manifest.len() as u64,
            statistics: sections.statistics.len() as u64,
            extensions: sections.extensions.len() as u64,
        },
    };

    let mut out = ChecksumWriter {
        inner: writer,
        hasher: crc32fast::Hasher::new(),
    };
    out.write_all(&header.encode())?;
    out.write_all(sections.automaton)?;
    sections.values.write_section(&mut out)?;
    out.write_all(sections.manifest)?;
    out.write_all(sections.statistics)?;
    out.write_all(sections.extensions)?;

    let ChecksumWriter { mut inner, hasher } = out;
    inner.write_all(&hasher.finalize().to_le_bytes())?;
    inner.write_all(&FOOTER_MAGIC)?;
    inner.flush()
}

/// Bytes backing an opened artifact.
enum Backing {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mmap(map) => map,
            Backing::Owned(bytes) => bytes,
        }
    }
}

/// A validated artifact and the byte ranges of its sections.
pub struct Artifact {
    data: Backing,
    header: Header,
    automaton: Range<usize>,
    values: Range<usize>,
    manifest: Range<usize>,
    statistics: Range<usize>,
    extensions: Range<usize>,
}

impl Artifact {
    /// Open and validate the artifact at `path`.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Io`] if the file cannot be read,
    /// [`DictionaryError::Format`] if it is not a well-formed artifact.
    pub fn open(path: impl AsRef<Path>, strategy: LoadingStrategy) -> Result<Self> {
        let path = path.as_ref();
        match strategy {
            LoadingStrategy::Lazy => {
                let file = File::open(path).with_path(path)?;
                let len = file.metadata().with_path(path)?.len();
                if len < (HEADER_SIZE + FOOTER_SIZE) as u64 {
                    return Err(DictionaryError::format(format!(
                        "{} is too short to be a dictionary ({} bytes)",
                        path.display(),
                        len
                    )));
                }
                // The mapping stays valid only while nobody rewrites the
                // file in place; compiled artifacts are immutable.
                let map = unsafe { Mmap::map(&file) }.with_path(path)?;
                tracing::debug!(path = %path.display(), bytes = len, "memory-mapped dictionary");
                Self::validate(Backing::Mmap(map), false)
            }
            LoadingStrategy::Populate => {
                let bytes = std::fs::read(path).with_path(path)?;
                tracing::debug!(path = %path.display(), bytes = bytes.len(), "loaded dictionary");
                Self::validate(Backing::Owned(bytes), true)
            }
        }
    }

    /// Validate an in-memory artifact, including its checksum.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::validate(Backing::Owned(bytes), true)
    }

    fn validate(data: Backing, verify_checksum: bool) -> Result<Self> {
        let len = data.len();
        if len < HEADER_SIZE + FOOTER_SIZE {
            return Err(DictionaryError::format(format!(
                "file is too short to be a dictionary ({} bytes)",
                len
            )));
        }
        let header = Header::decode(&data)?;

        let expected = header
            .sections
            .total()
            .and_then(|total| total.checked_add((HEADER_SIZE + FOOTER_SIZE) as u64))
            .ok_or_else(|| DictionaryError::format("section lengths overflow"))?;
        if expected != len as u64 {
            return Err(DictionaryError::format(format!(
                "file is {} bytes but its header describes {} bytes (truncated or corrupt)",
                len, expected
            )));
        }

        let footer = &data[len - FOOTER_SIZE..];
        if footer[4..] != FOOTER_MAGIC {
            return Err(DictionaryError::format("missing footer (truncated file)"));
        }
        if verify_checksum {
            let stored = read_u32(footer);
            let actual = crc32fast::hash(&data[..len - FOOTER_SIZE]);
            if stored != actual {
                return Err(DictionaryError::format(format!(
                    "checksum mismatch (stored {:08x}, computed {:08x})",
                    stored, actual
                )));
            }
        }

        // Lengths sum to less than the file size, so these conversions hold.
        let mut cursor = HEADER_SIZE;
        let mut next = |len: u64| {
            let start = cursor;
            cursor += len as usize;
            start..cursor
        };
        let automaton = next(header.sections.automaton);
        let values = next(header.sections.values);
        let manifest = next(header.sections.manifest);
        let statistics = next(header.sections.statistics);
        let extensions = next(header.sections.extensions);

        if header.start_state >= automaton.len() as u64 {
            return Err(DictionaryError::format(
                "start state lies outside the automaton section",
            ));
        }

        Ok(Artifact {
            data,
            header,
            automaton,
            values,
            manifest,
            statistics,
            extensions,
        })
    }

    /// The decoded header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Automaton section.
    pub fn automaton(&self) -> &[u8] {
        &self.data[self.automaton.clone()]
    }

    /// Value store section.
    pub fn values(&self) -> &[u8] {
        &self.data[self.values.clone()]
    }

    /// Manifest section.
    pub fn manifest(&self) -> &[u8] {
        &self.data[self.manifest.clone()]
    }

    /// Statistics section.
    pub fn statistics(&self) -> &[u8] {
        &self.data[self.statistics.clone()]
    }

    /// Extensions section.
    pub fn extensions(&self) -> &[u8] {
        &self.data[self.extensions.clone()]
    }

    /// Total size in bytes.
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }
}
