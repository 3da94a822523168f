//! Compiler and merger parameters.
//!
//! Parameters can be built in code with the `with_*` methods or parsed from
//! `key=value` strings, which is what the command line does:
//!
//! ```rust,ignore
//! use fsadict::config::CompilerParams;
//!
//! let params = CompilerParams::parse_assignments(["compression=zstd", "memory_limit_mb=64"])?;
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DictionaryError, Result};

const DEFAULT_MEMORY_LIMIT: usize = 1024 * 1024 * 1024;
const DEFAULT_COMPRESSION_THRESHOLD: usize = 32;

/// Payload compression scheme of a value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store payloads verbatim.
    #[default]
    None,
    /// zlib via flate2.
    Zlib,
    /// Raw snappy blocks.
    Snappy,
    /// Zstandard frames.
    Zstd,
}

impl Compression {
    /// Byte written in front of every payload record.
    pub fn code(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zlib => 1,
            Compression::Snappy => 2,
            Compression::Zstd => 3,
        }
    }

    /// Inverse of [`Compression::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Compression::None),
            1 => Some(Compression::Zlib),
            2 => Some(Compression::Snappy),
            3 => Some(Compression::Zstd),
            _ => None,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zlib => "zlib",
            Compression::Snappy => "snappy",
            Compression::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" | "raw" => Ok(Compression::None),
            "zlib" | "z" => Ok(Compression::Zlib),
            "snappy" => Ok(Compression::Snappy),
            "zstd" => Ok(Compression::Zstd),
            other => Err(DictionaryError::usage(format!(
                "unknown compression scheme '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precision used for non-integral JSON numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatMode {
    /// Round to f32 before encoding.
    Single,
    /// Keep f64.
    #[default]
    Double,
}

impl FloatMode {
    pub(crate) fn code(self) -> u8 {
        match self {
            FloatMode::Single => 1,
            FloatMode::Double => 0,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(FloatMode::Double),
            1 => Some(FloatMode::Single),
            _ => None,
        }
    }
}

impl FromStr for FloatMode {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(FloatMode::Single),
            "double" => Ok(FloatMode::Double),
            other => Err(DictionaryError::usage(format!(
                "unknown float mode '{}'",
                other
            ))),
        }
    }
}

/// Conflict policy applied by the merger to keys present in several inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// The last registered input containing the key wins.
    #[default]
    Overwrite,
    /// Values from all inputs are kept side by side.
    Append,
}

impl FromStr for MergeMode {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" | "" => Ok(MergeMode::Overwrite),
            "append" => Ok(MergeMode::Append),
            other => Err(DictionaryError::usage(format!(
                "unknown merge mode '{}'",
                other
            ))),
        }
    }
}

/// Parameters for [`DictionaryCompiler`](crate::compiler::DictionaryCompiler)
/// and [`DictionaryMerger`](crate::merger::DictionaryMerger).
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerParams {
    /// Working-memory budget in bytes. The sorter spills past it, the value
    /// payload buffer past a quarter of it.
    pub memory_limit: usize,
    /// Directory for spill chunks and spilled payloads.
    pub temporary_path: PathBuf,
    /// Payload compression scheme.
    pub compression: Compression,
    /// Payloads of at least this many bytes are compressed.
    pub compression_threshold: usize,
    /// Precision of JSON floats.
    pub float_mode: FloatMode,
    /// Share storage between identical payloads.
    pub minimization: bool,
    /// Arity of float-vector values.
    pub vector_size: Option<usize>,
    /// Merge conflict policy.
    pub merge_mode: MergeMode,
}

impl Default for CompilerParams {
    fn default() -> Self {
        CompilerParams {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            temporary_path: std::env::temp_dir(),
            compression: Compression::None,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            float_mode: FloatMode::Double,
            minimization: true,
            vector_size: None,
            merge_mode: MergeMode::Overwrite,
        }
    }
}

impl CompilerParams {
    /// Default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single parameter by name.
    ///
    /// # Errors
    ///
    /// Returns [`DictionaryError::Usage`] for unknown names or values that
    /// do not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key.trim() {
            "memory_limit_mb" => {
                self.memory_limit = parse_number::<usize>(key, value)?.saturating_mul(1024 * 1024)
            }
            "memory_limit" => self.memory_limit = parse_number(key, value)?,
            "temporary_path" => self.temporary_path = PathBuf::from(value),
            "compression" => self.compression = value.parse()?,
            "compression_threshold" => self.compression_threshold = parse_number(key, value)?,
            "float_mode" => self.float_mode = value.parse()?,
            "minimization" => self.minimization = parse_bool(key, value)?,
            "vector_size" => self.vector_size = Some(parse_number(key, value)?),
            "merge_mode" => self.merge_mode = value.parse()?,
            other => {
                return Err(DictionaryError::usage(format!(
                    "unknown parameter '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Build parameters from `(name, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.set(key.as_ref(), value.as_ref())?;
        }
        Ok(params)
    }

    /// Build parameters from `name=value` assignments.
    pub fn parse_assignments<I, S>(assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::default();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (key, value) = assignment.split_once('=').ok_or_else(|| {
                DictionaryError::usage(format!(
                    "expected name=value, got '{}'",
                    assignment
                ))
            })?;
            params.set(key, value)?;
        }
        Ok(params)
    }

    /// Set the sorter budget in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Set the spill directory.
    pub fn with_temporary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.temporary_path = path.into();
        self
    }

    /// Set the compression scheme.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the compression threshold.
    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Set the JSON float precision.
    pub fn with_float_mode(mut self, mode: FloatMode) -> Self {
        self.float_mode = mode;
        self
    }

    /// Enable or disable payload sharing.
    pub fn with_minimization(mut self, minimization: bool) -> Self {
        self.minimization = minimization;
        self
    }

    /// Set the float-vector arity.
    pub fn with_vector_size(mut self, size: usize) -> Self {
        self.vector_size = Some(size);
        self
    }

    /// Set the merge conflict policy.
    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        DictionaryError::usage(format!(
            "parameter '{}' expects a non-negative integer, got '{}'",
            key, value
        ))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DictionaryError::usage(format!(
            "parameter '{}' expects a boolean, got '{}'",
            key, value
        ))),
    }
}
