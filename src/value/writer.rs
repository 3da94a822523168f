use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use super::compression::compress;
use super::reader::{ValueStoreInfo, PREAMBLE_SIZE};
use super::{Value, ValueHandle, ValueStoreKind};
use crate::config::{CompilerParams, Compression, FloatMode};
use crate::dictionary::builder::BoundedRegistry;
use crate::dictionary::statistics::ValueStoreStatistics;
use crate::error::{DictionaryError, IoResultExt, Result};
use crate::serialization::varint::encode_varint;

const MIN_DEDUP_BYTES: usize = 1 << 20;

/// Payload bytes written so far: a spilled prefix in an anonymous temporary
/// file and an in-memory tail of at most `limit` bytes.
struct PayloadBuffer {
    tail: Vec<u8>,
    spill: Option<File>,
    spilled_len: u64,
    limit: usize,
    temporary_path: PathBuf,
}

impl PayloadBuffer {
    fn new(limit: usize, temporary_path: PathBuf) -> Self {
        PayloadBuffer {
            tail: Vec::new(),
            spill: None,
            spilled_len: 0,
            limit,
            temporary_path,
        }
    }

    fn len(&self) -> u64 {
        self.spilled_len + self.tail.len() as u64
    }

    fn append(&mut self, record: &[u8]) -> Result<()> {
        encode_varint(record.len() as u64, &mut self.tail);
        self.tail.extend_from_slice(record);
        if self.tail.len() >= self.limit {
            self.spill_tail()?;
        }
        Ok(())
    }

    fn spill_tail(&mut self) -> Result<()> {
        let file = match self.spill.take() {
            Some(file) => file,
            None => tempfile::tempfile_in(&self.temporary_path).with_path(&self.temporary_path)?,
        };
        let file = self.spill.insert(file);
        file.write_all(&self.tail).with_path(&self.temporary_path)?;
        self.spilled_len += self.tail.len() as u64;
        self.tail.clear();
        Ok(())
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if let Some(mut file) = self.spill.as_ref() {
            file.seek(SeekFrom::Start(0))?;
            let copied = io::copy(&mut file.take(self.spilled_len), writer)?;
            if copied != self.spilled_len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "spilled value payloads were truncated",
                ));
            }
        }
        writer.write_all(&self.tail)
    }
}

/// Accumulates encoded payloads while a dictionary is being compiled.
///
/// Records are appended to one buffer that spills to a temporary file once
/// it outgrows a quarter of `memory_limit`. With minimization enabled a
/// record that is byte-identical to a recent one reuses its offset.
pub struct ValueStoreWriter {
    info: ValueStoreInfo,
    payload: PayloadBuffer,
    dedup: BoundedRegistry<u64>,
    scratch: Vec<u8>,
}

impl ValueStoreWriter {
    /// Create a writer for `kind`.
    ///
    /// # Errors
    ///
    /// The float-vector flavor requires `vector_size`.
    pub fn new(kind: ValueStoreKind, params: &CompilerParams) -> Result<Self> {
        let vector_size = match (kind, params.vector_size) {
            (ValueStoreKind::FloatVector, None) | (ValueStoreKind::FloatVector, Some(0)) => {
                return Err(DictionaryError::usage(
                    "float_vector dictionaries need a positive vector_size",
                ))
            }
            (_, size) => size.unwrap_or(0),
        };
        let vector_size = u32::try_from(vector_size)
            .map_err(|_| DictionaryError::usage("vector_size does not fit in 32 bits"))?;
        let compression_threshold = u32::try_from(params.compression_threshold)
            .map_err(|_| DictionaryError::usage("compression_threshold does not fit in 32 bits"))?;

        Ok(ValueStoreWriter {
            info: ValueStoreInfo {
                kind,
                compression: params.compression,
                float_mode: params.float_mode,
                minimization: params.minimization,
                vector_size,
                compression_threshold,
                value_count: 0,
            },
            payload: PayloadBuffer::new(params.memory_limit / 4, params.temporary_path.clone()),
            dedup: BoundedRegistry::new((params.memory_limit / 4).max(MIN_DEDUP_BYTES)),
            scratch: Vec::new(),
        })
    }

    /// Flavor of this store.
    pub fn kind(&self) -> ValueStoreKind {
        self.info.kind
    }

    /// Encode `value` and return the handle the automaton stores for it.
    ///
    /// # Errors
    ///
    /// [`DictionaryError::Usage`] if `value` does not fit the flavor.
    pub fn add(&mut self, value: &Value) -> Result<ValueHandle> {
        match (self.info.kind, value) {
            (ValueStoreKind::KeyOnly, Value::None) => Ok(ValueHandle::default()),
            (ValueStoreKind::Int, Value::Int(n)) => Ok(ValueHandle {
                value_ref: *n,
                weight: 0,
            }),
            (ValueStoreKind::IntWithWeights, Value::Int(n)) => Ok(ValueHandle {
                value_ref: *n,
                weight: u32::try_from(*n).unwrap_or(u32::MAX),
            }),
            (ValueStoreKind::String, Value::String(s)) => self.add_body(s.as_bytes()),
            (ValueStoreKind::Json, Value::Json(v)) => {
                let body = self.encode_json(v)?;
                self.add_body(&body)
            }
            (ValueStoreKind::Json, Value::String(text)) => {
                // Text that is not JSON is kept as a JSON string.
                let parsed = serde_json::from_str::<serde_json::Value>(text)
                    .unwrap_or_else(|_| serde_json::Value::String(text.clone()));
                let body = self.encode_json(&parsed)?;
                self.add_body(&body)
            }
            (ValueStoreKind::FloatVector, Value::FloatVector(v)) => {
                if v.len() != self.info.vector_size as usize {
                    return Err(DictionaryError::usage(format!(
                        "float vector of length {} does not match vector_size {}",
                        v.len(),
                        self.info.vector_size
                    )));
                }
                let body: Vec<u8> = v.iter().flat_map(|f| f.to_le_bytes()).collect();
                self.add_body(&body)
            }
            (kind, value) => Err(DictionaryError::usage(format!(
                    "{:?} is not a valid value for a {} dictionary",
                    value, kind
                ))),
        }
    }

    /// Copy a record produced by another store of the same flavor.
    ///
    /// `record` is `codec | bytes` as returned by
    /// [`ValueStoreReader::record`]; integer flavors pass the slot through.
    pub fn add_record(&mut self, value_ref: u64, record: Option<&[u8]>) -> Result<ValueHandle> {
        match record {
            Some(record) if self.info.kind.has_payload() => self.push_record(record),
            _ => Ok(ValueHandle {
                value_ref,
                weight: if self.info.kind.is_weighted() {
                    u32::try_from(value_ref).unwrap_or(u32::MAX)
                } else {
                    0
                },
            }),
        }
    }

    /// Count `values` handles that ended up on a key of the automaton.
    /// Values superseded before reaching the automaton are not counted.
    pub fn count_stored(&mut self, values: usize) {
        self.info.value_count += values as u64;
    }

    fn encode_json(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let result = if self.info.float_mode == FloatMode::Single {
            ciborium::into_writer(&to_single_precision(value), &mut body)
        } else {
            ciborium::into_writer(value, &mut body)
        };
        result.map_err(|e| DictionaryError::Codec(format!("cbor: {}", e)))?;
        Ok(body)
    }

    fn add_body(&mut self, body: &[u8]) -> Result<ValueHandle> {
        let mut record = std::mem::take(&mut self.scratch);
        record.clear();

        let threshold = self.info.compression_threshold as usize;
        if self.info.compression != Compression::None && body.len() >= threshold {
            let packed = compress(self.info.compression, body)?;
            if packed.len() < body.len() {
                record.push(self.info.compression.code());
                record.extend_from_slice(&packed);
            }
        }
        if record.is_empty() {
            record.push(Compression::None.code());
            record.extend_from_slice(body);
        }

        let handle = self.push_record(&record);
        self.scratch = record;
        handle
    }

    fn push_record(&mut self, record: &[u8]) -> Result<ValueHandle> {
        if self.info.minimization {
            if let Some(offset) = self.dedup.get(record) {
                return Ok(ValueHandle {
                    value_ref: offset,
                    weight: 0,
                });
            }
        }

        let offset = self.payload.len();
        self.payload.append(record)?;

        if self.info.minimization {
            self.dedup.insert(record.to_vec(), offset);
        }
        Ok(ValueHandle {
            value_ref: offset,
            weight: 0,
        })
    }

    /// Size of the section [`ValueStoreWriter::write_section`] produces.
    pub fn section_len(&self) -> u64 {
        PREAMBLE_SIZE as u64 + self.payload.len()
    }

    /// Write the preamble followed by the payload records.
    pub fn write_section<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.info.preamble())?;
        self.payload.write_to(writer)
    }

    /// Statistics for the report.
    pub fn statistics(&self) -> ValueStoreStatistics {
        self.info.statistics(self.payload.len())
    }

    /// Drop the dedup table once no more values will be added.
    pub fn seal(&mut self) {
        self.dedup = BoundedRegistry::new(0);
        self.scratch = Vec::new();
    }
}

fn to_single_precision(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Json::Number(n) if n.is_f64() => n
            .as_f64()
            .and_then(|f| serde_json::Number::from_f64(f64::from(f as f32)))
            .map(Json::Number)
            .unwrap_or_else(|| value.clone()),
        Json::Array(items) => Json::Array(items.iter().map(to_single_precision).collect()),
        Json::Object(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_single_precision(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
