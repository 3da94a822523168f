use super::compression::decompress;
use super::{Value, ValueStoreKind};
use crate::config::{Compression, FloatMode};
use crate::dictionary::statistics::ValueStoreStatistics;
use crate::error::{DictionaryError, Result};
use crate::serialization::varint::decode_varint;

/// Size of the fixed preamble at the start of the value-store section.
pub(crate) const PREAMBLE_SIZE: usize = 24;

const FLAG_MINIMIZATION: u8 = 0b0000_0001;

/// Configuration recorded in the value-store preamble.
///
/// ```text
/// kind: u8 | compression: u8 | float_mode: u8 | flags: u8
/// vector_size: u32 | compression_threshold: u32 | reserved: u32
/// value_count: u64
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueStoreInfo {
    /// Flavor.
    pub kind: ValueStoreKind,
    /// Compression scheme used at compile time.
    pub compression: Compression,
    /// JSON float precision.
    pub float_mode: FloatMode,
    /// Whether identical payloads were shared.
    pub minimization: bool,
    /// Float-vector arity, 0 for other flavors.
    pub vector_size: u32,
    /// Compression threshold in bytes.
    pub compression_threshold: u32,
    /// Number of values added at compile time.
    pub value_count: u64,
}

impl ValueStoreInfo {
    pub(crate) fn preamble(&self) -> [u8; PREAMBLE_SIZE] {
        let mut out = [0u8; PREAMBLE_SIZE];
        out[0] = self.kind.code();
        out[1] = self.compression.code();
        out[2] = self.float_mode.code();
        out[3] = if self.minimization { FLAG_MINIMIZATION } else { 0 };
        out[4..8].copy_from_slice(&self.vector_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.compression_threshold.to_le_bytes());
        out[16..24].copy_from_slice(&self.value_count.to_le_bytes());
        out
    }

    pub(crate) fn from_preamble(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREAMBLE_SIZE {
            return Err(DictionaryError::format("value store section is too short"));
        }
        let kind = ValueStoreKind::from_code(bytes[0]).ok_or_else(|| {
            DictionaryError::format(format!("unknown value store type {}", bytes[0]))
        })?;
        let compression = Compression::from_code(bytes[1]).ok_or_else(|| {
            DictionaryError::format(format!("unknown compression code {}", bytes[1]))
        })?;
        let float_mode = FloatMode::from_code(bytes[2])
            .ok_or_else(|| DictionaryError::format(format!("unknown float mode {}", bytes[2])))?;

        Ok(ValueStoreInfo {
            kind,
            compression,
            float_mode,
            minimization: bytes[3] & FLAG_MINIMIZATION != 0,
            vector_size: read_u32(&bytes[4..8]),
            compression_threshold: read_u32(&bytes[8..12]),
            value_count: u64::from_le_bytes([
                bytes[16], bytes[17], bytes[18], bytes[19], bytes[20], bytes[21], bytes[22],
                bytes[23],
            ]),
        })
    }

    pub(crate) fn statistics(&self, payload_bytes: u64) -> ValueStoreStatistics {
        ValueStoreStatistics {
            value_store_type: self.kind,
            values: self.value_count,
            payload_bytes,
            compression: self.compression,
            compression_threshold: self.compression_threshold,
            float_mode: self.float_mode,
            vector_size: self.vector_size,
            minimization: self.minimization,
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Decodes slot references of an opened dictionary.
#[derive(Debug, Clone, Copy)]
pub struct ValueStoreReader<'a> {
    info: ValueStoreInfo,
    payload: &'a [u8],
}

impl<'a> ValueStoreReader<'a> {
    /// Parse a full value-store section (preamble and payload).
    pub fn parse(section: &'a [u8]) -> Result<Self> {
        let info = ValueStoreInfo::from_preamble(section)?;
        Ok(ValueStoreReader {
            info,
            payload: &section[PREAMBLE_SIZE..],
        })
    }

    pub(crate) fn with_info(info: ValueStoreInfo, section: &'a [u8]) -> Self {
        ValueStoreReader {
            info,
            payload: section.get(PREAMBLE_SIZE..).unwrap_or(&[]),
        }
    }

    /// Recorded configuration.
    pub fn info(&self) -> &ValueStoreInfo {
        &self.info
    }

    /// Raw record (`codec | bytes`) behind `value_ref`, for payload flavors.
    pub fn record(&self, value_ref: u64) -> Result<&'a [u8]> {
        let start = usize::try_from(value_ref)
            .ok()
            .filter(|&s| s < self.payload.len())
            .ok_or_else(|| {
                DictionaryError::format(format!("value reference {} out of bounds", value_ref))
            })?;
        let (len, consumed) = decode_varint(&self.payload[start..])
            .ok_or_else(|| DictionaryError::format("corrupt value record length"))?;
        let body_start = start + consumed;
        let body_end = usize::try_from(len)
            .ok()
            .and_then(|len| body_start.checked_add(len))
            .filter(|&end| end <= self.payload.len())
            .ok_or_else(|| DictionaryError::format("value record exceeds the value store"))?;
        if body_end == body_start {
            return Err(DictionaryError::format("empty value record"));
        }
        Ok(&self.payload[body_start..body_end])
    }

    /// Decode `value_ref` into a [`Value`].
    pub fn decode(&self, value_ref: u64) -> Result<Value> {
        match self.info.kind {
            ValueStoreKind::KeyOnly => Ok(Value::None),
            ValueStoreKind::Int | ValueStoreKind::IntWithWeights => Ok(Value::Int(value_ref)),
            ValueStoreKind::String => {
                let body = self.body(value_ref)?;
                String::from_utf8(body.into_owned())
                    .map(Value::String)
                    .map_err(|_| DictionaryError::format("string value is not UTF-8"))
            }
            ValueStoreKind::Json => {
                let body = self.body(value_ref)?;
                ciborium::from_reader::<serde_json::Value, _>(body.as_ref())
                    .map(Value::Json)
                    .map_err(|e| DictionaryError::format(format!("corrupt JSON value: {}", e)))
            }
            ValueStoreKind::FloatVector => {
                let body = self.body(value_ref)?;
                if body.len() != self.info.vector_size as usize * 4 {
                    return Err(DictionaryError::format(
                        "float vector length does not match vector_size",
                    ));
                }
                Ok(Value::FloatVector(
                    body.chunks_exact(4)
                        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                        .collect(),
                ))
            }
        }
    }

    /// Decode `value_ref` and render it as `dump` prints it.
    pub fn value_as_string(&self, value_ref: u64) -> Result<String> {
        self.decode(value_ref).map(|v| v.to_display_string())
    }

    fn body(&self, value_ref: u64) -> Result<std::borrow::Cow<'a, [u8]>> {
        let record = self.record(value_ref)?;
        decompress(record[0], &record[1..])
    }
}
