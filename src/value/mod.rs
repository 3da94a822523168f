//! Value stores: how the payload attached to a key is encoded.
//!
//! A dictionary has exactly one value store flavor, fixed at compile time.
//! Terminal states of the automaton carry a 64-bit slot reference whose
//! meaning depends on the flavor:
//!
//! - [`ValueStoreKind::KeyOnly`]: unused
//! - [`ValueStoreKind::Int`] and [`ValueStoreKind::IntWithWeights`]: the
//!   integer itself
//! - [`ValueStoreKind::String`], [`ValueStoreKind::Json`],
//!   [`ValueStoreKind::FloatVector`]: offset of a payload record
//!
//! Payload records are `varint(len) | codec | bytes`, where `codec` is the
//! [`Compression`](crate::config::Compression) code that produced `bytes`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DictionaryError, Result};

pub mod compression;
mod reader;
mod writer;

pub use reader::{ValueStoreInfo, ValueStoreReader};
pub use writer::ValueStoreWriter;

/// Value store flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueStoreKind {
    /// Keys only, no payload.
    KeyOnly,
    /// Unsigned integers, no ranking weight.
    Int,
    /// Unsigned integers that double as ranking weight (completion).
    IntWithWeights,
    /// UTF-8 strings.
    String,
    /// JSON documents, stored as CBOR.
    Json,
    /// Fixed-arity vectors of f32.
    FloatVector,
}

impl ValueStoreKind {
    /// All flavors, in code order.
    pub const ALL: [ValueStoreKind; 6] = [
        ValueStoreKind::KeyOnly,
        ValueStoreKind::Int,
        ValueStoreKind::IntWithWeights,
        ValueStoreKind::String,
        ValueStoreKind::Json,
        ValueStoreKind::FloatVector,
    ];

    /// Byte stored in the artifact header.
    pub fn code(self) -> u8 {
        match self {
            ValueStoreKind::KeyOnly => 1,
            ValueStoreKind::Int => 2,
            ValueStoreKind::IntWithWeights => 3,
            ValueStoreKind::String => 4,
            ValueStoreKind::Json => 5,
            ValueStoreKind::FloatVector => 6,
        }
    }

    /// Inverse of [`ValueStoreKind::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    /// Canonical name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            ValueStoreKind::KeyOnly => "key_only",
            ValueStoreKind::Int => "int",
            ValueStoreKind::IntWithWeights => "int_with_weights",
            ValueStoreKind::String => "string",
            ValueStoreKind::Json => "json",
            ValueStoreKind::FloatVector => "float_vector",
        }
    }

    /// True if slot references point into the payload buffer.
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            ValueStoreKind::String | ValueStoreKind::Json | ValueStoreKind::FloatVector
        )
    }

    /// True if values carry a ranking weight.
    pub fn is_weighted(self) -> bool {
        self == ValueStoreKind::IntWithWeights
    }
}

impl FromStr for ValueStoreKind {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "key_only" | "keyonly" | "key" => Ok(ValueStoreKind::KeyOnly),
            "int" | "integer" => Ok(ValueStoreKind::Int),
            "int_with_weights" | "completion" | "weighted" => Ok(ValueStoreKind::IntWithWeights),
            "string" => Ok(ValueStoreKind::String),
            "json" => Ok(ValueStoreKind::Json),
            "float_vector" | "floatvector" => Ok(ValueStoreKind::FloatVector),
            other => Err(DictionaryError::usage(format!("unknown flavor '{}'", other))),
        }
    }
}

impl fmt::Display for ValueStoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No payload (key-only dictionaries).
    None,
    /// Integer payload.
    Int(u64),
    /// String payload.
    String(String),
    /// JSON payload.
    Json(serde_json::Value),
    /// Float-vector payload.
    FloatVector(Vec<f32>),
}

impl Value {
    /// Integer payload, if any.
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON payload, if any.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Float-vector payload, if any.
    pub fn as_float_vector(&self) -> Option<&[f32]> {
        match self {
            Value::FloatVector(v) => Some(v),
            _ => None,
        }
    }

    /// Render the value the way `dump` prints it.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::None => String::new(),
            Value::Int(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Json(v) => v.to_string(),
            Value::FloatVector(v) => serde_json::Value::from(
                v.iter().map(|&f| f64::from(f)).collect::<Vec<f64>>(),
            )
            .to_string(),
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(u64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::FloatVector(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

/// What the value store hands the automaton builder for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ValueHandle {
    /// Slot reference stored on the terminal state.
    pub value_ref: u64,
    /// Ranking weight, 0 for unweighted flavors.
    pub weight: u32,
}
