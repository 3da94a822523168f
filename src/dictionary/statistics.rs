//! The statistics report stored alongside every dictionary.

use serde::{Deserialize, Serialize};

use crate::config::{Compression, FloatMode};
use crate::error::Result;
use crate::value::ValueStoreKind;

/// Statistics recorded when a dictionary is compiled or merged.
///
/// The report contains no timestamps or host information, so compiling the
/// same input with the same parameters yields a byte-identical artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Automaton-level figures.
    pub general: GeneralStatistics,
    /// Section sizes.
    pub persistence: PersistenceStatistics,
    /// Value-store figures.
    pub value_store: ValueStoreStatistics,
}

/// Automaton-level figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralStatistics {
    /// On-disk format version.
    pub version: u16,
    /// Number of keys.
    pub number_of_keys: u64,
    /// Number of state records.
    pub number_of_states: u64,
    /// Offset of the start state.
    pub start_state: u64,
    /// Whether equivalent states were shared.
    pub minimized: bool,
}

/// Sizes of the artifact sections, in bytes.
///
/// The statistics section itself is not listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistenceStatistics {
    /// Automaton section.
    pub automaton_bytes: u64,
    /// Value-store section, header included.
    pub value_store_bytes: u64,
    /// Manifest section.
    pub manifest_bytes: u64,
    /// Extensions section.
    pub extensions_bytes: u64,
}

/// Value-store figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueStoreStatistics {
    /// Flavor.
    pub value_store_type: ValueStoreKind,
    /// Number of values stored on keys of the automaton.
    pub values: u64,
    /// Size of the payload buffer.
    pub payload_bytes: u64,
    /// Compression scheme.
    pub compression: Compression,
    /// Minimum body size that is compressed.
    pub compression_threshold: u32,
    /// JSON float precision.
    pub float_mode: FloatMode,
    /// Float-vector arity, 0 for other flavors.
    pub vector_size: u32,
    /// Whether identical payloads were shared.
    pub minimization: bool,
}

impl Statistics {
    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_flavor_names() {
        let stats = Statistics {
            general: GeneralStatistics {
                version: 1,
                number_of_keys: 2,
                number_of_states: 3,
                start_state: 10,
                minimized: true,
            },
            persistence: PersistenceStatistics {
                automaton_bytes: 14,
                value_store_bytes: 24,
                manifest_bytes: 0,
                extensions_bytes: 0,
            },
            value_store: ValueStoreStatistics {
                value_store_type: ValueStoreKind::IntWithWeights,
                values: 2,
                payload_bytes: 0,
                compression: Compression::None,
                compression_threshold: 32,
                float_mode: FloatMode::Double,
                vector_size: 0,
                minimization: true,
            },
        };

        let json: serde_json::Value = serde_json::from_slice(&stats.to_bytes().unwrap()).unwrap();
        assert_eq!(json["value_store"]["value_store_type"], "int_with_weights");
        assert_eq!(json["value_store"]["compression"], "none");
        assert_eq!(json["general"]["number_of_keys"], 2);
        assert_eq!(json["persistence"]["automaton_bytes"], 14);

        let back: Statistics = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }
}
