//! PackStream serialization format.
//!
//! PackStream is the self-describing binary format Bolt uses for message
//! payloads. Every value starts with a marker byte; composite values carry
//! their size in the marker or in a following big-endian size field.
//!
//! # Value Families
//!
//! - **Null**, **Boolean**, **Float** (64-bit IEEE 754)
//! - **Integer**: smallest of tiny / 8 / 16 / 32 / 64-bit form
//! - **String**, **Bytes**: length-prefixed, strings are UTF-8
//! - **List**, **Map**: maps are keyed by strings
//! - **Structure**: tag byte plus up to 65535 fields
//!
//! Structures stay untyped at this layer apart from the graph wrappers in
//! [`structures`]; temporal and spatial structures are hydrated by the
//! driver's value model.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod structures;
pub mod types;

pub use decoder::{decode, PackStreamDecoder, MAX_NESTING_DEPTH};
pub use encoder::{encode, PackStreamEncoder};
pub use marker::*;
pub use structures::{
    Fields, PackStreamNode, PackStreamPath, PackStreamRelationship, PackStreamUnboundRelationship,
};
pub use types::{PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Unexpected end of input
    UnexpectedEof,
    /// Unknown marker byte
    UnknownMarker(u8),
    /// Invalid UTF-8 in string
    InvalidUtf8(String),
    /// Invalid map key (must be string)
    InvalidMapKey,
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Invalid structure format
    InvalidStructure(String),
    /// Structure tag with no known meaning
    UnknownTag(u8),
    /// Bytes left over after a complete value
    TrailingBytes(usize),
    /// Containers nested deeper than the decoder accepts
    NestingTooDeep(usize),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(t, s) => write!(f, "{} too large: {} entries", t, s),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
            PackStreamError::UnknownTag(tag) => write!(f, "Unknown structure tag: 0x{:02X}", tag),
            PackStreamError::TrailingBytes(n) => {
                write!(f, "{} trailing bytes after PackStream value", n)
            }
            PackStreamError::NestingTooDeep(limit) => {
                write!(f, "PackStream value nested deeper than {} levels", limit)
            }
        }
    }
}

impl std::error::Error for PackStreamError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn round_trip(value: &PackStreamValue) -> PackStreamValue {
        let bytes = encode(value).unwrap();
        decode(&bytes).unwrap()
    }

    #[test]
    fn test_integer_boundaries() {
        for v in [
            0i64,
            -16,
            -17,
            127,
            128,
            -128,
            -129,
            32_767,
            32_768,
            -32_769,
            2_147_483_647,
            2_147_483_648,
            i64::MAX,
            i64::MIN,
        ] {
            let value = PackStreamValue::Integer(v);
            assert_eq!(round_trip(&value), value, "integer {}", v);
        }
    }

    #[test]
    fn test_string_size_boundaries() {
        for len in [0usize, 15, 16, 255, 256, 65_535, 65_536] {
            let value = PackStreamValue::String("s".repeat(len));
            assert_eq!(round_trip(&value), value, "string of {} bytes", len);
        }
    }

    #[test]
    fn test_nested_values() {
        let mut inner = HashMap::new();
        inner.insert(
            "items".to_string(),
            PackStreamValue::List(vec![1i64.into(), 2.5f64.into(), PackStreamValue::Null]),
        );
        inner.insert("blob".to_string(), PackStreamValue::Bytes(vec![0, 1, 255]));

        let value = PackStreamValue::List(vec![
            PackStreamValue::Map(inner.clone()),
            PackStreamStructure::new(0x01, vec![PackStreamValue::Map(inner)]).into(),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn test_graph_structures_survive_the_wire() {
        let mut props = HashMap::new();
        props.insert("name".to_string(), PackStreamValue::String("Alice".into()));
        let node = PackStreamNode::new(1, vec!["Person".to_string()], props);

        let decoded = round_trip(&node.to_value());
        assert_eq!(PackStreamNode::from_value(&decoded).unwrap(), node);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            PackStreamError::UnknownTag(0x7A).to_string(),
            "Unknown structure tag: 0x7A"
        );
        assert_eq!(
            PackStreamError::TrailingBytes(3).to_string(),
            "3 trailing bytes after PackStream value"
        );
    }
}
