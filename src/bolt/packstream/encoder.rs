//! PackStream encoder.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Marker family used when writing a size header.
struct SizedMarkers {
    kind: &'static str,
    tiny: Option<u8>,
    m8: u8,
    m16: u8,
    m32: Option<u8>,
}

const STRING_MARKERS: SizedMarkers = SizedMarkers {
    kind: "string",
    tiny: Some(TINY_STRING),
    m8: STRING_8,
    m16: STRING_16,
    m32: Some(STRING_32),
};

const BYTES_MARKERS: SizedMarkers = SizedMarkers {
    kind: "bytes",
    tiny: None,
    m8: BYTES_8,
    m16: BYTES_16,
    m32: Some(BYTES_32),
};

const LIST_MARKERS: SizedMarkers = SizedMarkers {
    kind: "list",
    tiny: Some(TINY_LIST),
    m8: LIST_8,
    m16: LIST_16,
    m32: Some(LIST_32),
};

const MAP_MARKERS: SizedMarkers = SizedMarkers {
    kind: "map",
    tiny: Some(TINY_MAP),
    m8: MAP_8,
    m16: MAP_16,
    m32: Some(MAP_32),
};

const STRUCT_MARKERS: SizedMarkers = SizedMarkers {
    kind: "structure",
    tiny: Some(TINY_STRUCT),
    m8: STRUCT_8,
    m16: STRUCT_16,
    m32: None,
};

/// PackStream encoder that appends values to a byte buffer.
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl PackStreamEncoder {
    /// Create a new encoder with default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new encoder with specified buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Consume the encoder and return the bytes.
    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Get the bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Encode any value.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => {
                self.write_header(&BYTES_MARKERS, b.len())?;
                self.buffer.put_slice(b);
            }
            PackStreamValue::String(s) => self.encode_string(s)?,
            PackStreamValue::List(items) => self.encode_list(items)?,
            PackStreamValue::Map(map) => self.encode_map(map)?,
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    /// Encode an integer using the smallest representation that fits.
    pub fn encode_int(&mut self, value: i64) {
        if fits_tiny_int(value) {
            self.buffer.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    /// Encode a UTF-8 string.
    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        self.write_header(&STRING_MARKERS, value.len())?;
        self.buffer.put_slice(value.as_bytes());
        Ok(())
    }

    /// Encode a list and all of its items.
    pub fn encode_list(&mut self, items: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.write_header(&LIST_MARKERS, items.len())?;
        items.iter().try_for_each(|item| self.encode(item))
    }

    /// Encode a map; entry order is whatever the map yields.
    pub fn encode_map(
        &mut self,
        map: &HashMap<String, PackStreamValue>,
    ) -> Result<(), PackStreamError> {
        self.write_header(&MAP_MARKERS, map.len())?;
        for (key, value) in map {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    /// Encode a tagged structure.
    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        self.write_header(&STRUCT_MARKERS, s.fields.len())?;
        self.buffer.put_u8(s.tag);
        s.fields.iter().try_for_each(|field| self.encode(field))
    }

    fn write_header(&mut self, markers: &SizedMarkers, size: usize) -> Result<(), PackStreamError> {
        match markers.tiny {
            Some(tiny) if size <= TINY_SIZE_MAX => {
                self.buffer.put_u8(tiny | size as u8);
                return Ok(());
            }
            _ => {}
        }

        if let Ok(n) = u8::try_from(size) {
            self.buffer.put_u8(markers.m8);
            self.buffer.put_u8(n);
        } else if let Ok(n) = u16::try_from(size) {
            self.buffer.put_u8(markers.m16);
            self.buffer.put_u16(n);
        } else {
            match (markers.m32, u32::try_from(size)) {
                (Some(m32), Ok(n)) => {
                    self.buffer.put_u8(m32);
                    self.buffer.put_u32(n);
                }
                _ => return Err(PackStreamError::ValueTooLarge(markers.kind, size)),
            }
        }
        Ok(())
    }
}

impl Default for PackStreamEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a single value into a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(value: PackStreamValue) -> Vec<u8> {
        encode(&value).unwrap().to_vec()
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(bytes_of(PackStreamValue::Null), vec![0xC0]);
        assert_eq!(bytes_of(PackStreamValue::Boolean(true)), vec![0xC3]);
        assert_eq!(bytes_of(PackStreamValue::Boolean(false)), vec![0xC2]);
        assert_eq!(
            bytes_of(PackStreamValue::Float(1.1)),
            vec![0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]
        );
    }

    #[test]
    fn test_encode_integer_widths() {
        assert_eq!(bytes_of(PackStreamValue::Integer(1)), vec![0x01]);
        assert_eq!(bytes_of(PackStreamValue::Integer(-16)), vec![0xF0]);
        assert_eq!(bytes_of(PackStreamValue::Integer(-17)), vec![0xC8, 0xEF]);
        assert_eq!(bytes_of(PackStreamValue::Integer(128)), vec![0xC9, 0x00, 0x80]);
        assert_eq!(
            bytes_of(PackStreamValue::Integer(32768)),
            vec![0xCA, 0x00, 0x00, 0x80, 0x00]
        );
        assert_eq!(
            bytes_of(PackStreamValue::Integer(2_147_483_648)),
            vec![0xCB, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_encode_strings() {
        assert_eq!(bytes_of(PackStreamValue::String(String::new())), vec![0x80]);
        assert_eq!(bytes_of("A".into()), vec![0x81, 0x41]);

        let sixteen = "x".repeat(16);
        let encoded = bytes_of(sixteen.as_str().into());
        assert_eq!(&encoded[..2], &[0xD0, 0x10]);

        let long = "y".repeat(300);
        let encoded = bytes_of(long.as_str().into());
        assert_eq!(&encoded[..3], &[0xD1, 0x01, 0x2C]);
    }

    #[test]
    fn test_encode_bytes_has_no_tiny_form() {
        assert_eq!(bytes_of(PackStreamValue::Bytes(vec![])), vec![0xCC, 0x00]);
        assert_eq!(
            bytes_of(PackStreamValue::Bytes(vec![1, 2, 3])),
            vec![0xCC, 0x03, 1, 2, 3]
        );
    }

    #[test]
    fn test_encode_containers() {
        let list = PackStreamValue::List(vec![1i64.into(), 2i64.into(), 3i64.into()]);
        assert_eq!(bytes_of(list), vec![0x93, 0x01, 0x02, 0x03]);

        let mut map = HashMap::new();
        map.insert("a".to_string(), PackStreamValue::Integer(1));
        assert_eq!(bytes_of(PackStreamValue::Map(map)), vec![0xA1, 0x81, 0x61, 0x01]);

        let items: Vec<PackStreamValue> = (0..20).map(PackStreamValue::Integer).collect();
        let encoded = bytes_of(PackStreamValue::List(items));
        assert_eq!(&encoded[..2], &[0xD4, 20]);
    }

    #[test]
    fn test_encode_structure() {
        let s = PackStreamStructure::new(0x44, vec![PackStreamValue::Integer(1)]);
        assert_eq!(bytes_of(PackStreamValue::Structure(s)), vec![0xB1, 0x44, 0x01]);

        let wide = PackStreamStructure::new(0x01, vec![PackStreamValue::Null; 16]);
        let encoded = bytes_of(PackStreamValue::Structure(wide));
        assert_eq!(&encoded[..3], &[0xDC, 16, 0x01]);
    }

    #[test]
    fn test_structure_field_limit() {
        let huge = PackStreamStructure::new(0x01, vec![PackStreamValue::Null; 70_000]);
        let err = encode(&PackStreamValue::Structure(huge)).unwrap_err();
        assert!(matches!(err, PackStreamError::ValueTooLarge("structure", 70_000)));
    }
}
