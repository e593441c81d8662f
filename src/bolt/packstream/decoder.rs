//! PackStream decoder.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Deepest list, map or structure nesting accepted from the wire.
pub const MAX_NESTING_DEPTH: usize = 512;

/// PackStream decoder reading values from a borrowed byte slice.
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, depth: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Remaining bytes count.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if all data has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.read_u8()?;

        if is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }

        match high_nibble(marker) {
            TINY_STRING => return self.read_string(tiny_size(marker)),
            TINY_LIST => return self.read_list(tiny_size(marker)),
            TINY_MAP => return self.read_map(tiny_size(marker)),
            TINY_STRUCT => return self.read_structure(tiny_size(marker)),
            _ => {}
        }

        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => Ok(PackStreamValue::Float(self.take(8)?.get_f64())),

            INT_8 => Ok(PackStreamValue::Integer(self.take(1)?.get_i8() as i64)),
            INT_16 => Ok(PackStreamValue::Integer(self.take(2)?.get_i16() as i64)),
            INT_32 => Ok(PackStreamValue::Integer(self.take(4)?.get_i32() as i64)),
            INT_64 => Ok(PackStreamValue::Integer(self.take(8)?.get_i64())),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.take(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_size(marker - STRING_8)?;
                self.read_string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_size(marker - LIST_8)?;
                self.read_list(len)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_size(marker - MAP_8)?;
                self.read_map(len)
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.read_size(marker - STRUCT_8)?;
                self.read_structure(len)
            }

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    /// Read a size header: width 0 = u8, 1 = u16, 2 = u32.
    fn read_size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        let size = match width {
            0 => self.take(1)?.get_u8() as usize,
            1 => self.take(2)?.get_u16() as usize,
            _ => self.take(4)?.get_u32() as usize,
        };
        Ok(size)
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))?;
        Ok(PackStreamValue::String(s.to_string()))
    }

    /// Run `read` one container level deeper.
    fn nested<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, PackStreamError>,
    ) -> Result<T, PackStreamError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.nested(|this| {
            // Every item takes at least one byte, so the remaining input bounds the capacity.
            let mut items = Vec::with_capacity(len.min(this.remaining()));
            for _ in 0..len {
                items.push(this.decode()?);
            }
            Ok(PackStreamValue::List(items))
        })
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.nested(|this| this.read_map_entries(len))
    }

    fn read_map_entries(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut map = HashMap::with_capacity(len.min(self.remaining()));
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            map.insert(key, value);
        }
        Ok(PackStreamValue::Map(map))
    }

    fn read_structure(&mut self, field_count: usize) -> Result<PackStreamValue, PackStreamError> {
        self.nested(|this| {
            let tag = this.read_u8()?;
            let mut fields = Vec::with_capacity(field_count.min(this.remaining()));
            for _ in 0..field_count {
                fields.push(this.decode()?);
            }
            Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
        })
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], PackStreamError> {
        if self.remaining() < len {
            return Err(PackStreamError::UnexpectedEof);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }
}

/// Decode exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(PackStreamError::TrailingBytes(decoder.remaining()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_scalars() {
        assert!(decode(&[0xC0]).unwrap().is_null());
        assert_eq!(decode(&[0xC3]).unwrap(), PackStreamValue::Boolean(true));
        assert_eq!(decode(&[0xC2]).unwrap(), PackStreamValue::Boolean(false));
        assert_eq!(
            decode(&[0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]).unwrap(),
            PackStreamValue::Float(1.1)
        );
    }

    #[test]
    fn test_decode_integers() {
        assert_eq!(decode(&[0x7F]).unwrap(), PackStreamValue::Integer(127));
        assert_eq!(decode(&[0xF0]).unwrap(), PackStreamValue::Integer(-16));
        assert_eq!(decode(&[0xC8, 0x80]).unwrap(), PackStreamValue::Integer(-128));
        assert_eq!(decode(&[0xC9, 0x01, 0x00]).unwrap(), PackStreamValue::Integer(256));
        assert_eq!(
            decode(&[0xCA, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            PackStreamValue::Integer(-1)
        );
        assert_eq!(
            decode(&[0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            PackStreamValue::Integer(i64::MAX)
        );
    }

    #[test]
    fn test_decode_sized_forms() {
        assert_eq!(decode(&[0x81, 0x41]).unwrap(), PackStreamValue::String("A".into()));
        assert_eq!(
            decode(&[0xD0, 0x01, 0x42]).unwrap(),
            PackStreamValue::String("B".into())
        );
        assert_eq!(
            decode(&[0xCD, 0x00, 0x02, 0x01, 0x02]).unwrap(),
            PackStreamValue::Bytes(vec![1, 2])
        );
        assert_eq!(
            decode(&[0xD4, 0x02, 0x01, 0x02]).unwrap(),
            PackStreamValue::List(vec![1i64.into(), 2i64.into()])
        );
    }

    #[test]
    fn test_decode_structure() {
        let value = decode(&[0xB1, 0x44, 0x01]).unwrap();
        let s = value.as_structure().unwrap();
        assert_eq!(s.tag, 0x44);
        assert_eq!(s.fields, vec![PackStreamValue::Integer(1)]);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(&[]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0x82, 0x41]), Err(PackStreamError::UnexpectedEof)));
        assert!(matches!(decode(&[0xC4]), Err(PackStreamError::UnknownMarker(0xC4))));
        assert!(matches!(decode(&[0xA1, 0x01, 0x01]), Err(PackStreamError::InvalidMapKey)));
        assert!(matches!(decode(&[0x82, 0xFF, 0xFE]), Err(PackStreamError::InvalidUtf8(_))));
        assert!(matches!(decode(&[0x01, 0x02]), Err(PackStreamError::TrailingBytes(1))));
    }

    #[test]
    fn test_hostile_size_header() {
        // LIST_32 claiming four billion items with nothing behind it
        let err = decode(&[0xD6, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, PackStreamError::UnexpectedEof));
    }

    #[test]
    fn test_nesting_limit() {
        let mut deep = vec![0x91; MAX_NESTING_DEPTH];
        deep.push(0xC0);
        assert!(decode(&deep).is_ok());

        let mut too_deep = vec![0x91; MAX_NESTING_DEPTH + 1];
        too_deep.push(0xC0);
        assert_eq!(
            decode(&too_deep).unwrap_err(),
            PackStreamError::NestingTooDeep(MAX_NESTING_DEPTH)
        );
    }

    #[test]
    fn test_hostile_nesting_on_small_stack() {
        // a megabyte of single-item lists, on a stack the size of a tokio worker's
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let mut data = vec![0x91; 1 << 20];
                data.push(0xC0);
                decode(&data)
            })
            .unwrap();
        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, PackStreamError::NestingTooDeep(_)));

        let mut maps = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH {
            maps.extend_from_slice(&[0xA1, 0x81, 0x6B]);
        }
        maps.push(0xC0);
        assert!(matches!(decode(&maps), Err(PackStreamError::NestingTooDeep(_))));
    }

    #[test]
    fn test_sequential_decode() {
        let data = [0x01, 0x81, 0x61, 0xC0];
        let mut decoder = PackStreamDecoder::new(&data);
        assert_eq!(decoder.decode().unwrap(), PackStreamValue::Integer(1));
        assert_eq!(decoder.decode().unwrap(), PackStreamValue::String("a".into()));
        assert_eq!(decoder.position(), 3);
        assert!(decoder.decode().unwrap().is_null());
        assert!(decoder.is_empty());
    }
}
