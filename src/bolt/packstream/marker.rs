//! PackStream type markers and structure tags.
//!
//! Every encoded value starts with a marker byte. Small strings, lists,
//! maps and structures carry their size in the low nibble of the marker;
//! integers between -16 and 127 are the marker itself.

/// Null marker
pub const NULL: u8 = 0xC0;

/// Float marker (64-bit IEEE 754, big-endian)
pub const FLOAT_64: u8 = 0xC1;

/// Boolean `false`
pub const FALSE: u8 = 0xC2;
/// Boolean `true`
pub const TRUE: u8 = 0xC3;

/// 8-bit integer
pub const INT_8: u8 = 0xC8;
/// 16-bit integer
pub const INT_16: u8 = 0xC9;
/// 32-bit integer
pub const INT_32: u8 = 0xCA;
/// 64-bit integer
pub const INT_64: u8 = 0xCB;

/// Smallest value that fits in a tiny int marker
pub const TINY_INT_MIN: i64 = -16;
/// Largest value that fits in a tiny int marker
pub const TINY_INT_MAX: i64 = 127;

/// Byte array, u8 length (no tiny form)
pub const BYTES_8: u8 = 0xCC;
/// Byte array, u16 length
pub const BYTES_16: u8 = 0xCD;
/// Byte array, u32 length
pub const BYTES_32: u8 = 0xCE;

/// String of up to 15 bytes
pub const TINY_STRING: u8 = 0x80;
/// String, u8 length
pub const STRING_8: u8 = 0xD0;
/// String, u16 length
pub const STRING_16: u8 = 0xD1;
/// String, u32 length
pub const STRING_32: u8 = 0xD2;

/// List of up to 15 items
pub const TINY_LIST: u8 = 0x90;
/// List, u8 length
pub const LIST_8: u8 = 0xD4;
/// List, u16 length
pub const LIST_16: u8 = 0xD5;
/// List, u32 length
pub const LIST_32: u8 = 0xD6;

/// Map of up to 15 entries
pub const TINY_MAP: u8 = 0xA0;
/// Map, u8 length
pub const MAP_8: u8 = 0xD8;
/// Map, u16 length
pub const MAP_16: u8 = 0xD9;
/// Map, u32 length
pub const MAP_32: u8 = 0xDA;

/// Structure of up to 15 fields
pub const TINY_STRUCT: u8 = 0xB0;
/// Structure, u8 field count
pub const STRUCT_8: u8 = 0xDC;
/// Structure, u16 field count
pub const STRUCT_16: u8 = 0xDD;

/// Largest size carried inside a tiny marker's low nibble
pub const TINY_SIZE_MAX: usize = 0x0F;

/// Node (`N`)
pub const NODE_TAG: u8 = 0x4E;
/// Relationship (`R`)
pub const RELATIONSHIP_TAG: u8 = 0x52;
/// Relationship inside a path (`r`)
pub const UNBOUND_RELATIONSHIP_TAG: u8 = 0x72;
/// Path (`P`)
pub const PATH_TAG: u8 = 0x50;

/// Date (`D`)
pub const DATE_TAG: u8 = 0x44;
/// Time with offset (`T`)
pub const TIME_TAG: u8 = 0x54;
/// Local time (`t`)
pub const LOCAL_TIME_TAG: u8 = 0x74;
/// Date-time, wall-clock seconds + offset (`F`)
pub const DATE_TIME_TAG: u8 = 0x46;
/// Date-time, wall-clock seconds + zone id (`f`)
pub const DATE_TIME_ZONE_ID_TAG: u8 = 0x66;
/// Date-time, UTC seconds + offset (`I`)
pub const DATE_TIME_UTC_TAG: u8 = 0x49;
/// Date-time, UTC seconds + zone id (`i`)
pub const DATE_TIME_ZONE_ID_UTC_TAG: u8 = 0x69;
/// Local date-time (`d`)
pub const LOCAL_DATE_TIME_TAG: u8 = 0x64;
/// Duration (`E`)
pub const DURATION_TAG: u8 = 0x45;

/// 2D point (`X`)
pub const POINT_2D_TAG: u8 = 0x58;
/// 3D point (`Y`)
pub const POINT_3D_TAG: u8 = 0x59;

/// High nibble of a marker, used to recognise the tiny forms.
#[inline]
pub fn high_nibble(marker: u8) -> u8 {
    marker & 0xF0
}

/// Size carried by a tiny marker.
#[inline]
pub fn tiny_size(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

/// Whether the marker byte is itself an integer in -16..=127.
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}

/// Whether `value` can be written as a tiny int.
#[inline]
pub fn fits_tiny_int(value: i64) -> bool {
    (TINY_INT_MIN..=TINY_INT_MAX).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_int_bounds() {
        assert!(fits_tiny_int(-16));
        assert!(fits_tiny_int(127));
        assert!(!fits_tiny_int(-17));
        assert!(!fits_tiny_int(128));
    }

    #[test]
    fn test_tiny_int_markers() {
        assert!(is_tiny_int(0x00));
        assert!(is_tiny_int(0x7F));
        assert!(is_tiny_int(0xF0));
        assert!(is_tiny_int(0xFF));
        assert!(!is_tiny_int(NULL));
        assert!(!is_tiny_int(TINY_STRING));
    }

    #[test]
    fn test_nibbles() {
        assert_eq!(high_nibble(0x85), TINY_STRING);
        assert_eq!(tiny_size(0x85), 5);
        assert_eq!(high_nibble(0xB3), TINY_STRUCT);
        assert_eq!(tiny_size(0xB3), 3);
    }
}
