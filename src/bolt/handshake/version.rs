//! Bolt protocol version definitions.

use std::fmt;

/// Bolt protocol versions.
///
/// The discriminant packs the version as `0x00MM_00mm` so that ordering
/// follows the version number. On the wire a version is four bytes laid
/// out as `[0, range, minor, major]`; see [`BoltVersion::to_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BoltVersion {
    /// Bolt 3.0 - no query ids, PULL_ALL / DISCARD_ALL
    V3_0 = 0x0003_0000,
    /// Bolt 4.0 - query ids, database selection, fetch size
    V4_0 = 0x0004_0000,
    /// Bolt 4.1
    V4_1 = 0x0004_0001,
    /// Bolt 4.2
    V4_2 = 0x0004_0002,
    /// Bolt 4.3
    V4_3 = 0x0004_0003,
    /// Bolt 4.4
    V4_4 = 0x0004_0004,
    /// Bolt 5.0 - element ids, UTC date-times
    V5_0 = 0x0005_0000,
}

impl BoltVersion {
    /// All supported versions, newest first.
    pub const ALL: [BoltVersion; 7] = [
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_2,
        BoltVersion::V4_1,
        BoltVersion::V4_0,
        BoltVersion::V3_0,
    ];

    /// Look up a version by its major and minor number.
    pub fn from_parts(major: u8, minor: u8) -> Option<Self> {
        match (major, minor) {
            (3, 0) => Some(BoltVersion::V3_0),
            (4, 0) => Some(BoltVersion::V4_0),
            (4, 1) => Some(BoltVersion::V4_1),
            (4, 2) => Some(BoltVersion::V4_2),
            (4, 3) => Some(BoltVersion::V4_3),
            (4, 4) => Some(BoltVersion::V4_4),
            (5, 0) => Some(BoltVersion::V5_0),
            _ => None,
        }
    }

    /// Get the major version number.
    pub fn major(self) -> u8 {
        ((self as u32) >> 16) as u8
    }

    /// Get the minor version number.
    pub fn minor(self) -> u8 {
        ((self as u32) & 0xFF) as u8
    }

    /// Wire form of an exact version: `[0, 0, minor, major]`.
    pub fn to_bytes(self) -> [u8; 4] {
        [0, 0, self.minor(), self.major()]
    }

    /// Parse a server reply. The range byte is ignored.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::from_parts(bytes[3], bytes[2])
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl PartialOrd for BoltVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoltVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u32).cmp(&(*other as u32))
    }
}
