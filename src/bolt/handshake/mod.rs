//! Bolt protocol handshake.
//!
//! The client opens with the 4-byte magic number followed by four 4-byte
//! version proposals, most preferred first. The server answers with the
//! 4-byte version it picked, or zeros when it supports none of them.

mod negotiation;
mod version;

pub use negotiation::{Handshake, VersionProposal};
pub use version::BoltVersion;

pub use super::error::HandshakeError;

/// Bolt protocol magic number.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the client's opening bytes (magic + 4 proposals)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of the server's reply
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;
