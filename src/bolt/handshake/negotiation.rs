//! Client side of the Bolt handshake.

use super::{BoltVersion, HandshakeError, BOLT_MAGIC, HANDSHAKE_SIZE};

/// Reply bytes of a server that speaks HTTP ("HTTP").
const HTTP_REPLY: [u8; 4] = *b"HTTP";

/// One version proposal: the newest version plus how many minor versions
/// below it are also acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProposal {
    /// Newest acceptable version
    pub version: BoltVersion,
    /// Number of older minor versions also accepted
    pub range: u8,
}

impl VersionProposal {
    /// Exact version, no range.
    pub const fn exact(version: BoltVersion) -> Self {
        Self { version, range: 0 }
    }

    /// Version with a minor-version range.
    pub const fn range(version: BoltVersion, range: u8) -> Self {
        Self { version, range }
    }

    /// Wire form: `[0, range, minor, major]`.
    pub fn to_bytes(self) -> [u8; 4] {
        [0, self.range, self.version.minor(), self.version.major()]
    }

    /// Whether `version` falls inside this proposal.
    pub fn covers(self, version: BoltVersion) -> bool {
        version.major() == self.version.major()
            && version.minor() <= self.version.minor()
            && version.minor() >= self.version.minor().saturating_sub(self.range)
    }
}

/// Version proposals sent by the client, most preferred first.
#[derive(Debug, Clone)]
pub struct Handshake {
    proposals: [Option<VersionProposal>; 4],
}

impl Handshake {
    /// Default proposals: 5.0, 4.4 down to 4.2, 4.1 down to 4.0, 3.0.
    pub fn new() -> Self {
        Self {
            proposals: [
                Some(VersionProposal::exact(BoltVersion::V5_0)),
                Some(VersionProposal::range(BoltVersion::V4_4, 2)),
                Some(VersionProposal::range(BoltVersion::V4_1, 1)),
                Some(VersionProposal::exact(BoltVersion::V3_0)),
            ],
        }
    }

    /// Propose only the given versions (at most four; the rest are ignored).
    pub fn with_proposals(proposals: &[VersionProposal]) -> Self {
        let mut slots = [None; 4];
        for (slot, proposal) in slots.iter_mut().zip(proposals) {
            *slot = Some(*proposal);
        }
        Self { proposals: slots }
    }

    /// The 20 bytes the client opens the connection with.
    pub fn request_bytes(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut out = [0u8; HANDSHAKE_SIZE];
        out[..4].copy_from_slice(&BOLT_MAGIC);
        for (i, proposal) in self.proposals.iter().enumerate() {
            if let Some(p) = proposal {
                let start = 4 + i * 4;
                out[start..start + 4].copy_from_slice(&p.to_bytes());
            }
        }
        out
    }

    /// Interpret the server's 4-byte reply.
    pub fn parse_reply(&self, reply: [u8; 4]) -> Result<BoltVersion, HandshakeError> {
        if reply == [0, 0, 0, 0] {
            return Err(HandshakeError::NoCompatibleVersion);
        }
        if reply == HTTP_REPLY {
            return Err(HandshakeError::HttpEndpoint);
        }

        BoltVersion::from_bytes(reply)
            .filter(|v| self.proposals.iter().flatten().any(|p| p.covers(*v)))
            .ok_or(HandshakeError::UnexpectedVersion(reply))
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}
