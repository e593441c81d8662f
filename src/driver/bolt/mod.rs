//! Client-side Bolt plumbing for the driver.
//!
//! ```text
//! Session
//!   └── SessionEngine (request FIFO, cursors, transaction state)
//!         └── BoltConnection (link + framing + handshake)
//!               ├── ProtocolAdapter (per-version message vocabulary)
//!               └── BoltResponseCodec (from the wire layer)
//! ```

pub mod connection;
pub mod engine;
pub mod protocol;
#[cfg(test)]
pub mod stub;

pub use connection::{BoltConnection, LinkStream};
pub use engine::{EngineState, SessionEngine, SharedEngine};
pub use protocol::{adapter_for, Capabilities, ProtocolAdapter, StreamId, TxMetadata, FETCH_ALL};

pub use crate::bolt::message::AuthToken as BoltAuthToken;
use crate::bolt::PackStreamValue;

use super::driver::AuthToken;

/// Client user agent string sent in HELLO
pub const CLIENT_USER_AGENT: &str = concat!("boltwire/", env!("CARGO_PKG_VERSION"));

/// Convert the driver-level token into the HELLO auth fields
pub fn to_bolt_auth(auth: &AuthToken) -> BoltAuthToken {
    match auth {
        AuthToken::None => BoltAuthToken::none(),
        AuthToken::Basic { username, password, realm } => match realm {
            Some(realm) => BoltAuthToken::basic_with_realm(username, password, realm),
            None => BoltAuthToken::basic(username, password),
        },
        AuthToken::Bearer { token } => BoltAuthToken::bearer(token),
        AuthToken::Kerberos { ticket } => {
            BoltAuthToken::custom("kerberos", "", ticket, None, Default::default())
        }
        AuthToken::Custom { principal, credentials, realm, scheme, parameters } => {
            let parameters = parameters
                .iter()
                .map(|(k, v)| (k.clone(), PackStreamValue::String(v.clone())))
                .collect();
            BoltAuthToken::custom(scheme, principal, credentials, realm.as_deref(), parameters)
        }
    }
}
