//! # Bolt wire protocol
//!
//! Client-side building blocks of the Bolt protocol: the PackStream value
//! format, typed request/response messages, the version handshake and the
//! chunked framing codec. Nothing here keeps session state; that lives in
//! [`crate::driver`].
//!
//! ## Submodules
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`message`] - Bolt message types (HELLO, RUN, PULL, etc.)
//! - [`handshake`] - Version proposals and reply parsing
//! - [`codec`] - Tokio codec for chunked framing
//! - [`error`] - Wire-level error types

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{BoltCodec, BoltRequestCodec, BoltResponseCodec};
pub use error::{BoltError, BoltResult, HandshakeError};
pub use handshake::{BoltVersion, Handshake, VersionProposal, BOLT_MAGIC};
pub use message::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltResponse, FailureMessage,
    HelloMessage, Notification, NotificationSeverity, PullMessage, QueryStats, RecordMessage,
    RunMessage, SuccessMessage,
};
pub use packstream::{
    PackStreamDecoder, PackStreamEncoder, PackStreamError, PackStreamStructure, PackStreamValue,
};
