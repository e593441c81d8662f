//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server. The message
//! structs only know their wire layout; which metadata keys go into the
//! `extra` maps is decided per protocol version by the driver's adapters.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{Fields, PackStreamError, PackStreamStructure, PackStreamValue};

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Value of the `mode` metadata key.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token carried by HELLO.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme (e.g., "basic", "bearer")
    pub scheme: String,
    /// Principal (username)
    pub principal: Option<String>,
    /// Credentials (password or token)
    pub credentials: Option<String>,
    /// Realm
    pub realm: Option<String>,
    /// Additional scheme-specific parameters
    pub parameters: HashMap<String, PackStreamValue>,
}

impl AuthToken {
    fn with_scheme(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            principal: None,
            credentials: None,
            realm: None,
            parameters: HashMap::new(),
        }
    }

    /// Basic auth with user name and password.
    pub fn basic(principal: &str, credentials: &str) -> Self {
        Self {
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
            ..Self::with_scheme("basic")
        }
    }

    /// Basic auth within a realm.
    pub fn basic_with_realm(principal: &str, credentials: &str, realm: &str) -> Self {
        Self {
            realm: Some(realm.to_string()),
            ..Self::basic(principal, credentials)
        }
    }

    /// Bearer token (SSO).
    pub fn bearer(token: &str) -> Self {
        Self {
            credentials: Some(token.to_string()),
            ..Self::with_scheme("bearer")
        }
    }

    /// Custom scheme with free-form parameters.
    pub fn custom(
        scheme: &str,
        principal: &str,
        credentials: &str,
        realm: Option<&str>,
        parameters: HashMap<String, PackStreamValue>,
    ) -> Self {
        Self {
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
            realm: realm.map(str::to_string),
            parameters,
            ..Self::with_scheme(scheme)
        }
    }

    /// No authentication.
    pub fn none() -> Self {
        Self::with_scheme("none")
    }

    /// Write the token fields into a HELLO extra map.
    pub fn write_into(&self, extra: &mut HashMap<String, PackStreamValue>) {
        extra.insert("scheme".to_string(), self.scheme.as_str().into());
        if let Some(ref p) = self.principal {
            extra.insert("principal".to_string(), p.as_str().into());
        }
        if let Some(ref c) = self.credentials {
            extra.insert("credentials".to_string(), c.as_str().into());
        }
        if let Some(ref r) = self.realm {
            extra.insert("realm".to_string(), r.as_str().into());
        }
        if !self.parameters.is_empty() {
            extra.insert(
                "parameters".to_string(),
                PackStreamValue::Map(self.parameters.clone()),
            );
        }
    }
}

/// All Bolt request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// GOODBYE - Close connection gracefully
    Goodbye,
    /// RESET - Reset connection state
    Reset,
    /// RUN - Execute a query
    Run(RunMessage),
    /// PULL - Pull `n` records of a stream (4.0+)
    Pull(PullMessage),
    /// PULL_ALL - Pull every record of the last stream (3.0)
    PullAll,
    /// DISCARD - Discard `n` records of a stream (4.0+)
    Discard(PullMessage),
    /// DISCARD_ALL - Discard the last stream (3.0)
    DiscardAll,
    /// BEGIN - Start transaction
    Begin(BeginMessage),
    /// COMMIT - Commit transaction
    Commit,
    /// ROLLBACK - Rollback transaction
    Rollback,
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Pull(_) | BoltRequest::PullAll => tag::PULL,
            BoltRequest::Discard(_) | BoltRequest::DiscardAll => tag::DISCARD,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Hello(_) => "HELLO",
            BoltRequest::Goodbye => "GOODBYE",
            BoltRequest::Reset => "RESET",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::Pull(_) => "PULL",
            BoltRequest::PullAll => "PULL_ALL",
            BoltRequest::Discard(_) => "DISCARD",
            BoltRequest::DiscardAll => "DISCARD_ALL",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
        }
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltRequest::Hello(msg) => {
                PackStreamStructure::new(tag::HELLO, vec![PackStreamValue::Map(msg.extra.clone())])
            }
            BoltRequest::Run(msg) => PackStreamStructure::new(
                tag::RUN,
                vec![
                    PackStreamValue::String(msg.query.clone()),
                    PackStreamValue::Map(msg.parameters.clone()),
                    PackStreamValue::Map(msg.extra.clone()),
                ],
            ),
            BoltRequest::Pull(msg) | BoltRequest::Discard(msg) => {
                PackStreamStructure::new(self.tag(), vec![PackStreamValue::Map(msg.to_extra())])
            }
            BoltRequest::Begin(msg) => {
                PackStreamStructure::new(tag::BEGIN, vec![PackStreamValue::Map(msg.extra.clone())])
            }
            BoltRequest::Goodbye
            | BoltRequest::Reset
            | BoltRequest::PullAll
            | BoltRequest::DiscardAll
            | BoltRequest::Commit
            | BoltRequest::Rollback => PackStreamStructure::new(self.tag(), vec![]),
        }
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let request = match (s.tag, s.fields.len()) {
            (tag::HELLO, _) => BoltRequest::Hello(HelloMessage {
                extra: Fields::new(s, tag::HELLO, "HELLO", 1..=1)?.map(0)?.clone(),
            }),
            (tag::GOODBYE, 0) => BoltRequest::Goodbye,
            (tag::RESET, 0) => BoltRequest::Reset,
            (tag::RUN, _) => {
                let f = Fields::new(s, tag::RUN, "RUN", 2..=3)?;
                BoltRequest::Run(RunMessage {
                    query: f.string(0)?.to_string(),
                    parameters: f.map(1)?.clone(),
                    extra: if f.len() > 2 { f.map(2)?.clone() } else { HashMap::new() },
                })
            }
            (tag::PULL, 0) => BoltRequest::PullAll,
            (tag::PULL, _) => BoltRequest::Pull(PullMessage::from_extra(
                Fields::new(s, tag::PULL, "PULL", 1..=1)?.map(0)?,
            )),
            (tag::DISCARD, 0) => BoltRequest::DiscardAll,
            (tag::DISCARD, _) => BoltRequest::Discard(PullMessage::from_extra(
                Fields::new(s, tag::DISCARD, "DISCARD", 1..=1)?.map(0)?,
            )),
            (tag::BEGIN, _) => BoltRequest::Begin(BeginMessage {
                extra: Fields::new(s, tag::BEGIN, "BEGIN", 1..=1)?.map(0)?.clone(),
            }),
            (tag::COMMIT, 0) => BoltRequest::Commit,
            (tag::ROLLBACK, 0) => BoltRequest::Rollback,
            (other, n) => {
                return Err(PackStreamError::InvalidStructure(format!(
                    "Unknown request message 0x{:02X} with {} fields",
                    other, n
                )))
            }
        };
        Ok(request)
    }
}

/// HELLO message: a single metadata map with `user_agent` and auth fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HelloMessage {
    /// Metadata map
    pub extra: HashMap<String, PackStreamValue>,
}

impl HelloMessage {
    /// Create a HELLO with user agent and auth token.
    pub fn new(user_agent: &str, auth: &AuthToken) -> Self {
        let mut extra = HashMap::new();
        extra.insert("user_agent".to_string(), user_agent.into());
        auth.write_into(&mut extra);
        Self { extra }
    }

    /// User agent string, if present.
    pub fn user_agent(&self) -> Option<&str> {
        self.extra.get("user_agent").and_then(|v| v.as_str())
    }
}

/// RUN message - Execute a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Query text
    pub query: String,
    /// Query parameters
    pub parameters: HashMap<String, PackStreamValue>,
    /// Extra metadata (bookmarks, tx_timeout, tx_metadata, mode, db)
    pub extra: HashMap<String, PackStreamValue>,
}

impl RunMessage {
    /// Create a new RUN message.
    pub fn new(
        query: impl Into<String>,
        parameters: HashMap<String, PackStreamValue>,
        extra: HashMap<String, PackStreamValue>,
    ) -> Self {
        Self {
            query: query.into(),
            parameters,
            extra,
        }
    }
}

/// Body shared by PULL and DISCARD: how many records and for which stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullMessage {
    /// Number of records (-1 for all)
    pub n: i64,
    /// Query id; `None` means the last stream
    pub qid: Option<i64>,
}

impl PullMessage {
    /// Every remaining record of the last stream.
    pub fn all() -> Self {
        Self { n: -1, qid: None }
    }

    /// `n` records of the last stream.
    pub fn with_n(n: i64) -> Self {
        Self { n, qid: None }
    }

    /// Target a specific query id.
    pub fn with_qid(mut self, qid: i64) -> Self {
        self.qid = Some(qid);
        self
    }

    fn to_extra(self) -> HashMap<String, PackStreamValue> {
        let mut extra = HashMap::new();
        extra.insert("n".to_string(), PackStreamValue::Integer(self.n));
        if let Some(qid) = self.qid {
            extra.insert("qid".to_string(), PackStreamValue::Integer(qid));
        }
        extra
    }

    fn from_extra(extra: &HashMap<String, PackStreamValue>) -> Self {
        Self {
            n: extra.get("n").and_then(|v| v.as_int()).unwrap_or(-1),
            qid: extra.get("qid").and_then(|v| v.as_int()),
        }
    }
}

/// BEGIN message - Start a transaction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeginMessage {
    /// Extra metadata (bookmarks, tx_timeout, tx_metadata, mode, db)
    pub extra: HashMap<String, PackStreamValue>,
}

impl BeginMessage {
    /// Create a BEGIN with the given metadata.
    pub fn new(extra: HashMap<String, PackStreamValue>) -> Self {
        Self { extra }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(request: &BoltRequest) -> BoltRequest {
        BoltRequest::from_structure(&request.to_structure()).unwrap()
    }

    #[test]
    fn test_hello_carries_auth_fields() {
        let hello = HelloMessage::new("boltwire/0.1", &AuthToken::basic("neo4j", "secret"));
        assert_eq!(hello.user_agent(), Some("boltwire/0.1"));
        assert_eq!(hello.extra.get("scheme").and_then(|v| v.as_str()), Some("basic"));
        assert_eq!(hello.extra.get("principal").and_then(|v| v.as_str()), Some("neo4j"));
        assert_eq!(hello.extra.get("credentials").and_then(|v| v.as_str()), Some("secret"));
        assert!(!hello.extra.contains_key("realm"));

        let request = BoltRequest::Hello(hello);
        assert_eq!(reparse(&request), request);
    }

    #[test]
    fn test_auth_token_variants() {
        let token = AuthToken::bearer("abc");
        assert_eq!(token.scheme, "bearer");
        assert_eq!(token.credentials.as_deref(), Some("abc"));
        assert!(token.principal.is_none());

        let token = AuthToken::basic_with_realm("u", "p", "ldap");
        assert_eq!(token.realm.as_deref(), Some("ldap"));

        let mut extra = HashMap::new();
        AuthToken::none().write_into(&mut extra);
        assert_eq!(extra.len(), 1);
    }

    #[test]
    fn test_run_layout() {
        let mut params = HashMap::new();
        params.insert("x".to_string(), PackStreamValue::Integer(1));
        let request = BoltRequest::Run(RunMessage::new("RETURN $x", params, HashMap::new()));

        let s = request.to_structure();
        assert_eq!(s.tag, tag::RUN);
        assert_eq!(s.fields.len(), 3);
        assert_eq!(reparse(&request), request);
    }

    #[test]
    fn test_pull_variants() {
        let s = BoltRequest::PullAll.to_structure();
        assert_eq!((s.tag, s.fields.len()), (tag::PULL, 0));
        assert_eq!(reparse(&BoltRequest::PullAll), BoltRequest::PullAll);

        let pull = BoltRequest::Pull(PullMessage::with_n(2).with_qid(7));
        assert_eq!(reparse(&pull), pull);

        let unnamed = BoltRequest::Pull(PullMessage::with_n(1000)).to_structure();
        let extra = unnamed.fields[0].as_map().unwrap();
        assert!(!extra.contains_key("qid"));

        let discard = BoltRequest::Discard(PullMessage::all());
        assert_eq!(discard.name(), "DISCARD");
        assert_eq!(reparse(&discard), discard);
        assert_eq!(reparse(&BoltRequest::DiscardAll), BoltRequest::DiscardAll);
    }

    #[test]
    fn test_empty_messages() {
        for request in [
            BoltRequest::Goodbye,
            BoltRequest::Reset,
            BoltRequest::Commit,
            BoltRequest::Rollback,
        ] {
            assert!(request.to_structure().fields.is_empty());
            assert_eq!(reparse(&request), request);
        }
    }

    #[test]
    fn test_unknown_request() {
        let s = PackStreamStructure::new(0x66, vec![]);
        assert!(BoltRequest::from_structure(&s).is_err());
    }

    #[test]
    fn test_access_mode() {
        assert_eq!(AccessMode::default(), AccessMode::Write);
        assert_eq!(AccessMode::Read.as_str(), "r");
    }
}
