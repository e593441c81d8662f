//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client. Every request
//! is answered by exactly one summary (SUCCESS, FAILURE or IGNORED),
//! preceded by any number of RECORDs for PULL.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{Fields, PackStreamError, PackStreamStructure, PackStreamValue};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - request completed
    Success(SuccessMessage),
    /// RECORD - one row of a result stream
    Record(RecordMessage),
    /// FAILURE - request failed, server enters its failed state
    Failure(FailureMessage),
    /// IGNORED - request skipped because the server is in its failed state
    Ignored,
}

impl BoltResponse {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Whether this message completes a request.
    pub fn is_summary(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltResponse::Success(msg) => PackStreamStructure::new(
                tag::SUCCESS,
                vec![PackStreamValue::Map(msg.metadata.clone())],
            ),
            BoltResponse::Record(msg) => PackStreamStructure::new(
                tag::RECORD,
                vec![PackStreamValue::List(msg.fields.clone())],
            ),
            BoltResponse::Failure(msg) => {
                let metadata = PackStreamValue::map([
                    ("code", msg.code.as_str().into()),
                    ("message", msg.message.as_str().into()),
                ]);
                PackStreamStructure::new(tag::FAILURE, vec![metadata])
            }
            BoltResponse::Ignored => PackStreamStructure::new(tag::IGNORED, vec![]),
        }
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        match s.tag {
            tag::SUCCESS => {
                let f = Fields::new(s, tag::SUCCESS, "SUCCESS", 0..=1)?;
                let metadata = if f.is_empty() { HashMap::new() } else { f.map(0)?.clone() };
                Ok(BoltResponse::Success(SuccessMessage { metadata }))
            }
            tag::RECORD => {
                let f = Fields::new(s, tag::RECORD, "RECORD", 1..=1)?;
                Ok(BoltResponse::Record(RecordMessage::new(f.list(0)?.to_vec())))
            }
            tag::FAILURE => {
                let metadata = Fields::new(s, tag::FAILURE, "FAILURE", 1..=1)?.map(0)?;
                let text = |key: &str| {
                    metadata
                        .get(key)
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                        .ok_or_else(|| {
                            PackStreamError::InvalidStructure(format!("FAILURE requires {}", key))
                        })
                };
                Ok(BoltResponse::Failure(FailureMessage {
                    code: text("code")?,
                    message: text("message")?,
                }))
            }
            tag::IGNORED => Ok(BoltResponse::Ignored),
            _ => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                s.tag
            ))),
        }
    }
}

/// SUCCESS message: a metadata map whose keys depend on the request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: HashMap<String, PackStreamValue>,
}

impl SuccessMessage {
    /// Create a SUCCESS with empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a SUCCESS with metadata.
    pub fn with_metadata(metadata: HashMap<String, PackStreamValue>) -> Self {
        Self { metadata }
    }

    /// Builder-style metadata entry.
    pub fn with(mut self, key: &str, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    fn str_of(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Server agent reported by HELLO.
    pub fn server(&self) -> Option<&str> {
        self.str_of("server")
    }

    /// Connection id reported by HELLO.
    pub fn connection_id(&self) -> Option<&str> {
        self.str_of("connection_id")
    }

    /// Field names reported by RUN.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.metadata.get("fields").and_then(|v| v.to_string_list())
    }

    /// Query id reported by RUN (4.0+).
    pub fn qid(&self) -> Option<i64> {
        self.metadata.get("qid").and_then(|v| v.as_int())
    }

    /// Whether the stream has more records to pull.
    pub fn has_more(&self) -> bool {
        self.metadata
            .get("has_more")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Bookmark reported at the end of an autocommit stream or by COMMIT.
    pub fn bookmark(&self) -> Option<&str> {
        self.str_of("bookmark")
    }

    /// Database the query ran against.
    pub fn db(&self) -> Option<&str> {
        self.str_of("db")
    }

    /// Query type: "r", "w", "rw" or "s".
    pub fn query_type(&self) -> Option<&str> {
        self.str_of("type")
    }

    /// Milliseconds until the first record was available.
    pub fn t_first(&self) -> Option<i64> {
        self.metadata.get("t_first").and_then(|v| v.as_int())
    }

    /// Milliseconds until the stream was consumed.
    pub fn t_last(&self) -> Option<i64> {
        self.metadata.get("t_last").and_then(|v| v.as_int())
    }

    /// Update counters.
    pub fn stats(&self) -> Option<&HashMap<String, PackStreamValue>> {
        self.metadata.get("stats").and_then(|v| v.as_map())
    }

    /// Notifications list.
    pub fn notifications(&self) -> Option<&[PackStreamValue]> {
        self.metadata.get("notifications").and_then(|v| v.as_list())
    }

    /// HELLO reply.
    pub fn hello(server: &str, connection_id: &str) -> Self {
        Self::new()
            .with("server", server)
            .with("connection_id", connection_id)
    }

    /// RUN reply.
    pub fn run<S: AsRef<str>>(fields: &[S], qid: Option<i64>) -> Self {
        let msg = Self::new().with("fields", PackStreamValue::string_list(fields));
        match qid {
            Some(id) => msg.with("qid", id),
            None => msg,
        }
    }

    /// PULL / DISCARD reply.
    pub fn streaming(has_more: bool, bookmark: Option<&str>) -> Self {
        let mut msg = Self::new();
        if has_more {
            msg = msg.with("has_more", true);
        }
        if let Some(bm) = bookmark {
            msg = msg.with("bookmark", bm);
        }
        msg
    }
}

/// RECORD message: one row of values in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMessage {
    /// Field values
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    /// Create a new RECORD message.
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }

    /// Get field count.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if record is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// FAILURE message: status code plus human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Status code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Error message
    pub message: String,
}

impl FailureMessage {
    /// Create a new FAILURE message.
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for FailureMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
