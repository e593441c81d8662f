//! Per-version message vocabulary.
//!
//! The session engine never looks at the negotiated version directly; it
//! asks the [`ProtocolAdapter`] for the request to send and for what the
//! connection can do.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::bolt::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltVersion, HelloMessage, PackStreamValue,
    PullMessage, RunMessage, SuccessMessage,
};
use crate::driver::error::{DriverError, DriverResult};

/// Pull everything.
pub const FETCH_ALL: i64 = -1;

/// What a protocol version supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// RUN SUCCESS carries `qid`; several streams can be open at once
    pub query_ids: bool,
    /// RUN/BEGIN accept `db`
    pub database_selection: bool,
    /// PULL/DISCARD accept `n`
    pub fetch_size: bool,
    /// Date-times are sent with UTC seconds
    pub utc_date_times: bool,
}

/// Reference to a result stream on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamId {
    /// The most recently opened stream
    Unnamed,
    /// A stream addressed by its query id
    Query(i64),
}

/// Metadata attached to BEGIN and to autocommit RUN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxMetadata {
    /// Bookmarks the transaction must observe
    pub bookmarks: Vec<String>,
    /// Server-side transaction timeout
    pub tx_timeout: Option<Duration>,
    /// Free-form metadata shown in server-side transaction listings
    pub tx_metadata: HashMap<String, PackStreamValue>,
    /// Access mode
    pub mode: AccessMode,
    /// Target database
    pub database: Option<String>,
}

impl TxMetadata {
    /// Build the `extra` map. Empty fields are left out.
    pub fn to_extra(&self) -> HashMap<String, PackStreamValue> {
        let mut extra = HashMap::new();
        if !self.bookmarks.is_empty() {
            extra.insert(
                "bookmarks".to_string(),
                PackStreamValue::string_list(&self.bookmarks),
            );
        }
        if let Some(timeout) = self.tx_timeout {
            let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
            extra.insert("tx_timeout".to_string(), PackStreamValue::Integer(millis));
        }
        if !self.tx_metadata.is_empty() {
            extra.insert(
                "tx_metadata".to_string(),
                PackStreamValue::Map(self.tx_metadata.clone()),
            );
        }
        if self.mode == AccessMode::Read {
            extra.insert("mode".to_string(), PackStreamValue::from("r"));
        }
        if let Some(db) = &self.database {
            extra.insert("db".to_string(), PackStreamValue::from(db.as_str()));
        }
        extra
    }
}

/// Message vocabulary of one protocol version.
pub trait ProtocolAdapter: Send + Sync + fmt::Debug {
    /// Negotiated version.
    fn version(&self) -> BoltVersion;

    /// Feature flags.
    fn capabilities(&self) -> Capabilities;

    /// HELLO with user agent and credentials.
    fn hello(&self, user_agent: &str, auth: &AuthToken) -> BoltRequest {
        BoltRequest::Hello(HelloMessage::new(user_agent, auth))
    }

    /// RUN. `tx` is empty for statements inside an explicit transaction.
    fn run(
        &self,
        query: &str,
        parameters: HashMap<String, PackStreamValue>,
        tx: &TxMetadata,
    ) -> DriverResult<BoltRequest> {
        self.check_database(tx)?;
        Ok(BoltRequest::Run(RunMessage::new(query, parameters, tx.to_extra())))
    }

    /// BEGIN.
    fn begin(&self, tx: &TxMetadata) -> DriverResult<BoltRequest> {
        self.check_database(tx)?;
        Ok(BoltRequest::Begin(BeginMessage::new(tx.to_extra())))
    }

    /// Ask for up to `n` more records ([`FETCH_ALL`] for all).
    fn pull(&self, stream: StreamId, n: i64) -> BoltRequest;

    /// Throw away the rest of a stream.
    fn discard(&self, stream: StreamId) -> BoltRequest;

    /// Stream reference carried by a RUN SUCCESS.
    fn stream_id(&self, success: &SuccessMessage) -> StreamId;

    /// COMMIT.
    fn commit(&self) -> BoltRequest {
        BoltRequest::Commit
    }

    /// ROLLBACK.
    fn rollback(&self) -> BoltRequest {
        BoltRequest::Rollback
    }

    /// RESET.
    fn reset(&self) -> BoltRequest {
        BoltRequest::Reset
    }

    /// GOODBYE.
    fn goodbye(&self) -> BoltRequest {
        BoltRequest::Goodbye
    }

    /// Reject a database name when the version cannot select one.
    fn check_database(&self, tx: &TxMetadata) -> DriverResult<()> {
        if tx.database.is_some() && !self.capabilities().database_selection {
            return Err(DriverError::configuration(format!(
                "Database name parameter for selecting database is not supported in Bolt Protocol Version {}",
                self.version()
            )));
        }
        Ok(())
    }
}

fn pull_message(stream: StreamId, n: i64) -> PullMessage {
    let message = PullMessage::with_n(n);
    match stream {
        StreamId::Unnamed => message,
        StreamId::Query(qid) => message.with_qid(qid),
    }
}

fn query_stream(success: &SuccessMessage) -> StreamId {
    success.qid().map_or(StreamId::Unnamed, StreamId::Query)
}

/// Protocol 3.0: one stream at a time, always pulled in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bolt3;

impl ProtocolAdapter for Bolt3 {
    fn version(&self) -> BoltVersion {
        BoltVersion::V3_0
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            query_ids: false,
            database_selection: false,
            fetch_size: false,
            utc_date_times: false,
        }
    }

    fn pull(&self, _stream: StreamId, _n: i64) -> BoltRequest {
        BoltRequest::PullAll
    }

    fn discard(&self, _stream: StreamId) -> BoltRequest {
        BoltRequest::DiscardAll
    }

    fn stream_id(&self, _success: &SuccessMessage) -> StreamId {
        StreamId::Unnamed
    }
}

/// Protocol 4.0 to 4.4: query ids, fetch size and database selection.
#[derive(Debug, Clone, Copy)]
pub struct Bolt4 {
    version: BoltVersion,
}

impl Bolt4 {
    /// Adapter for a specific 4.x version.
    pub fn new(version: BoltVersion) -> Self {
        Self { version }
    }
}

impl ProtocolAdapter for Bolt4 {
    fn version(&self) -> BoltVersion {
        self.version
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            query_ids: true,
            database_selection: true,
            fetch_size: true,
            utc_date_times: false,
        }
    }

    fn pull(&self, stream: StreamId, n: i64) -> BoltRequest {
        BoltRequest::Pull(pull_message(stream, n))
    }

    fn discard(&self, stream: StreamId) -> BoltRequest {
        BoltRequest::Discard(pull_message(stream, FETCH_ALL))
    }

    fn stream_id(&self, success: &SuccessMessage) -> StreamId {
        query_stream(success)
    }
}

/// Protocol 5.0: as 4.4, with UTC date-times and element ids.
#[derive(Debug, Clone, Copy)]
pub struct Bolt5 {
    version: BoltVersion,
}

impl Bolt5 {
    /// Adapter for a specific 5.x version.
    pub fn new(version: BoltVersion) -> Self {
        Self { version }
    }
}

impl ProtocolAdapter for Bolt5 {
    fn version(&self) -> BoltVersion {
        self.version
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            query_ids: true,
            database_selection: true,
            fetch_size: true,
            utc_date_times: true,
        }
    }

    fn pull(&self, stream: StreamId, n: i64) -> BoltRequest {
        BoltRequest::Pull(pull_message(stream, n))
    }

    fn discard(&self, stream: StreamId) -> BoltRequest {
        BoltRequest::Discard(pull_message(stream, FETCH_ALL))
    }

    fn stream_id(&self, success: &SuccessMessage) -> StreamId {
        query_stream(success)
    }
}

/// Adapter for a negotiated version.
pub fn adapter_for(version: BoltVersion) -> Box<dyn ProtocolAdapter> {
    match version.major() {
        3 => Box::new(Bolt3),
        4 => Box::new(Bolt4::new(version)),
        _ => Box::new(Bolt5::new(version)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx_with_db() -> TxMetadata {
        TxMetadata {
            database: Some("movies".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_capability_table() {
        let v3 = adapter_for(BoltVersion::V3_0).capabilities();
        assert!(!v3.query_ids && !v3.database_selection && !v3.fetch_size && !v3.utc_date_times);

        let v4 = adapter_for(BoltVersion::V4_4).capabilities();
        assert!(v4.query_ids && v4.database_selection && v4.fetch_size);
        assert!(!v4.utc_date_times);

        let v5 = adapter_for(BoltVersion::V5_0).capabilities();
        assert!(v5.utc_date_times);
        assert_eq!(adapter_for(BoltVersion::V4_2).version(), BoltVersion::V4_2);
    }

    #[test]
    fn test_v3_rejects_database() {
        let err = Bolt3.run("RETURN 1", HashMap::new(), &tx_with_db()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Database name parameter for selecting database is not supported in Bolt Protocol Version 3.0"
        );
        assert!(Bolt3.begin(&tx_with_db()).is_err());
        assert!(Bolt3.begin(&TxMetadata::default()).is_ok());
    }

    #[test]
    fn test_v3_pulls_everything() {
        assert_eq!(Bolt3.pull(StreamId::Query(4), 10), BoltRequest::PullAll);
        assert_eq!(Bolt3.discard(StreamId::Unnamed), BoltRequest::DiscardAll);
        assert_eq!(Bolt3.stream_id(&SuccessMessage::run(&["n"], Some(3))), StreamId::Unnamed);
    }

    #[test]
    fn test_v4_stream_addressing() {
        let v4 = Bolt4::new(BoltVersion::V4_4);
        assert_eq!(
            v4.pull(StreamId::Unnamed, 100),
            BoltRequest::Pull(PullMessage { n: 100, qid: None })
        );
        assert_eq!(
            v4.discard(StreamId::Query(2)),
            BoltRequest::Discard(PullMessage { n: -1, qid: Some(2) })
        );
        assert_eq!(v4.stream_id(&SuccessMessage::run(&["n"], Some(7))), StreamId::Query(7));
        assert_eq!(v4.stream_id(&SuccessMessage::run(&["n"], None)), StreamId::Unnamed);
    }

    #[test]
    fn test_tx_metadata_extra() {
        let mut tx_metadata = HashMap::new();
        tx_metadata.insert("app".to_string(), PackStreamValue::from("billing"));
        let tx = TxMetadata {
            bookmarks: vec!["bm:1".into()],
            tx_timeout: Some(Duration::from_secs(2)),
            tx_metadata,
            mode: AccessMode::Read,
            database: Some("movies".into()),
        };

        let request = Bolt5::new(BoltVersion::V5_0).begin(&tx).unwrap();
        let BoltRequest::Begin(begin) = request else {
            panic!("expected BEGIN");
        };
        assert_eq!(begin.extra.get("tx_timeout"), Some(&PackStreamValue::Integer(2000)));
        assert_eq!(begin.extra.get("mode"), Some(&PackStreamValue::from("r")));
        assert_eq!(begin.extra.get("db"), Some(&PackStreamValue::from("movies")));
        assert_eq!(
            begin.extra.get("bookmarks").and_then(|v| v.to_string_list()),
            Some(vec!["bm:1".to_string()])
        );
        assert!(begin.extra.contains_key("tx_metadata"));

        // write mode is the server default and is not sent
        assert!(TxMetadata::default().to_extra().is_empty());
    }
}
