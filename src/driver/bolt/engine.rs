//! Session engine.
//!
//! Sequences requests on one connection and routes every response back to
//! whoever is waiting for it. Responses arrive in request order, so the
//! engine keeps a FIFO of outstanding requests: each SUCCESS, FAILURE or
//! IGNORED completes the head entry, and RECORDs feed the cursor of the
//! head PULL.
//!
//! The engine is shared by a session and the transactions and cursors it
//! hands out, behind one `tokio::sync::Mutex`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bolt::{AccessMode, BoltError, BoltRequest, BoltResponse, PackStreamValue, SuccessMessage};
use crate::driver::driver::ServerInfo;
use crate::driver::error::{DriverError, DriverResult, ErrorClassifier};
use crate::driver::record::Record;
use crate::driver::result::{CursorState, Latency, ResultSummary};
use crate::driver::session::Query;
use crate::driver::transaction::TransactionConfig;
use crate::driver::types::{dehydrate_map, Value};

use super::connection::BoltConnection;
use super::protocol::{Capabilities, StreamId, TxMetadata, FETCH_ALL};

/// Engine shared by a session and its handles.
pub type SharedEngine = Arc<Mutex<SessionEngine>>;

/// Engine-wide cursor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(u64);

/// Where the session stands with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing open
    Idle,
    /// An autocommit statement is streaming
    InAutocommit,
    /// An explicit transaction is open
    InTransaction,
}

/// Per-session settings the engine applies to every statement.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target database
    pub database: Option<String>,
    /// Default access mode for autocommit statements
    pub access_mode: AccessMode,
    /// Records per PULL (-1 for all)
    pub fetch_size: i64,
    /// Bookmarks to start from
    pub bookmarks: Vec<String>,
}

/// A cursor the engine has opened on behalf of a caller.
#[derive(Debug)]
pub struct OpenedCursor {
    /// Engine cursor id
    pub id: CursorId,
    /// Field names
    pub keys: Arc<[String]>,
    /// Liveness token; the engine forgets the cursor once every clone is dropped
    pub token: Arc<()>,
}

/// An explicit transaction the engine has begun.
#[derive(Debug)]
pub struct OpenedTransaction {
    /// Engine transaction id
    pub id: u64,
    /// Set when the handle is dropped without being closed
    pub abandoned: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Run(CursorId),
    Pull(CursorId),
    Discard(CursorId),
    Begin,
    Commit,
    Rollback,
    Reset,
}

#[derive(Debug)]
struct Pending {
    seq: u64,
    request: Request,
}

#[derive(Debug)]
enum Outcome {
    Success(SuccessMessage),
    Failure(DriverError),
    Ignored,
}

#[derive(Debug)]
struct Completed {
    seq: u64,
    outcome: Outcome,
}

#[derive(Debug)]
struct Timing {
    started: Instant,
    flushed: Option<Instant>,
    first_response: Option<Instant>,
    last_response: Option<Instant>,
}

impl Timing {
    fn latency(&self) -> Latency {
        let since = |from: Option<Instant>, to: Option<Instant>| match (from, to) {
            (Some(from), Some(to)) => Some(to.saturating_duration_since(from)),
            _ => None,
        };
        Latency {
            overall: since(Some(self.started), self.last_response),
            network: since(Some(self.started), self.first_response),
            wait: since(self.flushed, self.first_response),
        }
    }
}

#[derive(Debug)]
struct CursorSlot {
    tx: Option<u64>,
    alive: Weak<()>,
    stream: StreamId,
    keys: Arc<[String]>,
    buffer: VecDeque<Record>,
    state: CursorState,
    has_more: bool,
    pull_in_flight: bool,
    discard_in_flight: bool,
    interrupted: bool,
    error: Option<DriverError>,
    fetch_size: i64,
    query: Query,
    run_metadata: HashMap<String, PackStreamValue>,
    summary_metadata: HashMap<String, PackStreamValue>,
    timing: Timing,
}

impl CursorSlot {
    /// Whether the server still owes this cursor something.
    fn streaming(&self) -> bool {
        self.pull_in_flight || self.discard_in_flight || self.has_more
    }

    fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }

    fn finish(&mut self, state: CursorState) {
        self.has_more = false;
        self.pull_in_flight = false;
        self.discard_in_flight = false;
        if self.state != CursorState::Discarded {
            self.state = state;
        }
        self.timing.last_response = Some(Instant::now());
    }
}

#[derive(Debug)]
struct TxState {
    id: u64,
    failed: bool,
    abandoned: Arc<AtomicBool>,
}

/// Protocol session engine for one connection.
#[derive(Debug)]
pub struct SessionEngine {
    conn: Option<BoltConnection>,
    server: ServerInfo,
    capabilities: Capabilities,
    classifier: Arc<ErrorClassifier>,
    config: EngineConfig,
    state: EngineState,
    pending: VecDeque<Pending>,
    cursors: HashMap<CursorId, CursorSlot>,
    tx: Option<TxState>,
    bookmarks: Vec<String>,
    needs_reset: bool,
    closed: bool,
    next_seq: u64,
    next_cursor: u64,
    next_tx: u64,
}

impl SessionEngine {
    /// Engine over an initialized (post-HELLO) connection.
    pub fn new(conn: BoltConnection, config: EngineConfig, classifier: Arc<ErrorClassifier>) -> Self {
        let server = ServerInfo::from_connection(&conn);
        let capabilities = conn.adapter().capabilities();
        let bookmarks = config.bookmarks.clone();
        Self {
            conn: Some(conn),
            server,
            capabilities,
            classifier,
            config,
            state: EngineState::Idle,
            pending: VecDeque::new(),
            cursors: HashMap::new(),
            tx: None,
            bookmarks,
            needs_reset: false,
            closed: false,
            next_seq: 0,
            next_cursor: 0,
            next_tx: 0,
        }
    }

    /// Wrap into the shared form handed to sessions.
    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// Current state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Server this engine talks to.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Feature flags of the negotiated version.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Bookmark of the last completed transaction.
    pub fn last_bookmark(&self) -> Option<&str> {
        self.bookmarks.last().map(String::as_str)
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Autocommit RUN, pipelined with the first PULL.
    pub async fn run_autocommit(
        &mut self,
        query: Query,
        config: &TransactionConfig,
        access_mode: Option<AccessMode>,
    ) -> DriverResult<OpenedCursor> {
        self.settle_abandoned().await;
        self.ensure_open()?;
        if self.tx.is_some() {
            return Err(DriverError::session(
                "Queries cannot be run directly on a session with an open transaction; \
                 either run from within the transaction or use a different session",
            ));
        }
        self.settle_streams(true).await?;
        self.reset_if_needed().await?;

        let tx = TxMetadata {
            bookmarks: self.bookmarks.clone(),
            tx_timeout: config.timeout,
            tx_metadata: dehydrate_map(&config.metadata, self.capabilities.utc_date_times)?,
            mode: access_mode.unwrap_or(self.config.access_mode),
            database: self.config.database.clone(),
        };
        let opened = self.open_cursor(query, None, &tx).await?;
        self.state = EngineState::InAutocommit;
        Ok(opened)
    }

    /// RUN inside the open explicit transaction `tx_id`.
    pub async fn run_in_transaction(&mut self, tx_id: u64, query: Query) -> DriverResult<OpenedCursor> {
        self.ensure_open()?;
        let tx = self.current_tx(tx_id)?;
        if tx.failed {
            return Err(DriverError::transaction(
                "Cannot run more queries in this transaction, it has been rolled back due to a failure",
            ));
        }
        self.settle_streams(false).await?;
        self.open_cursor(query, Some(tx_id), &TxMetadata::default()).await
    }

    async fn open_cursor(
        &mut self,
        query: Query,
        tx_id: Option<u64>,
        tx: &TxMetadata,
    ) -> DriverResult<OpenedCursor> {
        let parameters = dehydrate_map(&query.parameters, self.capabilities.utc_date_times)?;
        let (run, pull) = {
            let adapter = self.conn_ref()?.adapter();
            (
                adapter.run(&query.text, parameters, tx)?,
                adapter.pull(StreamId::Unnamed, self.config.fetch_size),
            )
        };

        self.cursors.retain(|_, slot| slot.is_alive() || slot.streaming());
        let id = CursorId(self.next_cursor);
        self.next_cursor += 1;
        let token = Arc::new(());
        self.cursors.insert(
            id,
            CursorSlot {
                tx: tx_id,
                alive: Arc::downgrade(&token),
                stream: StreamId::Unnamed,
                keys: Arc::from(Vec::new()),
                buffer: VecDeque::new(),
                state: CursorState::Streaming,
                has_more: false,
                pull_in_flight: true,
                discard_in_flight: false,
                interrupted: false,
                error: None,
                fetch_size: self.config.fetch_size,
                query,
                run_metadata: HashMap::new(),
                summary_metadata: HashMap::new(),
                timing: Timing {
                    started: Instant::now(),
                    flushed: None,
                    first_response: None,
                    last_response: None,
                },
            },
        );

        let seq = self.submit(run, Request::Run(id))?;
        self.submit(pull, Request::Pull(id))?;
        self.flush().await?;
        if let Some(slot) = self.cursors.get_mut(&id) {
            slot.timing.flushed = Some(Instant::now());
        }

        match self.wait_for(seq).await? {
            Outcome::Success(_) => {
                let keys = self
                    .cursors
                    .get(&id)
                    .map(|slot| slot.keys.clone())
                    .unwrap_or_else(|| Arc::from(Vec::new()));
                Ok(OpenedCursor { id, keys, token })
            }
            Outcome::Failure(err) => {
                self.cursors.remove(&id);
                Err(err)
            }
            Outcome::Ignored => {
                self.cursors.remove(&id);
                Err(DriverError::transaction(
                    "Query was ignored because an earlier query in this transaction failed",
                ))
            }
        }
    }

    /// Before a RUN or BEGIN: buffer every unfinished stream that a new
    /// statement would orphan, and discard the ones nobody can read any more.
    /// Streams with a query id survive, except autocommit streams when the
    /// next statement leaves the current autocommit transaction.
    async fn settle_streams(&mut self, leaving_autocommit: bool) -> DriverResult<()> {
        let ids: Vec<CursorId> = self
            .cursors
            .iter()
            .filter(|(_, slot)| {
                slot.streaming()
                    && (slot.stream == StreamId::Unnamed || (leaving_autocommit && slot.tx.is_none()))
            })
            .map(|(id, _)| *id)
            .collect();

        for id in ids {
            let alive = self.cursors.get(&id).map_or(false, CursorSlot::is_alive);
            if alive {
                self.buffer_all(id).await?;
            } else {
                self.discard_stream(id).await?;
            }
        }
        Ok(())
    }

    async fn buffer_all(&mut self, id: CursorId) -> DriverResult<()> {
        loop {
            let Some(slot) = self.cursors.get_mut(&id) else {
                return Ok(());
            };
            if slot.pull_in_flight || slot.discard_in_flight {
                self.receive_next().await?;
            } else if slot.has_more {
                slot.pull_in_flight = true;
                let stream = slot.stream;
                let pull = self.conn_ref()?.adapter().pull(stream, FETCH_ALL);
                self.submit(pull, Request::Pull(id))?;
                self.flush().await?;
            } else {
                debug!(cursor = ?id, "stream buffered");
                return Ok(());
            }
        }
    }

    async fn discard_stream(&mut self, id: CursorId) -> DriverResult<()> {
        loop {
            let Some(slot) = self.cursors.get_mut(&id) else {
                return Ok(());
            };
            if slot.pull_in_flight || slot.discard_in_flight {
                self.receive_next().await?;
            } else if slot.has_more {
                slot.discard_in_flight = true;
                let stream = slot.stream;
                let discard = self.conn_ref()?.adapter().discard(stream);
                self.submit(discard, Request::Discard(id))?;
                self.flush().await?;
            } else {
                return Ok(());
            }
        }
    }

    // ========================================================================
    // Cursors
    // ========================================================================

    /// Make a record available in the cursor's buffer if the stream has one.
    async fn fill(&mut self, id: CursorId) -> DriverResult<bool> {
        let filled = self.fill_inner(id).await;
        if filled.is_err() {
            // the caller has now seen the failure
            if let Some(slot) = self.cursors.get_mut(&id) {
                slot.interrupted = false;
            }
        }
        filled
    }

    async fn fill_inner(&mut self, id: CursorId) -> DriverResult<bool> {
        loop {
            let Some(slot) = self.cursors.get_mut(&id) else {
                return Ok(false);
            };
            if !slot.buffer.is_empty() {
                return Ok(true);
            }
            if let Some(err) = slot.error.take() {
                return Err(err);
            }
            if slot.interrupted {
                slot.state = CursorState::Discarded;
                return Err(DriverError::connectivity(
                    "Connection was lost before the result was fully received",
                ));
            }
            if slot.pull_in_flight || slot.discard_in_flight {
                self.receive_next().await?;
                continue;
            }
            if slot.has_more && slot.state != CursorState::Discarded {
                let tx_failed = match (slot.tx, self.tx.as_ref()) {
                    (Some(owner), Some(tx)) => tx.id == owner && tx.failed,
                    _ => false,
                };
                if tx_failed {
                    slot.buffer.clear();
                    slot.finish(CursorState::Discarded);
                    slot.state = CursorState::Discarded;
                    return Err(unfinished_in_failed_transaction());
                }
                slot.pull_in_flight = true;
                let (stream, n) = (slot.stream, slot.fetch_size);
                let pull = self.conn_ref()?.adapter().pull(stream, n);
                self.submit(pull, Request::Pull(id))?;
                self.flush().await?;
                continue;
            }
            return Ok(false);
        }
    }

    /// Next record, `None` at the end of the stream.
    pub async fn next_record(&mut self, id: CursorId) -> DriverResult<Option<Record>> {
        if !self.fill(id).await? {
            return Ok(None);
        }
        let Some(slot) = self.cursors.get_mut(&id) else {
            return Ok(None);
        };
        let record = slot.buffer.pop_front();
        if record.is_some() && slot.state == CursorState::Streaming {
            slot.state = CursorState::PartiallyConsumed;
        }
        Ok(record)
    }

    /// Next record without consuming it.
    pub async fn peek_record(&mut self, id: CursorId) -> DriverResult<Option<Record>> {
        if !self.fill(id).await? {
            return Ok(None);
        }
        Ok(self
            .cursors
            .get(&id)
            .and_then(|slot| slot.buffer.front().cloned()))
    }

    /// Lifecycle state of a cursor.
    pub fn cursor_state(&self, id: CursorId) -> CursorState {
        self.cursors
            .get(&id)
            .map_or(CursorState::Discarded, |slot| slot.state)
    }

    /// Throw away the rest of the stream and build the summary.
    pub async fn consume(&mut self, id: CursorId) -> DriverResult<ResultSummary> {
        if let Some(slot) = self.cursors.get_mut(&id) {
            if let Some(err) = slot.error.take() {
                slot.buffer.clear();
                return Err(err);
            }
            let tx_failed = match (slot.tx, self.tx.as_ref()) {
                (Some(owner), Some(tx)) => tx.id == owner && tx.failed,
                _ => false,
            };
            if tx_failed && slot.has_more {
                slot.buffer.clear();
                slot.finish(CursorState::Discarded);
                slot.state = CursorState::Discarded;
                return Err(unfinished_in_failed_transaction());
            }
            slot.buffer.clear();
            if slot.has_more || slot.pull_in_flight {
                slot.state = CursorState::Discarded;
            }
        }
        if self.conn_ref().is_ok() {
            self.discard_stream(id).await?;
        }

        let Some(slot) = self.cursors.get_mut(&id) else {
            return Err(DriverError::session("Result is no longer available"));
        };
        slot.buffer.clear();
        if let Some(err) = slot.error.take() {
            return Err(err);
        }
        if slot.interrupted {
            slot.interrupted = false;
            return Err(DriverError::connectivity(
                "Connection was lost before the result was fully received",
            ));
        }
        Ok(ResultSummary::from_metadata(
            slot.query.clone(),
            &slot.run_metadata,
            &slot.summary_metadata,
            self.server.clone(),
            slot.timing.latency(),
        ))
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// BEGIN an explicit transaction.
    pub async fn begin(
        &mut self,
        config: &TransactionConfig,
        access_mode: Option<AccessMode>,
    ) -> DriverResult<OpenedTransaction> {
        self.settle_abandoned().await;
        self.ensure_open()?;
        if self.tx.is_some() {
            return Err(DriverError::transaction(
                "You cannot begin a transaction on a session with an open transaction",
            ));
        }
        self.settle_streams(true).await?;
        self.reset_if_needed().await?;

        let tx = TxMetadata {
            bookmarks: self.bookmarks.clone(),
            tx_timeout: config.timeout,
            tx_metadata: dehydrate_map(&config.metadata, self.capabilities.utc_date_times)?,
            mode: access_mode.unwrap_or(self.config.access_mode),
            database: self.config.database.clone(),
        };
        let begin = self.conn_ref()?.adapter().begin(&tx)?;
        let seq = self.submit(begin, Request::Begin)?;
        self.flush().await?;

        match self.wait_for(seq).await? {
            Outcome::Success(_) => {
                let id = self.next_tx;
                self.next_tx += 1;
                let abandoned = Arc::new(AtomicBool::new(false));
                self.tx = Some(TxState {
                    id,
                    failed: false,
                    abandoned: abandoned.clone(),
                });
                self.state = EngineState::InTransaction;
                debug!(tx = id, "transaction started");
                Ok(OpenedTransaction { id, abandoned })
            }
            Outcome::Failure(err) => Err(err),
            Outcome::Ignored => Err(DriverError::protocol("BEGIN was ignored")),
        }
    }

    /// COMMIT, after every open stream of the transaction is discarded.
    /// Returns the bookmark of the committed transaction.
    pub async fn commit(&mut self, tx_id: u64) -> DriverResult<Option<String>> {
        self.ensure_open()?;
        self.current_tx(tx_id)?;

        let cursor_error = self.discard_transaction_streams(tx_id).await?;
        let failed = self.tx.as_ref().map_or(true, |tx| tx.failed);
        if failed || cursor_error.is_some() {
            self.reset().await?;
            return Err(cursor_error.unwrap_or_else(|| {
                DriverError::transaction(
                    "Transaction has been rolled back because of an earlier failure",
                )
            }));
        }

        let commit = self.conn_ref()?.adapter().commit();
        let seq = self.submit(commit, Request::Commit)?;
        self.flush().await?;
        let outcome = self.wait_for(seq).await?;
        self.end_transaction();

        match outcome {
            Outcome::Success(success) => {
                let bookmark = success.bookmark().map(str::to_string);
                if let Some(bookmark) = &bookmark {
                    self.bookmarks = vec![bookmark.clone()];
                }
                debug!(tx = tx_id, bookmark = ?bookmark, "transaction committed");
                Ok(bookmark)
            }
            Outcome::Failure(err) => Err(err),
            Outcome::Ignored => Err(DriverError::protocol("COMMIT was ignored")),
        }
    }

    /// ROLLBACK, or RESET when the transaction already failed.
    pub async fn rollback(&mut self, tx_id: u64) -> DriverResult<()> {
        self.ensure_open()?;
        self.current_tx(tx_id)?;

        if let Some(err) = self.discard_transaction_streams(tx_id).await? {
            debug!(tx = tx_id, error = %err, "failure dropped by rollback");
        }
        if self.tx.as_ref().map_or(true, |tx| tx.failed) {
            return self.reset().await;
        }

        let rollback = self.conn_ref()?.adapter().rollback();
        let seq = self.submit(rollback, Request::Rollback)?;
        self.flush().await?;
        let outcome = self.wait_for(seq).await?;
        self.end_transaction();

        match outcome {
            Outcome::Success(_) => {
                debug!(tx = tx_id, "transaction rolled back");
                Ok(())
            }
            Outcome::Failure(err) => Err(err),
            Outcome::Ignored => Err(DriverError::protocol("ROLLBACK was ignored")),
        }
    }

    /// Whether `tx_id` is still the open transaction.
    pub fn is_transaction_open(&self, tx_id: u64) -> bool {
        self.tx.as_ref().map_or(false, |tx| tx.id == tx_id)
    }

    fn current_tx(&self, tx_id: u64) -> DriverResult<&TxState> {
        self.tx
            .as_ref()
            .filter(|tx| tx.id == tx_id)
            .ok_or_else(|| DriverError::transaction("Transaction is no longer open"))
    }

    /// Discard every unfinished stream of the transaction and drop unread
    /// records. Returns the first failure a stream carried.
    async fn discard_transaction_streams(&mut self, tx_id: u64) -> DriverResult<Option<DriverError>> {
        let ids: Vec<CursorId> = self
            .cursors
            .iter()
            .filter(|(_, slot)| slot.tx == Some(tx_id))
            .map(|(id, _)| *id)
            .collect();

        loop {
            let mut waiting = false;
            let mut discards = Vec::new();
            for id in &ids {
                let Some(slot) = self.cursors.get_mut(id) else {
                    continue;
                };
                if slot.pull_in_flight || slot.discard_in_flight {
                    slot.state = CursorState::Discarded;
                    waiting = true;
                } else if slot.has_more {
                    slot.discard_in_flight = true;
                    slot.state = CursorState::Discarded;
                    discards.push((*id, slot.stream));
                    waiting = true;
                }
            }
            if !waiting {
                break;
            }
            for (id, stream) in discards {
                let discard = self.conn_ref()?.adapter().discard(stream);
                self.submit(discard, Request::Discard(id))?;
            }
            self.flush().await?;
            self.receive_next().await?;
        }

        let mut first_error = None;
        for id in &ids {
            if let Some(slot) = self.cursors.get_mut(id) {
                slot.buffer.clear();
                if let Some(err) = slot.error.take() {
                    first_error.get_or_insert(err);
                }
            }
        }
        Ok(first_error)
    }

    fn end_transaction(&mut self) {
        self.tx = None;
        self.state = EngineState::Idle;
    }

    /// Roll back a transaction whose handle was dropped while open.
    async fn settle_abandoned(&mut self) {
        let abandoned = match &self.tx {
            Some(tx) if tx.abandoned.load(Ordering::Acquire) => tx.id,
            _ => return,
        };
        debug!(tx = abandoned, "rolling back abandoned transaction");
        if let Err(e) = self.rollback(abandoned).await {
            warn!(tx = abandoned, error = %e, "rollback of abandoned transaction failed");
            self.end_transaction();
        }
    }

    // ========================================================================
    // Reset / close
    // ========================================================================

    /// RESET: abort whatever is in flight and return to idle. Every
    /// unfinished cursor becomes discarded.
    pub async fn reset(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        let unfinished: Vec<CursorId> = self
            .cursors
            .iter_mut()
            .filter(|(_, slot)| slot.streaming() || slot.state == CursorState::Streaming)
            .map(|(id, slot)| {
                slot.state = CursorState::Discarded;
                *id
            })
            .collect();
        let reset = self.conn_ref()?.adapter().reset();
        let seq = self.submit(reset, Request::Reset)?;
        self.flush().await?;
        let outcome = self.wait_for(seq).await?;

        for id in unfinished {
            if let Some(slot) = self.cursors.get_mut(&id) {
                slot.buffer.clear();
                slot.finish(CursorState::Discarded);
            }
        }
        self.end_transaction();
        self.needs_reset = false;

        match outcome {
            Outcome::Success(_) => {
                debug!("session reset");
                Ok(())
            }
            Outcome::Failure(err) => {
                self.mark_defunct();
                Err(err)
            }
            Outcome::Ignored => {
                self.mark_defunct();
                Err(DriverError::protocol("RESET was ignored"))
            }
        }
    }

    async fn reset_if_needed(&mut self) -> DriverResult<()> {
        if self.needs_reset {
            self.reset().await?;
        }
        Ok(())
    }

    /// Roll back an open transaction, reset an unfinished autocommit
    /// stream, and give the connection back. Idempotent.
    pub async fn close(&mut self) -> Option<BoltConnection> {
        if self.closed {
            return None;
        }
        if self.conn_ref().is_ok() {
            if let Some(tx_id) = self.tx.as_ref().map(|tx| tx.id) {
                if let Err(e) = self.rollback(tx_id).await {
                    warn!(error = %e, "rollback on session close failed");
                }
            } else if self.needs_reset
                || self.cursors.values().any(|slot| slot.tx.is_none() && slot.streaming())
            {
                if let Err(e) = self.reset().await {
                    warn!(error = %e, "reset on session close failed");
                }
            }
        }
        for slot in self.cursors.values_mut() {
            if slot.streaming() {
                slot.finish(CursorState::Discarded);
                slot.interrupted = true;
            }
        }
        self.pending.clear();
        self.tx = None;
        self.state = EngineState::Idle;
        self.closed = true;
        self.conn.take()
    }

    // ========================================================================
    // Wire plumbing
    // ========================================================================

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::session("Session is closed"));
        }
        self.conn_ref().map(|_| ())
    }

    fn conn_ref(&self) -> DriverResult<&BoltConnection> {
        match &self.conn {
            Some(conn) if !conn.is_defunct() => Ok(conn),
            Some(_) => Err(DriverError::connectivity("Connection is defunct")),
            None => Err(DriverError::session("Session is closed")),
        }
    }

    fn submit(&mut self, request: BoltRequest, kind: Request) -> DriverResult<u64> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.send(request),
            None => return Err(DriverError::session("Session is closed")),
        };
        if let Err(e) = result {
            return Err(self.fatal(e));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back(Pending { seq, request: kind });
        Ok(seq)
    }

    async fn flush(&mut self) -> DriverResult<()> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.flush().await,
            None => return Err(DriverError::session("Session is closed")),
        };
        result.map_err(|e| self.fatal(e))
    }

    async fn wait_for(&mut self, seq: u64) -> DriverResult<Outcome> {
        loop {
            if let Some(done) = self.receive_next().await? {
                if done.seq == seq {
                    return Ok(done.outcome);
                }
                debug!(seq = done.seq, "completion without a waiter");
            }
        }
    }

    /// Read and route one response.
    async fn receive_next(&mut self) -> DriverResult<Option<Completed>> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.receive_one().await,
            None => return Err(DriverError::session("Session is closed")),
        };
        let response = result.map_err(|e| self.fatal(e))?;

        match response {
            BoltResponse::Record(record) => {
                let Some(Request::Pull(id)) = self.pending.front().map(|p| p.request) else {
                    return Err(self.fatal(BoltError::Protocol(
                        "RECORD received without an outstanding PULL".into(),
                    )));
                };
                let values = record
                    .fields
                    .into_iter()
                    .map(Value::hydrate)
                    .collect::<Result<Vec<_>, _>>();
                let values = match values {
                    Ok(values) => values,
                    Err(e) => return Err(self.fatal(BoltError::PackStream(e))),
                };
                if let Some(slot) = self.cursors.get_mut(&id) {
                    slot.buffer.push_back(Record::new(slot.keys.clone(), values));
                }
                Ok(None)
            }
            summary => {
                let Some(pending) = self.pending.pop_front() else {
                    return Err(self.fatal(BoltError::Protocol(format!(
                        "{} received without an outstanding request",
                        summary.name()
                    ))));
                };
                let outcome = match summary {
                    BoltResponse::Success(success) => Outcome::Success(success),
                    BoltResponse::Failure(failure) => {
                        debug!(code = %failure.code, request = ?pending.request, "S: FAILURE");
                        let err = self.classifier.classify(failure);
                        if err.is_fatal() {
                            if let Some(conn) = self.conn.as_mut() {
                                conn.mark_defunct();
                            }
                        }
                        Outcome::Failure(err)
                    }
                    _ => Outcome::Ignored,
                };
                Ok(self.complete(pending, outcome))
            }
        }
    }

    /// Apply a summary to the request it answers. Cursor requests are
    /// absorbed into their slot; the rest go back to the waiter.
    fn complete(&mut self, pending: Pending, outcome: Outcome) -> Option<Completed> {
        if matches!(outcome, Outcome::Failure(_)) {
            self.needs_reset = true;
            match self.tx.as_mut() {
                Some(tx) => tx.failed = true,
                None => self.state = EngineState::Idle,
            }
        }

        match pending.request {
            Request::Run(id) => {
                if let (Some(slot), Outcome::Success(success)) = (self.cursors.get_mut(&id), &outcome) {
                    slot.keys = success.fields().unwrap_or_default().into();
                    slot.stream = self
                        .conn
                        .as_ref()
                        .map_or(StreamId::Unnamed, |conn| conn.adapter().stream_id(success));
                    slot.run_metadata = success.metadata.clone();
                    slot.timing.first_response = Some(Instant::now());
                }
                Some(Completed { seq: pending.seq, outcome })
            }
            Request::Pull(id) | Request::Discard(id) => {
                let discard = matches!(pending.request, Request::Discard(_));
                let autocommit_done = self.absorb_stream_summary(id, discard, outcome);
                if autocommit_done && self.tx.is_none() {
                    let still_streaming = self
                        .cursors
                        .values()
                        .any(|slot| slot.tx.is_none() && slot.streaming());
                    if !still_streaming {
                        self.state = EngineState::Idle;
                    }
                }
                None
            }
            Request::Begin | Request::Commit | Request::Rollback | Request::Reset => {
                Some(Completed { seq: pending.seq, outcome })
            }
        }
    }

    /// Returns true when an autocommit stream finished.
    fn absorb_stream_summary(&mut self, id: CursorId, discard: bool, outcome: Outcome) -> bool {
        let Some(slot) = self.cursors.get_mut(&id) else {
            return false;
        };
        if slot.timing.first_response.is_none() {
            slot.timing.first_response = Some(Instant::now());
        }
        let autocommit = slot.tx.is_none();
        match outcome {
            Outcome::Success(success) => {
                if success.has_more() && !discard {
                    slot.pull_in_flight = false;
                    slot.has_more = true;
                    return false;
                }
                let bookmark = success.bookmark().map(str::to_string);
                slot.summary_metadata = success.metadata;
                slot.finish(if discard {
                    CursorState::Discarded
                } else {
                    CursorState::Exhausted
                });
                if autocommit {
                    if let Some(bookmark) = bookmark {
                        self.bookmarks = vec![bookmark];
                    }
                }
                autocommit
            }
            Outcome::Failure(err) => {
                slot.error = Some(err);
                slot.finish(CursorState::Discarded);
                slot.state = CursorState::Discarded;
                autocommit
            }
            Outcome::Ignored => {
                if slot.state != CursorState::Discarded {
                    slot.error = Some(unfinished_in_failed_transaction());
                }
                slot.finish(CursorState::Discarded);
                slot.state = CursorState::Discarded;
                autocommit
            }
        }
    }

    /// A transport or protocol failure: the connection is gone, every
    /// outstanding request is dropped and unfinished cursors are cut off.
    fn fatal(&mut self, err: BoltError) -> DriverError {
        warn!(error = %err, "connection failure, marking defunct");
        self.mark_defunct();
        DriverError::from(err)
    }

    fn mark_defunct(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.mark_defunct();
        }
        self.pending.clear();
        for slot in self.cursors.values_mut() {
            if slot.streaming() {
                slot.finish(CursorState::Discarded);
                slot.interrupted = true;
            }
        }
        if let Some(tx) = self.tx.as_mut() {
            tx.failed = true;
        }
        self.needs_reset = false;
        self.state = EngineState::Idle;
    }
}

fn unfinished_in_failed_transaction() -> DriverError {
    DriverError::transaction(
        "Transaction failed, result was not fully received; \
         the server ignored the request after an earlier failure",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::BoltVersion;
    use crate::driver::bolt::stub::{connect, Script};
    use crate::driver::error::ErrorKind;

    fn engine_config(fetch_size: i64) -> EngineConfig {
        EngineConfig {
            database: None,
            access_mode: AccessMode::Write,
            fetch_size,
            bookmarks: vec!["bm:0".into()],
        }
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let script = vec![
            Script::client("RUN"),
            Script::client("PULL"),
            Script::fields(&["x"]),
            Script::int_record(1),
            Script::has_more(),
            Script::client("DISCARD"),
            Script::done(),
            Script::client("BEGIN"),
            Script::success(),
            Script::client("COMMIT"),
            Script::bookmark("bm:1"),
        ];
        let (conn, server) = connect(BoltVersion::V4_4, script).await;
        let mut engine = SessionEngine::new(conn, engine_config(1), Arc::new(ErrorClassifier::default()));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.last_bookmark(), Some("bm:0"));

        let cursor = engine
            .run_autocommit(Query::new("UNWIND range(1, 5) AS x RETURN x"), &TransactionConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(&cursor.keys[..], &["x".to_string()]);
        assert_eq!(engine.state(), EngineState::InAutocommit);

        engine.consume(cursor.id).await.unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.cursor_state(cursor.id), CursorState::Discarded);

        let tx = engine.begin(&TransactionConfig::default(), None).await.unwrap();
        assert_eq!(engine.state(), EngineState::InTransaction);
        assert!(engine.is_transaction_open(tx.id));

        let bookmark = engine.commit(tx.id).await.unwrap();
        assert_eq!(bookmark.as_deref(), Some("bm:1"));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.last_bookmark(), Some("bm:1"));

        assert!(engine.close().await.is_some());
        assert!(engine.is_closed());
        assert!(engine.close().await.is_none());

        let requests = server.await.unwrap();
        match &requests[0] {
            BoltRequest::Run(run) => assert_eq!(
                run.extra.get("bookmarks"),
                Some(&PackStreamValue::List(vec![PackStreamValue::String("bm:0".into())]))
            ),
            other => panic!("expected RUN, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unexpected_record_is_fatal() {
        let script = vec![
            Script::client("BEGIN"),
            Script::int_record(1),
        ];
        let (conn, _server) = connect(BoltVersion::V4_4, script).await;
        let mut engine = SessionEngine::new(conn, engine_config(1000), Arc::new(ErrorClassifier::default()));

        let err = engine.begin(&TransactionConfig::default(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(engine.state(), EngineState::Idle);

        let conn = engine.close().await.unwrap();
        assert!(conn.is_defunct());
    }
}
