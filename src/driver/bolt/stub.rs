//! Scripted in-process Bolt server for tests.
//!
//! A script is a list of expected client messages (by name) and canned
//! server replies, played in order. The server task panics on the first
//! unexpected client message and returns every request it received.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::bolt::codec::BoltRequestCodec;
use crate::bolt::{
    BoltRequest, BoltResponse, BoltVersion, FailureMessage, PackStreamValue, RecordMessage,
    SuccessMessage,
};
use crate::driver::error::{DriverError, DriverResult};
use crate::driver::pool::ConnectionProvider;

use super::connection::BoltConnection;

/// One step of a server script.
#[derive(Debug, Clone)]
pub enum Script {
    /// Expect a client message with this name (`RUN`, `PULL`, ...)
    Client(&'static str),
    /// Send this response
    Server(BoltResponse),
}

impl Script {
    /// Expect a client message
    pub fn client(name: &'static str) -> Self {
        Script::Client(name)
    }

    /// Send a canned response
    pub fn server(response: BoltResponse) -> Self {
        Script::Server(response)
    }

    pub fn success() -> Self {
        Script::Server(BoltResponse::Success(SuccessMessage::new()))
    }

    pub fn success_with(message: SuccessMessage) -> Self {
        Script::Server(BoltResponse::Success(message))
    }

    pub fn fields(fields: &[&str]) -> Self {
        Script::Server(BoltResponse::Success(SuccessMessage::run(fields, None)))
    }

    pub fn fields_qid(fields: &[&str], qid: i64) -> Self {
        Script::Server(BoltResponse::Success(SuccessMessage::run(fields, Some(qid))))
    }

    pub fn record(values: Vec<PackStreamValue>) -> Self {
        Script::Server(BoltResponse::Record(RecordMessage::new(values)))
    }

    pub fn int_record(n: i64) -> Self {
        Self::record(vec![PackStreamValue::Integer(n)])
    }

    pub fn has_more() -> Self {
        Script::Server(BoltResponse::Success(SuccessMessage::streaming(true, None)))
    }

    pub fn done() -> Self {
        Script::Server(BoltResponse::Success(SuccessMessage::streaming(false, None)))
    }

    pub fn bookmark(bookmark: &str) -> Self {
        Script::Server(BoltResponse::Success(SuccessMessage::streaming(false, Some(bookmark))))
    }

    pub fn failure(code: &str, message: &str) -> Self {
        Script::Server(BoltResponse::Failure(FailureMessage::new(code, message)))
    }

    pub fn ignored() -> Self {
        Script::Server(BoltResponse::Ignored)
    }
}

/// Play `script` on `stream`, starting with the server side of the handshake.
pub fn serve<S>(stream: S, version: BoltVersion, script: Vec<Script>) -> JoinHandle<Vec<BoltRequest>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut stream = stream;
        let mut handshake = [0u8; 20];
        stream.read_exact(&mut handshake).await.expect("handshake request");
        stream.write_all(&version.to_bytes()).await.expect("handshake reply");

        let mut framed = Framed::new(stream, BoltRequestCodec::new());
        let mut received = Vec::new();
        for (step, line) in script.into_iter().enumerate() {
            match line {
                Script::Client(name) => {
                    let request = framed
                        .next()
                        .await
                        .unwrap_or_else(|| panic!("step {}: client hung up, expected {}", step, name))
                        .expect("decodable request");
                    assert_eq!(request.name(), name, "step {}: got {:?}", step, request);
                    received.push(request);
                }
                Script::Server(response) => {
                    framed.send(response).await.expect("write response");
                }
            }
        }
        received
    })
}

/// Log to the test output when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Connection to a scripted server over an in-memory pipe.
pub async fn connect(
    version: BoltVersion,
    script: Vec<Script>,
) -> (BoltConnection, JoinHandle<Vec<BoltRequest>>) {
    init_tracing();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let handle = serve(server, version, script);
    let conn = BoltConnection::open(client, "stub:7687", None)
        .await
        .expect("stub handshake");
    (conn, handle)
}

/// Provider handing out pre-scripted connections in order.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    ready: Mutex<VecDeque<BoltConnection>>,
    /// Connections handed back with `release`
    pub released: Mutex<usize>,
    /// Connections handed back with `discard`
    pub discarded: Mutex<usize>,
}

impl ScriptedProvider {
    /// Provider with one scripted connection.
    pub async fn single(
        version: BoltVersion,
        script: Vec<Script>,
    ) -> (Arc<Self>, JoinHandle<Vec<BoltRequest>>) {
        let (conn, handle) = connect(version, script).await;
        let provider = Self::default();
        provider.ready.lock().push_back(conn);
        (Arc::new(provider), handle)
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    async fn acquire(&self) -> DriverResult<BoltConnection> {
        self.ready
            .lock()
            .pop_front()
            .ok_or_else(|| DriverError::connectivity("no scripted connection left"))
    }

    async fn release(&self, _conn: BoltConnection) {
        *self.released.lock() += 1;
    }

    async fn discard(&self, _conn: BoltConnection) {
        *self.discarded.lock() += 1;
    }

    async fn close(&self) {
        self.ready.lock().clear();
    }
}
