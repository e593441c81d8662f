//! Client-side Bolt connection.
//!
//! Owns one duplex link: performs the handshake, queues outgoing messages,
//! writes them in one go on [`BoltConnection::flush`], and reassembles
//! incoming messages. Any transport failure leaves the connection defunct.

use std::fmt;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

use crate::bolt::codec::BoltResponseCodec;
use crate::bolt::handshake::HANDSHAKE_RESPONSE_SIZE;
use crate::bolt::{
    AuthToken, BoltError, BoltRequest, BoltResponse, BoltResult, BoltVersion, Handshake,
    HandshakeError,
};
use crate::driver::error::{DriverError, DriverResult};

use super::protocol::{adapter_for, ProtocolAdapter};

/// Anything that can carry Bolt bytes: a TCP socket, a TLS stream, an
/// in-memory duplex pipe.
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkStream for T {}

/// One negotiated Bolt connection.
pub struct BoltConnection {
    link: Box<dyn LinkStream>,
    codec: BoltResponseCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
    adapter: Box<dyn ProtocolAdapter>,
    address: String,
    read_timeout: Option<Duration>,
    server_agent: Option<String>,
    connection_id: Option<String>,
    defunct: bool,
    closed: bool,
}

impl BoltConnection {
    /// Dial `address` over TCP and perform the handshake.
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> BoltResult<Self> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| BoltError::Timeout)??;
        stream.set_nodelay(true)?;
        Self::open(stream, address, read_timeout).await
    }

    /// Perform the handshake over an already established link.
    pub async fn open<L: LinkStream + 'static>(
        link: L,
        address: impl Into<String>,
        read_timeout: Option<Duration>,
    ) -> BoltResult<Self> {
        let mut link: Box<dyn LinkStream> = Box::new(link);
        let address = address.into();
        let handshake = Handshake::new();

        link.write_all(&handshake.request_bytes()).await?;
        link.flush().await?;

        let mut reply = [0u8; HANDSHAKE_RESPONSE_SIZE];
        let read = link.read_exact(&mut reply);
        let result = match read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| BoltError::Handshake(HandshakeError::Timeout))?,
            None => read.await,
        };
        if let Err(e) = result {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    BoltError::Handshake(HandshakeError::ConnectionClosed)
                }
                _ => BoltError::Io(e),
            });
        }

        let version = handshake.parse_reply(reply)?;
        info!(address = %address, version = %version, "Bolt connection established");

        Ok(Self {
            link,
            codec: BoltResponseCodec::new(),
            read_buffer: BytesMut::with_capacity(8192),
            write_buffer: BytesMut::with_capacity(8192),
            adapter: adapter_for(version),
            address,
            read_timeout,
            server_agent: None,
            connection_id: None,
            defunct: false,
            closed: false,
        })
    }

    /// Send HELLO and wait for its answer. A FAILURE here is always an
    /// authentication error.
    pub async fn hello(&mut self, user_agent: &str, auth: &AuthToken) -> DriverResult<()> {
        let request = self.adapter.hello(user_agent, auth);
        self.send(request)?;
        self.flush().await?;

        match self.receive_one().await? {
            BoltResponse::Success(success) => {
                self.server_agent = success.server().map(str::to_string);
                self.connection_id = success.connection_id().map(str::to_string);
                debug!(
                    server = ?self.server_agent,
                    connection_id = ?self.connection_id,
                    "HELLO accepted"
                );
                Ok(())
            }
            BoltResponse::Failure(failure) => {
                self.defunct = true;
                Err(DriverError::Authentication {
                    code: failure.code,
                    message: failure.message,
                })
            }
            other => {
                self.defunct = true;
                Err(DriverError::protocol(format!(
                    "Unexpected {} in response to HELLO",
                    other.name()
                )))
            }
        }
    }

    /// Queue a message. No I/O happens until [`flush`](Self::flush).
    pub fn send(&mut self, request: BoltRequest) -> BoltResult<()> {
        self.ensure_usable()?;
        trace!(connection_id = ?self.connection_id, "C: {:?}", request);
        if let Err(e) = self.codec.encode(request, &mut self.write_buffer) {
            self.defunct = true;
            return Err(e);
        }
        Ok(())
    }

    /// Write every queued message to the link.
    pub async fn flush(&mut self) -> BoltResult<()> {
        self.ensure_usable()?;
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let pending = self.write_buffer.split();
        let result = async {
            self.link.write_all(&pending).await?;
            self.link.flush().await
        }
        .await;
        if let Err(e) = result {
            self.defunct = true;
            warn!(address = %self.address, error = %e, "write failed");
            return Err(e.into());
        }
        Ok(())
    }

    /// Wait for the next complete message.
    pub async fn receive_one(&mut self) -> BoltResult<BoltResponse> {
        self.ensure_usable()?;
        match self.read_message().await {
            Ok(response) => {
                trace!(connection_id = ?self.connection_id, "S: {:?}", response);
                Ok(response)
            }
            Err(e) => {
                self.defunct = true;
                warn!(address = %self.address, error = %e, "read failed");
                Err(e)
            }
        }
    }

    async fn read_message(&mut self) -> BoltResult<BoltResponse> {
        loop {
            if let Some(response) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(response);
            }

            let read = self.link.read_buf(&mut self.read_buffer);
            let n = match self.read_timeout {
                Some(limit) => tokio::time::timeout(limit, read)
                    .await
                    .map_err(|_| BoltError::Timeout)??,
                None => read.await?,
            };

            if n == 0 {
                return match self.codec.decode_eof(&mut self.read_buffer)? {
                    Some(response) => Ok(response),
                    None => Err(BoltError::ConnectionClosed),
                };
            }
        }
    }

    /// Send GOODBYE (best effort) and shut the link down.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        if !self.defunct {
            let goodbye = self.adapter.goodbye();
            if self.send(goodbye).is_ok() {
                let _ = self.flush().await;
            }
        }
        let _ = self.link.shutdown().await;
        self.closed = true;
        debug!(address = %self.address, "connection closed");
    }

    fn ensure_usable(&self) -> BoltResult<()> {
        if self.closed || self.defunct {
            Err(BoltError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Mark the connection as unusable.
    pub fn mark_defunct(&mut self) {
        self.defunct = true;
    }

    /// Whether the connection must be discarded.
    pub fn is_defunct(&self) -> bool {
        self.defunct
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Adapter of the negotiated version.
    pub fn adapter(&self) -> &dyn ProtocolAdapter {
        self.adapter.as_ref()
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> BoltVersion {
        self.adapter.version()
    }

    /// Address this connection was opened to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Server agent string from HELLO.
    pub fn server_agent(&self) -> Option<&str> {
        self.server_agent.as_deref()
    }

    /// Server-assigned connection id from HELLO.
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }
}

impl fmt::Debug for BoltConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoltConnection")
            .field("address", &self.address)
            .field("version", &self.version())
            .field("connection_id", &self.connection_id)
            .field("defunct", &self.defunct)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::{SuccessMessage, BOLT_MAGIC};
    use crate::driver::bolt::stub::{self, Script};

    #[tokio::test]
    async fn test_handshake_bytes_and_version() {
        let (client, mut server) = tokio::io::duplex(1024);
        let server_task = tokio::spawn(async move {
            let mut request = [0u8; 20];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(&[0, 0, 4, 4]).await.unwrap();
            request
        });

        let conn = BoltConnection::open(client, "stub:7687", None).await.unwrap();
        assert_eq!(conn.version(), BoltVersion::V4_4);

        let request = server_task.await.unwrap();
        assert_eq!(&request[..4], &BOLT_MAGIC);
        assert_eq!(&request[4..8], &[0, 0, 0, 5]);
        assert_eq!(&request[8..12], &[0, 2, 4, 4]);
        assert_eq!(&request[12..16], &[0, 1, 1, 4]);
        assert_eq!(&request[16..20], &[0, 0, 0, 3]);
    }

    #[tokio::test]
    async fn test_handshake_rejected() {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut request = [0u8; 20];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(&[0, 0, 0, 0]).await.unwrap();
        });

        let err = BoltConnection::open(client, "stub:7687", None).await.unwrap_err();
        assert!(matches!(err, BoltError::Handshake(HandshakeError::NoCompatibleVersion)));
    }

    #[tokio::test]
    async fn test_http_endpoint_detected() {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let mut request = [0u8; 20];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(b"HTTP").await.unwrap();
        });

        let err = BoltConnection::open(client, "stub:7474", None).await.unwrap_err();
        assert!(matches!(err, BoltError::Handshake(HandshakeError::HttpEndpoint)));
    }

    #[tokio::test]
    async fn test_hello_records_server_info() {
        let (mut conn, server) = stub::connect(
            BoltVersion::V5_0,
            vec![
                Script::client("HELLO"),
                Script::server(BoltResponse::Success(SuccessMessage::hello("Neo4j/5.0.0", "bolt-7"))),
            ],
        )
        .await;

        conn.hello("boltwire/test", &AuthToken::basic("neo4j", "secret")).await.unwrap();
        assert_eq!(conn.server_agent(), Some("Neo4j/5.0.0"));
        assert_eq!(conn.connection_id(), Some("bolt-7"));

        let requests = server.await.unwrap();
        let BoltRequest::Hello(hello) = &requests[0] else {
            panic!("expected HELLO");
        };
        assert_eq!(hello.user_agent(), Some("boltwire/test"));
    }

    #[tokio::test]
    async fn test_hello_failure_is_authentication() {
        let (mut conn, _server) = stub::connect(
            BoltVersion::V4_4,
            vec![
                Script::client("HELLO"),
                Script::failure("Neo.ClientError.Statement.SyntaxError", "odd but still auth"),
            ],
        )
        .await;

        let err = conn.hello("boltwire/test", &AuthToken::none()).await.unwrap_err();
        assert!(matches!(err, DriverError::Authentication { .. }));
        assert!(conn.is_defunct());
    }

    #[tokio::test]
    async fn test_eof_marks_defunct() {
        let (mut conn, server) = stub::connect(BoltVersion::V4_4, vec![]).await;
        server.await.unwrap();

        let err = conn.receive_one().await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(conn.is_defunct());
        assert!(conn.send(BoltRequest::Reset).is_err());
    }

    #[tokio::test]
    async fn test_read_timeout_is_fatal() {
        let (client, mut server) = tokio::io::duplex(1024);
        let _keep = tokio::spawn(async move {
            let mut request = [0u8; 20];
            server.read_exact(&mut request).await.unwrap();
            server.write_all(&[0, 0, 0, 5]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(server);
        });

        let mut conn = BoltConnection::open(client, "stub:7687", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        let err = conn.receive_one().await.unwrap_err();
        assert!(matches!(err, BoltError::Timeout));
        assert!(conn.is_defunct());
    }
}
