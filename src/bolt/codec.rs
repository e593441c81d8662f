//! Chunked message framing for tokio_util.
//!
//! A message is split into chunks of at most [`MAX_CHUNK_SIZE`] bytes, each
//! prefixed with its 2-byte big-endian length, and terminated by a
//! zero-length chunk. A zero-length chunk with nothing before it is a NOOP
//! and is skipped.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BoltRequest, BoltResponse};
use super::packstream::{decode, encode, PackStreamValue};
use super::BoltError;

/// Largest chunk the writer produces.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// Default limit for one reassembled incoming message (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

const CHUNK_HEADER_SIZE: usize = 2;

/// Bolt message codec: chunk framing plus PackStream.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    /// Chunks of the message currently being reassembled
    message_buffer: BytesMut,
}

impl BoltCodec {
    /// Create a codec with the default message size limit.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with a custom message size limit.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Split already-encoded bytes into chunks and append them to `dst`.
    pub fn write_chunked(data: &[u8], dst: &mut BytesMut) {
        if data.is_empty() {
            return;
        }
        dst.reserve(data.len() + (data.len() / MAX_CHUNK_SIZE + 2) * CHUNK_HEADER_SIZE);
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = PackStreamValue;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < CHUNK_HEADER_SIZE {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(CHUNK_HEADER_SIZE);
                if self.message_buffer.is_empty() {
                    continue;
                }
                let message = self.message_buffer.split();
                return Ok(Some(decode(&message)?));
            }

            if src.len() < CHUNK_HEADER_SIZE + chunk_size {
                src.reserve(CHUNK_HEADER_SIZE + chunk_size - src.len());
                return Ok(None);
            }

            let size = self.message_buffer.len() + chunk_size;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(CHUNK_HEADER_SIZE);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(value) => Ok(Some(value)),
            None if src.is_empty() && self.message_buffer.is_empty() => Ok(None),
            None => Err(BoltError::ConnectionClosed),
        }
    }
}

impl Encoder<PackStreamValue> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: PackStreamValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = encode(&item)?;
        Self::write_chunked(&encoded, dst);
        Ok(())
    }
}

/// Client-side codec: decodes responses, encodes requests.
#[derive(Debug, Default)]
pub struct BoltResponseCodec {
    inner: BoltCodec,
}

impl BoltResponseCodec {
    /// Create a response codec with the default message size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a response codec with a custom message size limit.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            inner: BoltCodec::with_max_size(max_message_size),
        }
    }
}

fn structure_of(value: PackStreamValue) -> Result<super::PackStreamStructure, BoltError> {
    match value {
        PackStreamValue::Structure(s) => Ok(s),
        other => Err(BoltError::Protocol(format!(
            "Expected a message structure, got {}",
            other.type_name()
        ))),
    }
}

impl Decoder for BoltResponseCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(value) => Ok(Some(BoltResponse::from_structure(&structure_of(value)?)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltRequest> for BoltResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(PackStreamValue::Structure(item.to_structure()), dst)
    }
}

/// Server-side codec used by the scripted test server: decodes requests,
/// encodes responses.
#[derive(Debug, Default)]
pub struct BoltRequestCodec {
    inner: BoltCodec,
}

impl BoltRequestCodec {
    /// Create a request codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BoltRequestCodec {
    type Item = BoltRequest;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(value) => Ok(Some(BoltRequest::from_structure(&structure_of(value)?)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltResponse> for BoltRequestCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(PackStreamValue::Structure(item.to_structure()), dst)
    }
}
