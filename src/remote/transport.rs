//! Pluggable reliable-ordered byte stream for remote bus forwarding
//! (§4.6 "Transport is a reliable ordered byte stream ... pluggable but must
//! guarantee in-order delivery per connection").

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::error::TransportError;

use super::wire::{decode_body, encode_body, Envelope};

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// A connection capable of sending and receiving framed [`Envelope`]s. The
/// default implementation below wraps a TCP socket; the trait exists so a
/// TLS- or SSH-tunneled stream can be substituted without touching
/// [`crate::remote::connector::OutboundConnector`] (§4.6 "Mechanism").
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Result<Envelope, TransportError>;
}

async fn write_frame<W: AsyncWrite + Unpin + Send>(
    stream: &mut W,
    peer: &str,
    envelope: &Envelope,
) -> Result<(), TransportError> {
    let body = encode_body(envelope);
    stream
        .write_u32(body.len() as u32)
        .await
        .map_err(|source| TransportError::Io {
            peer: peer.to_string(),
            source,
        })?;
    stream.write_all(&body).await.map_err(|source| TransportError::Io {
        peer: peer.to_string(),
        source,
    })?;
    stream.flush().await.map_err(|source| TransportError::Io {
        peer: peer.to_string(),
        source,
    })
}

async fn read_frame<R: AsyncRead + Unpin + Send>(stream: &mut R, peer: &str) -> Result<Envelope, TransportError> {
    let len = stream.read_u32().await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Closed(peer.to_string())
        } else {
            TransportError::Io {
                peer: peer.to_string(),
                source,
            }
        }
    })?;
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::Malformed(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.map_err(|source| TransportError::Io {
        peer: peer.to_string(),
        source,
    })?;
    decode_body(&body)
}

/// [`Transport`] over any `AsyncRead + AsyncWrite` byte stream.
pub struct StreamTransport<S> {
    stream: S,
    peer: String,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        StreamTransport {
            stream,
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport for StreamTransport<S> {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        write_frame(&mut self.stream, &self.peer, envelope).await
    }

    async fn recv(&mut self) -> Result<Envelope, TransportError> {
        read_frame(&mut self.stream, &self.peer).await
    }
}

pub type TcpTransport = StreamTransport<TcpStream>;

impl TcpTransport {
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Io {
                peer: addr.to_string(),
                source,
            })?;
        Ok(StreamTransport::new(stream, addr))
    }

    /// Splits a connected TCP transport into an independent read half and
    /// write half so the Master can drive inbound draining and outbound
    /// forwarding as two concurrent tasks over the same socket (§4.6
    /// "Mechanism": one `OutboundConnector` and one `InboundConnector` per
    /// peer, each driven independently).
    pub fn split(self) -> (WriteHalfTransport<WriteHalf<TcpStream>>, ReadHalfTransport<ReadHalf<TcpStream>>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            WriteHalfTransport::new(write, self.peer.clone()),
            ReadHalfTransport::new(read, self.peer),
        )
    }
}

/// The write side of a split [`Transport`]. `recv` always fails -- a
/// [`WriteHalfTransport`] is handed to an [`super::connector::OutboundConnector`],
/// which never calls it.
pub struct WriteHalfTransport<W> {
    stream: W,
    peer: String,
}

impl<W> WriteHalfTransport<W> {
    pub fn new(stream: W, peer: impl Into<String>) -> Self {
        WriteHalfTransport {
            stream,
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Transport for WriteHalfTransport<W> {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        write_frame(&mut self.stream, &self.peer, envelope).await
    }

    async fn recv(&mut self) -> Result<Envelope, TransportError> {
        Err(TransportError::Closed(self.peer.clone()))
    }
}

/// The read side of a split [`Transport`]. `send` always fails -- a
/// [`ReadHalfTransport`] is handed to an [`super::connector::InboundConnector`]'s
/// `drain`, which never calls it.
pub struct ReadHalfTransport<R> {
    stream: R,
    peer: String,
}

impl<R> ReadHalfTransport<R> {
    pub fn new(stream: R, peer: impl Into<String>) -> Self {
        ReadHalfTransport {
            stream,
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Transport for ReadHalfTransport<R> {
    async fn send(&mut self, _envelope: &Envelope) -> Result<(), TransportError> {
        Err(TransportError::Closed(self.peer.clone()))
    }

    async fn recv(&mut self) -> Result<Envelope, TransportError> {
        read_frame(&mut self.stream, &self.peer).await
    }
}
