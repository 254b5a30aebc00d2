//! The connection type shared by every stage of the pipeline, and the
//! factories through which sockets are injected at construction time.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use infrared_protocol::packets::handshaking::HandshakeC2s;
use infrared_protocol::{
    CompressionThreshold, Decode, Encode, Packet, PacketDecoder, PacketEncoder, PacketFrame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::ProxyError;

const READ_BUF_SIZE: usize = 4096;

/// Identity of a proxied connection, assigned at accept time. Used as the
/// key of the player set so no raw pointers need hashing.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConnId(u64);

impl ConnId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A TCP connection framed as Minecraft packets, with the side's
/// compression threshold and optional cipher pair living in the encoder and
/// decoder halves.
///
/// A connection is owned by exactly one task at a time; transfer between
/// pipeline stages happens by sending it over a channel.
pub struct McConn {
    stream: TcpStream,
    enc: PacketEncoder,
    dec: PacketDecoder,
    remote_addr: SocketAddr,
}

impl McConn {
    pub fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            stream,
            enc: PacketEncoder::new(),
            dec: PacketDecoder::new(),
            remote_addr,
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn threshold(&self) -> CompressionThreshold {
        self.dec.compression()
    }

    /// Reads the next packet frame, pulling more bytes from the socket as
    /// needed.
    pub async fn recv_frame(&mut self) -> Result<PacketFrame, ProxyError> {
        loop {
            if let Some(frame) = self.dec.try_next_packet()? {
                return Ok(frame);
            }

            self.read_more().await?;
        }
    }

    /// Reads the next packet frame without consuming it: the same bytes stay
    /// queued for a later [`recv_frame`] or a raw relay.
    ///
    /// [`recv_frame`]: Self::recv_frame
    pub async fn peek_frame(&mut self) -> Result<PacketFrame, ProxyError> {
        loop {
            if let Some(frame) = self.dec.try_peek_packet()? {
                return Ok(frame);
            }

            self.read_more().await?;
        }
    }

    pub async fn recv_packet<P>(&mut self) -> Result<P, ProxyError>
    where
        P: Packet + for<'a> Decode<'a>,
    {
        let frame = self.recv_frame().await?;
        Ok(frame.decode()?)
    }

    pub async fn send_packet<P>(&mut self, pkt: &P) -> Result<(), ProxyError>
    where
        P: Packet + Encode,
    {
        self.enc.append_packet(pkt)?;
        self.flush().await
    }

    pub async fn send_frame(&mut self, frame: &PacketFrame) -> Result<(), ProxyError> {
        self.enc.append_frame(frame)?;
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), ProxyError> {
        let bytes = self.enc.take();
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    async fn read_more(&mut self) -> Result<(), ProxyError> {
        self.dec.reserve(READ_BUF_SIZE);
        let mut buf = self.dec.take_capacity();

        if self.stream.read_buf(&mut buf).await? == 0 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        self.dec.queue_bytes(buf);
        Ok(())
    }

    /// Sets the compression threshold for both directions of this socket.
    pub fn set_compression(&mut self, threshold: CompressionThreshold) {
        self.enc.set_compression(threshold);
        self.dec.set_compression(threshold);
    }

    /// Installs the CFB-8 cipher pair. Bytes already buffered but not yet
    /// framed are decrypted as part of the installation, so this must happen
    /// before anything past the encryption response is read or written.
    pub fn enable_encryption(&mut self, key: &[u8; 16]) {
        self.enc.enable_encryption(key);
        self.dec.enable_encryption(key);
    }

    /// Tears the framing down for a raw relay: the bare stream plus any
    /// bytes that were buffered but not yet consumed.
    pub fn into_parts(mut self) -> (TcpStream, BytesMut) {
        (self.stream, self.dec.take_buffered())
    }

    /// Splits into a reader and a writer for the bidirectional pipe. The
    /// side's threshold and cipher state travel with the halves.
    pub fn into_split(self) -> (ConnReader, ConnWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnReader {
                half: read_half,
                dec: self.dec,
            },
            ConnWriter {
                half: write_half,
                enc: self.enc,
            },
        )
    }
}

/// The read half of a split [`McConn`].
pub struct ConnReader {
    half: OwnedReadHalf,
    dec: PacketDecoder,
}

impl ConnReader {
    pub async fn recv_frame(&mut self) -> Result<PacketFrame, ProxyError> {
        loop {
            if let Some(frame) = self.dec.try_next_packet()? {
                return Ok(frame);
            }

            self.dec.reserve(READ_BUF_SIZE);
            let mut buf = self.dec.take_capacity();

            if self.half.read_buf(&mut buf).await? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }

            self.dec.queue_bytes(buf);
        }
    }
}

/// The write half of a split [`McConn`].
pub struct ConnWriter {
    half: OwnedWriteHalf,
    enc: PacketEncoder,
}

impl ConnWriter {
    pub async fn send_frame(&mut self, frame: &PacketFrame) -> Result<(), ProxyError> {
        self.enc.append_frame(frame)?;
        let bytes = self.enc.take();
        self.half.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn send_packet<P>(&mut self, pkt: &P) -> Result<(), ProxyError>
    where
        P: Packet + Encode,
    {
        self.enc.append_packet(pkt)?;
        let bytes = self.enc.take();
        self.half.write_all(&bytes).await?;
        Ok(())
    }
}

/// A client connection on its way through the pipeline, together with its
/// identity and, once the gateway has read it, the parsed handshake.
pub struct HandshakeConn {
    pub id: ConnId,
    pub conn: McConn,
    pub handshake: Option<HandshakeC2s>,
}

impl HandshakeConn {
    pub fn new(stream: TcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            id: ConnId::next(),
            conn: McConn::new(stream, remote_addr),
            handshake: None,
        }
    }
}

/// Dials backend servers. Injected at construction so tests and alternative
/// transports can substitute their own.
#[async_trait]
pub trait ServerConnFactory: Send + Sync {
    async fn dial(&self, addr: &str) -> io::Result<McConn>;
}

/// Builds the dialer once the supervisor knows its dial timeout; the
/// concrete timeout is supplied exactly once, at lane startup.
pub type ServerConnFactoryBuilder =
    Arc<dyn Fn(Duration) -> Arc<dyn ServerConnFactory> + Send + Sync>;

/// The default dialer: plain TCP with a connect timeout.
pub struct TcpDialer {
    pub timeout: Duration,
}

#[async_trait]
impl ServerConnFactory for TcpDialer {
    async fn dial(&self, addr: &str) -> io::Result<McConn> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "backend dial timed out"))??;

        stream.set_nodelay(true)?;

        let remote_addr = stream.peer_addr()?;
        Ok(McConn::new(stream, remote_addr))
    }
}

/// Binds the public listener. Injected for the same reason as the dialer.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn bind(&self, addr: &str) -> io::Result<TcpListener>;
}

pub struct TcpBinder;

#[async_trait]
impl ListenerFactory for TcpBinder {
    async fn bind(&self, addr: &str) -> io::Result<TcpListener> {
        TcpListener::bind(addr).await
    }
}
