//! Frame-level transport over a bidirectional byte stream.
//!
//! A [`Transport`] owns both halves of a stream and exposes
//! [`read_frame`](Transport::read_frame) / [`write_frame`](Transport::write_frame).
//! It holds no locks: concurrent writers must be serialized by the caller,
//! typically by splitting with [`Transport::into_split`] and putting the
//! [`FrameWriter`] behind whatever exclusion the caller already has.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::framing::{FrameError, read_frame, write_frame};
use crate::messages::Message;

/// Read side of a transport.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Suspend until one full frame has arrived, then decode it.
    pub async fn read_frame(&mut self) -> Result<Message, FrameError> {
        read_frame(&mut self.inner).await
    }
}

/// Write side of a transport. Closing is idempotent.
pub struct FrameWriter<W> {
    inner: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Encode and write one frame. Fails with
    /// [`FrameError::ConnectionClosed`] once the writer has been closed.
    pub async fn write_frame(&mut self, msg: &Message) -> Result<(), FrameError> {
        if self.closed {
            return Err(FrameError::ConnectionClosed);
        }
        write_frame(&mut self.inner, msg).await
    }

    /// Shut down the write direction. Errors are swallowed; closing twice is
    /// a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.shutdown().await {
            tracing::trace!("Ignoring error while closing transport: {e}");
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Both halves of a framed stream.
pub struct Transport<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

/// Transport over a TCP connection.
pub type TcpTransport = Transport<OwnedReadHalf, OwnedWriteHalf>;

impl TcpTransport {
    /// Open a TCP connection to `addr` with `TCP_NODELAY` set.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Transport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// See [`FrameReader::read_frame`].
    pub async fn read_frame(&mut self) -> Result<Message, FrameError> {
        self.reader.read_frame().await
    }

    /// See [`FrameWriter::write_frame`].
    pub async fn write_frame(&mut self, msg: &Message) -> Result<(), FrameError> {
        self.writer.write_frame(msg).await
    }

    /// See [`FrameWriter::close`].
    pub async fn close(&mut self) {
        self.writer.close().await;
    }

    /// Separate the halves so reading and writing can live on different tasks.
    pub fn into_split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

    type DuplexTransport = Transport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn pair() -> (DuplexTransport, DuplexTransport) {
        let (a, b) = duplex(4096);
        let (ar, aw) = split(a);
        let (br, bw) = split(b);
        (Transport::new(ar, aw), Transport::new(br, bw))
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (mut left, mut right) = pair();

        left.write_frame(&Message::say("ping?")).await.unwrap();
        assert_eq!(right.read_frame().await.unwrap(), Message::say("ping?"));

        right.write_frame(&Message::say("pong!")).await.unwrap();
        assert_eq!(left.read_frame().await.unwrap(), Message::say("pong!"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut left, _right) = pair();
        left.close().await;
        left.close().await;

        let result = left.write_frame(&Message::say("late")).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_peer_observes_close_as_connection_closed() {
        let (left, mut right) = pair();
        let (_reader, mut writer) = left.into_split();
        writer.close().await;
        assert!(writer.is_closed());

        let result = right.read_frame().await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_tcp_transport_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut server = TcpTransport::from_stream(stream).unwrap();
            let msg = server.read_frame().await.unwrap();
            server.write_frame(&msg).await.unwrap();
        });

        let mut client = TcpTransport::connect(addr).await.unwrap();
        client.write_frame(&Message::emote("echoes")).await.unwrap();
        assert_eq!(client.read_frame().await.unwrap(), Message::emote("echoes"));
        accept.await.unwrap();
    }
}
