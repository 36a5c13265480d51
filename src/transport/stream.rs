//! Token transport over any async byte stream.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::framing::{encode_frame, FrameDecoder};
use super::{TokenTransport, TransportConfig, TransportFuture};
use crate::error::TransportError;

/// Length-prefixed token transport over a byte stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    config: TransportConfig,
    decoder: FrameDecoder,
    peer: String,
}

/// Token transport over TCP.
pub type TcpTokenTransport = StreamTransport<TcpStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap `stream`, describing the peer as `peer` in logs.
    pub fn new(stream: S, config: TransportConfig, peer: impl Into<String>) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(config.max_token_len),
            config,
            peer: peer.into(),
        }
    }

    async fn read_frame(&mut self) -> Result<Bytes, TransportError> {
        let len = self.stream.read_u32().await.map_err(eof_is_closed)? as usize;
        self.decoder.check_len(len)?;

        let mut body = vec![0u8; len];
        self.stream.read_exact(&mut body).await.map_err(eof_is_closed)?;
        Ok(Bytes::from(body))
    }

    async fn read_token(&mut self) -> Result<Bytes, TransportError> {
        let token = match self.config.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_frame())
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => self.read_frame().await?,
        };
        tracing::trace!(peer = %self.peer, len = token.len(), "token received");
        Ok(token)
    }

    async fn write_token(&mut self, token: &[u8]) -> Result<(), TransportError> {
        let frame = encode_frame(token)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        tracing::trace!(peer = %self.peer, len = token.len(), "token sent");
        Ok(())
    }
}

impl StreamTransport<TcpStream> {
    /// Wrap an accepted or connected TCP stream.
    pub fn tcp(stream: TcpStream, config: TransportConfig) -> Self {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
        Self::new(stream, config, peer)
    }
}

/// Connect to `addr` and wrap the stream.
pub async fn connect(addr: impl ToSocketAddrs, config: TransportConfig) -> Result<TcpTokenTransport, TransportError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(StreamTransport::tcp(stream, config))
}

fn eof_is_closed(err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(err)
    }
}

impl<S> TokenTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn recv_token(&mut self) -> TransportFuture<'_, Bytes> {
        Box::pin(self.read_token())
    }

    fn send_token<'a>(&'a mut self, token: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(self.write_token(token))
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hex_literal::hex;
    use tokio_test::io::Builder;

    use super::*;

    #[tokio::test]
    async fn test_recv_token() {
        let mock = Builder::new().read(&hex!("00000003")).read(b"abc").build();
        let mut transport = StreamTransport::new(mock, TransportConfig::default(), "mock");
        assert_eq!(&transport.recv_token().await.unwrap()[..], b"abc");
    }

    #[tokio::test]
    async fn test_send_token() {
        let mock = Builder::new().write(&hex!("00000002 6869")).build();
        let mut transport = StreamTransport::new(mock, TransportConfig::default(), "mock");
        transport.send_token(b"hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let mock = Builder::new().read(&hex!("0000")).build();
        let mut transport = StreamTransport::new(mock, TransportConfig::default(), "mock");
        assert!(matches!(transport.recv_token().await, Err(TransportError::Closed)));

        let mock = Builder::new().read(&hex!("00000008 0102")).build();
        let mut transport = StreamTransport::new(mock, TransportConfig::default(), "mock");
        assert!(matches!(transport.recv_token().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_oversize_rejected() {
        let mock = Builder::new().read(&hex!("00100001")).build();
        let config = TransportConfig::default();
        let mut transport = StreamTransport::new(mock, config, "mock");
        assert!(matches!(
            transport.recv_token().await,
            Err(TransportError::TokenTooLarge { len: 0x0010_0001, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let config = TransportConfig::default().with_read_timeout(Duration::from_millis(20));
        let mut transport = StreamTransport::new(client, config, "duplex");
        assert!(matches!(transport.recv_token().await, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_duplex_roundtrip() {
        let (a, b) = tokio::io::duplex(1 << 17);
        let mut left = StreamTransport::new(a, TransportConfig::default(), "left");
        let mut right = StreamTransport::new(b, TransportConfig::default(), "right");

        for n in [0usize, 1, 65536] {
            let token = vec![7u8; n];
            left.send_token(&token).await.unwrap();
            assert_eq!(right.recv_token().await.unwrap(), token);
        }
    }
}
