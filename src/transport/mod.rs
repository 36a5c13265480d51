//! Token transport for negotiation and message tokens.
//!
//! Tokens travel as length-prefixed frames: a 4-byte big-endian length
//! followed by exactly that many opaque bytes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       AcceptorSession / Server          │
//! │        (transport-agnostic)             │
//! └──────────────────┬──────────────────────┘
//!                    │ TokenTransport
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │ TcpTokenTransport│ │ StreamTransport │
//! │   (TcpStream)   │ │ (duplex, tests) │
//! └─────────────────┘ └─────────────────┘
//! ```
//!
//! [`encode_frame`] and [`FrameDecoder`] expose the same framing over plain
//! buffers.

mod framing;
mod stream;

pub use framing::{encode_frame, FrameDecoder, LENGTH_PREFIX_SIZE};
pub use stream::{connect, StreamTransport, TcpTokenTransport};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Default upper bound on a single token (1 MiB)
pub const DEFAULT_MAX_TOKEN_LEN: usize = 1024 * 1024;

/// Boxed future returned by [`TokenTransport`] methods.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Exchanges opaque tokens with one peer.
///
/// Every error is fatal to the session using the transport.
pub trait TokenTransport: Send {
    /// Receive the next complete token.
    fn recv_token(&mut self) -> TransportFuture<'_, Bytes>;

    /// Send one token.
    fn send_token<'a>(&'a mut self, token: &'a [u8]) -> TransportFuture<'a, ()>;

    /// Peer description for logging.
    fn peer(&self) -> String;
}

/// Transport limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest token accepted, in bytes
    pub max_token_len: usize,
    /// Time allowed for one complete token to arrive
    #[serde(with = "opt_secs", rename = "read_timeout_secs")]
    pub read_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            read_timeout: None,
        }
    }
}

impl TransportConfig {
    /// Set the maximum token size
    #[must_use]
    pub fn with_max_token_len(mut self, len: usize) -> Self {
        self.max_token_len = len;
        self
    }

    /// Set the read timeout
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

/// `Option<Duration>` as whole seconds, 0 or absent meaning none.
mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.map_or(0, |d| d.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok((secs > 0).then(|| Duration::from_secs(secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.max_token_len, 1024 * 1024);
        assert!(config.read_timeout.is_none());
    }

    #[test]
    fn test_transport_config_toml() {
        let config: TransportConfig = toml::from_str("max_token_len = 4096\nread_timeout_secs = 5").unwrap();
        assert_eq!(config.max_token_len, 4096);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));

        let config: TransportConfig = toml::from_str("read_timeout_secs = 0").unwrap();
        assert!(config.read_timeout.is_none());
        assert_eq!(config.max_token_len, DEFAULT_MAX_TOKEN_LEN);
    }
}
