//! TCP acceptor server.
//!
//! Each accepted connection gets its own negotiation engine bound to the
//! shared credential. Once the context is established the server reports the
//! client, receives one authenticated message and sends back its MIC.
//!
//! # Example
//!
//! ```rust,ignore
//! use gsslayer::server::Server;
//!
//! let server = Server::bind("0.0.0.0:44444", credential, TransportConfig::default()).await?;
//! server.run().await?;
//! ```

use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::credential::Credential;
use crate::diagnostics::{self, Diagnostics};
use crate::error::{GssError, Result};
use crate::flags::{flag_name, FlagSet};
use crate::mechanism::MechanismProvider;
use crate::name::{MechanismOid, PeerIdentity};
use crate::negotiation::NegotiationEngine;
use crate::session;
use crate::transport::{StreamTransport, TokenTransport, TransportConfig};

/// What one connection negotiated and exchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    /// Authenticated client
    pub peer: PeerIdentity,
    /// Negotiated mechanism
    pub mechanism: MechanismOid,
    /// Name forms the mechanism supports
    pub name_forms: Vec<String>,
    /// Negotiated flags
    pub flags: FlagSet,
    /// Application message received from the client
    pub message: Bytes,
    /// Whether the MIC reached the client
    pub mic_sent: bool,
}

/// Acceptor listening on TCP.
pub struct Server<M: MechanismProvider> {
    listener: TcpListener,
    credential: Credential<M>,
    transport: TransportConfig,
    diagnostics: Arc<dyn Diagnostics>,
    required_flags: FlagSet,
}

impl<M: MechanismProvider> Server<M> {
    /// Bind to `addr`, accepting with `credential`.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        credential: Credential<M>,
        transport: TransportConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "acceptor listening");
        Ok(Self {
            listener,
            credential,
            transport,
            diagnostics: diagnostics::default_sink(),
            required_flags: FlagSet::empty(),
        })
    }

    /// Send status reports to `sink`.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Deny contexts that do not grant every flag in `flags`.
    #[must_use]
    pub fn with_required_flags(mut self, flags: FlagSet) -> Self {
        self.required_flags = flags;
        self
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn engine(&self) -> NegotiationEngine<M> {
        NegotiationEngine::new(self.credential.clone())
            .with_diagnostics(Arc::clone(&self.diagnostics))
            .with_required_flags(self.required_flags)
    }

    /// Accept and serve exactly one connection.
    pub async fn serve_one(&self) -> Result<ConnectionReport> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::info!(%addr, "connection accepted");
        handle_connection(StreamTransport::tcp(stream, self.transport), self.engine()).await
    }

    /// Serve connections until the listener fails, one task per connection.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(%addr, error = %e, "set_nodelay failed");
            }
            tracing::info!(%addr, "connection accepted");

            let transport = StreamTransport::tcp(stream, self.transport);
            let engine = self.engine();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(transport, engine).await {
                    tracing::warn!(%addr, error = %e, "connection failed");
                }
            });
        }
    }
}

/// Negotiate over `transport`, report the context, then receive one message
/// and send back its MIC.
pub async fn handle_connection<T, M>(transport: T, engine: NegotiationEngine<M>) -> Result<ConnectionReport>
where
    T: TokenTransport,
    M: MechanismProvider,
{
    let context_id = engine.id();
    let mut established = session::accept(transport, engine).await?;

    let view = established.introspector();
    let peer = view.peer_identity()?;
    let mechanism = view.negotiated_mechanism()?;
    let name_forms = view.supported_name_forms()?;
    let flags = view.flags()?;

    tracing::info!(%context_id, "client id: {peer}");
    tracing::info!(%context_id, "mechanism {mechanism} supports {} names", name_forms.len());
    for name in &name_forms {
        tracing::info!(%context_id, " - mech name: {name}");
    }
    for bit in flags.iter() {
        tracing::info!(%context_id, "supported flag: {}", flag_name(bit));
    }

    let message = established.recv_message().await?;
    tracing::info!(%context_id, "recv data: {}", hex_dump(&message));

    let mic_sent = match established.send_mic(&message).await {
        Ok(()) => true,
        Err(GssError::Transport(e)) => {
            tracing::warn!(%context_id, error = %e, "mic not delivered");
            false
        },
        Err(e) => return Err(e),
    };
    tracing::info!(%context_id, "send mic: {}", if mic_sent { "success" } else { "failed" });

    Ok(ConnectionReport {
        peer,
        mechanism,
        name_forms,
        flags,
        message,
        mic_sent,
    })
}

/// `0x48,0x69` style dump of `data`.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 5);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "0x{b:02X}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(b""), "");
        assert_eq!(hex_dump(b"Hi"), "0x48,0x69");
        assert_eq!(hex_dump(&[0x0a, 0xff]), "0x0A,0xFF");
    }
}
