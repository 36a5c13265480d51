//! Acceptor driver binding one engine to one transport handle.
//!
//! The driver is where suspension happens: it awaits peer tokens, feeds them
//! to the synchronous engine and sends back whatever the engine produces.
//! A transport failure mid-negotiation fails the context; there is no
//! resumption.

use bytes::Bytes;

use crate::channel::SecureMessageChannel;
use crate::context::ContextState;
use crate::error::{GssError, NegotiationError, Result};
use crate::introspect::ContextIntrospector;
use crate::mechanism::MechanismProvider;
use crate::negotiation::{NegotiationEngine, StepStatus};
use crate::transport::TokenTransport;

/// One connection's negotiation in progress.
pub struct AcceptorSession<T, M: MechanismProvider> {
    transport: T,
    engine: NegotiationEngine<M>,
}

impl<T: TokenTransport, M: MechanismProvider> AcceptorSession<T, M> {
    /// Pair `engine` with the peer's `transport`.
    pub fn new(transport: T, engine: NegotiationEngine<M>) -> Self {
        Self { transport, engine }
    }

    /// The engine driven by this session.
    pub fn engine(&self) -> &NegotiationEngine<M> {
        &self.engine
    }

    /// Run the token loop until the context is Established or Failed.
    pub async fn negotiate(&mut self) -> Result<()> {
        loop {
            let token = match self.transport.recv_token().await {
                Ok(token) => token,
                Err(err) => {
                    self.engine.abort(&format!("receive failed: {err}"));
                    return Err(err.into());
                },
            };

            let result = self.engine.step(Some(&token[..]))?;
            if let Some(output) = &result.output {
                if let Err(err) = self.transport.send_token(output).await {
                    self.engine.delivery_failed(&format!("send failed: {err}"));
                    return Err(err.into());
                }
            }

            match result.status {
                StepStatus::Continue => continue,
                StepStatus::Complete => return Ok(()),
                StepStatus::Error(kind) => return Err(kind.into()),
            }
        }
    }

    /// Finish negotiation and switch to messaging.
    pub fn into_established(self) -> Result<EstablishedSession<T, M>> {
        Ok(EstablishedSession {
            channel: self.engine.into_channel()?,
            transport: self.transport,
        })
    }
}

/// An established context with its transport.
pub struct EstablishedSession<T, M: MechanismProvider> {
    transport: T,
    channel: SecureMessageChannel<M>,
}

impl<T: TokenTransport, M: MechanismProvider> EstablishedSession<T, M> {
    /// Read-only view of the negotiated values.
    pub fn introspector(&self) -> ContextIntrospector<'_> {
        self.channel.introspector()
    }

    /// The message channel.
    pub fn channel(&self) -> &SecureMessageChannel<M> {
        &self.channel
    }

    /// Receive and verify one application message.
    pub async fn recv_message(&mut self) -> Result<Bytes> {
        let token = self.transport.recv_token().await?;
        Ok(self.channel.receive_message(&token)?)
    }

    /// Compute the MIC of `message` and send it to the peer.
    pub async fn send_mic(&mut self, message: &[u8]) -> Result<()> {
        let mic = self.channel.compute_mic(message)?;
        self.transport.send_token(&mic).await?;
        Ok(())
    }

    /// Peer description from the transport.
    pub fn peer(&self) -> String {
        self.transport.peer()
    }
}

/// Negotiate over `transport` and return the established session.
pub async fn accept<T: TokenTransport, M: MechanismProvider>(
    transport: T,
    engine: NegotiationEngine<M>,
) -> Result<EstablishedSession<T, M>> {
    let mut session = AcceptorSession::new(transport, engine);
    session.negotiate().await?;
    match session.engine().state() {
        ContextState::Established => session.into_established(),
        state => Err(GssError::Negotiation(NegotiationError::InvalidState {
            operation: "accept",
            state,
        })),
    }
}
