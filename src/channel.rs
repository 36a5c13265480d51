//! Authenticated messaging over an established context.
//!
//! A [`SecureMessageChannel`] can only be obtained from an Established
//! [`NegotiationEngine`](crate::NegotiationEngine), so every operation here
//! runs against a complete context. Confidentiality is not offered: message
//! tokens are integrity protected only.

use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::context::ContextState;
use crate::diagnostics::Diagnostics;
use crate::error::MessageError;
use crate::introspect::ContextIntrospector;
use crate::mechanism::{EstablishedInfo, MechanismProvider, MechanismSession};
use crate::status::Status;

const COMPONENT: &str = "channel";

/// Receives authenticated messages and computes integrity codes.
pub struct SecureMessageChannel<M: MechanismProvider> {
    id: Uuid,
    info: EstablishedInfo,
    session: M::Session,
    mechanism: Arc<M>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<M: MechanismProvider> SecureMessageChannel<M> {
    pub(crate) fn new(
        id: Uuid,
        info: EstablishedInfo,
        session: M::Session,
        mechanism: Arc<M>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            id,
            info,
            session,
            mechanism,
            diagnostics,
        }
    }

    /// Context identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Read-only view of the negotiated values.
    pub fn introspector(&self) -> ContextIntrospector<'_> {
        ContextIntrospector::new(ContextState::Established, Some(&self.info))
    }

    /// Verify an integrity-protected message token and return its payload.
    ///
    /// Corrupted, forged, replayed and out-of-sequence tokens fail with
    /// [`MessageError::InvalidToken`].
    pub fn receive_message(&mut self, raw: &[u8]) -> Result<Bytes, MessageError> {
        match self.session.unwrap(raw) {
            Ok(payload) => {
                tracing::debug!(context_id = %self.id, len = payload.len(), "message received");
                Ok(payload)
            },
            Err(status) => Err(self.fail("receive_message", status)),
        }
    }

    /// Compute the integrity code of `message`.
    ///
    /// The same message always yields the same code within one context.
    pub fn compute_mic(&self, message: &[u8]) -> Result<Bytes, MessageError> {
        match self.session.get_mic(message) {
            Ok(mic) => {
                tracing::debug!(context_id = %self.id, len = message.len(), "mic computed");
                Ok(mic)
            },
            Err(status) => Err(self.fail("compute_mic", status)),
        }
    }

    /// Whether `mic` is a valid integrity code of `message` in this context.
    pub fn verify_mic(&self, message: &[u8], mic: &[u8]) -> bool {
        match self.session.verify_mic(message, mic) {
            Ok(()) => true,
            Err(status) => {
                self.fail("verify_mic", status);
                false
            },
        }
    }

    fn fail(&self, operation: &'static str, status: Status) -> MessageError {
        let message = status.render(self.mechanism.minor_message(status.minor()));
        self.diagnostics.report(COMPONENT, operation, status, &message);
        tracing::debug!(context_id = %self.id, operation, "message operation failed");
        MessageError::from(status)
    }
}
