//! Acceptor-side negotiation state machine.
//!
//! The engine consumes peer tokens one leg at a time and never performs I/O:
//! the caller moves tokens between [`NegotiationEngine::step`] and the
//! transport.
//!
//! ```text
//!            step(token)                 step(token)
//! Initial ───────────────> Negotiating ───────────────> Established
//!    │                        │   ▲  │
//!    │                        │   └──┘ Continue
//!    │        Error / abort   ▼
//!    └──────────────────────> Failed
//! ```

use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::channel::SecureMessageChannel;
use crate::context::{ContextState, SecurityContext};
use crate::credential::Credential;
use crate::diagnostics::{self, Diagnostics};
use crate::error::NegotiationError;
use crate::flags::FlagSet;
use crate::introspect::ContextIntrospector;
use crate::mechanism::{AcceptLeg, MechanismProvider};
use crate::status::{RoutineError, Status};

const COMPONENT: &str = "negotiation";

/// Outcome kind of one negotiation leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Transmit the output token, if any, and wait for another peer token.
    Continue,
    /// The context is established. Transmit the output token, if any, before
    /// using the context.
    Complete,
    /// The context failed.
    Error(NegotiationError),
}

/// Result of [`NegotiationEngine::step`].
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Token to send to the peer
    pub output: Option<Bytes>,
    /// Outcome of the leg
    pub status: StepStatus,
}

impl StepResult {
    fn error(kind: NegotiationError) -> Self {
        Self {
            output: None,
            status: StepStatus::Error(kind),
        }
    }

    /// Whether the leg established the context.
    pub fn is_complete(&self) -> bool {
        self.status == StepStatus::Complete
    }

    /// Whether another leg is expected.
    pub fn is_continue(&self) -> bool {
        self.status == StepStatus::Continue
    }
}

/// Drives one security context from `Initial` to `Established` or `Failed`.
pub struct NegotiationEngine<M: MechanismProvider> {
    credential: Credential<M>,
    context: SecurityContext<M>,
    diagnostics: Arc<dyn Diagnostics>,
    required_flags: FlagSet,
}

impl<M: MechanismProvider> NegotiationEngine<M> {
    /// Create an engine in `Initial` bound to `credential`.
    pub fn new(credential: Credential<M>) -> Self {
        Self {
            credential,
            context: SecurityContext::new(),
            diagnostics: diagnostics::default_sink(),
            required_flags: FlagSet::empty(),
        }
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

    /// Context identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.context.id()
    }

    /// Current state.
    pub fn state(&self) -> ContextState {
        self.context.state()
    }

    /// Number of legs run so far.
    pub fn legs(&self) -> u32 {
        self.context.legs()
    }

    /// Credential the engine accepts with.
    pub fn credential(&self) -> &Credential<M> {
        &self.credential
    }

    /// Advance the negotiation by one leg over the peer's `token`.
    ///
    /// Fails with [`NegotiationError::InvalidState`] once the context is
    /// Established or Failed. Every other failure is reported in the returned
    /// [`StepStatus::Error`] and leaves the context Failed.
    pub fn step(&mut self, token: Option<&[u8]>) -> Result<StepResult, NegotiationError> {
        let state = self.context.state();
        if state.is_terminal() {
            return Err(NegotiationError::InvalidState {
                operation: "step",
                state,
            });
        }

        self.context.begin_leg();

        let Some(token) = token else {
            let status = Status::routine(RoutineError::DefectiveToken, 0);
            self.report(status, &status.render(Some("no input token from peer")));
            return Ok(self.fail(NegotiationError::MalformedToken));
        };

        let mechanism = Arc::clone(self.credential.mechanism());
        let partial = self.context.take_partial();
        let leg = match mechanism.accept_leg(self.credential.handle(), partial, token) {
            Ok(leg) => leg,
            Err(status) => {
                self.report(status, &status.render(mechanism.minor_message(status.minor())));
                return Ok(self.fail(NegotiationError::from(status)));
            },
        };

        match leg {
            AcceptLeg::Continue { partial, output } => {
                self.context.park(partial);
                tracing::debug!(
                    context_id = %self.context.id(),
                    leg = self.context.legs(),
                    output_len = output.as_ref().map_or(0, Bytes::len),
                    "negotiation continues"
                );
                Ok(StepResult {
                    output,
                    status: StepStatus::Continue,
                })
            },
            AcceptLeg::Complete {
                session,
                info,
                output,
            } => {
                if !info.flags.contains(self.required_flags.bits()) {
                    let status = Status::routine(RoutineError::Unauthorized, 0);
                    let detail = format!(
                        "required flags {} not granted (granted {})",
                        self.required_flags, info.flags
                    );
                    self.report(status, &status.render(Some(&detail)));
                    return Ok(self.fail(NegotiationError::Denied));
                }

                tracing::info!(
                    context_id = %self.context.id(),
                    peer = %info.peer,
                    mechanism = %info.mechanism,
                    flags = %info.flags,
                    "security context established"
                );
                self.context.establish(info, session);
                Ok(StepResult {
                    output,
                    status: StepStatus::Complete,
                })
            },
        }
    }

    /// Fail a non-terminal context and drop partial mechanism state.
    pub fn abort(&mut self, reason: &str) {
        if self.context.state().is_terminal() {
            return;
        }
        tracing::warn!(context_id = %self.context.id(), reason, "negotiation aborted");
        self.context.fail();
    }

    /// Fail the context because an output token never reached the peer.
    ///
    /// Unlike [`abort`](Self::abort) this also fails an Established context:
    /// the token returned with [`StepStatus::Complete`] must be delivered
    /// before the context may be used.
    pub fn delivery_failed(&mut self, reason: &str) {
        if self.context.state() == ContextState::Failed {
            return;
        }
        tracing::warn!(
            context_id = %self.context.id(),
            state = %self.context.state(),
            reason,
            "output token not delivered"
        );
        self.context.fail();
    }

    /// Read-only view of the negotiated values.
    pub fn introspector(&self) -> ContextIntrospector<'_> {
        ContextIntrospector::new(self.context.state(), self.context.info())
    }

    /// Turn an Established engine into its message channel.
    pub fn into_channel(mut self) -> Result<SecureMessageChannel<M>, NegotiationError> {
        let state = self.context.state();
        if state != ContextState::Established {
            return Err(NegotiationError::InvalidState {
                operation: "into_channel",
                state,
            });
        }
        let (info, session) = self
            .context
            .take_established()
            .ok_or(NegotiationError::Internal)?;
        Ok(SecureMessageChannel::new(
            self.context.id(),
            info,
            session,
            Arc::clone(self.credential.mechanism()),
            Arc::clone(&self.diagnostics),
        ))
    }

    fn fail(&mut self, kind: NegotiationError) -> StepResult {
        self.context.fail();
        StepResult::error(kind)
    }

    fn report(&self, status: Status, message: &str) {
        self.diagnostics.report(COMPONENT, "step", status, message);
    }
}
