//! Per-connection security context.
//!
//! State transitions are monotonic:
//!
//! ```text
//! Initial ──> Negotiating ──> Established
//!    │             │
//!    └─────────────┴────────> Failed
//! ```
//!
//! Established and Failed are terminal. The values exported at establishment
//! (mechanism, peer, flags) are written once and never change afterwards.

use std::fmt;

use uuid::Uuid;

use crate::mechanism::{EstablishedInfo, MechanismProvider};

/// Lifecycle state of a security context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    /// No token consumed yet
    Initial,
    /// At least one leg ran and more are expected
    Negotiating,
    /// Authenticated; introspection and messaging are available
    Established,
    /// Negotiation failed or was aborted; permanently unusable
    Failed,
}

impl ContextState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Established | Self::Failed)
    }

    fn can_transition_to(self, next: ContextState) -> bool {
        matches!(
            (self, next),
            (Self::Initial, Self::Negotiating | Self::Failed)
                | (Self::Negotiating, Self::Negotiating | Self::Established | Self::Failed)
                | (Self::Established, Self::Failed)
        )
    }
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "Initial",
            Self::Negotiating => "Negotiating",
            Self::Established => "Established",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// State owned by one negotiation.
pub(crate) struct SecurityContext<M: MechanismProvider> {
    id: Uuid,
    state: ContextState,
    legs: u32,
    partial: Option<M::Partial>,
    info: Option<EstablishedInfo>,
    session: Option<M::Session>,
}

impl<M: MechanismProvider> SecurityContext<M> {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ContextState::Initial,
            legs: 0,
            partial: None,
            info: None,
            session: None,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn state(&self) -> ContextState {
        self.state
    }

    pub(crate) fn legs(&self) -> u32 {
        self.legs
    }

    pub(crate) fn info(&self) -> Option<&EstablishedInfo> {
        self.info.as_ref()
    }

    pub(crate) fn take_partial(&mut self) -> Option<M::Partial> {
        self.partial.take()
    }

    /// Record the start of a leg, moving out of `Initial`.
    pub(crate) fn begin_leg(&mut self) {
        self.legs += 1;
        self.transition(ContextState::Negotiating);
    }

    pub(crate) fn park(&mut self, partial: M::Partial) {
        self.partial = Some(partial);
    }

    pub(crate) fn establish(&mut self, info: EstablishedInfo, session: M::Session) {
        debug_assert!(self.info.is_none(), "context established twice");
        self.partial = None;
        self.info = Some(info);
        self.session = Some(session);
        self.transition(ContextState::Established);
    }

    /// Move to `Failed` and drop any partial mechanism state.
    pub(crate) fn fail(&mut self) {
        self.partial = None;
        self.info = None;
        self.session = None;
        self.transition(ContextState::Failed);
    }

    /// Hand the established session and its info to a message channel.
    pub(crate) fn take_established(&mut self) -> Option<(EstablishedInfo, M::Session)> {
        match (self.info.clone(), self.session.take()) {
            (Some(info), Some(session)) => Some((info, session)),
            _ => None,
        }
    }

    fn transition(&mut self, next: ContextState) {
        let from = self.state;
        if from == next {
            return;
        }
        debug_assert!(from.can_transition_to(next), "illegal transition {from} -> {next}");
        self.state = next;
        tracing::info!(
            context_id = %self.id,
            from = %from,
            to = %next,
            leg = self.legs,
            "context state transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ContextState::Initial.is_terminal());
        assert!(!ContextState::Negotiating.is_terminal());
        assert!(ContextState::Established.is_terminal());
        assert!(ContextState::Failed.is_terminal());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use ContextState::*;

        assert!(Initial.can_transition_to(Negotiating));
        assert!(Negotiating.can_transition_to(Established));
        assert!(Negotiating.can_transition_to(Failed));
        assert!(!Established.can_transition_to(Negotiating));
        assert!(Established.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Established));
        assert!(!Initial.can_transition_to(Established));
    }

    #[test]
    fn test_display() {
        assert_eq!(ContextState::Negotiating.to_string(), "Negotiating");
    }
}
