//! Error types for credential acquisition, negotiation, messaging and transport.
//!
//! Mechanism status codes are translated into these kinds at the boundary of
//! each component; see [`crate::status`] for the raw codes. The variants carry
//! no raw codes on purpose, the rendered status goes to the diagnostics sink.

use std::time::Duration;

use thiserror::Error;

use crate::context::ContextState;
use crate::status::{RoutineError, Status};

/// Errors from [`CredentialStore::acquire`](crate::CredentialStore::acquire).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// The service name could not be parsed or resolved to a principal.
    #[error("name resolution failed")]
    NameResolutionFailed,

    /// Backing key material (keytab entry) is missing or invalid.
    #[error("key material unavailable")]
    KeyMaterialUnavailable,

    /// Any other mechanism failure.
    #[error("internal credential error")]
    Internal,
}

impl From<Status> for CredentialError {
    fn from(status: Status) -> Self {
        match status.routine_error() {
            Some(RoutineError::BadName | RoutineError::BadNameType | RoutineError::NameNotMn) => {
                Self::NameResolutionFailed
            },
            Some(
                RoutineError::NoCred
                | RoutineError::DefectiveCredential
                | RoutineError::CredentialsExpired,
            ) => Self::KeyMaterialUnavailable,
            _ => Self::Internal,
        }
    }
}

/// Errors from the negotiation state machine and context introspection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The mechanism rejected the credentials or the peer.
    #[error("negotiation denied")]
    Denied,

    /// No mechanism is common to both peers.
    #[error("no common mechanism")]
    MechanismMismatch,

    /// A peer token could not be parsed.
    #[error("malformed token")]
    MalformedToken,

    /// Any other mechanism failure.
    #[error("internal negotiation error")]
    Internal,

    /// The operation is not valid in the context's current state.
    #[error("{operation} is not valid in state {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the context was in.
        state: ContextState,
    },
}

impl From<Status> for NegotiationError {
    fn from(status: Status) -> Self {
        match status.routine_error() {
            Some(RoutineError::BadMech) => Self::MechanismMismatch,
            Some(RoutineError::DefectiveToken) => Self::MalformedToken,
            Some(
                RoutineError::BadName
                | RoutineError::BadNameType
                | RoutineError::BadBindings
                | RoutineError::BadMic
                | RoutineError::NoCred
                | RoutineError::DefectiveCredential
                | RoutineError::CredentialsExpired
                | RoutineError::Unauthorized,
            ) => Self::Denied,
            _ => Self::Internal,
        }
    }
}

/// Errors from [`SecureMessageChannel`](crate::SecureMessageChannel) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// The message token was corrupted, forged, replayed or out of sequence.
    #[error("invalid message token")]
    InvalidToken,

    /// The security context lifetime has elapsed.
    #[error("security context expired")]
    ContextExpired,

    /// Any other mechanism failure.
    #[error("internal message error")]
    Internal,
}

impl From<Status> for MessageError {
    fn from(status: Status) -> Self {
        match status.routine_error() {
            Some(RoutineError::ContextExpired | RoutineError::NoContext) => Self::ContextExpired,
            Some(RoutineError::DefectiveToken | RoutineError::BadMic) => Self::InvalidToken,
            None if status.is_sequence_problem() => Self::InvalidToken,
            _ => Self::Internal,
        }
    }
}

/// Token transport failures. Always fatal to the session.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// A frame announced a length above the configured limit.
    #[error("token of {len} bytes exceeds limit of {max} bytes")]
    TokenTooLarge {
        /// Announced length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// No complete token arrived within the read timeout.
    #[error("timed out after {0:?} waiting for token")]
    Timeout(Duration),

    /// Underlying I/O error.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error aggregating every component's failures.
#[derive(Error, Debug)]
pub enum GssError {
    /// Credential acquisition failed.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Context negotiation failed.
    #[error("negotiation error: {0}")]
    Negotiation(#[from] NegotiationError),

    /// A message operation failed.
    #[error("message error: {0}")]
    Message(#[from] MessageError),

    /// The token transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for gsslayer operations.
pub type Result<T> = std::result::Result<T, GssError>;

impl From<toml::de::Error> for GssError {
    fn from(err: toml::de::Error) -> Self {
        GssError::Config(err.to_string())
    }
}

impl From<std::io::Error> for GssError {
    fn from(err: std::io::Error) -> Self {
        GssError::Transport(TransportError::Io(err))
    }
}
