//! # gsslayer - acceptor-side security context negotiation
//!
//! A transport-agnostic GSS-API style acceptor: it drives the handshake that
//! authenticates a remote peer and establishes an integrity-protected
//! security context, without the caller knowing the wire format of the
//! mechanism's tokens.
//!
//! ## Features
//!
//! - **Negotiation state machine**: one leg per peer token, 1..N legs
//! - **Introspection**: peer identity, mechanism, name forms and flags once established
//! - **Authenticated messaging**: integrity-checked receive, MIC compute/verify, replay detection
//! - **Pluggable mechanisms**: [`MechanismProvider`] trait with a built-in keytab mechanism
//! - **Length-prefixed token transport**: over TCP or any async byte stream
//!
//! ## Protocol Overview
//!
//! ```text
//! Initiator                      Acceptor (this crate)
//!    |                              |
//!    |------ token (leg 1) -------->|  step()
//!    |<----- token -----------------|  Continue / Complete
//!    |------ token (leg N) -------->|  step()
//!    |                              |  Established
//!    |                              |
//!    |====== wrapped message ======>|  receive_message()
//!    |<===== MIC ===================|  compute_mic()
//! ```
//!
//! ### State Machine
//!
//! ```text
//!                 step(token)
//!     [Initial] ──────────────> [Negotiating] ──┐ Continue
//!         │                       │   │   ▲     │
//!         │ no token              │   │   └─────┘
//!         │                       │   │ Complete
//!         v         Error/abort   │   v
//!     [Failed] <──────────────────┘ [Established]
//! ```
//!
//! Established and Failed are terminal: `step` on either fails with
//! [`NegotiationError::InvalidState`]. The one exit from Established is to
//! Failed, when the final output token cannot be delivered.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gsslayer::{CredentialStore, KeytabMechanism, NameType, NegotiationEngine, StepStatus};
//!
//! let mechanism = Arc::new(KeytabMechanism::from_keytab_file("/etc/gsslayer.keytab"));
//! let store = CredentialStore::new(mechanism);
//! let credential = store.acquire("TestService", NameType::HostBasedService)?;
//!
//! let mut engine = NegotiationEngine::new(credential);
//! loop {
//!     let token = transport.recv_token().await?;
//!     let result = engine.step(Some(&token))?;
//!     if let Some(out) = &result.output {
//!         transport.send_token(out).await?;
//!     }
//!     match result.status {
//!         StepStatus::Continue => continue,
//!         StepStatus::Complete => break,
//!         StepStatus::Error(e) => return Err(e.into()),
//!     }
//! }
//!
//! let mut channel = engine.into_channel()?;
//! let message = channel.receive_message(&transport.recv_token().await?)?;
//! transport.send_token(&channel.compute_mic(&message)?).await?;
//! ```
//!
//! ## Modules
//!
//! - [`credential`]: Acceptor credential acquisition and caching
//! - [`negotiation`]: Negotiation state machine
//! - [`introspect`]: Queries on an established context
//! - [`channel`]: Authenticated messaging
//! - [`mechanism`]: Mechanism provider trait and the built-in keytab mechanism
//! - [`transport`]: Length-prefixed token transport
//! - [`session`]: Driver binding an engine to a transport
//! - [`server`]: TCP acceptor server
//! - [`status`]: Two-part mechanism status codes
//! - [`diagnostics`]: Sink for rendered status codes
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod channel;
pub mod config;
pub mod context;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod flags;
pub mod introspect;
pub mod mechanism;
pub mod name;
pub mod negotiation;
pub mod server;
pub mod session;
pub mod status;
pub mod transport;

// Re-exports for convenience
pub use channel::SecureMessageChannel;
pub use config::Config;
pub use context::ContextState;
pub use credential::{Credential, CredentialStore};
pub use diagnostics::{Diagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use error::{CredentialError, GssError, MessageError, NegotiationError, Result, TransportError};
pub use flags::{flag_name, FlagSet};
pub use introspect::ContextIntrospector;
pub use mechanism::{KeytabMechanism, MechanismProvider, MechanismSession, KEYTAB_MECH_OID};
pub use name::{MechanismOid, Name, NameType, Oid, PeerIdentity};
pub use negotiation::{NegotiationEngine, StepResult, StepStatus};
pub use server::{ConnectionReport, Server};
pub use session::{AcceptorSession, EstablishedSession};
pub use status::Status;
pub use transport::{TcpTokenTransport, TokenTransport, TransportConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
