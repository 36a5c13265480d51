//! Security mechanism providers.
//!
//! A [`MechanismProvider`] supplies the primitives the core drives: credential
//! acquisition, one negotiation leg at a time, and per-message integrity
//! operations on an established session. Providers report failures as
//! two-part [`Status`] codes; the core translates them before they reach
//! callers.
//!
//! # Built-in mechanism
//!
//! [`KeytabMechanism`] is a pre-shared-key mechanism backed by a keytab file.
//! It runs an X25519 exchange authenticated with the service's long-term key
//! and derives per-context keys with HKDF-SHA256:
//!
//! ```text
//! Initiator                                    Acceptor
//!    |                                            |
//!    |--- INIT (mechs, flags, names, eph_i) ----->|  leg 1
//!    |<-- ACCEPT (flags, eph_a, proof) -----------|  Complete, or Continue if mutual
//!    |--- CONFIRM (proof) ----------------------->|  leg 2 (mutual only)
//!    |                                            |
//!    |=== WRAP (seq, payload, tag) ==============>|  receive_message
//!    |<-- MIC (tag) ------------------------------|  compute_mic
//! ```

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::flags::FlagSet;
use crate::name::{MechanismOid, Name, NameType, Oid, PeerIdentity};
use crate::status::Status;

mod builtin;
mod keytab;
mod token;

pub use builtin::{
    Initiator, InitiatorSession, InitiatorStep, KeytabCredential, KeytabMechanism, KeytabPartial,
    KeytabSession, KeytabSource, MinorCode, DEFAULT_MAX_LIFETIME, KEYTAB_MECH_OID,
};
pub use keytab::{KeyMaterial, Keytab, KeytabEntry, KeytabError};

/// Outcome of one acceptor negotiation leg.
pub enum AcceptLeg<P, S> {
    /// Another peer token is required.
    Continue {
        /// Mechanism state to resume with on the next leg.
        partial: P,
        /// Token to send to the peer, if any.
        output: Option<Bytes>,
    },
    /// The context is established.
    Complete {
        /// Per-message state of the established context.
        session: S,
        /// Values fixed at establishment.
        info: EstablishedInfo,
        /// Final token to send to the peer, if any.
        output: Option<Bytes>,
    },
}

impl<P, S> fmt::Debug for AcceptLeg<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue { output, .. } => f
                .debug_struct("Continue")
                .field("output_len", &output.as_ref().map(Bytes::len))
                .finish_non_exhaustive(),
            Self::Complete { info, output, .. } => f
                .debug_struct("Complete")
                .field("info", info)
                .field("output_len", &output.as_ref().map(Bytes::len))
                .finish_non_exhaustive(),
        }
    }
}

/// Values a mechanism exports when a context is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishedInfo {
    /// Negotiated mechanism.
    pub mechanism: MechanismOid,
    /// Authenticated peer.
    pub peer: PeerIdentity,
    /// Name forms the mechanism can export for the peer.
    pub name_forms: Vec<Oid>,
    /// Negotiated capabilities.
    pub flags: FlagSet,
    /// Context lifetime, if bounded.
    pub lifetime: Option<Duration>,
}

/// A security mechanism engine.
///
/// Implementations must be shareable across sessions: every method takes
/// `&self`, and credential handles are only ever read after acquisition.
pub trait MechanismProvider: Send + Sync + 'static {
    /// Long-lived credential handle.
    type Credential: Send + Sync + fmt::Debug;
    /// Mechanism state between negotiation legs.
    type Partial: Send;
    /// Per-message state of an established context.
    type Session: MechanismSession;

    /// Mechanism identifier.
    fn oid(&self) -> &MechanismOid;

    /// Short mechanism name for logs.
    fn name(&self) -> &'static str;

    /// Name forms this mechanism understands, in preference order.
    fn name_types(&self) -> Vec<NameType> {
        NameType::ALL.to_vec()
    }

    /// Acquire an acceptor credential for `name`.
    fn acquire_credential(&self, name: &Name) -> Result<Self::Credential, Status>;

    /// Run one acceptor leg over `token`.
    ///
    /// `partial` is `None` on the first leg and the state returned by the
    /// previous `Continue` afterwards.
    fn accept_leg(
        &self,
        credential: &Self::Credential,
        partial: Option<Self::Partial>,
        token: &[u8],
    ) -> Result<AcceptLeg<Self::Partial, Self::Session>, Status>;

    /// Description of a mechanism-specific minor code.
    fn minor_message(&self, _minor: u32) -> Option<&'static str> {
        None
    }
}

/// Per-message operations on an established context.
pub trait MechanismSession: Send {
    /// Verify an integrity-protected message token and return its payload.
    fn unwrap(&mut self, token: &[u8]) -> Result<Bytes, Status>;

    /// Compute a deterministic integrity code over `message`.
    fn get_mic(&self, message: &[u8]) -> Result<Bytes, Status>;

    /// Check `mic` against `message`.
    fn verify_mic(&self, message: &[u8], mic: &[u8]) -> Result<(), Status>;
}
