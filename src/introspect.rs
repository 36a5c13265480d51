//! Read-only queries on an established context.

use std::time::Duration;

use crate::context::ContextState;
use crate::error::NegotiationError;
use crate::flags::FlagSet;
use crate::mechanism::EstablishedInfo;
use crate::name::{MechanismOid, PeerIdentity};

pub use crate::flags::flag_name;

/// View of the values fixed at establishment.
///
/// Every query fails with [`NegotiationError::InvalidState`] unless the
/// context is Established.
#[derive(Debug, Clone, Copy)]
pub struct ContextIntrospector<'a> {
    state: ContextState,
    info: Option<&'a EstablishedInfo>,
}

impl<'a> ContextIntrospector<'a> {
    pub(crate) fn new(state: ContextState, info: Option<&'a EstablishedInfo>) -> Self {
        Self { state, info }
    }

    fn established(&self, operation: &'static str) -> Result<&'a EstablishedInfo, NegotiationError> {
        match (self.state, self.info) {
            (ContextState::Established, Some(info)) => Ok(info),
            (state, _) => Err(NegotiationError::InvalidState { operation, state }),
        }
    }

    /// Authenticated peer.
    pub fn peer_identity(&self) -> Result<PeerIdentity, NegotiationError> {
        self.established("peer_identity").map(|i| i.peer.clone())
    }

    /// Mechanism that established the context.
    pub fn negotiated_mechanism(&self) -> Result<MechanismOid, NegotiationError> {
        self.established("negotiated_mechanism").map(|i| i.mechanism.clone())
    }

    /// OIDs of the name forms the mechanism can export for the peer, in the
    /// mechanism's order.
    pub fn supported_name_forms(&self) -> Result<Vec<String>, NegotiationError> {
        self.established("supported_name_forms")
            .map(|i| i.name_forms.iter().map(ToString::to_string).collect())
    }

    /// Negotiated capability flags.
    pub fn flags(&self) -> Result<FlagSet, NegotiationError> {
        self.established("flags").map(|i| i.flags)
    }

    /// Granted context lifetime.
    pub fn lifetime(&self) -> Result<Option<Duration>, NegotiationError> {
        self.established("lifetime").map(|i| i.lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::{NameType, Oid};

    fn info() -> EstablishedInfo {
        EstablishedInfo {
            mechanism: Oid::from_static("1.2.3.4"),
            peer: PeerIdentity::new("alice@EXAMPLE.COM"),
            name_forms: vec![NameType::UserName.oid(), NameType::HostBasedService.oid()],
            flags: FlagSet::from_bits(FlagSet::MUTUAL | FlagSet::INTEG),
            lifetime: Some(Duration::from_secs(60)),
        }
    }

    #[test]
    fn test_fails_before_established() {
        for state in [ContextState::Initial, ContextState::Negotiating, ContextState::Failed] {
            let view = ContextIntrospector::new(state, None);
            assert_eq!(
                view.flags().unwrap_err(),
                NegotiationError::InvalidState {
                    operation: "flags",
                    state
                }
            );
            assert!(view.peer_identity().is_err());
            assert!(view.negotiated_mechanism().is_err());
            assert!(view.supported_name_forms().is_err());
        }
    }

    #[test]
    fn test_established_queries() {
        let info = info();
        let view = ContextIntrospector::new(ContextState::Established, Some(&info));
        assert_eq!(view.peer_identity().unwrap().as_str(), "alice@EXAMPLE.COM");
        assert_eq!(view.negotiated_mechanism().unwrap().as_str(), "1.2.3.4");
        assert_eq!(
            view.supported_name_forms().unwrap(),
            vec!["1.2.840.113554.1.2.1.1", "1.2.840.113554.1.2.1.4"]
        );
        assert_eq!(view.flags().unwrap().names(), vec!["GSS_C_MUTUAL_FLAG", "GSS_C_INTEG_FLAG"]);
        assert_eq!(view.lifetime().unwrap(), Some(Duration::from_secs(60)));
        // Deterministic across calls
        assert_eq!(view.flags().unwrap(), view.flags().unwrap());
    }
}
