//! End-to-end negotiation and messaging tests.
//!
//! These tests drive the acceptor engine with tokens from the built-in
//! mechanism's initiator, without any network I/O.

use std::sync::Arc;
use std::time::Duration;

use gsslayer::mechanism::{Initiator, InitiatorSession, KeyMaterial, Keytab, KeytabMechanism};
use gsslayer::{
    ContextState, Credential, CredentialError, CredentialStore, FlagSet, MessageError, NameType,
    NegotiationEngine, NegotiationError, RecordingDiagnostics, SecureMessageChannel, StepStatus,
    KEYTAB_MECH_OID,
};
use proptest::prelude::*;

const PRINCIPAL: &str = "TestService@server.example";

fn keytab_with(key: &KeyMaterial) -> Keytab {
    Keytab::new().with_entry(PRINCIPAL, key.clone())
}

fn credential(mechanism: KeytabMechanism) -> Credential<KeytabMechanism> {
    CredentialStore::new(Arc::new(mechanism))
        .acquire("TestService", NameType::HostBasedService)
        .unwrap()
}

/// Run a full handshake and return both ends.
fn establish(flags: u32) -> (SecureMessageChannel<KeytabMechanism>, InitiatorSession) {
    let key = KeyMaterial::generate();
    let mut engine = NegotiationEngine::new(credential(KeytabMechanism::in_memory(keytab_with(&key))));
    let mut initiator = Initiator::new("alice@EXAMPLE.COM", "TestService", key).with_flags(flags);

    let first = engine.step(Some(&initiator.initial_token().unwrap())).unwrap();
    let step = initiator.finish(&first.output.unwrap()).unwrap();
    if let Some(confirm) = &step.output {
        assert!(first.status == StepStatus::Continue);
        assert!(engine.step(Some(confirm)).unwrap().is_complete());
    } else {
        assert!(first.status == StepStatus::Complete);
    }
    (engine.into_channel().unwrap(), step.session)
}

#[test]
fn test_acquire_from_keytab_file() {
    let key = KeyMaterial::generate();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("service.keytab");
    std::fs::write(&path, keytab_with(&key).to_toml_string()).unwrap();

    let store = CredentialStore::new(Arc::new(KeytabMechanism::from_keytab_file(&path)));
    for (name, kind) in [
        ("TestService", NameType::HostBasedService),
        ("TestService@server.example", NameType::HostBasedService),
        ("TestService@server.example", NameType::KerberosPrincipal),
    ] {
        assert!(store.acquire(name, kind).is_ok(), "{name} as {kind}");
    }
    assert_eq!(
        store.acquire("Other", NameType::HostBasedService).unwrap_err(),
        CredentialError::KeyMaterialUnavailable
    );
}

#[test]
fn test_short_key_in_keytab_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.keytab");
    std::fs::write(
        &path,
        format!("[[entries]]\nprincipal = \"{PRINCIPAL}\"\nkey = \"00112233\"\n"),
    )
    .unwrap();

    let store = CredentialStore::new(Arc::new(KeytabMechanism::from_keytab_file(&path)));
    assert_eq!(
        store.acquire("TestService", NameType::HostBasedService).unwrap_err(),
        CredentialError::KeyMaterialUnavailable
    );
}

#[test]
fn test_one_leg_handshake() {
    let key = KeyMaterial::generate();
    let mut engine = NegotiationEngine::new(credential(KeytabMechanism::in_memory(keytab_with(&key))));
    assert_eq!(engine.state(), ContextState::Initial);
    assert!(engine.introspector().flags().is_err());

    let mut initiator = Initiator::new("alice@EXAMPLE.COM", "TestService", key);
    let token = initiator.initial_token().unwrap();
    let result = engine.step(Some(&token)).unwrap();
    assert!(result.is_complete());

    let view = engine.introspector();
    assert_eq!(view.peer_identity().unwrap().as_str(), "alice@EXAMPLE.COM");
    assert_eq!(view.negotiated_mechanism().unwrap(), KEYTAB_MECH_OID);
    assert_eq!(view.supported_name_forms().unwrap().len(), 4);
    assert_eq!(view.peer_identity().unwrap(), view.peer_identity().unwrap());

    let again = engine.step(Some(&token));
    assert!(matches!(
        again,
        Err(NegotiationError::InvalidState {
            state: ContextState::Established,
            ..
        })
    ));
}

#[test]
fn test_mutual_handshake_flags() {
    let (channel, peer) = establish(FlagSet::MUTUAL | FlagSet::REPLAY | FlagSet::SEQUENCE);
    let flags = channel.introspector().flags().unwrap();
    assert!(flags.contains(FlagSet::MUTUAL | FlagSet::REPLAY | FlagSet::SEQUENCE | FlagSet::INTEG));
    assert_eq!(flags, peer.flags());
    assert_eq!(
        flags.names(),
        vec![
            "GSS_C_MUTUAL_FLAG",
            "GSS_C_REPLAY_FLAG",
            "GSS_C_SEQUENCE_FLAG",
            "GSS_C_INTEG_FLAG"
        ]
    );
}

#[test]
fn test_failed_context_never_recovers() {
    let key = KeyMaterial::generate();
    let sink = RecordingDiagnostics::new();
    let mut engine = NegotiationEngine::new(credential(KeytabMechanism::in_memory(keytab_with(&key))))
        .with_diagnostics(sink.clone());

    let mut token = Initiator::new("alice@EXAMPLE.COM", "TestService", key.clone())
        .initial_token()
        .unwrap()
        .to_vec();
    let last = token.len() - 1;
    token[last] ^= 0xff;

    let result = engine.step(Some(&token)).unwrap();
    assert_eq!(result.status, StepStatus::Error(NegotiationError::Denied));
    assert!(result.output.is_none());
    assert!(sink.reports()[0].message.contains("GSS_S_BAD_MIC"));

    let good = Initiator::new("alice@EXAMPLE.COM", "TestService", key).initial_token().unwrap();
    assert!(engine.step(Some(&good)).is_err());
    assert_eq!(engine.state(), ContextState::Failed);
}

#[test]
fn test_messages_and_replay() {
    let (mut channel, mut peer) = establish(FlagSet::REPLAY);
    let first = peer.wrap(b"first").unwrap();
    let second = peer.wrap(b"second").unwrap();

    assert_eq!(&channel.receive_message(&second).unwrap()[..], b"second");
    assert_eq!(&channel.receive_message(&first).unwrap()[..], b"first");
    assert_eq!(channel.receive_message(&first), Err(MessageError::InvalidToken));
    assert_eq!(channel.receive_message(b"garbage"), Err(MessageError::InvalidToken));
}

#[test]
fn test_message_from_other_context_rejected() {
    let (mut channel, _) = establish(0);
    let (_, mut stranger) = establish(0);
    assert_eq!(
        channel.receive_message(&stranger.wrap(b"hi").unwrap()),
        Err(MessageError::InvalidToken)
    );
}

#[test]
fn test_expired_context() {
    let key = KeyMaterial::generate();
    let mechanism = KeytabMechanism::in_memory(keytab_with(&key)).with_max_lifetime(Duration::ZERO);
    let mut engine = NegotiationEngine::new(credential(mechanism));
    let mut initiator = Initiator::new("alice@EXAMPLE.COM", "TestService", key);
    let first = engine.step(Some(&initiator.initial_token().unwrap())).unwrap();
    let mut peer = initiator.finish(&first.output.unwrap()).unwrap().session;

    let mut channel = engine.into_channel().unwrap();
    assert_eq!(channel.compute_mic(b"late"), Err(MessageError::ContextExpired));
    assert_eq!(
        channel.receive_message(&peer.wrap(b"late").unwrap()),
        Err(MessageError::ContextExpired)
    );
    assert!(!channel.verify_mic(b"late", &peer.get_mic(b"late").unwrap()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_mic_roundtrip(message in prop::collection::vec(any::<u8>(), 0..512)) {
        let (channel, peer) = establish(0);
        let mic = channel.compute_mic(&message).unwrap();
        prop_assert!(channel.verify_mic(&message, &mic));
        prop_assert!(peer.verify_mic(&message, &mic));
    }

    #[test]
    fn prop_mutated_message_fails(
        message in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let (channel, _) = establish(0);
        let mic = channel.compute_mic(&message).unwrap();
        let mut mutated = message.clone();
        let i = index.index(mutated.len());
        mutated[i] ^= flip;
        prop_assert!(!channel.verify_mic(&mutated, &mic));
    }
}
