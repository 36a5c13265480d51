//! End-to-end transport tests.
//!
//! These tests run the acceptor over real loopback TCP connections and
//! in-memory duplex pipes.

use std::sync::Arc;
use std::time::Duration;

use gsslayer::mechanism::{Initiator, KeyMaterial, Keytab, KeytabMechanism};
use gsslayer::server::{handle_connection, Server};
use gsslayer::transport::{self, StreamTransport, TokenTransport, TransportConfig};
use gsslayer::{
    AcceptorSession, ContextState, Credential, CredentialStore, FlagSet, GssError, NameType,
    NegotiationEngine, TransportError, KEYTAB_MECH_OID,
};
use tokio::time::timeout;

fn credential(key: &KeyMaterial) -> Credential<KeytabMechanism> {
    let keytab = Keytab::new().with_entry("TestService@localhost", key.clone());
    CredentialStore::new(Arc::new(KeytabMechanism::in_memory(keytab)))
        .acquire("TestService", NameType::HostBasedService)
        .unwrap()
}

/// Client half of the demo flow: negotiate, send a message, check the MIC.
async fn run_client<T: TokenTransport>(mut transport: T, key: KeyMaterial, flags: u32, message: &[u8]) -> bool {
    let mut initiator = Initiator::new("client@LOCAL", "TestService", key).with_flags(flags);
    transport.send_token(&initiator.initial_token().unwrap()).await.unwrap();
    let accept = transport.recv_token().await.unwrap();
    let step = initiator.finish(&accept).unwrap();
    if let Some(confirm) = &step.output {
        transport.send_token(confirm).await.unwrap();
    }

    let mut session = step.session;
    transport.send_token(&session.wrap(message).unwrap()).await.unwrap();
    let mic = transport.recv_token().await.unwrap();
    session.verify_mic(message, &mic)
}

#[tokio::test]
async fn test_tcp_server_full_flow() {
    let key = KeyMaterial::generate();
    let server = Server::bind("127.0.0.1:0", credential(&key), TransportConfig::default())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let server_task = tokio::spawn(async move { server.serve_one().await });

    let client = transport::connect(addr, TransportConfig::default()).await.unwrap();
    let verified = timeout(
        Duration::from_secs(5),
        run_client(client, key, FlagSet::MUTUAL | FlagSet::REPLAY, b"Hello, acceptor"),
    )
    .await
    .expect("client timed out");
    assert!(verified);

    let report = server_task.await.unwrap().unwrap();
    assert_eq!(report.peer.as_str(), "client@LOCAL");
    assert_eq!(report.mechanism, KEYTAB_MECH_OID);
    assert_eq!(report.name_forms.len(), 4);
    assert!(report.flags.contains(FlagSet::MUTUAL | FlagSet::INTEG));
    assert_eq!(&report.message[..], b"Hello, acceptor");
    assert!(report.mic_sent);
}

#[tokio::test]
async fn test_duplex_one_leg_flow() {
    let key = KeyMaterial::generate();
    let (a, b) = tokio::io::duplex(4096);
    let acceptor = StreamTransport::new(a, TransportConfig::default(), "client");
    let client = StreamTransport::new(b, TransportConfig::default(), "server");

    let engine = NegotiationEngine::new(credential(&key));
    let server = tokio::spawn(handle_connection(acceptor, engine));
    assert!(run_client(client, key, 0, b"").await);

    let report = server.await.unwrap().unwrap();
    assert!(report.message.is_empty());
    assert!(!report.flags.contains(FlagSet::MUTUAL));
}

#[tokio::test]
async fn test_disconnect_mid_negotiation_fails_context() {
    let key = KeyMaterial::generate();
    let (a, b) = tokio::io::duplex(4096);
    let acceptor = StreamTransport::new(a, TransportConfig::default(), "client");
    let mut client = StreamTransport::new(b, TransportConfig::default(), "server");

    let mut initiator = Initiator::new("client@LOCAL", "TestService", key.clone()).with_flags(FlagSet::MUTUAL);
    client.send_token(&initiator.initial_token().unwrap()).await.unwrap();

    let mut session = AcceptorSession::new(acceptor, NegotiationEngine::new(credential(&key)));
    let negotiation = tokio::spawn(async move {
        let result = session.negotiate().await;
        (result, session)
    });

    // Read the ACCEPT token, then hang up before confirming.
    client.recv_token().await.unwrap();
    drop(client);

    let (result, mut session) = negotiation.await.unwrap();
    assert!(matches!(result, Err(GssError::Transport(TransportError::Closed))));
    assert_eq!(session.engine().state(), ContextState::Failed);
    assert!(session.negotiate().await.is_err());
    assert!(session.into_established().is_err());
}

#[tokio::test]
async fn test_undelivered_accept_token_fails_context() {
    let key = KeyMaterial::generate();
    let (a, b) = tokio::io::duplex(4096);
    let acceptor = StreamTransport::new(a, TransportConfig::default(), "client");
    let mut client = StreamTransport::new(b, TransportConfig::default(), "server");

    // One-leg handshake: the client hangs up right after its INIT token.
    let mut initiator = Initiator::new("client@LOCAL", "TestService", key.clone());
    client.send_token(&initiator.initial_token().unwrap()).await.unwrap();
    drop(client);

    let mut session = AcceptorSession::new(acceptor, NegotiationEngine::new(credential(&key)));
    let result = session.negotiate().await;
    assert!(matches!(result, Err(GssError::Transport(_))));
    assert_eq!(session.engine().state(), ContextState::Failed);
    assert!(session.engine().introspector().peer_identity().is_err());
    assert!(matches!(
        session.into_established(),
        Err(GssError::Negotiation(gsslayer::NegotiationError::InvalidState {
            state: ContextState::Failed,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_oversized_token_rejected() {
    let (a, b) = tokio::io::duplex(1 << 16);
    let config = TransportConfig::default().with_max_token_len(1024);
    let mut acceptor = StreamTransport::new(a, config, "client");
    let mut client = StreamTransport::new(b, TransportConfig::default(), "server");

    client.send_token(&[0u8; 2048]).await.unwrap();
    assert!(matches!(
        acceptor.recv_token().await,
        Err(TransportError::TokenTooLarge { len: 2048, max: 1024 })
    ));
}

#[tokio::test]
async fn test_tcp_framing_sizes() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let echo = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = StreamTransport::tcp(stream, TransportConfig::default());
        for _ in 0..3 {
            let token = transport.recv_token().await.unwrap();
            transport.send_token(&token).await.unwrap();
        }
    });

    let mut client = transport::connect(addr, TransportConfig::default()).await.unwrap();
    for n in [0usize, 1, 65536] {
        let token: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
        client.send_token(&token).await.unwrap();
        assert_eq!(client.recv_token().await.unwrap(), token);
    }
    echo.await.unwrap();
}
