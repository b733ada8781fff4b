//! End-to-end handshake scenarios between two in-process endpoints.

use std::sync::Arc;
use std::time::Duration;

use accord_core::did::Did;
use accord_core::error::ErrorCode;
use accord_crypto::KeyPair;
use accord_session::handshake::{HandshakeConfig, HandshakeInitiator, HandshakeResponder};
use accord_session::manager::SessionManager;
use accord_session::resolver::StaticResolver;
use accord_session::session::SessionStatus;
use chrono::Utc;

struct Endpoint {
    did: Did,
    keypair: Arc<KeyPair>,
    manager: Arc<SessionManager>,
}

impl Endpoint {
    fn new(did: &str) -> Self {
        Self {
            did: Did::new(did).unwrap(),
            keypair: Arc::new(KeyPair::generate()),
            manager: Arc::new(SessionManager::new()),
        }
    }
}

async fn resolver_for(endpoints: &[&Endpoint]) -> Arc<StaticResolver> {
    let resolver = Arc::new(StaticResolver::new());
    for endpoint in endpoints {
        resolver
            .register(endpoint.did.clone(), endpoint.keypair.public_key())
            .await;
    }
    resolver
}

#[tokio::test]
async fn full_handshake_activates_both_sides_with_one_key() {
    let alice = Endpoint::new("did:example:A");
    let bob = Endpoint::new("did:example:B");
    let resolver = resolver_for(&[&alice, &bob]).await;

    let initiator = HandshakeInitiator::new(
        Arc::clone(&alice.manager),
        Arc::clone(&alice.keypair),
        alice.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );
    let responder = HandshakeResponder::new(
        Arc::clone(&bob.manager),
        Arc::clone(&bob.keypair),
        bob.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );

    let invitation = initiator.initiate(&bob.did).await.unwrap();
    let request = responder.process_invitation(&invitation).await.unwrap();
    let response = initiator.process_request(&request).await.unwrap();
    let complete = responder.process_response(&response).await.unwrap();
    let session_a = initiator.process_complete(&complete).await.unwrap();

    let session_b = bob.manager.get(&request.session_id).await.unwrap();

    // Both sessions active, one shared id, one 32-byte key.
    assert_eq!(session_a.status(), SessionStatus::Active);
    assert_eq!(session_b.status(), SessionStatus::Active);
    assert_eq!(session_a.id, session_b.id);
    let key_a = session_a.session_key().unwrap();
    let key_b = session_b.session_key().unwrap();
    assert_eq!(key_a.as_bytes(), key_b.as_bytes());
    assert_eq!(key_a.as_bytes().len(), 32);

    // Nonces crossed correctly: each side's local nonce is the
    // other's remote nonce.
    assert_eq!(session_a.local_nonce, session_b.remote_nonce);
    assert_eq!(session_a.remote_nonce, session_b.local_nonce);
}

#[tokio::test]
async fn repeated_create_after_activation_reuses_the_session() {
    let alice = Endpoint::new("did:example:A");
    let bob = Endpoint::new("did:example:B");
    let resolver = resolver_for(&[&alice, &bob]).await;

    let initiator = HandshakeInitiator::new(
        Arc::clone(&alice.manager),
        Arc::clone(&alice.keypair),
        alice.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );
    let responder = HandshakeResponder::new(
        Arc::clone(&bob.manager),
        Arc::clone(&bob.keypair),
        bob.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );

    let invitation = initiator.initiate(&bob.did).await.unwrap();
    let request = responder.process_invitation(&invitation).await.unwrap();
    let response = initiator.process_request(&request).await.unwrap();
    let complete = responder.process_response(&response).await.unwrap();
    let active = initiator.process_complete(&complete).await.unwrap();

    // Idempotent reuse: create returns the same live session.
    let again = alice.manager.create(&alice.did, &bob.did).await;
    assert_eq!(again.id, active.id);

    // A second initiate against the active session is refused.
    let err = initiator.initiate(&bob.did).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidValue);
}

#[tokio::test]
async fn forged_request_signature_aborts_the_handshake() {
    let alice = Endpoint::new("did:example:A");
    let bob = Endpoint::new("did:example:B");
    let resolver = resolver_for(&[&alice, &bob]).await;

    let initiator = HandshakeInitiator::new(
        Arc::clone(&alice.manager),
        Arc::clone(&alice.keypair),
        alice.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );
    let responder = HandshakeResponder::new(
        Arc::clone(&bob.manager),
        Arc::clone(&bob.keypair),
        bob.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );

    let invitation = initiator.initiate(&bob.did).await.unwrap();
    let mut request = responder.process_invitation(&invitation).await.unwrap();

    // Tamper with a signed field after signing.
    request.nonce = "forged".to_string();

    let err = initiator.process_request(&request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidSignature);

    // The initiator's session is gone; a fresh handshake can start.
    assert!(alice.manager.get_by_did(&bob.did).await.is_err());
    assert!(initiator.initiate(&bob.did).await.is_ok());
}

#[tokio::test]
async fn unresolvable_peer_fails_with_did_not_found() {
    let alice = Endpoint::new("did:example:A");
    let bob = Endpoint::new("did:example:B");
    // Only Alice is registered; Bob's DID cannot be resolved.
    let resolver = resolver_for(&[&alice]).await;

    let initiator = HandshakeInitiator::new(
        Arc::clone(&alice.manager),
        Arc::clone(&alice.keypair),
        alice.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );
    let responder = HandshakeResponder::new(
        Arc::clone(&bob.manager),
        Arc::clone(&bob.keypair),
        bob.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );

    let invitation = initiator.initiate(&bob.did).await.unwrap();
    let request = responder.process_invitation(&invitation).await.unwrap();

    let err = initiator.process_request(&request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DidNotFound);
}

#[tokio::test]
async fn stale_invitation_is_rejected() {
    let alice = Endpoint::new("did:example:A");
    let bob = Endpoint::new("did:example:B");
    let resolver = resolver_for(&[&alice, &bob]).await;

    let initiator = HandshakeInitiator::new(
        Arc::clone(&alice.manager),
        Arc::clone(&alice.keypair),
        alice.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );
    let responder = HandshakeResponder::new(
        Arc::clone(&bob.manager),
        Arc::clone(&bob.keypair),
        bob.did.clone(),
        resolver.clone(),
        HandshakeConfig {
            max_clock_skew: Duration::from_secs(60),
            ..HandshakeConfig::default()
        },
    );

    let mut invitation = initiator.initiate(&bob.did).await.unwrap();
    invitation.timestamp = Utc::now()
        .checked_sub_signed(chrono::TimeDelta::seconds(600))
        .unwrap();

    let err = responder.process_invitation(&invitation).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfRange);
}

#[tokio::test]
async fn sealed_traffic_flows_after_handshake() {
    use accord_core::message::{Message, Part, Role};
    use accord_session::envelope::{open_message, seal_message};

    let alice = Endpoint::new("did:example:A");
    let bob = Endpoint::new("did:example:B");
    let resolver = resolver_for(&[&alice, &bob]).await;

    let initiator = HandshakeInitiator::new(
        Arc::clone(&alice.manager),
        Arc::clone(&alice.keypair),
        alice.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );
    let responder = HandshakeResponder::new(
        Arc::clone(&bob.manager),
        Arc::clone(&bob.keypair),
        bob.did.clone(),
        resolver.clone(),
        HandshakeConfig::default(),
    );

    let invitation = initiator.initiate(&bob.did).await.unwrap();
    let request = responder.process_invitation(&invitation).await.unwrap();
    let response = initiator.process_request(&request).await.unwrap();
    let complete = responder.process_response(&response).await.unwrap();
    let mut session_a = initiator.process_complete(&complete).await.unwrap();
    let mut session_b = bob.manager.get(&session_a.id).await.unwrap();

    let message = Message::new("m1", Role::User, vec![Part::text("over the wire")]);
    let envelope = seal_message(&mut session_a, &message, &alice.keypair).unwrap();

    let opened = open_message(
        &envelope,
        &mut session_b,
        &alice.keypair.public_key(),
        Duration::from_secs(300),
    )
    .unwrap();

    assert_eq!(opened.text(), "over the wire");
    assert_eq!(session_a.messages_sent, 1);
    assert_eq!(session_b.messages_received, 1);
}
