//! End-to-end handshake sessions over the in-memory transport.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;

use keylink::server::{handshake, HandshakeConfig, HandshakeOutcome};
use keylink::transport::memory::{pair, MemoryTransport};
use keylink::transport::MessageTransport;
use keylink::{authenticate, LinkError};
use keyproof::wire::{Envelope, Message, ResponsePayload, HASH_SHA256};
use keyproof::{AuthError, ClientIdentity, EcdsaKeyPair};

fn make_identity() -> (ClientIdentity, EcdsaKeyPair) {
    let kp = EcdsaKeyPair::generate();
    (ClientIdentity::from_verifying_key(*kp.verifying_key()), kp)
}

async fn recv_envelope(t: &mut MemoryTransport) -> Envelope {
    let text = t.recv().await.unwrap().expect("peer closed unexpectedly");
    Envelope::decode(&text).unwrap()
}

async fn send_message(t: &mut MemoryTransport, message: Message) {
    t.send(message.encode().unwrap()).await.unwrap();
}

/// Helper: spawn the server driver on its own task, handing the transport
/// back together with the outcome.
fn spawn_server(
    mut end: MemoryTransport,
    config: HandshakeConfig,
) -> tokio::task::JoinHandle<(keylink::Result<HandshakeOutcome>, MemoryTransport)> {
    tokio::spawn(async move {
        let outcome = handshake(&mut end, &config).await;
        (outcome, end)
    })
}

// ---------------------------------------------------------------------------
// Full session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_session_authenticates_and_leaves_transport_open() {
    let (identity, kp) = make_identity();
    let announced = identity.encode();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    authenticate(&mut client_end, identity, kp, &HandshakeConfig::default())
        .await
        .unwrap();

    let (outcome, mut server_end) = server.await.unwrap();
    let outcome = outcome.unwrap();
    assert!(outcome.is_authenticated());
    assert_eq!(outcome.client_id(), Some(announced.as_str()));

    // Neither driver closed the connection; application traffic flows.
    client_end.send("first app message".to_owned()).await.unwrap();
    assert_eq!(
        server_end.recv().await.unwrap(),
        Some("first app message".to_owned())
    );
}

#[tokio::test]
async fn hand_rolled_json_interoperates() {
    let (identity, kp) = make_identity();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    // Envelopes built by hand, the way a WebCrypto peer would produce them.
    client_end
        .send(serde_json::json!({ "type": "CLIENT_ID", "data": identity.encode() }).to_string())
        .await
        .unwrap();
    let challenge = recv_envelope(&mut client_end).await;
    let raw = BASE64_STANDARD
        .decode(challenge.text_payload().unwrap())
        .unwrap();
    client_end
        .send(
            serde_json::json!({
                "type": "CHALLENGE_RESPONSE",
                "data": {
                    "signature": BASE64_STANDARD.encode(kp.sign(&raw)),
                    "hash": "SHA-256",
                },
            })
            .to_string(),
        )
        .await
        .unwrap();
    assert_eq!(recv_envelope(&mut client_end).await.kind, "SIGNATURE_MATCHES");

    let (outcome, _end) = server.await.unwrap();
    assert!(outcome.unwrap().is_authenticated());
}

// ---------------------------------------------------------------------------
// Protocol rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_hash_rejects_and_reports_the_announced_id() {
    let (identity, kp) = make_identity();
    let announced = identity.encode();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    send_message(&mut client_end, Message::ClientId(announced.clone())).await;
    let challenge = recv_envelope(&mut client_end).await;
    assert_eq!(challenge.kind, "CHALLENGE");

    let raw = BASE64_STANDARD
        .decode(challenge.text_payload().unwrap())
        .unwrap();
    send_message(
        &mut client_end,
        Message::ChallengeResponse(ResponsePayload {
            signature: BASE64_STANDARD.encode(kp.sign(&raw)),
            hash: "SHA-1".to_owned(),
        }),
    )
    .await;
    assert_eq!(recv_envelope(&mut client_end).await.kind, "UNSUPPORTED_HASH");

    let (outcome, _end) = server.await.unwrap();
    match outcome.unwrap() {
        HandshakeOutcome::Rejected { client_id, reason } => {
            assert_eq!(client_id.as_deref(), Some(announced.as_str()));
            assert!(reason.contains("SHA-1"), "reason was: {reason}");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn short_signature_rejects_citing_the_byte_count() {
    let (identity, _kp) = make_identity();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    send_message(&mut client_end, Message::ClientId(identity.encode())).await;
    let challenge = recv_envelope(&mut client_end).await;
    assert_eq!(challenge.kind, "CHALLENGE");

    send_message(
        &mut client_end,
        Message::ChallengeResponse(ResponsePayload {
            signature: BASE64_STANDARD.encode([0u8; 32]),
            hash: HASH_SHA256.to_owned(),
        }),
    )
    .await;
    let mismatch = recv_envelope(&mut client_end).await;
    assert_eq!(mismatch.kind, "SIGNATURE_MISMATCH");
    assert!(mismatch.text_payload().unwrap().contains("got 32 bytes"));

    let (outcome, _end) = server.await.unwrap();
    match outcome.unwrap() {
        HandshakeOutcome::Rejected { reason, .. } => {
            assert!(reason.contains("got 32 bytes"), "reason was: {reason}");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn signature_from_a_different_key_fails_both_drivers() {
    let (identity, _announced_kp) = make_identity();
    let (_other_identity, other_kp) = make_identity();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    let err = authenticate(
        &mut client_end,
        identity,
        other_kp,
        &HandshakeConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, LinkError::Auth(AuthError::Rejected(_))));

    let (outcome, _end) = server.await.unwrap();
    match outcome.unwrap() {
        HandshakeOutcome::Rejected { reason, .. } => {
            assert_eq!(reason, "signature mismatch");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_identity_rejects_before_any_challenge() {
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    send_message(
        &mut client_end,
        Message::ClientId("WebCrypto-raw.EC.P-384$AAAA".to_owned()),
    )
    .await;
    // The first and only reply is the rejection; no challenge was issued.
    assert_eq!(recv_envelope(&mut client_end).await.kind, "CLIENT_ERROR");

    let (outcome, _end) = server.await.unwrap();
    match outcome.unwrap() {
        HandshakeOutcome::Rejected { client_id, reason } => {
            assert_eq!(client_id.as_deref(), Some("WebCrypto-raw.EC.P-384$AAAA"));
            assert!(reason.contains("failed to parse CLIENT_ID"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Malformed JSON
// ---------------------------------------------------------------------------

#[tokio::test]
async fn garbage_before_the_challenge_aborts_without_a_reply() {
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    client_end.send("this is not json".to_owned()).await.unwrap();

    let (outcome, end) = server.await.unwrap();
    assert!(matches!(
        outcome.unwrap_err(),
        LinkError::Auth(AuthError::InvalidEnvelope(_))
    ));
    // Nothing was written back before the abort.
    drop(end);
    assert_eq!(client_end.recv().await.unwrap(), None);
}

#[tokio::test]
async fn garbage_after_the_challenge_gets_a_server_error_notice() {
    let (identity, _kp) = make_identity();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    send_message(&mut client_end, Message::ClientId(identity.encode())).await;
    assert_eq!(recv_envelope(&mut client_end).await.kind, "CHALLENGE");

    client_end.send("][".to_owned()).await.unwrap();
    let notice = recv_envelope(&mut client_end).await;
    assert_eq!(notice.kind, "SERVER_ERROR");

    let (outcome, _end) = server.await.unwrap();
    assert!(matches!(
        outcome.unwrap_err(),
        LinkError::Auth(AuthError::InvalidEnvelope(_))
    ));
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn server_times_out_a_silent_client() {
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    let notice = recv_envelope(&mut client_end).await;
    assert_eq!(notice.kind, "CLIENT_ERROR");
    assert_eq!(
        notice.text_payload().unwrap(),
        "timed out waiting for CLIENT_ID"
    );

    let (outcome, _end) = server.await.unwrap();
    match outcome.unwrap() {
        HandshakeOutcome::Rejected { client_id, reason } => {
            assert_eq!(client_id, None);
            assert_eq!(reason, "timed out waiting for CLIENT_ID");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn server_timeout_after_the_announcement_names_the_awaited_tag() {
    let (identity, _kp) = make_identity();
    let announced = identity.encode();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    send_message(&mut client_end, Message::ClientId(announced.clone())).await;
    assert_eq!(recv_envelope(&mut client_end).await.kind, "CHALLENGE");
    // Then silence.
    let notice = recv_envelope(&mut client_end).await;
    assert_eq!(notice.kind, "CLIENT_ERROR");

    let (outcome, _end) = server.await.unwrap();
    match outcome.unwrap() {
        HandshakeOutcome::Rejected { client_id, reason } => {
            assert_eq!(client_id.as_deref(), Some(announced.as_str()));
            assert_eq!(reason, "timed out waiting for CHALLENGE_RESPONSE");
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn client_times_out_when_the_server_stays_silent() {
    let (identity, kp) = make_identity();
    let (mut client_end, mut server_end) = pair(8);

    let err = authenticate(&mut client_end, identity, kp, &HandshakeConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::HandshakeTimeout));

    // The client closed its end on the way out.
    assert!(server_end.recv().await.unwrap().is_some());
    assert_eq!(server_end.recv().await.unwrap(), None);
}

// ---------------------------------------------------------------------------
// Early close
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_errors_when_the_server_closes_mid_handshake() {
    let (identity, kp) = make_identity();
    let (mut client_end, mut server_end) = pair(8);

    let peer = tokio::spawn(async move {
        let _announcement = server_end.recv().await.unwrap();
        server_end.close().await.unwrap();
    });

    let err = authenticate(&mut client_end, identity, kp, &HandshakeConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::ConnectionClosed));
    peer.await.unwrap();
}

#[tokio::test]
async fn server_errors_when_the_client_closes_mid_handshake() {
    let (identity, _kp) = make_identity();
    let (mut client_end, server_end) = pair(8);
    let server = spawn_server(server_end, HandshakeConfig::default());

    send_message(&mut client_end, Message::ClientId(identity.encode())).await;
    assert_eq!(recv_envelope(&mut client_end).await.kind, "CHALLENGE");
    client_end.close().await.unwrap();

    let (outcome, _end) = server.await.unwrap();
    assert!(matches!(outcome.unwrap_err(), LinkError::ConnectionClosed));
}

// ---------------------------------------------------------------------------
// Deferred ready
// ---------------------------------------------------------------------------

/// A transport that only comes up after a delay, like a socket that is still
/// connecting when the driver starts.
struct SlowOpen {
    inner: MemoryTransport,
    delay: Duration,
}

#[async_trait]
impl MessageTransport for SlowOpen {
    async fn ready(&mut self) -> io::Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn send(&mut self, text: String) -> io::Result<()> {
        self.inner.send(text).await
    }

    async fn recv(&mut self) -> io::Result<Option<String>> {
        self.inner.recv().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}

#[tokio::test(start_paused = true)]
async fn client_times_out_on_a_transport_that_never_opens() {
    let (identity, kp) = make_identity();
    let (client_end, mut server_end) = pair(8);
    let mut client_end = SlowOpen {
        inner: client_end,
        // Well past the read deadline; the driver must give up first.
        delay: Duration::from_secs(3600),
    };

    let err = authenticate(&mut client_end, identity, kp, &HandshakeConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::HandshakeTimeout));

    // Nothing was ever announced, and the client closed its end on the way out.
    assert_eq!(server_end.recv().await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn announcement_waits_for_the_transport_to_open() {
    let (identity, kp) = make_identity();
    let (client_end, server_end) = pair(8);
    let mut client_end = SlowOpen {
        inner: client_end,
        delay: Duration::from_secs(5),
    };
    let server = spawn_server(server_end, HandshakeConfig::default());

    authenticate(&mut client_end, identity, kp, &HandshakeConfig::default())
        .await
        .unwrap();

    let (outcome, _end) = server.await.unwrap();
    assert!(outcome.unwrap().is_authenticated());
}
