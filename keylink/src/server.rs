//! Server-side handshake driver.
//!
//! Pumps one authentication attempt over a [`MessageTransport`], imposing a
//! read deadline on each inbound message. Protocol rejections resolve to
//! `Ok(HandshakeOutcome::Rejected)`; only transport faults and local failures
//! surface as errors. The transport is left open either way, because the
//! connection belongs to the caller.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use keyproof::wire::{Envelope, Message, MessageKind};
use keyproof::{ServerHandshake, Verdict};

use crate::error::{LinkError, Result};
use crate::transport::MessageTransport;

/// Tunables for one handshake attempt.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Deadline for each inbound message. A silent peer counts as rejected.
    pub read_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// What a finished server-side handshake produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The peer proved possession of the key it announced.
    Authenticated {
        /// The raw identifier string the peer announced.
        client_id: String,
    },
    /// The attempt failed and the connection should not carry traffic.
    Rejected {
        /// The identifier the peer announced, when one arrived at all.
        client_id: Option<String>,
        /// One line explaining the rejection.
        reason: String,
    },
}

impl HandshakeOutcome {
    /// Whether the peer authenticated.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, HandshakeOutcome::Authenticated { .. })
    }

    /// The announced identifier, if one arrived.
    pub fn client_id(&self) -> Option<&str> {
        match self {
            HandshakeOutcome::Authenticated { client_id } => Some(client_id),
            HandshakeOutcome::Rejected { client_id, .. } => client_id.as_deref(),
        }
    }
}

/// Run the server side of one handshake on `transport`.
pub async fn handshake<T>(transport: &mut T, config: &HandshakeConfig) -> Result<HandshakeOutcome>
where
    T: MessageTransport,
{
    let mut machine = ServerHandshake::new();
    let mut reason = String::new();

    while !machine.is_terminal() {
        let text = match timeout(config.read_timeout, transport.recv()).await {
            Ok(read) => match read? {
                Some(text) => text,
                None => return Err(LinkError::ConnectionClosed),
            },
            Err(_elapsed) => return reject_for_timeout(transport, &machine).await,
        };

        let envelope = match Envelope::decode(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                // A read that is not JSON at all aborts silently before the
                // challenge goes out; afterwards the peer gets a best-effort
                // SERVER_ERROR first.
                if machine.awaiting() == Some(MessageKind::ChallengeResponse) {
                    let notice =
                        Message::server_error("failed to read CHALLENGE_RESPONSE", err.to_string());
                    send_best_effort(transport, &notice).await;
                }
                return Err(err.into());
            }
        };

        // Local faults (entropy exhaustion) error out with nothing written to
        // the wire; every peer-attributable violation produces a reply.
        let reply = machine.on_envelope(envelope)?;
        debug!(reply = %reply.kind(), state = machine.state().label(), "handshake step");
        if machine.verdict() == Some(Verdict::Rejected) {
            reason = rejection_reason(&reply);
        }
        transport.send(reply.encode()?).await?;
    }

    match machine.authenticated_client_id() {
        Some(client_id) => {
            debug!(client_id, "handshake authenticated");
            Ok(HandshakeOutcome::Authenticated {
                client_id: client_id.to_owned(),
            })
        }
        None => {
            let client_id = machine.client_id().map(str::to_owned);
            warn!(
                client_id = client_id.as_deref().unwrap_or("<unannounced>"),
                %reason,
                "handshake rejected"
            );
            Ok(HandshakeOutcome::Rejected { client_id, reason })
        }
    }
}

async fn reject_for_timeout<T>(
    transport: &mut T,
    machine: &ServerHandshake,
) -> Result<HandshakeOutcome>
where
    T: MessageTransport,
{
    let reason = match machine.awaiting() {
        Some(kind) => format!("timed out waiting for {kind}"),
        None => "timed out".to_owned(),
    };
    send_best_effort(transport, &Message::client_error(reason.clone())).await;
    warn!(%reason, "handshake rejected");
    Ok(HandshakeOutcome::Rejected {
        client_id: machine.client_id().map(str::to_owned),
        reason,
    })
}

/// The peer may already be gone when we try to tell it why it failed.
async fn send_best_effort<T>(transport: &mut T, message: &Message)
where
    T: MessageTransport,
{
    if let Ok(text) = message.encode() {
        let _ = transport.send(text).await;
    }
}

fn rejection_reason(reply: &Message) -> String {
    match reply {
        Message::ClientError {
            message,
            error: Some(error),
        } => format!("{message}: {error}"),
        Message::ClientError {
            message,
            error: None,
        } => message.clone(),
        Message::UnsupportedHash(detail) => detail.clone(),
        Message::SignatureMismatch(Some(detail)) => detail.clone(),
        Message::SignatureMismatch(None) => "signature mismatch".to_owned(),
        other => other.kind().to_string(),
    }
}
