// Client side of the challenge-response handshake

use std::mem;

use base64::prelude::*;
use serde_json::Value;

use crate::crypto::keys::ChallengeSigner;
use crate::error::{AuthError, Result};
use crate::handshake::Verdict;
use crate::identity::ClientIdentity;
use crate::wire::{Envelope, Message, MessageKind, ResponsePayload, HASH_SHA256};

/// Client handshake states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Identifier announced (or about to be), waiting for the challenge.
    Connecting,
    /// Challenge signed and returned, waiting for the verdict.
    SentResponse,
    /// Terminal success.
    Authenticated,
    /// Terminal failure.
    Failed,
}

impl ClientState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(self) -> &'static str {
        match self {
            ClientState::Connecting => "Connecting",
            ClientState::SentResponse => "SentResponse",
            ClientState::Authenticated => "Authenticated",
            ClientState::Failed => "Failed",
        }
    }
}

/// What the caller must do after feeding an envelope to the client machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Send this message and keep reading.
    Respond(Message),
    /// Handshake complete, the session is authenticated.
    Authenticated,
}

/// Drives the client side of one handshake attempt.
///
/// Signing goes through the injected [`ChallengeSigner`], so the private key
/// can stay in a non-extractable store. Every failure leaves the machine in
/// `Failed` and surfaces as an error; closing the transport is then the
/// caller's job.
#[derive(Debug)]
pub struct ClientHandshake<S> {
    identity: ClientIdentity,
    signer: S,
    state: ClientState,
}

impl<S: ChallengeSigner> ClientHandshake<S> {
    /// New machine in `Connecting`.
    pub fn new(identity: ClientIdentity, signer: S) -> Self {
        Self {
            identity,
            signer,
            state: ClientState::Connecting,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The identity this client announces.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Terminal outcome, `None` while the handshake is in flight.
    pub fn verdict(&self) -> Option<Verdict> {
        match self.state {
            ClientState::Authenticated => Some(Verdict::Authenticated),
            ClientState::Failed => Some(Verdict::Rejected),
            _ => None,
        }
    }

    /// Whether a verdict has been reached.
    pub fn is_terminal(&self) -> bool {
        self.verdict().is_some()
    }

    /// The announcement to send once the transport is open.
    pub fn hello(&self) -> Message {
        Message::ClientId(self.identity.encode())
    }

    /// Feed one inbound envelope.
    pub fn on_envelope(&mut self, envelope: Envelope) -> Result<ClientAction> {
        // The state defaults to Failed here; only the success paths
        // overwrite it.
        let state = mem::replace(&mut self.state, ClientState::Failed);
        match state {
            ClientState::Connecting => self.on_challenge(envelope),
            ClientState::SentResponse => self.on_verdict(envelope),
            terminal => {
                self.state = terminal;
                Err(AuthError::AlreadyTerminal(terminal.label().to_owned()))
            }
        }
    }

    fn on_challenge(&mut self, envelope: Envelope) -> Result<ClientAction> {
        match MessageKind::from_tag(&envelope.kind) {
            Some(MessageKind::Challenge) => {}
            Some(kind) if is_failure_tag(kind) => {
                return Err(AuthError::Rejected(describe_failure(kind, &envelope)));
            }
            _ => {
                return Err(AuthError::UnexpectedMessage {
                    expected: "CHALLENGE".to_owned(),
                    got: envelope.kind,
                });
            }
        }
        let encoded = envelope.text_payload()?;
        // The challenge is opaque: decode and sign exactly these bytes. No
        // length expectation is imposed client-side.
        let challenge =
            BASE64_STANDARD
                .decode(encoded)
                .map_err(|e| AuthError::InvalidPayload {
                    kind: envelope.kind.clone(),
                    detail: format!("challenge is not valid base64: {e}"),
                })?;
        let signature = self.signer.sign(&challenge)?;
        let reply = Message::ChallengeResponse(ResponsePayload {
            signature: BASE64_STANDARD.encode(signature),
            hash: HASH_SHA256.to_owned(),
        });
        self.state = ClientState::SentResponse;
        Ok(ClientAction::Respond(reply))
    }

    fn on_verdict(&mut self, envelope: Envelope) -> Result<ClientAction> {
        match MessageKind::from_tag(&envelope.kind) {
            Some(MessageKind::SignatureMatches) => {
                self.state = ClientState::Authenticated;
                Ok(ClientAction::Authenticated)
            }
            Some(kind) if is_failure_tag(kind) => {
                Err(AuthError::Rejected(describe_failure(kind, &envelope)))
            }
            _ => Err(AuthError::UnexpectedMessage {
                expected: "SIGNATURE_MATCHES".to_owned(),
                got: envelope.kind,
            }),
        }
    }
}

/// Server-reported failure tags. Each one is a rejection in any client state.
fn is_failure_tag(kind: MessageKind) -> bool {
    matches!(
        kind,
        MessageKind::SignatureMismatch
            | MessageKind::UnsupportedHash
            | MessageKind::ClientError
            | MessageKind::ServerError
    )
}

/// Render a server-reported failure as one line of detail.
fn describe_failure(kind: MessageKind, envelope: &Envelope) -> String {
    let detail = match &envelope.data {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(fields)) => {
            let message = fields.get("message").and_then(Value::as_str);
            let error = fields.get("error").and_then(Value::as_str);
            match (message, error) {
                (Some(m), Some(e)) => Some(format!("{m}: {e}")),
                (Some(m), None) => Some(m.to_owned()),
                (None, Some(e)) => Some(e.to_owned()),
                (None, None) => None,
            }
        }
        _ => None,
    };
    match detail {
        Some(detail) => format!("{kind}: {detail}"),
        None => kind.to_string(),
    }
}
