// Server side of the challenge-response handshake

use std::mem;

use base64::prelude::*;

use crate::crypto::challenge::Challenge;
use crate::crypto::verify::{verify_signature, SIGNATURE_LEN};
use crate::error::{AuthError, Result};
use crate::handshake::Verdict;
use crate::identity::ClientIdentity;
use crate::wire::{Envelope, Message, MessageKind, ResponsePayload, HASH_SHA256};

/// Server handshake states. One machine instance serves exactly one attempt
/// on one connection; no state is re-enterable.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerState {
    /// Waiting for the CLIENT_ID announcement.
    AwaitClientId,

    /// Challenge issued, waiting for the signed response.
    AwaitChallengeResponse {
        /// The key the client claims to control.
        identity: ClientIdentity,
        /// The outstanding single-use challenge.
        challenge: Challenge,
    },

    /// Terminal success: the client proved possession of its key.
    Authenticated,

    /// Terminal failure.
    Rejected,
}

impl ServerState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            ServerState::AwaitClientId => "AwaitClientId",
            ServerState::AwaitChallengeResponse { .. } => "AwaitChallengeResponse",
            ServerState::Authenticated => "Authenticated",
            ServerState::Rejected => "Rejected",
        }
    }
}

/// Drives the server side of one handshake attempt.
///
/// Each accepted input envelope yields exactly one reply message; transport
/// reads and writes belong to the caller. Peer-attributable violations come
/// back as replies with the machine landing in `Rejected`; local faults
/// (entropy exhaustion) come back as errors with no reply, because they must
/// never reach the wire.
#[derive(Debug)]
pub struct ServerHandshake {
    state: ServerState,
    client_id: Option<String>,
}

impl ServerHandshake {
    /// New machine in `AwaitClientId`.
    pub fn new() -> Self {
        Self {
            state: ServerState::AwaitClientId,
            client_id: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Raw identifier string as announced by the client. Recorded as soon as
    /// it arrives, so a rejected handshake still reports what the peer
    /// claimed to be.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Tag the machine is waiting for, `None` once terminal.
    pub fn awaiting(&self) -> Option<MessageKind> {
        match self.state {
            ServerState::AwaitClientId => Some(MessageKind::ClientId),
            ServerState::AwaitChallengeResponse { .. } => Some(MessageKind::ChallengeResponse),
            ServerState::Authenticated | ServerState::Rejected => None,
        }
    }

    /// Terminal outcome, `None` while the handshake is in flight.
    pub fn verdict(&self) -> Option<Verdict> {
        match self.state {
            ServerState::Authenticated => Some(Verdict::Authenticated),
            ServerState::Rejected => Some(Verdict::Rejected),
            _ => None,
        }
    }

    /// Whether a verdict has been reached.
    pub fn is_terminal(&self) -> bool {
        self.verdict().is_some()
    }

    /// The announced identifier, only once the handshake has succeeded.
    pub fn authenticated_client_id(&self) -> Option<&str> {
        match self.state {
            ServerState::Authenticated => self.client_id.as_deref(),
            _ => None,
        }
    }

    /// Feed one inbound envelope, producing the reply to send.
    pub fn on_envelope(&mut self, envelope: Envelope) -> Result<Message> {
        // The state defaults to Rejected here; only the two success paths
        // overwrite it.
        let state = mem::replace(&mut self.state, ServerState::Rejected);
        match state {
            ServerState::AwaitClientId => self.on_client_id(envelope),
            ServerState::AwaitChallengeResponse {
                identity,
                challenge,
            } => Ok(self.on_challenge_response(envelope, &identity, &challenge)),
            terminal => {
                let label = terminal.label();
                self.state = terminal;
                Err(AuthError::AlreadyTerminal(label.to_owned()))
            }
        }
    }

    fn on_client_id(&mut self, envelope: Envelope) -> Result<Message> {
        // Tag check precedes payload parsing.
        if MessageKind::from_tag(&envelope.kind) != Some(MessageKind::ClientId) {
            return Ok(Message::client_error(format!(
                "expected a CLIENT_ID message, got {}",
                envelope.kind
            )));
        }
        let raw_id = match envelope.text_payload() {
            Ok(id) => id.to_owned(),
            Err(err) => {
                return Ok(Message::client_error_detailed(
                    "failed to parse CLIENT_ID",
                    err.to_string(),
                ));
            }
        };
        self.client_id = Some(raw_id.clone());
        let identity = match ClientIdentity::decode(&raw_id) {
            Ok(identity) => identity,
            Err(err) => {
                return Ok(Message::client_error_detailed(
                    "failed to parse CLIENT_ID",
                    err.to_string(),
                ));
            }
        };
        let challenge = Challenge::generate()?;
        let reply = Message::Challenge(challenge.to_base64());
        self.state = ServerState::AwaitChallengeResponse {
            identity,
            challenge,
        };
        Ok(reply)
    }

    fn on_challenge_response(
        &mut self,
        envelope: Envelope,
        identity: &ClientIdentity,
        challenge: &Challenge,
    ) -> Message {
        if MessageKind::from_tag(&envelope.kind) != Some(MessageKind::ChallengeResponse) {
            return Message::client_error(format!(
                "expected a CHALLENGE_RESPONSE message, got {}",
                envelope.kind
            ));
        }
        let payload: ResponsePayload = match envelope.typed_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return Message::client_error_detailed(
                    "failed to parse CHALLENGE_RESPONSE",
                    err.to_string(),
                );
            }
        };
        if payload.hash != HASH_SHA256 {
            return Message::UnsupportedHash(format!(
                "got hash algorithm {:?}, the only supported hash is {HASH_SHA256}",
                payload.hash
            ));
        }
        let signature = match BASE64_STANDARD.decode(&payload.signature) {
            Ok(bytes) => bytes,
            Err(err) => {
                return Message::client_error_detailed(
                    "failed to parse CHALLENGE_RESPONSE",
                    format!("signature is not valid base64: {err}"),
                );
            }
        };
        if signature.len() != SIGNATURE_LEN {
            return Message::SignatureMismatch(Some(format!(
                "expected a {SIGNATURE_LEN} byte signature, got {} bytes",
                signature.len()
            )));
        }
        let mut sig = [0u8; SIGNATURE_LEN];
        sig.copy_from_slice(&signature);
        match verify_signature(identity.verifying_key(), &challenge.digest(), &sig) {
            Ok(()) => {
                self.state = ServerState::Authenticated;
                Message::SignatureMatches
            }
            Err(_) => Message::SignatureMismatch(None),
        }
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}
