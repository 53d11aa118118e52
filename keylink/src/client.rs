//! Client-side handshake driver.
//!
//! Waits for the transport to come up, announces the identity, signs the
//! server's challenge through the injected signer, and resolves once the
//! server confirms. On failure the transport is closed best-effort before the
//! error surfaces; on success it stays open for application traffic.

use tokio::time::timeout;
use tracing::debug;

use keyproof::wire::Envelope;
use keyproof::{ChallengeSigner, ClientAction, ClientHandshake, ClientIdentity};

use crate::error::{LinkError, Result};
use crate::server::HandshakeConfig;
use crate::transport::MessageTransport;

/// Run the client side of one handshake on `transport`.
pub async fn authenticate<T, S>(
    transport: &mut T,
    identity: ClientIdentity,
    signer: S,
    config: &HandshakeConfig,
) -> Result<()>
where
    T: MessageTransport,
    S: ChallengeSigner + Send,
{
    let mut machine = ClientHandshake::new(identity, signer);

    // The open-wait runs under the same deadline as every read; a transport
    // that never comes up is a timeout, not a hang.
    match timeout(config.read_timeout, transport.ready()).await {
        Ok(ready) => ready?,
        Err(_elapsed) => {
            let _ = transport.close().await;
            return Err(LinkError::HandshakeTimeout);
        }
    }
    transport.send(machine.hello().encode()?).await?;
    debug!("announced client identity");

    loop {
        let text = match timeout(config.read_timeout, transport.recv()).await {
            Ok(read) => match read? {
                Some(text) => text,
                // The peer is already gone; there is nothing left to close.
                None => return Err(LinkError::ConnectionClosed),
            },
            Err(_elapsed) => {
                let _ = transport.close().await;
                return Err(LinkError::HandshakeTimeout);
            }
        };

        let envelope = match Envelope::decode(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                let _ = transport.close().await;
                return Err(err.into());
            }
        };

        match machine.on_envelope(envelope) {
            Ok(ClientAction::Respond(message)) => {
                debug!(reply = %message.kind(), "handshake step");
                transport.send(message.encode()?).await?;
            }
            Ok(ClientAction::Authenticated) => {
                debug!("handshake authenticated");
                return Ok(());
            }
            Err(err) => {
                let _ = transport.close().await;
                return Err(err.into());
            }
        }
    }
}
