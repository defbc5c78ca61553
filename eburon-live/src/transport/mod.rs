//! Transport seam between the session and the live service.
//!
//! The session talks to a [`Transport`] object, never to a socket. The real
//! implementation is [`ws::WsTransport`]; tests inject scripted ones.

pub mod ws;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::wire::{ClientMessage, ServerMessage};

/// Bidirectional message channel to the live service.
///
/// A transport handed to the session is already established and past its
/// handshake. `next_message` returning `None` means the remote side closed
/// cleanly; `Some(Err(_))` means a transport or protocol fault. The session
/// treats both as the end of the conversation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Serialize and send one message. Callers may share the transport; sends
    /// are serialized internally.
    async fn send(&self, message: ClientMessage) -> Result<()>;

    /// Receive the next server message. Single consumer.
    async fn next_message(&self) -> Option<Result<ServerMessage>>;

    /// Close the channel. Safe to call more than once.
    async fn close(&self);
}
