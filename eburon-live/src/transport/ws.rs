//! Websocket transport for the live service.
//!
//! Messages are JSON either way; the service replies in text or binary
//! frames, so both are parsed. Connecting performs the session handshake:
//! the setup envelope goes out first and the connection is not returned
//! until the service acknowledges it.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{LiveError, Result};
use crate::session::wire::{ClientMessage, ServerMessage, Setup};
use crate::transport::Transport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live websocket connection, handshake already completed.
pub struct WsTransport {
    writer: Mutex<SplitSink<WsStream, Message>>,
    reader: Mutex<SplitStream<WsStream>>,
}

impl WsTransport {
    /// Dial `endpoint`, authenticate with `api_key` and run the setup
    /// handshake. Returns only once the service has acknowledged the setup.
    pub async fn connect(endpoint: &str, api_key: &str, setup: Setup) -> Result<Self> {
        // The key rides in the query string; keep it out of the logs.
        let url = format!("{endpoint}?key={api_key}");
        info!(endpoint, "connecting to live service");

        let (stream, _response) = connect_async(&url)
            .await
            .map_err(|e| LiveError::Transport(format!("websocket connect failed: {e}")))?;
        let (mut writer, mut reader) = stream.split();

        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| LiveError::Transport(format!("setup encode failed: {e}")))?;
        writer
            .send(Message::Text(setup_json))
            .await
            .map_err(|e| LiveError::Handshake(format!("setup send failed: {e}")))?;

        loop {
            match reader.next().await {
                None | Some(Ok(Message::Close(_))) => {
                    return Err(LiveError::Handshake(
                        "connection closed before setup was acknowledged".to_string(),
                    ));
                }
                Some(Ok(Message::Text(raw))) => {
                    if parse_payload(raw.as_bytes())?.setup_complete.is_some() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(raw))) => {
                    if parse_payload(&raw)?.setup_complete.is_some() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(LiveError::Handshake(format!(
                        "transport fault during setup: {e}"
                    )));
                }
            }
        }
        debug!("setup acknowledged");

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, message: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&message)
            .map_err(|e| LiveError::Transport(format!("message encode failed: {e}")))?;
        let mut writer = self.writer.lock().await;
        writer
            .send(Message::Text(json))
            .await
            .map_err(|e| LiveError::Transport(format!("send failed: {e}")))
    }

    async fn next_message(&self) -> Option<Result<ServerMessage>> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                None | Some(Ok(Message::Close(_))) => return None,
                Some(Ok(Message::Text(raw))) => return Some(parse_payload(raw.as_bytes())),
                Some(Ok(Message::Binary(raw))) => return Some(parse_payload(&raw)),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Some(Err(LiveError::Transport(format!("receive failed: {e}"))))
                }
            }
        }
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            warn!("websocket close failed: {e}");
        }
    }
}

fn parse_payload(raw: &[u8]) -> Result<ServerMessage> {
    serde_json::from_slice(raw)
        .map_err(|e| LiveError::Protocol(format!("unparseable server message: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_parse_from_raw_bytes() {
        let msg = parse_payload(br#"{"setupComplete": {}}"#).expect("parse");
        assert!(msg.setup_complete.is_some());
    }

    #[test]
    fn malformed_payloads_are_protocol_errors() {
        let err = parse_payload(b"not json at all");
        assert!(matches!(err, Err(LiveError::Protocol(_))));
    }

    #[test]
    fn unknown_payloads_parse_to_an_ignorable_shell() {
        let msg = parse_payload(br#"{"goAway": {"timeLeft": "10s"}}"#).expect("parse");
        assert!(msg.setup_complete.is_none());
        assert!(msg.server_content.is_none());
    }
}
