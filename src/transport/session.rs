//! WebSocket session to the chat server.
//!
//! One reader task and one writer task per connection. The reader parses
//! inbound frames into [`TransportEvent`]s; the writer drains a channel of
//! [`ClientMessage`]s and sends a close frame when the channel is dropped.

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};

use crate::config::{Settings, UserSession};
use crate::transport::{decode_segment, ClientMessage, ServerMessage, TransportEvent};

/// Handle to a live connection. Dropping it (or calling
/// [`TransportSession::disconnect`]) tears both tasks down.
pub struct TransportSession {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TransportSession {
    /// Queue a message for sending. Fails once the connection is gone.
    pub fn send(&self, msg: ClientMessage) -> anyhow::Result<()> {
        self.outbound
            .send(msg)
            .map_err(|_| anyhow::anyhow!("Connection closed"))
    }

    /// Close the connection and stop both tasks.
    pub fn disconnect(self) {
        // Closing the channel lets the writer flush a close frame.
        drop(self.outbound);
        self.reader.abort();
        let _ = self.writer;
        info!("Disconnected from server");
    }
}

/// Derive the WebSocket endpoint from the configured HTTP server address.
fn ws_url(server_url: &str, avatar_id: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{base}")
    };
    format!("{base}/ws?avatarId={avatar_id}")
}

fn build_request(url: &str, token: &str) -> anyhow::Result<http::Request<()>> {
    let uri: http::Uri = url.parse().context("Invalid server address")?;
    let host = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .ok_or_else(|| anyhow::anyhow!("Server address has no host"))?;
    http::Request::builder()
        .uri(uri)
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header(
            "Sec-WebSocket-Key",
            tungstenite::handshake::client::generate_key(),
        )
        .header("Authorization", format!("Bearer {token}"))
        .body(())
        .context("Failed to build connect request")
}

/// Connect to the chat server for one avatar. Returns the session handle
/// and the event stream the caller selects on.
pub async fn connect(
    settings: &Settings,
    session: &UserSession,
    avatar_id: &str,
) -> anyhow::Result<(TransportSession, mpsc::UnboundedReceiver<TransportEvent>)> {
    let url = ws_url(&settings.server_url, avatar_id);
    info!(%url, "Connecting to server");

    let request = build_request(&url, &session.token)?;
    let (ws, _) = tokio::time::timeout(
        Duration::from_secs(settings.api_timeout),
        connect_async(request),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Connect timed out after {}s", settings.api_timeout))?
    .context("WebSocket connect failed")?;

    let (mut write, mut read) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize outbound message: {e}");
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(json.into())).await {
                warn!("Send failed: {e}");
                break;
            }
        }
        let _ = write.send(Message::Close(None)).await;
    });

    let reader = tokio::spawn(async move {
        let reason = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                    Ok(msg) => {
                        if event_tx.send(to_event(msg)).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Unparseable server frame: {e}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "server closed".to_string());
                }
                Some(Ok(_)) => {} // ping/pong/binary, nothing to do
                Some(Err(e)) => break e.to_string(),
                None => break "connection lost".to_string(),
            }
        };
        debug!(%reason, "Reader finished");
        let _ = event_tx.send(TransportEvent::Disconnected { reason });
    });

    info!("Connected");
    Ok((
        TransportSession {
            outbound: outbound_tx,
            reader,
            writer,
        },
        event_rx,
    ))
}

fn to_event(msg: ServerMessage) -> TransportEvent {
    match msg {
        ServerMessage::AiReplyStream {
            index,
            send_count,
            audio,
            shapes,
            message,
            audio_duration,
        } => TransportEvent::Reply(decode_segment(
            index,
            send_count,
            audio,
            shapes,
            message,
            audio_duration,
        )),
        ServerMessage::Error { message } => TransportEvent::ServerError(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_schemes() {
        assert_eq!(
            ws_url("http://10.0.0.5:3000", "a1"),
            "ws://10.0.0.5:3000/ws?avatarId=a1"
        );
        assert_eq!(
            ws_url("https://chat.example.com/", "a2"),
            "wss://chat.example.com/ws?avatarId=a2"
        );
        // Scheme-less addresses fall back to plain ws.
        assert_eq!(ws_url("localhost:3000", "a3"), "ws://localhost:3000/ws?avatarId=a3");
    }

    #[test]
    fn test_build_request_carries_auth() {
        let req = build_request("ws://localhost:3000/ws?avatarId=x", "tok123").unwrap();
        assert_eq!(
            req.headers().get("Authorization").unwrap(),
            "Bearer tok123"
        );
        assert_eq!(req.headers().get("Host").unwrap(), "localhost:3000");
    }

    #[test]
    fn test_reply_frame_becomes_event() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"aiReplyStream","index":0,"sendCount":1,"message":"hi","audioDuration":0.5}"#,
        )
        .unwrap();
        match to_event(msg) {
            TransportEvent::Reply(seg) => {
                assert_eq!(seg.index, 0);
                assert_eq!(seg.send_count, 1);
                assert_eq!(seg.text, "hi");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
