//! Server transport: wire message types and the WebSocket session.
//!
//! Every frame is a JSON object tagged by `type`. Inbound traffic is the
//! reply segment stream plus server-reported errors; outbound traffic is
//! recorded audio and the two context commands.

pub mod session;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::avatar::shapes::VisemeFrame;
use crate::reply::ReplySegment;

pub use session::{connect, TransportSession};

/// Messages the server sends us.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// One segment of a streamed assistant reply.
    #[serde(rename_all = "camelCase")]
    AiReplyStream {
        index: usize,
        send_count: u32,
        /// Base64-encoded MP3, absent for terminal segments.
        #[serde(default)]
        audio: Option<String>,
        /// Viseme frames, one weight list per 60 Hz frame.
        #[serde(default)]
        shapes: Option<Vec<Vec<f32>>>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        audio_duration: f64,
    },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

/// Messages we send to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// A complete recorded utterance, base64-encoded WAV.
    #[serde(rename_all = "camelCase")]
    AudioStream { audio: String },
    /// Drop the conversation context server-side.
    ResetContext,
    /// Ask the avatar to volunteer a new topic.
    NewIdea,
}

impl ClientMessage {
    pub fn audio_stream(wav_bytes: &[u8]) -> Self {
        Self::AudioStream {
            audio: BASE64.encode(wav_bytes),
        }
    }
}

/// Connection-level events surfaced to the session loop.
#[derive(Debug)]
pub enum TransportEvent {
    Reply(ReplySegment),
    ServerError(String),
    Disconnected { reason: String },
}

/// Convert a wire segment into the domain form the sequencer consumes.
///
/// Undecodable audio is treated as absent rather than failing the whole
/// segment; the playback path already handles missing audio.
pub fn decode_segment(
    index: usize,
    send_count: u32,
    audio: Option<String>,
    shapes: Option<Vec<Vec<f32>>>,
    message: Option<String>,
    audio_duration: f64,
) -> ReplySegment {
    let audio: Option<Arc<[u8]>> = audio
        .as_deref()
        .and_then(|b64| BASE64.decode(b64).ok())
        .map(Arc::from);
    let shapes: Arc<[VisemeFrame]> = shapes
        .unwrap_or_default()
        .iter()
        .map(|frame| VisemeFrame::from_wire(frame))
        .collect();
    ReplySegment {
        index,
        send_count,
        audio,
        shapes,
        text: message.unwrap_or_default(),
        audio_duration,
    }
}

/// Whether a connect failure is the server rejecting our token.
pub fn is_auth_rejection(message: &str) -> bool {
    message.to_ascii_lowercase().contains("invalid token")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_stream_parses() {
        let json = r#"{
            "type": "aiReplyStream",
            "index": 2,
            "sendCount": 4,
            "audio": "AAEC",
            "shapes": [[0.5, 0.25]],
            "message": "hello",
            "audioDuration": 1.75
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let ServerMessage::AiReplyStream {
            index,
            send_count,
            audio,
            shapes,
            message,
            audio_duration,
        } = msg
        else {
            panic!("wrong variant");
        };
        assert_eq!(index, 2);
        assert_eq!(send_count, 4);
        assert_eq!(audio_duration, 1.75);

        let seg = decode_segment(index, send_count, audio, shapes, message, audio_duration);
        assert_eq!(seg.audio.as_deref(), Some(&[0u8, 1, 2][..]));
        assert_eq!(seg.shapes.len(), 1);
        assert_eq!(seg.shapes[0].0[0], 0.5);
        assert_eq!(seg.text, "hello");
    }

    #[test]
    fn test_terminal_segment_parses_without_audio() {
        let json = r#"{"type":"aiReplyStream","index":3,"sendCount":4}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        let ServerMessage::AiReplyStream {
            audio,
            audio_duration,
            ..
        } = msg
        else {
            panic!("wrong variant");
        };
        assert!(audio.is_none());
        assert_eq!(audio_duration, 0.0);
    }

    #[test]
    fn test_server_error_parses() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert!(matches!(msg, ServerMessage::Error { message } if message == "boom"));
    }

    #[test]
    fn test_client_messages_serialize_tagged() {
        let json = serde_json::to_string(&ClientMessage::audio_stream(&[1, 2, 3])).unwrap();
        assert!(json.contains(r#""type":"audioStream""#));
        assert!(json.contains(r#""audio":"AQID""#));

        assert_eq!(
            serde_json::to_string(&ClientMessage::ResetContext).unwrap(),
            r#"{"type":"resetContext"}"#
        );
        assert_eq!(
            serde_json::to_string(&ClientMessage::NewIdea).unwrap(),
            r#"{"type":"newIdea"}"#
        );
    }

    #[test]
    fn test_bad_base64_audio_becomes_absent() {
        let seg = decode_segment(0, 1, Some("!!!".into()), None, None, 2.0);
        assert!(seg.audio.is_none());
        assert!(seg.shapes.is_empty());
    }

    #[test]
    fn test_auth_rejection_detection() {
        assert!(is_auth_rejection("Invalid Token"));
        assert!(is_auth_rejection("handshake failed: invalid token supplied"));
        assert!(!is_auth_rejection("connection refused"));
    }
}
