//! IPC protocol types for communication with the UI shell.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> shell).
//! Commands use `{"command": "<name>", ...}` format (shell -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Events: core -> shell (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the shell via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    Starting {},
    Loading { step: String },
    /// The avatar's `.glb` is on disk; the shell can load the mesh.
    /// `channels` names the morph target for each weight index in
    /// `morph_frame` events.
    ModelReady { path: String, channels: Vec<String> },
    Connected {},
    Disconnected { reason: String },
    ConnectError { message: String },
    /// The server rejected our token; the shell should return to login.
    AuthExpired {},
    /// A new reply turn began; any displayed transcript is stale.
    TurnStarted {},
    /// The conversation was reset at the user's request; the shell should
    /// clear the transcript and return the avatar to rest.
    ContextReset {},
    /// Next chunk of the assistant's reply text, in reading order.
    ResponseText { delta: String },
    RecordingStart {},
    RecordingStop {},
    /// The current reply turn has fully played out.
    TurnFinished {},
    /// One viseme frame of morph target weights, in channel order.
    MorphFrame { weights: Vec<f32> },
    /// Idle-blink eyelid weight for both eyes.
    EyeBlink { weight: f32 },
    /// Zero all morph target influences.
    NeutralPose {},
    /// Input device names, in enumeration order.
    AudioDevices { input: Vec<String> },
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: shell -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the shell via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum UiCommand {
    /// Start recording if idle, stop and send if recording.
    ToggleRecording {},
    StartRecording {},
    StopRecording {},
    /// Clear the conversation on both ends.
    ResetContext {},
    /// Ask the avatar to volunteer a new topic.
    NewIdea {},
    /// Replay the buffered turn from segment 0.
    Replay {},
    ListAudioDevices {},
    Ping {},
    Stop {},
}
