//! Chat session: wires the sequencer, renderer, recorder, audio device,
//! and transport into one cooperative loop.
//!
//! Everything runs on a single `tokio::select!` over three sources: UI
//! commands from stdin, transport events from the server, and a render
//! tick. All state transitions happen inside this loop, so no component
//! needs interior locking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::{self, AudioPlayer};
use crate::avatar::shapes::{MorphTargetSink, SHAPE_CHANNELS};
use crate::avatar::{TickSignal, VisemeRenderer};
use crate::ipc::bridge::{emit_error, emit_event};
use crate::ipc::{UiCommand, UiEvent};
use crate::recording::{CpalCapture, RecordingController, RecordingState};
use crate::reply::sequencer::{PlaybackSequencer, SequencerEvent};
use crate::transport::{ClientMessage, TransportEvent, TransportSession};

/// Render tick period. Frame catch-up in the renderer tolerates jitter,
/// so this only bounds latency, not correctness.
const TICK_PERIOD: Duration = Duration::from_millis(16);

/// Forwards morph target weights to the shell as IPC events.
///
/// Blink weights are deduplicated so the settled eyes-open state does not
/// stream a constant value at tick rate.
#[derive(Default)]
struct IpcMorphSink {
    last_blink: Option<f32>,
}

impl MorphTargetSink for IpcMorphSink {
    fn apply_frame(&mut self, weights: &[f32; SHAPE_CHANNELS]) {
        self.last_blink = None;
        emit_event(&UiEvent::MorphFrame {
            weights: weights.to_vec(),
        });
    }

    fn set_blink(&mut self, weight: f32) {
        if let Some(last) = self.last_blink {
            if (last - weight).abs() < 1e-3 {
                return;
            }
        }
        self.last_blink = Some(weight);
        emit_event(&UiEvent::EyeBlink { weight });
    }

    fn neutral_pose(&mut self) {
        self.last_blink = None;
        emit_event(&UiEvent::NeutralPose {});
    }
}

pub struct ChatSession {
    sequencer: PlaybackSequencer,
    renderer: VisemeRenderer,
    recorder: RecordingController<CpalCapture>,
    /// Absent when no output device could be opened; viseme frames and
    /// text still stream, playable segments are skipped.
    player: Option<AudioPlayer>,
    transport: Option<TransportSession>,
    sink: IpcMorphSink,
}

impl ChatSession {
    pub fn new(transport: TransportSession) -> Self {
        let player = match AudioPlayer::new() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("No audio output device: {e:#}");
                None
            }
        };
        Self {
            sequencer: PlaybackSequencer::new(),
            renderer: VisemeRenderer::new(Instant::now()),
            recorder: RecordingController::new(CpalCapture::new(None)),
            player,
            transport: Some(transport),
            sink: IpcMorphSink::default(),
        }
    }

    /// Drive the session until the shell says stop, stdin closes, or the
    /// server disconnects. Tears down on every exit path.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<UiCommand>,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let mut tick = tokio::time::interval(TICK_PERIOD);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        None => {
                            info!("stdin closed, shutting down");
                            break;
                        }
                        Some(UiCommand::Stop {}) => {
                            info!("Stop command received");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                ev = events.recv() => {
                    match ev {
                        None | Some(TransportEvent::Disconnected { .. }) => {
                            let reason = match ev {
                                Some(TransportEvent::Disconnected { reason }) => reason,
                                _ => "connection task ended".to_string(),
                            };
                            warn!(%reason, "Server connection lost");
                            emit_event(&UiEvent::Disconnected { reason });
                            break;
                        }
                        Some(TransportEvent::Reply(segment)) => {
                            let effects = self.sequencer.on_segment_arrived(segment);
                            debug!(
                                status = ?self.sequencer.status(),
                                next = self.sequencer.next_index(),
                                buffered = self.sequencer.buffered_segments(),
                                waiting = self.sequencer.is_waiting(),
                                "Segment processed"
                            );
                            self.apply(effects);
                        }
                        Some(TransportEvent::ServerError(message)) => {
                            warn!(%message, "Server reported an error");
                            emit_error(&message);
                        }
                    }
                }
                _ = tick.tick() => {
                    if let Some(TickSignal::SegmentFinished) =
                        self.renderer.tick(&mut self.sink, Instant::now())
                    {
                        if let Some(player) = &self.player {
                            player.stop();
                        }
                        let effects = self.sequencer.on_segment_finished();
                        self.apply(effects);
                    }
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, cmd: UiCommand) {
        match cmd {
            UiCommand::ToggleRecording {} => match self.recorder.state() {
                RecordingState::Idle => self.start_recording(),
                RecordingState::Recording => self.stop_recording(),
                // Mid-transition: drop the request rather than queue it.
                _ => {}
            },
            UiCommand::StartRecording {} => self.start_recording(),
            UiCommand::StopRecording {} => self.stop_recording(),
            UiCommand::ResetContext {} => self.reset_context(),
            UiCommand::NewIdea {} => self.send(ClientMessage::NewIdea),
            UiCommand::Replay {} => {
                let effects = self.sequencer.replay_from_start();
                self.apply(effects);
            }
            UiCommand::ListAudioDevices {} => emit_event(&UiEvent::AudioDevices {
                input: audio::capture::list_devices(),
            }),
            UiCommand::Ping {} => emit_event(&UiEvent::Pong {}),
            // Handled by the select loop before we get here.
            UiCommand::Stop {} => {}
        }
    }

    fn start_recording(&mut self) {
        match self.recorder.start() {
            Ok(true) => emit_event(&UiEvent::RecordingStart {}),
            Ok(false) => {}
            Err(e) => emit_error(&format!("Recording failed: {e:#}")),
        }
    }

    /// Stop the recorder and ship the utterance to the server.
    fn stop_recording(&mut self) {
        if self.recorder.state() != RecordingState::Recording {
            return;
        }
        match self.recorder.stop() {
            Ok(Some(wav)) => {
                emit_event(&UiEvent::RecordingStop {});
                self.send(ClientMessage::audio_stream(&wav));
            }
            Ok(None) => emit_event(&UiEvent::RecordingStop {}),
            Err(e) => {
                emit_event(&UiEvent::RecordingStop {});
                emit_error(&format!("Recording failed: {e:#}"));
            }
        }
    }

    /// Clear the conversation on both ends and silence any playback.
    fn reset_context(&mut self) {
        let effects = self.sequencer.reset();
        self.apply(effects);
        emit_event(&UiEvent::ContextReset {});
        self.send(ClientMessage::ResetContext);
    }

    fn send(&mut self, msg: ClientMessage) {
        if let Some(transport) = &self.transport {
            if let Err(e) = transport.send(msg) {
                emit_error(&format!("Send failed: {e:#}"));
            }
        }
    }

    /// Route sequencer effects to the audio device, renderer, and shell.
    fn apply(&mut self, effects: Vec<SequencerEvent>) {
        for effect in effects {
            match effect {
                SequencerEvent::TurnStarted => {
                    // A new turn preempts whatever was playing.
                    if let Some(player) = &self.player {
                        player.stop();
                    }
                    self.renderer.abandon_segment();
                    emit_event(&UiEvent::TurnStarted {});
                }
                SequencerEvent::TextAppended(delta) => {
                    emit_event(&UiEvent::ResponseText { delta });
                }
                SequencerEvent::PlaySegment(snapshot) => self.play_segment(snapshot),
                SequencerEvent::PlaybackAborted => {
                    if let Some(player) = &self.player {
                        player.stop();
                    }
                    self.renderer.clear(&mut self.sink);
                }
                SequencerEvent::TurnExhausted => {
                    info!(
                        chars = self.sequencer.response_text().len(),
                        "Turn finished"
                    );
                    emit_event(&UiEvent::TurnFinished {});
                }
            }
        }
    }

    /// Hand a playable segment to the audio device and start frame-stepping.
    ///
    /// A segment that claims a duration but cannot actually play (missing
    /// audio bytes, decode failure, no device) is abandoned: the renderer
    /// never reports it finished, so the turn parks until a reset or a new
    /// turn rather than presenting frames with no sound.
    fn play_segment(&mut self, snapshot: crate::reply::RenderSnapshot) {
        let snapshot = Arc::new(snapshot);
        let playable = match (&self.player, &snapshot.audio) {
            (Some(player), Some(bytes)) => match player.play_mp3(bytes) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Audio playback failed: {e:#}");
                    false
                }
            },
            (_, None) => {
                warn!("Playable segment arrived without audio bytes");
                false
            }
            (None, _) => false,
        };
        if playable {
            self.renderer.begin_segment(snapshot, Instant::now());
        } else {
            self.renderer.abandon_segment();
        }
    }

    /// Release every resource. Runs on all exits from [`run`].
    fn teardown(&mut self) {
        self.recorder.abort();
        let effects = self.sequencer.reset();
        self.apply(effects);
        if let Some(transport) = self.transport.take() {
            transport.disconnect();
        }
        emit_event(&UiEvent::Stopping {});
        info!("Chat session ended");
    }
}
