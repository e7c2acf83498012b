//! The page controller: binds gestures to capture sessions, feeds
//! finalized transcripts through the transport client, and owns the
//! conversation.
//!
//! All mutation happens in [`Orchestrator::handle_event`] and the gesture
//! methods, which the TUI loop calls from a single task. Spawned work (the
//! capture-event forwarder, the processing cycle) only reports back over
//! the event channel, so no state is mutated off the orchestrator's turn.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use murmur_client::{ClientError, Turn, VoiceApi};
use murmur_foundation::{AppState, StateManager};
use murmur_stt::{CaptureError, SessionController, SessionHandle, Transcriber, TranscriptEvent};

use crate::conversation::Conversation;
use murmur_audio::PlaybackThread;

/// The fixed apology appended whenever the generate/synthesize chain
/// fails.
pub const FALLBACK_REPLY: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

const CAPTURE_UNAVAILABLE_NOTICE: &str =
    "Speech capture is not available on this system. Press 'i' to type instead.";

/// Events the TUI select loop feeds back into the orchestrator.
#[derive(Debug)]
pub enum AppEvent {
    /// Forwarded from the active capture session.
    Capture(TranscriptEvent),
    /// The capture session's event stream has drained.
    CaptureClosed,
    /// A processing cycle finished.
    Cycle(CycleEvent),
}

/// Outcome of one generate→synthesize round-trip.
#[derive(Debug)]
pub struct CycleEvent {
    pub reply: String,
    pub audio: Option<Vec<u8>>,
}

/// Starts a capture session for one gesture. Production launchers wrap
/// [`murmur_stt::CaptureSession::start`]; tests inject their own.
pub type SessionLauncher = Box<dyn FnMut() -> Result<SessionHandle, CaptureError> + Send>;

/// Bridges the transport client into the capture session's transcriber
/// seam. A transcription failure mid-session is an engine error, not a
/// conversation-level one.
pub struct RemoteTranscriber {
    api: Arc<dyn VoiceApi>,
}

impl RemoteTranscriber {
    pub fn new(api: Arc<dyn VoiceApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, CaptureError> {
        self.api
            .transcribe(wav)
            .await
            .map_err(|e: ClientError| CaptureError::Transcription(e.to_string()))
    }
}

pub struct Orchestrator {
    state: StateManager,
    conversation: Conversation,
    /// Accumulated final segments for the active gesture.
    live_transcript: String,
    /// Latest non-final segment; displayed, never accumulated.
    interim_transcript: String,
    /// Gesture-up arrived; submit once the session drains.
    pending_submit: bool,
    session: Option<SessionController>,
    launcher: SessionLauncher,
    api: Arc<dyn VoiceApi>,
    playback: Option<PlaybackThread>,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    notice: Option<String>,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn VoiceApi>,
        launcher: SessionLauncher,
        playback: Option<PlaybackThread>,
        events_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            state: StateManager::new(),
            conversation: Conversation::new(),
            live_transcript: String::new(),
            interim_transcript: String::new(),
            pending_submit: false,
            session: None,
            launcher,
            api,
            playback,
            events_tx,
            notice: None,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.current()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// What the recording bubble shows: accumulated finals plus the
    /// current interim segment, if any.
    pub fn live_transcript(&self) -> String {
        if self.interim_transcript.is_empty() {
            self.live_transcript.clone()
        } else if self.live_transcript.is_empty() {
            self.interim_transcript.clone()
        } else {
            format!("{} {}", self.live_transcript, self.interim_transcript)
        }
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Gesture-down: start a capture session. Ignored unless idle, so a
    /// gesture during `Processing` can never start a second session.
    pub fn gesture_down(&mut self) {
        if self.state.current() != AppState::Idle {
            return;
        }
        self.notice = None;

        match (self.launcher)() {
            Ok(handle) => {
                let (controller, mut events) = handle.split();
                self.session = Some(controller);
                self.live_transcript.clear();
                self.interim_transcript.clear();
                self.pending_submit = false;

                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if tx.send(AppEvent::Capture(event)).is_err() {
                            return;
                        }
                    }
                    let _ = tx.send(AppEvent::CaptureClosed);
                });

                let _ = self.state.transition(AppState::Recording);
            }
            Err(CaptureError::Unavailable(e)) => {
                tracing::warn!("Cannot start capture: {}", e);
                self.notice = Some(CAPTURE_UNAVAILABLE_NOTICE.to_string());
            }
            Err(e) => {
                tracing::warn!("Failed to start recording: {}", e);
                self.notice = Some("Could not start recording. Please try again.".to_string());
            }
        }
    }

    /// Gesture-up: stop the session. The transcript is submitted once the
    /// session's event stream drains (the stop flush may still be
    /// transcribing).
    pub fn gesture_up(&mut self) {
        if self.state.current() != AppState::Recording {
            return;
        }
        if let Some(session) = &self.session {
            self.pending_submit = true;
            session.stop();
        }
    }

    /// Typed fallback: a submitted line enters the pipeline exactly where
    /// a finalized transcript would. Ignored while a cycle is in flight.
    pub fn submit_text(&mut self, text: &str) {
        if self.state.current() != AppState::Idle {
            return;
        }
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let _ = self.state.transition(AppState::Processing);
        self.begin_cycle(text.to_string());
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Capture(TranscriptEvent::Segment { is_final, text }) => {
                if is_final {
                    if !self.live_transcript.is_empty() {
                        self.live_transcript.push(' ');
                    }
                    self.live_transcript.push_str(text.trim());
                    self.interim_transcript.clear();
                } else {
                    self.interim_transcript = text;
                }
            }
            AppEvent::Capture(TranscriptEvent::Error { message }) => {
                // Engine error: this gesture produces no utterance.
                tracing::warn!("Capture engine error: {}", message);
                self.live_transcript.clear();
                self.interim_transcript.clear();
                self.pending_submit = false;
            }
            AppEvent::CaptureClosed => {
                self.session = None;
                if self.state.current() != AppState::Recording {
                    return;
                }
                let text = std::mem::take(&mut self.live_transcript);
                self.interim_transcript.clear();
                let submit = self.pending_submit;
                self.pending_submit = false;

                let text = text.trim().to_string();
                if submit && !text.is_empty() {
                    let _ = self.state.transition(AppState::Processing);
                    self.begin_cycle(text);
                } else {
                    let _ = self.state.transition(AppState::Idle);
                }
            }
            AppEvent::Cycle(CycleEvent { reply, audio }) => {
                self.conversation.push(Turn::assistant(reply));
                if let (Some(playback), Some(clip)) = (&self.playback, audio) {
                    playback.play(clip);
                }
                let _ = self.state.transition(AppState::Idle);
            }
        }
    }

    /// Append the user turn and run generate→synthesize off-loop. The
    /// history snapshot excludes the new message; the endpoint receives it
    /// separately.
    fn begin_cycle(&mut self, text: String) {
        let history = self.conversation.turns().to_vec();
        self.conversation.push(Turn::user(text.clone()));

        let api = self.api.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = run_exchange(api.as_ref(), &text, &history).await;
            let _ = tx.send(AppEvent::Cycle(outcome));
        });
    }

    /// Stop whatever is active on the way out.
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
        if let Some(playback) = self.playback.take() {
            playback.stop();
        }
    }
}

/// One generate→synthesize round-trip. Any failure in the chain collapses
/// to the fallback reply with no audio; the caller appends exactly one
/// assistant turn either way.
pub async fn run_exchange(api: &dyn VoiceApi, message: &str, history: &[Turn]) -> CycleEvent {
    match api.generate_reply(message, history).await {
        Ok(reply) => match api.synthesize_speech(&reply).await {
            Ok(audio) => CycleEvent {
                reply,
                audio: Some(audio),
            },
            Err(e) => {
                tracing::warn!("Speech synthesis failed: {}", e);
                CycleEvent {
                    reply: FALLBACK_REPLY.to_string(),
                    audio: None,
                }
            }
        },
        Err(e) => {
            tracing::warn!("Reply generation failed: {}", e);
            CycleEvent {
                reply: FALLBACK_REPLY.to_string(),
                audio: None,
            }
        }
    }
}
