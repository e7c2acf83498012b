//! Speech capture sessions for Murmur.
//!
//! A session owns the microphone for the duration of one push-to-talk
//! gesture: it segments incoming audio into utterances, transcribes each
//! finished utterance through the [`Transcriber`] seam, and surfaces
//! results as [`TranscriptEvent`]s on an async channel. The orchestrator's
//! state machine drives the session through [`SessionController::stop`]
//! rather than reacting to engine callbacks.

pub mod session;
pub mod types;

pub use session::{
    CaptureSession, FrameSource, SessionController, SessionHandle, SourceFactory,
};
pub use types::{CaptureConfig, CaptureError, TranscriptEvent};

use async_trait::async_trait;

/// Converts one WAV-encoded utterance to text.
///
/// The production implementation calls the remote speech-to-text endpoint;
/// tests substitute a canned one.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, CaptureError>;
}
