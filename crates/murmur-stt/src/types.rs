//! Core types for speech capture

use murmur_foundation::AudioError;
use thiserror::Error;

/// One recognized piece of speech.
///
/// Final segments are accumulated by the caller into the running
/// transcript; non-final segments are display-only. Batch transcription
/// produces only final segments, but the shape leaves room for a streaming
/// engine behind the same seam.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    Segment { is_final: bool, text: String },
    /// The capture engine failed mid-session. The session deactivates and
    /// the caller treats the gesture as "no utterance captured".
    Error { message: String },
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("speech capture is unavailable: {0}")]
    Unavailable(#[from] AudioError),

    #[error("transcription failed: {0}")]
    Transcription(String),
}

/// Utterance endpointing parameters.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// RMS level (i16 scale) below which a frame counts as silence.
    pub silence_threshold: i16,
    /// Sustained speech required before an utterance opens.
    pub speech_debounce_ms: u32,
    /// Trailing silence that closes an utterance.
    pub hangover_ms: u32,
    /// Utterances shorter than this are discarded as noise.
    pub min_utterance_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            silence_threshold: murmur_foundation::AudioConfig::default().silence_threshold,
            speech_debounce_ms: 150,
            hangover_ms: 600,
            min_utterance_ms: 250,
        }
    }
}
