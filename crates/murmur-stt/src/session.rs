//! Capture session lifecycle.
//!
//! `start()` opens the microphone and spawns a worker that runs until
//! `stop()` or an engine error. While active, the worker buffers speech,
//! closes an utterance after the silence hangover, and transcribes it.
//! If the underlying capture stream terminates on its own the worker
//! immediately restarts it, so the listening window is bounded only by an
//! explicit `stop()`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use murmur_audio::{
    encode_wav_mono16, CaptureThread, DeviceConfig, FrameReceiver, SilenceDetector,
};
use murmur_foundation::AudioError;

use crate::types::{CaptureConfig, CaptureError, TranscriptEvent};
use crate::Transcriber;

/// A live audio source feeding the session; the session stops it when the
/// worker exits. Production sources are [`CaptureThread`]s, tests inject
/// channels directly.
pub trait FrameSource: Send {
    fn stop(self: Box<Self>);
}

impl FrameSource for CaptureThread {
    fn stop(self: Box<Self>) {
        CaptureThread::stop(*self);
    }
}

/// Produces a fresh audio source; invoked once at session start and again
/// for every unsolicited stream termination.
pub type SourceFactory =
    Box<dyn FnMut() -> Result<(Box<dyn FrameSource>, DeviceConfig, FrameReceiver), AudioError> + Send>;

/// Cancel handle for an active session. Cloneable so the orchestrator can
/// keep one while the event receiver lives in a forwarding task.
#[derive(Clone)]
pub struct SessionController {
    stop: Arc<watch::Sender<bool>>,
}

impl SessionController {
    /// End the session. Buffered speech is flushed through transcription
    /// before the event channel closes.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// An active capture session: the event stream plus its cancel handle.
pub struct SessionHandle {
    events: mpsc::Receiver<TranscriptEvent>,
    controller: SessionController,
}

impl SessionHandle {
    pub fn controller(&self) -> SessionController {
        self.controller.clone()
    }

    /// Next event; `None` once the session has fully drained.
    pub async fn next_event(&mut self) -> Option<TranscriptEvent> {
        self.events.recv().await
    }

    pub fn split(self) -> (SessionController, mpsc::Receiver<TranscriptEvent>) {
        (self.controller, self.events)
    }
}

/// Session factory bound to one transcriber and one endpointing config.
pub struct CaptureSession {
    transcriber: Arc<dyn Transcriber>,
    config: CaptureConfig,
}

impl CaptureSession {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: CaptureConfig) -> Self {
        Self {
            transcriber,
            config,
        }
    }

    /// Start capturing from the given input device (host default if
    /// `None`). Fails fast with `CaptureError::Unavailable` when no
    /// device can be opened.
    pub fn start(&self, device: Option<String>) -> Result<SessionHandle, CaptureError> {
        let factory: SourceFactory = Box::new(move || {
            let (thread, config, frames) = CaptureThread::spawn(device.clone())?;
            Ok((Box::new(thread) as Box<dyn FrameSource>, config, frames))
        });
        self.start_with_source(factory)
    }

    /// Start against an injected source factory. This is the testable
    /// core; `start()` merely wires in the microphone.
    pub fn start_with_source(
        &self,
        mut factory: SourceFactory,
    ) -> Result<SessionHandle, CaptureError> {
        let (source, device_config, frames) = factory().map_err(CaptureError::Unavailable)?;

        let (event_tx, event_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker = SessionWorker {
            transcriber: self.transcriber.clone(),
            config: self.config,
            events: event_tx,
        };
        tokio::spawn(worker.run(source, device_config, frames, factory, stop_rx));

        Ok(SessionHandle {
            events: event_rx,
            controller: SessionController {
                stop: Arc::new(stop_tx),
            },
        })
    }
}

struct SessionWorker {
    transcriber: Arc<dyn Transcriber>,
    config: CaptureConfig,
    events: mpsc::Sender<TranscriptEvent>,
}

impl SessionWorker {
    async fn run(
        self,
        mut source: Box<dyn FrameSource>,
        device_config: DeviceConfig,
        mut frames: FrameReceiver,
        mut factory: SourceFactory,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let mut sample_rate = device_config.sample_rate;
        let mut endpointer = Endpointer::new(&self.config, sample_rate);

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        // Drain whatever the callback already delivered,
                        // then flush the open utterance.
                        let mut utterances = Vec::new();
                        while let Ok(frame) = frames.try_recv() {
                            if let Some(u) = endpointer.feed(&frame) {
                                utterances.push(u);
                            }
                        }
                        if let Some(u) = endpointer.flush() {
                            utterances.push(u);
                        }
                        for utterance in utterances {
                            if !self.transcribe_utterance(utterance, sample_rate).await {
                                break;
                            }
                        }
                        break;
                    }
                }
                frame = frames.recv() => match frame {
                    Some(samples) => {
                        if let Some(utterance) = endpointer.feed(&samples) {
                            if !self.transcribe_utterance(utterance, sample_rate).await {
                                break;
                            }
                        }
                    }
                    None => {
                        // Unsolicited termination while still active:
                        // restart capture so the listening window stays
                        // open until stop().
                        match factory() {
                            Ok((new_source, new_config, new_frames)) => {
                                tracing::warn!("Capture stream ended unexpectedly; restarting");
                                let old = std::mem::replace(&mut source, new_source);
                                old.stop();
                                frames = new_frames;
                                if new_config.sample_rate != sample_rate {
                                    sample_rate = new_config.sample_rate;
                                    endpointer.retime(&self.config, sample_rate);
                                }
                            }
                            Err(e) => {
                                tracing::warn!("Capture restart failed: {}", e);
                                let _ = self
                                    .events
                                    .send(TranscriptEvent::Error {
                                        message: e.to_string(),
                                    })
                                    .await;
                                break;
                            }
                        }
                    }
                }
            }
        }

        source.stop();
    }

    /// Transcribe one utterance and emit the final segment. Returns false
    /// when the session must deactivate (transcription failed or nobody is
    /// listening).
    async fn transcribe_utterance(&self, utterance: Vec<i16>, sample_rate: u32) -> bool {
        let min_samples = ms_to_samples(self.config.min_utterance_ms, sample_rate);
        if utterance.len() < min_samples {
            tracing::debug!(samples = utterance.len(), "Discarding sub-minimum utterance");
            return true;
        }

        let wav = match encode_wav_mono16(&utterance, sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                let _ = self
                    .events
                    .send(TranscriptEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return false;
            }
        };

        match self.transcriber.transcribe(wav).await {
            Ok(text) if text.trim().is_empty() => true,
            Ok(text) => self
                .events
                .send(TranscriptEvent::Segment {
                    is_final: true,
                    text,
                })
                .await
                .is_ok(),
            Err(e) => {
                tracing::warn!("Mid-session transcription failed: {}", e);
                let _ = self
                    .events
                    .send(TranscriptEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                false
            }
        }
    }
}

fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}

/// Utterance state machine: sample-count based so it needs no clock.
struct Endpointer {
    detector: SilenceDetector,
    debounce_samples: usize,
    hangover_samples: usize,
    state: EndpointerState,
}

enum EndpointerState {
    /// Waiting for sustained speech; `pending` holds the unconfirmed run.
    Idle { pending: Vec<i16>, speech_run: usize },
    /// Inside an utterance; `trailing` counts consecutive silent samples.
    Speech { buffer: Vec<i16>, trailing: usize },
}

impl Endpointer {
    fn new(config: &CaptureConfig, sample_rate: u32) -> Self {
        Self {
            detector: SilenceDetector::new(config.silence_threshold),
            debounce_samples: ms_to_samples(config.speech_debounce_ms, sample_rate),
            hangover_samples: ms_to_samples(config.hangover_ms, sample_rate),
            state: EndpointerState::Idle {
                pending: Vec::new(),
                speech_run: 0,
            },
        }
    }

    fn retime(&mut self, config: &CaptureConfig, sample_rate: u32) {
        self.debounce_samples = ms_to_samples(config.speech_debounce_ms, sample_rate);
        self.hangover_samples = ms_to_samples(config.hangover_ms, sample_rate);
    }

    /// Feed one frame; returns a finished utterance once the hangover
    /// elapses.
    fn feed(&mut self, samples: &[i16]) -> Option<Vec<i16>> {
        let silent = self.detector.is_silence(samples);
        match &mut self.state {
            EndpointerState::Idle {
                pending,
                speech_run,
            } => {
                if silent {
                    pending.clear();
                    *speech_run = 0;
                } else {
                    pending.extend_from_slice(samples);
                    *speech_run += samples.len();
                    if *speech_run >= self.debounce_samples {
                        let buffer = std::mem::take(pending);
                        self.state = EndpointerState::Speech {
                            buffer,
                            trailing: 0,
                        };
                    }
                }
                None
            }
            EndpointerState::Speech { buffer, trailing } => {
                buffer.extend_from_slice(samples);
                if silent {
                    *trailing += samples.len();
                    if *trailing >= self.hangover_samples {
                        let utterance = std::mem::take(buffer);
                        self.state = EndpointerState::Idle {
                            pending: Vec::new(),
                            speech_run: 0,
                        };
                        return Some(utterance);
                    }
                } else {
                    *trailing = 0;
                }
                None
            }
        }
    }

    /// Close out the open utterance on stop; unconfirmed pending audio is
    /// discarded as noise.
    fn flush(&mut self) -> Option<Vec<i16>> {
        match std::mem::replace(
            &mut self.state,
            EndpointerState::Idle {
                pending: Vec::new(),
                speech_run: 0,
            },
        ) {
            EndpointerState::Speech { buffer, .. } if !buffer.is_empty() => Some(buffer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CaptureConfig {
        CaptureConfig {
            silence_threshold: 100,
            speech_debounce_ms: 100,
            hangover_ms: 300,
            min_utterance_ms: 200,
        }
    }

    const RATE: u32 = 16_000;

    fn speech(ms: u32) -> Vec<i16> {
        vec![8_000; ms_to_samples(ms, RATE)]
    }

    fn silence(ms: u32) -> Vec<i16> {
        vec![0; ms_to_samples(ms, RATE)]
    }

    #[test]
    fn utterance_closes_after_hangover() {
        let mut ep = Endpointer::new(&config(), RATE);
        assert!(ep.feed(&speech(50)).is_none());
        assert!(ep.feed(&speech(100)).is_none()); // debounce met, utterance open
        assert!(ep.feed(&silence(100)).is_none());
        assert!(ep.feed(&silence(100)).is_none());
        let utterance = ep.feed(&silence(150)).expect("hangover elapsed");
        // Everything from first speech frame through the closing silence.
        assert_eq!(utterance.len(), ms_to_samples(500, RATE));
    }

    #[test]
    fn short_blip_never_opens_an_utterance() {
        let mut ep = Endpointer::new(&config(), RATE);
        assert!(ep.feed(&speech(50)).is_none());
        assert!(ep.feed(&silence(500)).is_none());
        assert!(ep.flush().is_none());
    }

    #[test]
    fn flush_returns_open_utterance() {
        let mut ep = Endpointer::new(&config(), RATE);
        ep.feed(&speech(200));
        let flushed = ep.flush().expect("speech was buffered");
        assert_eq!(flushed.len(), ms_to_samples(200, RATE));
        assert!(ep.flush().is_none());
    }

    #[test]
    fn speech_resets_trailing_silence() {
        let mut ep = Endpointer::new(&config(), RATE);
        ep.feed(&speech(200));
        ep.feed(&silence(200));
        ep.feed(&speech(50)); // hangover restarts
        assert!(ep.feed(&silence(200)).is_none());
        assert!(ep.feed(&silence(150)).is_some());
    }
}
