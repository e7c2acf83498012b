//! Capture session tests
//!
//! Sessions run against injected frame sources and a canned transcriber,
//! so nothing here touches a microphone or the network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use murmur_audio::DeviceConfig;
use murmur_foundation::AudioError;
use murmur_stt::{
    CaptureConfig, CaptureError, CaptureSession, FrameSource, SourceFactory, Transcriber,
    TranscriptEvent,
};

const RATE: u32 = 16_000;

struct NullSource;

impl FrameSource for NullSource {
    fn stop(self: Box<Self>) {}
}

/// A transcriber that records every WAV it receives and answers from a
/// scripted queue.
struct ScriptedTranscriber {
    calls: Arc<Mutex<Vec<usize>>>,
    replies: Mutex<VecDeque<Result<String, CaptureError>>>,
}

impl ScriptedTranscriber {
    fn new(replies: Vec<Result<String, CaptureError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            replies: Mutex::new(replies.into()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, CaptureError> {
        self.calls.lock().unwrap().push(wav.len());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

fn config() -> CaptureConfig {
    CaptureConfig {
        silence_threshold: 100,
        speech_debounce_ms: 100,
        hangover_ms: 300,
        min_utterance_ms: 200,
    }
}

fn device_config() -> DeviceConfig {
    DeviceConfig {
        sample_rate: RATE,
        channels: 1,
    }
}

/// Factory handing out pre-built frame channels, one per (re)start.
fn channel_factory(
    count: usize,
) -> (SourceFactory, Vec<UnboundedSender<Vec<i16>>>, Arc<AtomicUsize>) {
    let mut senders = Vec::new();
    let mut receivers = VecDeque::new();
    for _ in 0..count {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        senders.push(tx);
        receivers.push_back(rx);
    }
    let starts = Arc::new(AtomicUsize::new(0));
    let starts_clone = starts.clone();
    let factory: SourceFactory = Box::new(move || {
        starts_clone.fetch_add(1, Ordering::SeqCst);
        match receivers.pop_front() {
            Some(rx) => Ok((Box::new(NullSource) as Box<dyn FrameSource>, device_config(), rx)),
            None => Err(AudioError::DeviceNotFound { name: None }),
        }
    });
    (factory, senders, starts)
}

fn speech(ms: u32) -> Vec<i16> {
    vec![8_000; (ms as u64 * RATE as u64 / 1000) as usize]
}

fn silence(ms: u32) -> Vec<i16> {
    vec![0; (ms as u64 * RATE as u64 / 1000) as usize]
}

#[tokio::test]
async fn utterance_is_transcribed_and_surfaced_as_final() {
    let transcriber = ScriptedTranscriber::new(vec![Ok("what's the weather".into())]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, senders, _) = channel_factory(1);
    let mut handle = session.start_with_source(factory).unwrap();

    senders[0].send(speech(300)).unwrap();
    senders[0].send(silence(400)).unwrap();

    match handle.next_event().await.expect("segment expected") {
        TranscriptEvent::Segment { is_final, text } => {
            assert!(is_final);
            assert_eq!(text, "what's the weather");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(transcriber.call_count(), 1);

    handle.controller().stop();
    assert!(handle.next_event().await.is_none());
}

#[tokio::test]
async fn stop_flushes_the_open_utterance() {
    let transcriber = ScriptedTranscriber::new(vec![Ok("flushed".into())]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, senders, _) = channel_factory(1);
    let mut handle = session.start_with_source(factory).unwrap();

    // Speech with no closing silence; only stop() can finish it.
    senders[0].send(speech(400)).unwrap();
    tokio::task::yield_now().await;
    handle.controller().stop();

    match handle.next_event().await.expect("flushed segment expected") {
        TranscriptEvent::Segment { is_final, text } => {
            assert!(is_final);
            assert_eq!(text, "flushed");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(handle.next_event().await.is_none());
}

#[tokio::test]
async fn silent_session_never_calls_the_transcriber() {
    let transcriber = ScriptedTranscriber::new(vec![]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, senders, _) = channel_factory(1);
    let mut handle = session.start_with_source(factory).unwrap();

    senders[0].send(silence(500)).unwrap();
    handle.controller().stop();

    assert!(handle.next_event().await.is_none());
    assert_eq!(transcriber.call_count(), 0);
}

#[tokio::test]
async fn whitespace_transcript_is_suppressed() {
    let transcriber = ScriptedTranscriber::new(vec![Ok("   ".into())]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, senders, _) = channel_factory(1);
    let mut handle = session.start_with_source(factory).unwrap();

    senders[0].send(speech(300)).unwrap();
    senders[0].send(silence(400)).unwrap();
    tokio::task::yield_now().await;
    handle.controller().stop();

    // Session stays healthy; no segment, no error, clean close.
    assert!(handle.next_event().await.is_none());
    assert_eq!(transcriber.call_count(), 1);
}

#[tokio::test]
async fn transcription_failure_deactivates_the_session() {
    let transcriber = ScriptedTranscriber::new(vec![Err(CaptureError::Transcription(
        "backend unreachable".into(),
    ))]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, senders, _) = channel_factory(1);
    let mut handle = session.start_with_source(factory).unwrap();

    senders[0].send(speech(300)).unwrap();
    senders[0].send(silence(400)).unwrap();

    match handle.next_event().await.expect("error event expected") {
        TranscriptEvent::Error { message } => assert!(message.contains("backend unreachable")),
        other => panic!("unexpected event: {:?}", other),
    }
    // Channel closes without stop() being called.
    assert!(handle.next_event().await.is_none());
}

#[tokio::test]
async fn capture_restart_keeps_the_session_listening() {
    let transcriber = ScriptedTranscriber::new(vec![Ok("after restart".into())]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, mut senders, starts) = channel_factory(2);
    let mut handle = session.start_with_source(factory).unwrap();

    // First source dies unsolicited.
    drop(senders.remove(0));

    // The replacement source keeps feeding the same session.
    let second = &senders[0];
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
    loop {
        if second.send(speech(300)).is_ok() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "restart never happened");
        tokio::task::yield_now().await;
    }
    second.send(speech(100)).unwrap();
    second.send(silence(400)).unwrap();

    match handle.next_event().await.expect("segment expected") {
        TranscriptEvent::Segment { text, .. } => assert_eq!(text, "after restart"),
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    handle.controller().stop();
    assert!(handle.next_event().await.is_none());
}

#[tokio::test]
async fn restart_failure_surfaces_an_engine_error() {
    let transcriber = ScriptedTranscriber::new(vec![]);
    let session = CaptureSession::new(transcriber.clone(), config());
    let (factory, mut senders, starts) = channel_factory(1);
    let mut handle = session.start_with_source(factory).unwrap();

    drop(senders.remove(0));

    match handle.next_event().await.expect("error event expected") {
        TranscriptEvent::Error { .. } => {}
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(handle.next_event().await.is_none());
    assert_eq!(starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unavailable_device_fails_fast() {
    let transcriber = ScriptedTranscriber::new(vec![]);
    let session = CaptureSession::new(transcriber, config());
    let factory: SourceFactory =
        Box::new(|| Err(AudioError::DeviceNotFound { name: None }));
    match session.start_with_source(factory) {
        Err(CaptureError::Unavailable(_)) => {}
        other => panic!("expected Unavailable, got {:?}", other.err()),
    }
}
