use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use murmur_foundation::AudioError;

use crate::device::find_output_device;

/// A handle to the dedicated playback thread.
///
/// Clips are MP3 bytes as returned by the synthesis endpoint. Sending a new
/// clip supersedes the current one: the previous stream is dropped before
/// the new clip starts, so a long session never accumulates streams.
pub struct PlaybackThread {
    clip_tx: Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl PlaybackThread {
    pub fn spawn() -> Result<Self, AudioError> {
        // Fail fast when there is nowhere to play; the caller downgrades to
        // text-only replies.
        find_output_device()?;

        let (clip_tx, clip_rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || run_playback(clip_rx, thread_shutdown))
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn playback thread: {}", e)))?;

        Ok(Self {
            clip_tx,
            shutdown,
            handle,
        })
    }

    /// Queue a clip for playback, superseding whatever is playing.
    pub fn play(&self, mp3: Vec<u8>) {
        let _ = self.clip_tx.send(mp3);
    }

    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.clip_tx);
        let _ = self.handle.join();
    }
}

struct ActiveClip {
    // Held for its side effect; dropping stops audio.
    _stream: Stream,
    finished: Arc<AtomicBool>,
}

fn run_playback(clip_rx: Receiver<Vec<u8>>, shutdown: Arc<AtomicBool>) {
    let mut current: Option<ActiveClip> = None;

    while !shutdown.load(Ordering::Relaxed) {
        match clip_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(mp3) => {
                // Release the superseded stream before starting the next.
                current = None;
                match start_clip(&mp3) {
                    Ok(clip) => current = Some(clip),
                    Err(e) => tracing::warn!("Playback failed: {}", e),
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if current
                    .as_ref()
                    .map(|c| c.finished.load(Ordering::Relaxed))
                    .unwrap_or(false)
                {
                    current = None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn start_clip(mp3: &[u8]) -> Result<ActiveClip, AudioError> {
    let (samples, clip_rate) = decode_mp3(mp3)?;

    let device = find_output_device()?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels as usize;

    let samples = resample_linear(&samples, clip_rate, config.sample_rate.0);
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let err_fn = |err: cpal::StreamError| tracing::warn!("Playback stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => {
            let samples = samples.clone();
            let position = position.clone();
            let finished = finished.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_frames(data, channels, &samples, &position, &finished, |s| s)
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let samples = samples.clone();
            let position = position.clone();
            let finished = finished.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    fill_frames(data, channels, &samples, &position, &finished, |s| {
                        (s.clamp(-1.0, 1.0) * 32767.0) as i16
                    })
                },
                err_fn,
                None,
            )?
        }
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            })
        }
    };
    stream.play()?;

    tracing::debug!(samples = samples.len(), "Playback started");
    Ok(ActiveClip {
        _stream: stream,
        finished,
    })
}

fn fill_frames<T>(
    data: &mut [T],
    channels: usize,
    samples: &Arc<Vec<f32>>,
    position: &Arc<AtomicUsize>,
    finished: &Arc<AtomicBool>,
    convert: impl Fn(f32) -> T,
) {
    for frame in data.chunks_mut(channels.max(1)) {
        let pos = position.fetch_add(1, Ordering::Relaxed);
        let sample = if pos < samples.len() {
            samples[pos]
        } else {
            finished.store(true, Ordering::Relaxed);
            0.0
        };
        for out in frame.iter_mut() {
            *out = convert(sample);
        }
    }
}

/// Decode MP3 bytes to mono f32 samples plus the clip's sample rate.
fn decode_mp3(mp3: &[u8]) -> Result<(Vec<f32>, u32), AudioError> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut samples = Vec::new();
    let mut rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                rate = frame.sample_rate as u32;
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = chunk[0] as f32 / 32768.0;
                        let right = chunk.get(1).copied().unwrap_or(chunk[0]) as f32 / 32768.0;
                        (left + right) / 2.0
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(AudioError::Fatal(format!("MP3 decode error: {}", e))),
        }
    }

    if samples.is_empty() || rate == 0 {
        return Err(AudioError::Fatal("MP3 clip contained no audio".to_string()));
    }
    Ok((samples, rate))
}

/// Nearest-sample linear resampling; synthesized speech does not warrant a
/// polyphase filter bank.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx = src as usize;
            let frac = (src - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity_when_rates_match() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 24_000, 24_000), samples);
    }

    #[test]
    fn resample_halves_length_when_downsampling() {
        let samples: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();
        let out = resample_linear(&samples, 48_000, 24_000);
        assert!((out.len() as i64 - 500).abs() <= 1, "len {}", out.len());
    }

    #[test]
    fn resample_preserves_constant_signal() {
        let samples = vec![0.5f32; 480];
        let out = resample_linear(&samples, 48_000, 44_100);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_mp3(&[0u8; 64]).is_err());
    }
}
