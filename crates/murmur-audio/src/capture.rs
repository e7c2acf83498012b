use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use murmur_foundation::AudioError;

use crate::device::find_input_device;

/// Mono i16 frames as delivered by the capture callback.
pub type FrameReceiver = tokio::sync::mpsc::UnboundedReceiver<Vec<i16>>;

/// Negotiated stream parameters, reported back once the stream is live.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A handle to the dedicated microphone thread.
///
/// cpal streams are not `Send`, so the stream lives on its own OS thread
/// and ships downmixed frames over a channel. Dropping the receiver or
/// calling [`CaptureThread::stop`] tears the stream down; if the stream
/// dies on its own the frame channel closes, which is the caller's signal
/// that capture terminated unsolicited.
pub struct CaptureThread {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl CaptureThread {
    pub fn spawn(
        device_name: Option<String>,
    ) -> Result<(Self, DeviceConfig, FrameReceiver), AudioError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (frame_tx, frame_rx) = tokio::sync::mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<DeviceConfig, AudioError>>();

        let thread_shutdown = shutdown.clone();
        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || run_capture(device_name, frame_tx, ready_tx, thread_shutdown))
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn capture thread: {}", e)))?;

        // The thread reports once the stream is playing (or why it can't).
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(config)) => Ok((Self { handle, shutdown }, config, frame_rx)),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                shutdown.store(true, Ordering::Relaxed);
                Err(AudioError::Fatal(
                    "Timed out waiting for capture stream to start".to_string(),
                ))
            }
        }
    }

    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

fn run_capture(
    device_name: Option<String>,
    frame_tx: tokio::sync::mpsc::UnboundedSender<Vec<i16>>,
    ready_tx: std_mpsc::Sender<Result<DeviceConfig, AudioError>>,
    shutdown: Arc<AtomicBool>,
) {
    let device = match find_input_device(device_name.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels as usize;

    let failed = Arc::new(AtomicBool::new(false));
    let err_failed = failed.clone();
    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("Capture stream error: {}", err);
        err_failed.store(true, Ordering::Relaxed);
    };

    let stream = match sample_format {
        SampleFormat::I16 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(downmix_to_mono_i16(data, channels));
                },
                err_fn,
                None,
            )
        }
        SampleFormat::F32 => {
            let tx = frame_tx.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(downmix_to_mono_f32(data, channels));
                },
                err_fn,
                None,
            )
        }
        other => {
            let _ = ready_tx.send(Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            }));
            return;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e.into()));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.into()));
        return;
    }

    let device_config = DeviceConfig {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };
    tracing::debug!(
        sample_rate = device_config.sample_rate,
        channels = device_config.channels,
        format = ?sample_format,
        "Capture stream started"
    );
    let _ = ready_tx.send(Ok(device_config));

    // Park until told to stop, the consumer goes away, or the stream dies.
    while !shutdown.load(Ordering::Relaxed)
        && !failed.load(Ordering::Relaxed)
        && !frame_tx.is_closed()
    {
        thread::sleep(Duration::from_millis(50));
    }

    drop(stream);
    tracing::debug!("Capture stream stopped");
}

fn downmix_to_mono_i16(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| (frame.iter().map(|&s| s as i32).sum::<i32>() / frame.len() as i32) as i16)
        .collect()
}

fn downmix_to_mono_f32(data: &[f32], channels: usize) -> Vec<i16> {
    let to_i16 = |s: f32| (s.clamp(-1.0, 1.0) * 32767.0) as i16;
    if channels <= 1 {
        return data.iter().map(|&s| to_i16(s)).collect();
    }
    data.chunks(channels)
        .map(|frame| to_i16(frame.iter().sum::<f32>() / frame.len() as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_i16_passes_through() {
        let data = [1i16, -2, 3];
        assert_eq!(downmix_to_mono_i16(&data, 1), vec![1, -2, 3]);
    }

    #[test]
    fn stereo_i16_averages_channels() {
        let data = [100i16, 300, -100, -300];
        assert_eq!(downmix_to_mono_i16(&data, 2), vec![200, -200]);
    }

    #[test]
    fn f32_converts_to_i16_range() {
        let data = [0.0f32, 1.0, -1.0, 2.0];
        let mono = downmix_to_mono_f32(&data, 1);
        assert_eq!(mono, vec![0, 32767, -32767, 32767]);
    }

    #[test]
    fn stereo_f32_downmixes() {
        let data = [0.5f32, 0.5, -0.25, -0.25];
        let mono = downmix_to_mono_f32(&data, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 16383).abs() <= 1);
    }
}
