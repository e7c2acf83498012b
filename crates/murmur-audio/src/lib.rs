pub mod capture;
pub mod detector;
pub mod device;
pub mod playback;
pub mod wav;

// Public API
pub use capture::{CaptureThread, DeviceConfig, FrameReceiver};
pub use detector::SilenceDetector;
pub use device::{default_input_available, find_input_device};
pub use playback::PlaybackThread;
pub use wav::encode_wav_mono16;
