use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use murmur_foundation::AudioError;

/// Resolve the capture device: a named device if requested, otherwise the
/// host default.
pub fn find_input_device(name: Option<&str>) -> Result<Device, AudioError> {
    let host = cpal::default_host();

    if let Some(wanted) = name {
        let devices = host.input_devices().map_err(|e| {
            AudioError::Fatal(format!("Failed to enumerate input devices: {}", e))
        })?;
        for device in devices {
            if device.name().map(|n| n == wanted).unwrap_or(false) {
                return Ok(device);
            }
        }
        return Err(AudioError::DeviceNotFound {
            name: Some(wanted.to_string()),
        });
    }

    host.default_input_device()
        .ok_or(AudioError::DeviceNotFound { name: None })
}

/// Cheap capability probe used at startup to decide whether push-to-talk
/// can work at all on this machine.
pub fn default_input_available() -> bool {
    cpal::default_host().default_input_device().is_some()
}

/// Resolve the playback device (host default only; replies are not routed).
pub fn find_output_device() -> Result<Device, AudioError> {
    cpal::default_host()
        .default_output_device()
        .ok_or(AudioError::DeviceNotFound { name: None })
}
