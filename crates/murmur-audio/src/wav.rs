use murmur_foundation::AudioError;
use std::io::Cursor;

/// Encode mono i16 PCM into an in-memory WAV file at the given rate.
///
/// Utterances are shipped to the transcription endpoint at the device's
/// native rate; the backend resamples as it sees fit.
pub fn encode_wav_mono16(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| AudioError::Wav(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| AudioError::Wav(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::Wav(e.to_string()))?;

    Ok(cursor.into_inner())
}
