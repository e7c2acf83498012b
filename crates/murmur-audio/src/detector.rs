/// RMS-based silence detection over i16 PCM frames.
///
/// The capture session's utterance endpointer classifies each incoming
/// frame as speech or silence; everything time-based (debounce, hangover)
/// lives in the session, which counts samples rather than wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SilenceDetector {
    threshold: i16,
}

impl SilenceDetector {
    pub fn new(threshold: i16) -> Self {
        Self { threshold }
    }

    pub fn is_silence(&self, samples: &[i16]) -> bool {
        rms(samples) < self.threshold
    }
}

/// Root-mean-square level of a frame, on the i16 sample scale.
pub fn rms(samples: &[i16]) -> i16 {
    if samples.is_empty() {
        return 0;
    }
    let sum: i64 = samples.iter().map(|&s| s as i64 * s as i64).sum();
    ((sum / samples.len() as i64) as f64).sqrt() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digital_silence_is_silent() {
        let detector = SilenceDetector::new(100);
        assert!(detector.is_silence(&[0i16; 512]));
    }

    #[test]
    fn full_scale_is_speech() {
        let detector = SilenceDetector::new(100);
        assert!(!detector.is_silence(&[20_000i16; 512]));
    }

    #[test]
    fn empty_frame_is_silent() {
        let detector = SilenceDetector::new(1);
        assert!(detector.is_silence(&[]));
    }

    #[test]
    fn rms_of_constant_signal_is_that_level() {
        let level = rms(&[1000i16; 256]);
        assert!((999..=1001).contains(&level), "rms was {}", level);
    }
}
