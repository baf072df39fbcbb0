//! RMS-based speech/silence classification (spec §4.1).
//!
//! Deliberately simple: a single energy threshold over 16-bit PCM samples,
//! no spectral analysis. The Chunker only needs a voiced/unvoiced verdict
//! per incoming frame, not a confidence score.

use relay_core::PcmBytes;

/// Root-mean-square energy of a PCM frame, on the native i16 sample scale.
pub fn rms(pcm: &PcmBytes) -> f64 {
    let samples = match pcm.samples() {
        Ok(s) => s,
        Err(_) => return 0.0,
    };
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

/// Whether a frame's energy clears the configured silence threshold.
pub fn is_voiced(pcm: &PcmBytes, rms_silence_threshold: i32) -> bool {
    rms(pcm) > rms_silence_threshold as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_frame(len: usize) -> PcmBytes {
        PcmBytes::new(vec![0u8; len])
    }

    fn loud_frame(len_samples: usize, amplitude: i16) -> PcmBytes {
        let mut bytes = Vec::with_capacity(len_samples * 2);
        for _ in 0..len_samples {
            bytes.extend_from_slice(&amplitude.to_le_bytes());
        }
        PcmBytes::new(bytes)
    }

    #[test]
    fn silence_is_not_voiced() {
        let frame = silent_frame(320);
        assert_eq!(rms(&frame), 0.0);
        assert!(!is_voiced(&frame, 350));
    }

    #[test]
    fn loud_frame_is_voiced() {
        let frame = loud_frame(160, 5000);
        assert!(is_voiced(&frame, 350));
    }

    #[test]
    fn threshold_is_inclusive_boundary() {
        let frame = loud_frame(160, 350);
        assert!(!is_voiced(&frame, 350));
        let frame = loud_frame(160, 351);
        assert!(is_voiced(&frame, 350));
    }
}
