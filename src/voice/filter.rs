//! Frame validity filter
//!
//! A disconnected or locked-up microphone delivers a constant signal.
//! Such frames are dropped before they reach the classifier or recognizer.

/// Whether a frame carries any variation at all
///
/// A frame is rejected when every sample is bit-identical to the first one.
/// An empty frame is rejected too.
#[must_use]
pub fn is_valid(frame: &[f32]) -> bool {
    match frame.split_first() {
        Some((first, rest)) => rest.iter().any(|s| s.to_bits() != first.to_bits()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_frame_is_rejected() {
        assert!(!is_valid(&[0.0; 512]));
        assert!(!is_valid(&[0.25; 512]));
    }

    #[test]
    fn single_differing_sample_is_accepted() {
        let mut frame = vec![0.0f32; 512];
        frame[511] = 1.0 / 32768.0;
        assert!(is_valid(&frame));
    }

    #[test]
    fn empty_and_single_sample_frames_are_rejected() {
        assert!(!is_valid(&[]));
        assert!(!is_valid(&[0.5]));
    }

    #[test]
    fn comparison_is_bitwise() {
        // -0.0 == 0.0 numerically but is a different sample on the wire
        assert!(is_valid(&[0.0, -0.0]));
        assert!(!is_valid(&[f32::NAN, f32::NAN]));
    }
}
