//! Frame-level speech classification.
//!
//! The real inference engine (Silero and friends) lives outside this crate;
//! [`FrameClassifier`] is the seam it plugs into. [`EnergyClassifier`] is a
//! lightweight RMS-based stand-in good enough for quiet rooms and for
//! exercising the full pipeline without a model.

use std::collections::VecDeque;

/// Per-frame speech classifier.
///
/// Called once per fixed ~32 ms window with 16 kHz mono samples; returns the
/// probability that the window contains speech. Must complete in bounded,
/// short time — it runs on the audio feed path.
pub trait FrameClassifier: Send {
    fn speech_probability(&mut self, frame: &[f32]) -> f32;
}

impl<T: FrameClassifier + ?Sized> FrameClassifier for Box<T> {
    fn speech_probability(&mut self, frame: &[f32]) -> f32 {
        (**self).speech_probability(frame)
    }
}

/// RMS-energy classifier.
///
/// Maps frame RMS linearly onto \[0, 1\] against a full-scale reference, so
/// the driver's probability thresholds behave like energy thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    /// RMS treated as probability 1.0.
    full_scale_rms: f32,
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self {
            full_scale_rms: 0.1,
        }
    }
}

impl EnergyClassifier {
    pub fn new(full_scale_rms: f32) -> Self {
        Self { full_scale_rms }
    }
}

impl FrameClassifier for EnergyClassifier {
    fn speech_probability(&mut self, frame: &[f32]) -> f32 {
        (calculate_rms(frame) / self.full_scale_rms).min(1.0)
    }
}

/// Calculates the Root Mean Square (RMS) of normalized f32 samples.
///
/// Returns 0.0 for silence; ~0.707 for a full-scale sine wave.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let s = sample as f64;
            s * s
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Classifier that replays scripted probabilities, for deterministic tests.
///
/// Returns 0.0 once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    probabilities: VecDeque<f32>,
}

impl ScriptedClassifier {
    pub fn new(probabilities: impl IntoIterator<Item = f32>) -> Self {
        Self {
            probabilities: probabilities.into_iter().collect(),
        }
    }
}

impl FrameClassifier for ScriptedClassifier {
    fn speech_probability(&mut self, _frame: &[f32]) -> f32 {
        self.probabilities.pop_front().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_silence_is_zero() {
        let silence = vec![0.0f32; 512];
        assert_eq!(calculate_rms(&silence), 0.0);
    }

    #[test]
    fn test_rms_empty_samples() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_constant_amplitude() {
        let signal = vec![0.5f32; 512];
        let rms = calculate_rms(&signal);
        assert!((rms - 0.5).abs() < 1e-4, "RMS should be ~0.5, got {}", rms);
    }

    #[test]
    fn test_rms_negative_samples() {
        let signal = vec![-0.5f32; 512];
        let rms = calculate_rms(&signal);
        assert!((rms - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_energy_classifier_silence_is_zero() {
        let mut classifier = EnergyClassifier::default();
        assert_eq!(classifier.speech_probability(&vec![0.0; 512]), 0.0);
    }

    #[test]
    fn test_energy_classifier_saturates_at_one() {
        let mut classifier = EnergyClassifier::default();
        let loud = vec![0.5f32; 512];
        assert_eq!(classifier.speech_probability(&loud), 1.0);
    }

    #[test]
    fn test_energy_classifier_scales_linearly() {
        let mut classifier = EnergyClassifier::new(0.2);
        let signal = vec![0.1f32; 512];
        let p = classifier.speech_probability(&signal);
        assert!((p - 0.5).abs() < 1e-3, "expected ~0.5, got {}", p);
    }

    #[test]
    fn test_scripted_classifier_replays_then_zeroes() {
        let mut classifier = ScriptedClassifier::new([0.9, 0.1]);
        assert_eq!(classifier.speech_probability(&[]), 0.9);
        assert_eq!(classifier.speech_probability(&[]), 0.1);
        assert_eq!(classifier.speech_probability(&[]), 0.0);
    }
}
