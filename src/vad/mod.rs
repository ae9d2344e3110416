//! Voice activity detection front-end.
//!
//! The inference engine is a pluggable [`FrameClassifier`]; the
//! [`VadDriver`] applies hysteresis over its per-frame probabilities and
//! emits explicit [`VadEvent`]s, which the [`VoiceActivitySegmenter`]
//! consumes to build utterance segments.

pub mod classifier;
pub mod driver;
pub mod segmenter;

pub use classifier::{EnergyClassifier, FrameClassifier, ScriptedClassifier};
pub use driver::{VadConfig, VadDriver, end_confirm_frames};
pub use segmenter::{AudioSegment, VoiceActivitySegmenter};

/// Events produced by the VAD driver, consumed by the segmenter.
///
/// Delivered as plain messages rather than reentrant callbacks so buffer
/// mutation stays on one execution path.
#[derive(Debug, Clone, PartialEq)]
pub enum VadEvent {
    /// A sustained run of speech frames was confirmed.
    VoiceStarted,
    /// Samples belonging to the current utterance (16 kHz mono).
    VoiceContinuing(Vec<f32>),
    /// The silence-confirmation window elapsed; the utterance is over.
    VoiceEnded,
}
