//! Utterance segmentation over VAD events.

use crate::defaults;
use crate::vad::VadEvent;

/// One contiguous span of detected speech, ready for transcription.
///
/// Samples are 16 kHz mono; immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub duration_seconds: f64,
}

impl AudioSegment {
    pub fn from_samples(samples: Vec<f32>) -> Self {
        let duration_seconds = samples.len() as f64 / defaults::INTERNAL_SAMPLE_RATE as f64;
        Self {
            samples,
            duration_seconds,
        }
    }
}

/// Builds [`AudioSegment`]s from the VAD event stream.
///
/// Owns the accumulation buffer exclusively. Methods take `&mut self`; when
/// audio delivery and control run on different threads the caller shares the
/// segmenter behind a mutex, which is the single serialized access path the
/// buffer requires.
#[derive(Default)]
pub struct VoiceActivitySegmenter {
    buffer: Vec<f32>,
    accumulating: bool,
    on_voice_started: Option<Box<dyn Fn() + Send>>,
    on_voice_ended: Option<Box<dyn Fn() + Send>>,
    on_segment: Option<Box<dyn Fn(AudioSegment) + Send>>,
}

impl VoiceActivitySegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer for confirmed voice starts.
    pub fn set_on_voice_started(&mut self, callback: Box<dyn Fn() + Send>) {
        self.on_voice_started = Some(callback);
    }

    /// Observer for confirmed voice ends (fires whether or not a segment
    /// was produced).
    pub fn set_on_voice_ended(&mut self, callback: Box<dyn Fn() + Send>) {
        self.on_voice_ended = Some(callback);
    }

    /// Receiver for completed segments.
    pub fn set_on_segment(&mut self, callback: Box<dyn Fn(AudioSegment) + Send>) {
        self.on_segment = Some(callback);
    }

    pub fn is_accumulating(&self) -> bool {
        self.accumulating
    }

    /// Consume one VAD event.
    pub fn handle_event(&mut self, event: VadEvent) {
        match event {
            VadEvent::VoiceStarted => {
                // Clear first so nothing leaks between utterances.
                self.buffer.clear();
                self.accumulating = true;
                if let Some(callback) = &self.on_voice_started {
                    callback();
                }
            }
            VadEvent::VoiceContinuing(chunk) => {
                // Late or duplicate events after an end are silently dropped.
                if self.accumulating {
                    self.buffer.extend_from_slice(&chunk);
                }
            }
            VadEvent::VoiceEnded => {
                self.finish_utterance();
            }
        }
    }

    /// Synthesize a voice-end while accumulation is in progress, bypassing
    /// the silence-timeout hysteresis. Used when capture stops mid-utterance.
    ///
    /// Returns whether a segment was emitted.
    pub fn flush_pending(&mut self) -> bool {
        if !self.accumulating {
            return false;
        }
        self.finish_utterance()
    }

    fn finish_utterance(&mut self) -> bool {
        self.accumulating = false;
        let segment = if self.buffer.is_empty() {
            None
        } else {
            Some(AudioSegment::from_samples(std::mem::take(&mut self.buffer)))
        };
        self.buffer.clear();

        if let Some(callback) = &self.on_voice_ended {
            callback();
        }

        match segment {
            Some(segment) => {
                if let Some(callback) = &self.on_segment {
                    callback(segment);
                }
                true
            }
            None => false,
        }
    }
}
