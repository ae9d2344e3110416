//! Hysteresis over frame classifications.
//!
//! The driver windows arbitrary-size sample deliveries into fixed ~32 ms
//! frames, asks the classifier for a per-frame speech probability, and only
//! commits to start/end decisions after a confirmation run of consecutive
//! frames. Single noisy frames neither fragment an utterance nor end it.

use crate::defaults;
use crate::vad::VadEvent;
use crate::vad::classifier::FrameClassifier;

/// Number of consecutive silent frames required before declaring voice end,
/// derived from the configured silence timeout (e.g. 3.0 s → 94 frames).
pub fn end_confirm_frames(timeout_seconds: f64) -> usize {
    (timeout_seconds / defaults::VAD_FRAME_SECONDS).ceil() as usize
}

/// Hysteresis configuration for the VAD driver.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Probability at or above which a frame counts as speech for starting.
    pub voice_start_probability: f32,
    /// Probability below which a frame counts as silence for ending.
    pub voice_end_probability: f32,
    /// Consecutive speech frames required to confirm voice start.
    pub start_confirm_frames: usize,
    /// Consecutive silent frames required to confirm voice end.
    pub end_confirm_frames: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            voice_start_probability: defaults::VOICE_START_PROBABILITY,
            voice_end_probability: defaults::VOICE_END_PROBABILITY,
            start_confirm_frames: defaults::START_CONFIRM_FRAMES,
            end_confirm_frames: end_confirm_frames(defaults::SILENCE_TIMEOUT_SECONDS),
        }
    }
}

impl VadConfig {
    /// Derive the end-confirmation window from a silence timeout in seconds.
    pub fn with_silence_timeout(mut self, seconds: f64) -> Self {
        self.end_confirm_frames = end_confirm_frames(seconds);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    /// No speech; frames are dropped.
    Quiet,
    /// Speech frames arriving, start not yet confirmed.
    PendingStart,
    /// Voice confirmed; frames flow to the segmenter.
    Voiced,
    /// Silent frames arriving, end not yet confirmed.
    PendingEnd,
}

/// Voice activity driver: windows samples, classifies, applies hysteresis.
pub struct VadDriver<C> {
    classifier: C,
    config: VadConfig,
    state: DriverState,
    /// Samples not yet filling a whole classification window.
    carry: Vec<f32>,
    /// Consecutive frames agreeing with the pending decision.
    streak: usize,
    /// Speech frames observed before the start decision was confirmed.
    /// Released as the first `VoiceContinuing` so the onset is not lost.
    pending_onset: Vec<f32>,
}

impl<C: FrameClassifier> VadDriver<C> {
    pub fn new(classifier: C, config: VadConfig) -> Self {
        Self {
            classifier,
            config,
            state: DriverState::Quiet,
            carry: Vec::new(),
            streak: 0,
            pending_onset: Vec::new(),
        }
    }

    /// Feed one delivery of samples. Events (possibly none) are appended to
    /// `events` in the order they occurred.
    pub fn feed(&mut self, samples: &[f32], events: &mut Vec<VadEvent>) {
        self.carry.extend_from_slice(samples);

        let mut offset = 0;
        while self.carry.len() - offset >= defaults::VAD_FRAME_SAMPLES {
            let frame_end = offset + defaults::VAD_FRAME_SAMPLES;
            // Split borrow: classify a copy-free slice of the carry buffer.
            let probability = {
                let frame = &self.carry[offset..frame_end];
                self.classifier.speech_probability(frame)
            };
            self.advance(probability, offset, frame_end, events);
            offset = frame_end;
        }
        self.carry.drain(..offset);
    }

    /// Reset to quiet, dropping carried samples and any pending onset.
    pub fn reset(&mut self) {
        self.state = DriverState::Quiet;
        self.carry.clear();
        self.streak = 0;
        self.pending_onset.clear();
    }

    fn advance(
        &mut self,
        probability: f32,
        frame_start: usize,
        frame_end: usize,
        events: &mut Vec<VadEvent>,
    ) {
        let is_start_speech = probability >= self.config.voice_start_probability;
        let is_end_silence = probability < self.config.voice_end_probability;

        match self.state {
            DriverState::Quiet => {
                if is_start_speech {
                    self.pending_onset = self.carry[frame_start..frame_end].to_vec();
                    self.streak = 1;
                    if self.streak >= self.config.start_confirm_frames {
                        self.confirm_start(events);
                    } else {
                        self.state = DriverState::PendingStart;
                    }
                }
            }
            DriverState::PendingStart => {
                if is_start_speech {
                    self.pending_onset.extend_from_slice(&self.carry[frame_start..frame_end]);
                    self.streak += 1;
                    if self.streak >= self.config.start_confirm_frames {
                        self.confirm_start(events);
                    }
                } else {
                    // Confirmation run broken; discard the candidate onset.
                    self.state = DriverState::Quiet;
                    self.streak = 0;
                    self.pending_onset.clear();
                }
            }
            DriverState::Voiced => {
                events.push(VadEvent::VoiceContinuing(
                    self.carry[frame_start..frame_end].to_vec(),
                ));
                if is_end_silence {
                    self.state = DriverState::PendingEnd;
                    self.streak = 1;
                    self.maybe_confirm_end(events);
                }
            }
            DriverState::PendingEnd => {
                events.push(VadEvent::VoiceContinuing(
                    self.carry[frame_start..frame_end].to_vec(),
                ));
                if is_end_silence {
                    self.streak += 1;
                    self.maybe_confirm_end(events);
                } else {
                    self.state = DriverState::Voiced;
                    self.streak = 0;
                }
            }
        }
    }

    fn confirm_start(&mut self, events: &mut Vec<VadEvent>) {
        self.state = DriverState::Voiced;
        self.streak = 0;
        events.push(VadEvent::VoiceStarted);
        events.push(VadEvent::VoiceContinuing(std::mem::take(
            &mut self.pending_onset,
        )));
    }

    fn maybe_confirm_end(&mut self, events: &mut Vec<VadEvent>) {
        if self.streak >= self.config.end_confirm_frames {
            self.state = DriverState::Quiet;
            self.streak = 0;
            events.push(VadEvent::VoiceEnded);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::classifier::ScriptedClassifier;

    const FRAME: usize = defaults::VAD_FRAME_SAMPLES;

    fn driver_with(probabilities: Vec<f32>, config: VadConfig) -> VadDriver<ScriptedClassifier> {
        VadDriver::new(ScriptedClassifier::new(probabilities), config)
    }

    fn quick_config() -> VadConfig {
        VadConfig {
            voice_start_probability: 0.7,
            voice_end_probability: 0.7,
            start_confirm_frames: 2,
            end_confirm_frames: 3,
        }
    }

    fn feed_frames(driver: &mut VadDriver<ScriptedClassifier>, count: usize) -> Vec<VadEvent> {
        let mut events = Vec::new();
        driver.feed(&vec![0.1; FRAME * count], &mut events);
        events
    }

    #[test]
    fn test_end_confirm_frames_derivation() {
        assert_eq!(end_confirm_frames(3.0), 94);
        assert_eq!(end_confirm_frames(1.0), 32);
        assert_eq!(end_confirm_frames(10.0), 313);
    }

    #[test]
    fn test_default_config_uses_derived_end_frames() {
        let config = VadConfig::default();
        assert_eq!(config.end_confirm_frames, 94);
        assert_eq!(config.start_confirm_frames, 10);
    }

    #[test]
    fn test_with_silence_timeout() {
        let config = VadConfig::default().with_silence_timeout(1.5);
        assert_eq!(config.end_confirm_frames, 47);
    }

    #[test]
    fn test_quiet_frames_produce_no_events() {
        let mut driver = driver_with(vec![0.0; 8], quick_config());
        let events = feed_frames(&mut driver, 8);
        assert!(events.is_empty());
    }

    #[test]
    fn test_start_confirmed_after_run_includes_onset() {
        let mut driver = driver_with(vec![0.9, 0.9, 0.9], quick_config());
        let events = feed_frames(&mut driver, 3);

        assert_eq!(events[0], VadEvent::VoiceStarted);
        // Onset holds both confirmation frames, then steady-state frames follow.
        match &events[1] {
            VadEvent::VoiceContinuing(chunk) => assert_eq!(chunk.len(), FRAME * 2),
            other => panic!("expected onset chunk, got {:?}", other),
        }
        match &events[2] {
            VadEvent::VoiceContinuing(chunk) => assert_eq!(chunk.len(), FRAME),
            other => panic!("expected continuing chunk, got {:?}", other),
        }
    }

    #[test]
    fn test_single_speech_frame_does_not_start() {
        let mut driver = driver_with(vec![0.9, 0.1, 0.9, 0.1], quick_config());
        let events = feed_frames(&mut driver, 4);
        assert!(events.is_empty(), "flapping must not confirm a start");
    }

    #[test]
    fn test_end_after_silence_run() {
        // 2 speech frames to start, then 3 silent frames to end.
        let mut driver = driver_with(vec![0.9, 0.9, 0.1, 0.1, 0.1], quick_config());
        let events = feed_frames(&mut driver, 5);
        assert_eq!(events.last(), Some(&VadEvent::VoiceEnded));
        let continuing = events
            .iter()
            .filter(|e| matches!(e, VadEvent::VoiceContinuing(_)))
            .count();
        // onset chunk + 3 countdown frames
        assert_eq!(continuing, 4);
    }

    #[test]
    fn test_brief_silence_does_not_end() {
        let mut driver = driver_with(vec![0.9, 0.9, 0.1, 0.1, 0.9, 0.1, 0.1], quick_config());
        let events = feed_frames(&mut driver, 7);
        assert!(
            !events.contains(&VadEvent::VoiceEnded),
            "silence shorter than the confirmation window must not end the utterance"
        );
    }

    #[test]
    fn test_partial_window_is_carried() {
        let mut driver = driver_with(vec![0.9, 0.9], quick_config());
        let mut events = Vec::new();

        driver.feed(&vec![0.1; FRAME / 2], &mut events);
        assert!(events.is_empty(), "half a window classifies nothing");

        driver.feed(&vec![0.1; FRAME / 2], &mut events);
        assert!(events.is_empty(), "one speech frame is not a start yet");

        driver.feed(&vec![0.1; FRAME], &mut events);
        assert_eq!(events.first(), Some(&VadEvent::VoiceStarted));
    }

    #[test]
    fn test_reset_clears_carry_and_pending() {
        let mut driver = driver_with(vec![0.9, 0.9, 0.9], quick_config());
        let mut events = Vec::new();
        driver.feed(&vec![0.1; FRAME], &mut events);
        driver.reset();

        driver.feed(&vec![0.1; FRAME], &mut events);
        assert!(events.is_empty(), "reset must drop the pending start run");
    }
}
