//! Speech-to-text stage contract.

use crate::error::{Result, VoxtaskError};
use crate::vad::AudioSegment;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Speech-to-text engine boundary.
///
/// Engines are external (on-device recognizers, whisper servers, ...); the
/// orchestrator only needs lazy model loading and per-segment transcription.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Load or warm up the model. Idempotent; may be slow.
    async fn load_model(&self) -> Result<()>;

    /// Whether the model is ready for transcription.
    fn is_loaded(&self) -> bool;

    /// Transcribe one utterance segment (16 kHz mono f32).
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String>;

    /// Name of the loaded model, for diagnostics.
    fn model_name(&self) -> &str;
}

/// Mock transcriber for testing.
///
/// Responds with scripted transcripts in order, with optional per-call
/// delays and failure injection.
#[derive(Default)]
pub struct MockTranscriber {
    responses: Mutex<Vec<String>>,
    delays: Mutex<Vec<Duration>>,
    loaded: AtomicBool,
    fail_load: bool,
    fail_transcribe: bool,
}

impl MockTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcripts returned in order; the last one repeats when exhausted.
    pub fn with_responses(self, responses: impl IntoIterator<Item = &'static str>) -> Self {
        *lock(&self.responses) = responses.into_iter().map(str::to_string).collect();
        self
    }

    /// Per-call transcription delays, consumed in order (then zero).
    pub fn with_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        *lock(&self.delays) = delays.into_iter().collect();
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn failing_transcribe(mut self) -> Self {
        self.fail_transcribe = true;
        self
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn load_model(&self) -> Result<()> {
        if self.fail_load {
            return Err(VoxtaskError::ModelLoad {
                message: "mock load failure".to_string(),
            });
        }
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn transcribe(&self, _segment: &AudioSegment) -> Result<String> {
        let delay = {
            let mut delays = lock(&self.delays);
            if delays.is_empty() {
                Duration::ZERO
            } else {
                delays.remove(0)
            }
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_transcribe {
            return Err(VoxtaskError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }

        let mut responses = lock(&self.responses);
        let text = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or_else(|| "mock transcription".to_string())
        };
        Ok(text)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
