//! voxtask turns short spoken utterances into items on a task list.
//!
//! Microphone frames flow through voice activity detection and a
//! segmenter that cuts them into utterances; each utterance is queued and
//! processed strictly in order through transcription, an LLM rewrite with
//! fallback, and persistence to the selected task list. The pipeline's
//! state is observable throughout via a watch channel.
//!
//! The external engines (speech-to-text, rewrite providers, the task
//! store) sit behind traits with public mocks, so the whole pipeline is
//! testable without audio hardware or network access.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod orchestrator;
pub mod stages;
pub mod state;
pub mod vad;

pub use config::Config;
pub use error::{Result, VoxtaskError};
pub use orchestrator::{PipelineSettings, SegmentOrchestrator};
pub use state::{PipelineState, SavedTask, StateCell};
