//! Default tuning values shared across the crate.

/// Sample rate every segment is expressed in, regardless of capture rate.
pub const INTERNAL_SAMPLE_RATE: u32 = 16_000;

/// Classification window used by the VAD front-end (~32 ms).
pub const VAD_FRAME_SECONDS: f64 = 0.032;

/// Samples per classification window at [`INTERNAL_SAMPLE_RATE`].
pub const VAD_FRAME_SAMPLES: usize = 512;

/// Probability above which a frame counts toward a voice-start decision.
pub const VOICE_START_PROBABILITY: f32 = 0.7;

/// Probability below which a frame counts toward a voice-end decision.
pub const VOICE_END_PROBABILITY: f32 = 0.7;

/// Consecutive speech frames required before committing to "voice started".
pub const START_CONFIRM_FRAMES: usize = 10;

/// Silence timeout before an utterance is considered finished.
pub const SILENCE_TIMEOUT_SECONDS: f64 = 3.0;
pub const MIN_SILENCE_TIMEOUT_SECONDS: f64 = 1.0;
pub const MAX_SILENCE_TIMEOUT_SECONDS: f64 = 10.0;

/// How long an `Error` state stays visible before auto-clearing.
pub const ERROR_DISPLAY_SECONDS: u64 = 3;

/// Capacity of the channel between the realtime audio callback and the VAD
/// feed thread. The callback uses `try_send` and must never block.
pub const FRAME_QUEUE_CAPACITY: usize = 1024;

/// OpenRouter chat completions endpoint used by the rewrite stage.
pub const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Models tried by OpenRouter's server-side fallback route, in order.
pub const OPENROUTER_MODELS: [&str; 3] = [
    "openrouter/free",
    "deepseek/deepseek-chat",
    "google/gemini-2.0-flash-exp:free",
];

/// Microsoft Graph API base for the task sink.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Correction label used when every rewrite provider failed.
pub const REWRITE_UNAVAILABLE_MARKER: &str = "(rewrite unavailable)";
