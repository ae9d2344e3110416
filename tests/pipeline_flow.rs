//! End-to-end pipeline tests: scripted frames in, recorded tasks out.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use voxtask::audio::frame::ScriptedFrameSource;
use voxtask::error::{Result, VoxtaskError};
use voxtask::stages::rewrite::{RewriteChain, RewriteResult, Rewriter};
use voxtask::stages::sink::{MockTaskSink, TaskSink};
use voxtask::stages::transcriber::MockTranscriber;
use voxtask::vad::{AudioSegment, VadConfig};
use voxtask::{PipelineSettings, PipelineState, SegmentOrchestrator};

const FRAME: usize = 512;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Short hysteresis windows so tests confirm start/end with few frames.
fn fast_vad() -> VadConfig {
    VadConfig {
        voice_start_probability: 0.7,
        voice_end_probability: 0.7,
        start_confirm_frames: 3,
        end_confirm_frames: 5,
    }
}

fn settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default().with_selected_list("inbox");
    settings.vad = fast_vad();
    settings
}

fn speech_frame() -> Vec<f32> {
    vec![0.3; FRAME]
}

fn silence_frame() -> Vec<f32> {
    vec![0.0; FRAME]
}

/// Poll until `condition` holds or a deadline passes.
async fn wait_for(condition: impl Fn() -> bool, what: &str) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Record every state transition for later assertions.
fn record_transitions(orchestrator: &SegmentOrchestrator) -> Arc<Mutex<Vec<PipelineState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    orchestrator
        .state_handle()
        .set_transition_hook(Box::new(move |state| {
            sink.lock().expect("transitions lock").push(state.clone());
        }));
    seen
}

struct FailingRewriter;

#[async_trait]
impl Rewriter for FailingRewriter {
    async fn rewrite(&self, _original: &str) -> Result<RewriteResult> {
        Err(VoxtaskError::Rewrite {
            message: "provider down".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn test_utterance_flows_to_saved_task_with_ordered_states() {
    init_tracing();
    let mut source = ScriptedFrameSource::new();
    let handle = source.handle();
    let sink = Arc::new(MockTaskSink::new());
    let mut orchestrator = SegmentOrchestrator::new(
        Box::new(source),
        Arc::new(MockTranscriber::new().with_responses(["call the dentist"])),
        RewriteChain::new(),
        Arc::clone(&sink) as Arc<dyn TaskSink>,
        settings(),
    );
    let transitions = record_transitions(&orchestrator);

    orchestrator.start().expect("start");
    assert_eq!(orchestrator.current_state(), PipelineState::Listening);

    for _ in 0..6 {
        handle.emit(&speech_frame());
    }
    wait_for(
        || orchestrator.current_state() == PipelineState::Speaking,
        "speech onset",
    )
    .await;

    for _ in 0..8 {
        handle.emit(&silence_frame());
    }
    wait_for(|| sink.recorded().len() == 1, "task saved").await;
    orchestrator.drain().await;
    orchestrator.stop().await;

    let recorded = sink.recorded();
    assert_eq!(recorded[0].list_id, "inbox");
    assert_eq!(recorded[0].title, "call the dentist");

    let saved = orchestrator.last_saved().expect("saved task");
    assert_eq!(saved.title, "call the dentist");

    // State walks the full stage sequence in order.
    let seen = transitions.lock().expect("transitions lock").clone();
    let expected = [
        PipelineState::Listening,
        PipelineState::Speaking,
        PipelineState::SilenceCountdown,
        PipelineState::FinalizingStt,
        PipelineState::Rewriting,
        PipelineState::Saving,
    ];
    let mut cursor = seen.iter();
    for step in &expected {
        assert!(
            cursor.any(|s| s == step),
            "missing {step:?} in {seen:?}"
        );
    }
    assert!(
        !seen.iter().any(|s| s.is_error()),
        "no error expected: {seen:?}"
    );
    assert_eq!(orchestrator.current_state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_segments_processed_in_arrival_order_despite_slow_head() {
    init_tracing();
    let sink = Arc::new(MockTaskSink::new());
    let orchestrator = SegmentOrchestrator::new(
        Box::new(ScriptedFrameSource::new()),
        Arc::new(
            MockTranscriber::new()
                .with_responses(["first utterance", "second utterance"])
                .with_delays([Duration::from_millis(150), Duration::from_millis(5)]),
        ),
        RewriteChain::new(),
        Arc::clone(&sink) as Arc<dyn TaskSink>,
        settings(),
    );

    orchestrator.submit_segment(AudioSegment::from_samples(vec![0.1; FRAME]));
    orchestrator.submit_segment(AudioSegment::from_samples(vec![0.1; FRAME]));
    assert_eq!(orchestrator.queue_depth(), 2);
    orchestrator.drain().await;

    let titles: Vec<_> = sink.recorded().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["first utterance", "second utterance"]);
    assert_eq!(orchestrator.queue_depth(), 0);
}

#[tokio::test]
async fn test_stop_mid_utterance_flushes_partial_segment() {
    init_tracing();
    let mut source = ScriptedFrameSource::new();
    let handle = source.handle();
    let sink = Arc::new(MockTaskSink::new());
    let mut orchestrator = SegmentOrchestrator::new(
        Box::new(source),
        Arc::new(
            MockTranscriber::new()
                .with_responses(["half a thought"])
                .with_delays([Duration::from_millis(100)]),
        ),
        RewriteChain::new(),
        Arc::clone(&sink) as Arc<dyn TaskSink>,
        settings(),
    );

    orchestrator.start().expect("start");
    for _ in 0..6 {
        handle.emit(&speech_frame());
    }
    wait_for(
        || orchestrator.current_state() == PipelineState::Speaking,
        "speech onset",
    )
    .await;

    // Stop while still mid-utterance: no silence window ever elapsed.
    orchestrator.stop().await;
    assert_eq!(orchestrator.current_state(), PipelineState::FinalizingStt);

    orchestrator.drain().await;
    wait_for(
        || orchestrator.current_state() == PipelineState::Idle,
        "return to idle",
    )
    .await;
    assert_eq!(sink.recorded().len(), 1);
    assert_eq!(sink.recorded()[0].title, "half a thought");
}

#[tokio::test]
async fn test_stop_racing_segment_completion_always_settles() {
    init_tracing();
    // Vary how far the worker has gotten when stop lands; every
    // interleaving must settle to Idle with the queue empty and allow a
    // fresh session afterwards.
    for lag_us in [0u64, 50, 200, 800, 3_000, 10_000] {
        let sink = Arc::new(MockTaskSink::new());
        let mut orchestrator = SegmentOrchestrator::new(
            Box::new(ScriptedFrameSource::new()),
            Arc::new(
                MockTranscriber::new()
                    .with_responses(["racing"])
                    .with_delays([Duration::from_micros(lag_us)]),
            ),
            RewriteChain::new(),
            Arc::clone(&sink) as Arc<dyn TaskSink>,
            settings(),
        );

        orchestrator.start().expect("start");
        orchestrator.submit_segment(AudioSegment::from_samples(vec![0.1; FRAME]));
        tokio::time::sleep(Duration::from_micros(lag_us / 2)).await;
        orchestrator.stop().await;

        orchestrator.drain().await;
        wait_for(
            || orchestrator.current_state() == PipelineState::Idle,
            "settle to idle",
        )
        .await;
        assert_eq!(orchestrator.queue_depth(), 0, "lag {lag_us}us");
        orchestrator
            .start()
            .expect("a new session must be possible after stop");
        orchestrator.stop().await;
    }
}

#[tokio::test]
async fn test_rewrite_failures_degrade_to_verbatim_transcript() {
    init_tracing();
    let sink = Arc::new(MockTaskSink::new());
    let orchestrator = SegmentOrchestrator::new(
        Box::new(ScriptedFrameSource::new()),
        Arc::new(MockTranscriber::new().with_responses(["pick up groceries"])),
        RewriteChain::new()
            .with_provider(Arc::new(FailingRewriter))
            .with_provider(Arc::new(FailingRewriter)),
        Arc::clone(&sink) as Arc<dyn TaskSink>,
        settings(),
    );
    let transitions = record_transitions(&orchestrator);

    orchestrator.submit_segment(AudioSegment::from_samples(vec![0.1; FRAME]));
    orchestrator.drain().await;

    let recorded = sink.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].title, "pick up groceries");
    let notes = recorded[0].notes.as_deref().expect("notes");
    assert!(notes.contains("(rewrite unavailable)"), "notes: {notes}");
    assert!(notes.contains("Original: pick up groceries"));

    let seen = transitions.lock().expect("transitions lock").clone();
    assert!(
        !seen.iter().any(|s| s.is_error()),
        "rewrite failure must not error the pipeline: {seen:?}"
    );
}

#[tokio::test]
async fn test_missing_list_reports_error_and_recovers() {
    init_tracing();
    let sink = Arc::new(MockTaskSink::new());
    let settings = PipelineSettings {
        vad: fast_vad(),
        selected_list: Arc::new(RwLock::new(None)),
        error_display: Duration::from_millis(50),
    };
    let orchestrator = SegmentOrchestrator::new(
        Box::new(ScriptedFrameSource::new()),
        Arc::new(MockTranscriber::new()),
        RewriteChain::new(),
        Arc::clone(&sink) as Arc<dyn TaskSink>,
        settings,
    );

    orchestrator.submit_segment(AudioSegment::from_samples(vec![0.1; FRAME]));
    orchestrator.drain().await;

    assert!(sink.recorded().is_empty());
    assert_eq!(
        orchestrator.last_error().as_deref(),
        Some("No destination list selected")
    );
    // The failure abandons the segment; the pipeline idles again.
    wait_for(
        || orchestrator.current_state() == PipelineState::Idle,
        "error auto-clear",
    )
    .await;
}

#[tokio::test]
async fn test_consecutive_utterances_while_first_still_processing() {
    init_tracing();
    let mut source = ScriptedFrameSource::new();
    let handle = source.handle();
    let sink = Arc::new(MockTaskSink::new());
    let mut orchestrator = SegmentOrchestrator::new(
        Box::new(source),
        Arc::new(
            MockTranscriber::new()
                .with_responses(["one", "two"])
                .with_delays([Duration::from_millis(200)]),
        ),
        RewriteChain::new(),
        Arc::clone(&sink) as Arc<dyn TaskSink>,
        settings(),
    );

    orchestrator.start().expect("start");

    // First utterance.
    for _ in 0..6 {
        handle.emit(&speech_frame());
    }
    for _ in 0..8 {
        handle.emit(&silence_frame());
    }
    wait_for(|| orchestrator.queue_depth() >= 1, "first segment queued").await;

    // Second utterance arrives while the first is still transcribing.
    for _ in 0..6 {
        handle.emit(&speech_frame());
    }
    for _ in 0..8 {
        handle.emit(&silence_frame());
    }

    wait_for(|| sink.recorded().len() == 2, "both tasks saved").await;
    orchestrator.drain().await;
    orchestrator.stop().await;

    let titles: Vec<_> = sink.recorded().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, ["one", "two"]);
}
