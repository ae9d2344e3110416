//! The segment orchestrator: strictly ordered asynchronous processing.
//!
//! Segments arrive at unpredictable times while capture is live. They are
//! queued FIFO and consumed by a single worker task, so segment N+1's stages
//! never begin before segment N's have all finished, regardless of how long
//! each stage takes. Capture and segmentation stay concurrent with
//! processing; processing is never concurrent with itself.

use crate::audio::frame::FrameSource;
use crate::config::Config;
use crate::defaults;
use crate::error::{Result, VoxtaskError};
use crate::stages::rewrite::RewriteChain;
use crate::stages::sink::TaskSink;
use crate::stages::transcriber::Transcriber;
use crate::state::{PipelineState, SavedTask, StateCell};
use crate::vad::classifier::{EnergyClassifier, FrameClassifier};
use crate::vad::driver::{VadConfig, VadDriver, end_confirm_frames};
use crate::vad::segmenter::{AudioSegment, VoiceActivitySegmenter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};

/// Settings the orchestrator consumes but does not own.
#[derive(Clone)]
pub struct PipelineSettings {
    /// VAD hysteresis tuning (end window derived from the silence timeout).
    pub vad: VadConfig,
    /// Destination list id; live-updatable while the pipeline runs.
    pub selected_list: Arc<RwLock<Option<String>>>,
    /// How long an error state stays visible.
    pub error_display: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            selected_list: Arc::new(RwLock::new(None)),
            error_display: Duration::from_secs(defaults::ERROR_DISPLAY_SECONDS),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let vad = VadConfig {
            voice_start_probability: config.audio.voice_start_probability,
            voice_end_probability: config.audio.voice_end_probability,
            start_confirm_frames: config.audio.start_confirm_frames,
            end_confirm_frames: end_confirm_frames(config.silence_timeout_seconds()),
        };
        Self {
            vad,
            selected_list: Arc::new(RwLock::new(config.tasks.selected_list_id.clone())),
            error_display: Duration::from_secs(defaults::ERROR_DISPLAY_SECONDS),
        }
    }

    pub fn with_selected_list(self, list_id: impl Into<String>) -> Self {
        *write(&self.selected_list) = Some(list_id.into());
        self
    }

    pub fn with_error_display(mut self, error_display: Duration) -> Self {
        self.error_display = error_display;
        self
    }
}

/// Factory for per-session frame classifiers (each session gets fresh state).
pub type ClassifierFactory = Arc<dyn Fn() -> Box<dyn FrameClassifier> + Send + Sync>;

/// FIFO handle shared between the segmenter callback and `submit_segment`.
#[derive(Clone)]
struct SegmentQueue {
    depth: Arc<AtomicUsize>,
    tx: mpsc::UnboundedSender<AudioSegment>,
}

impl SegmentQueue {
    fn push(&self, segment: AudioSegment) {
        // Increment before send so depth never under-reports in-flight work.
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(segment).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("segment queue closed, dropping segment");
        }
    }
}

/// Everything a segment's stages need; owned by the worker task.
struct StageDeps {
    state: Arc<StateCell>,
    transcriber: Arc<dyn Transcriber>,
    rewriters: RewriteChain,
    sink: Arc<dyn TaskSink>,
    selected_list: Arc<RwLock<Option<String>>>,
}

/// Drives segments through transcription → rewrite → save, in order.
pub struct SegmentOrchestrator {
    state: Arc<StateCell>,
    queue: SegmentQueue,
    capture_active: Arc<AtomicBool>,
    frame_source: Box<dyn FrameSource>,
    segmenter: Option<Arc<Mutex<VoiceActivitySegmenter>>>,
    feed_thread: Option<std::thread::JoinHandle<()>>,
    vad: VadConfig,
    classifier_factory: ClassifierFactory,
    /// Serializes the end-of-drain state decision between `stop()` and the
    /// worker, so exactly one of them performs the final transition.
    settle: Arc<Mutex<()>>,
}

impl SegmentOrchestrator {
    /// Create the orchestrator and spawn its worker task.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        frame_source: Box<dyn FrameSource>,
        transcriber: Arc<dyn Transcriber>,
        rewriters: RewriteChain,
        sink: Arc<dyn TaskSink>,
        settings: PipelineSettings,
    ) -> Self {
        let state = Arc::new(StateCell::with_error_display(settings.error_display));
        let depth = Arc::new(AtomicUsize::new(0));
        let capture_active = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = SegmentQueue {
            depth: Arc::clone(&depth),
            tx,
        };

        let deps = StageDeps {
            state: Arc::clone(&state),
            transcriber,
            rewriters,
            sink,
            selected_list: Arc::clone(&settings.selected_list),
        };
        let settle = Arc::new(Mutex::new(()));
        tokio::spawn(worker_loop(
            rx,
            deps,
            Arc::clone(&depth),
            Arc::clone(&capture_active),
            Arc::clone(&settle),
        ));

        Self {
            state,
            queue,
            capture_active,
            frame_source,
            segmenter: None,
            feed_thread: None,
            vad: settings.vad,
            classifier_factory: Arc::new(|| Box::new(EnergyClassifier::default())),
            settle,
        }
    }

    /// Swap the frame classifier (the VAD inference seam).
    pub fn with_classifier_factory(mut self, factory: ClassifierFactory) -> Self {
        self.classifier_factory = factory;
        self
    }

    /// Begin a capture session.
    ///
    /// Rejected unless the pipeline is `Idle` or showing an error. Wires
    /// frame delivery → VAD driver → segmenter → the processing queue, then
    /// starts the frame source.
    pub fn start(&mut self) -> Result<()> {
        self.state.begin_session()?;
        self.capture_active.store(true, Ordering::SeqCst);

        let segmenter = Arc::new(Mutex::new(self.build_segmenter()));

        // Frames hop from the (possibly realtime) audio callback to a feed
        // thread over a bounded channel; the callback never blocks.
        let (frame_tx, frame_rx) =
            crossbeam_channel::bounded::<Vec<f32>>(defaults::FRAME_QUEUE_CAPACITY);
        let mut driver = VadDriver::new((self.classifier_factory)(), self.vad);
        let segmenter_for_feed = Arc::clone(&segmenter);
        let feed = std::thread::Builder::new()
            .name("voxtask-vad-feed".to_string())
            .spawn(move || {
                let mut events = Vec::new();
                while let Ok(samples) = frame_rx.recv() {
                    driver.feed(&samples, &mut events);
                    if events.is_empty() {
                        continue;
                    }
                    let mut segmenter = lock(&segmenter_for_feed);
                    for event in events.drain(..) {
                        segmenter.handle_event(event);
                    }
                }
            })?;

        let mut dropped: u64 = 0;
        let started = self.frame_source.start(Box::new(move |samples| {
            if frame_tx.try_send(samples.to_vec()).is_err() {
                dropped += 1;
                if dropped % 100 == 1 {
                    tracing::warn!(dropped, "frame queue full, dropping audio");
                }
            }
        }));

        if let Err(error) = started {
            self.capture_active.store(false, Ordering::SeqCst);
            // The failed source dropped the callback, so the feed thread's
            // channel is closed and it exits on its own.
            let _ = feed.join();
            StateCell::handle_error(&self.state, error.to_string());
            return Err(error);
        }

        self.segmenter = Some(segmenter);
        self.feed_thread = Some(feed);
        Ok(())
    }

    /// Stop capture and segmentation immediately.
    ///
    /// Flushes any partial utterance (possibly enqueuing one final segment).
    /// Already-queued segments run to completion in the background: the
    /// state becomes `FinalizingStt` while they drain, `Idle` otherwise.
    pub async fn stop(&mut self) {
        self.frame_source.stop();
        self.capture_active.store(false, Ordering::SeqCst);

        if let Some(feed) = self.feed_thread.take() {
            // The source dropped its callback, closing the frame channel.
            let _ = tokio::task::spawn_blocking(move || feed.join()).await;
        }

        let flushed = match self.segmenter.take() {
            Some(segmenter) => lock(&segmenter).flush_pending(),
            None => false,
        };
        // Under the settle gate: the depth check and the transition must not
        // interleave with the worker's decrement-and-transition, or the
        // state can be stranded in `FinalizingStt` (or revived to
        // `Listening`) with nothing draining.
        let depth;
        {
            let _gate = lock(&self.settle);
            depth = self.queue_depth();
            if depth > 0 {
                self.state.transition_to(PipelineState::FinalizingStt);
            } else {
                self.state.transition_to(PipelineState::Idle);
            }
        }
        tracing::debug!(flushed, depth, "capture stopped");
    }

    /// Inject a segment directly, bypassing capture and session gating.
    ///
    /// The pipeline processes it regardless of the current state, so the
    /// observed transitions start at `FinalizingStt` rather than the full
    /// capture sequence. Intended for driving the stages without a frame
    /// source (tests, replay).
    #[doc(hidden)]
    pub fn submit_segment(&self, segment: AudioSegment) {
        self.queue.push(segment);
    }

    /// Wait until every accepted segment has been fully processed.
    pub async fn drain(&self) {
        while self.queue_depth() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Segments accepted but not yet fully processed.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth.load(Ordering::SeqCst)
    }

    pub fn current_state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Read-only handle to the shared state (observation and hooks only;
    /// mutation stays inside the orchestrator).
    pub fn state_handle(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    pub fn last_saved(&self) -> Option<SavedTask> {
        self.state.last_saved()
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.last_error()
    }

    fn build_segmenter(&self) -> VoiceActivitySegmenter {
        let mut segmenter = VoiceActivitySegmenter::new();

        let state = Arc::clone(&self.state);
        segmenter.set_on_voice_started(Box::new(move || {
            // Only meaningful while listening; the visible state otherwise
            // tracks the head-of-line segment's stage.
            if state.current() == PipelineState::Listening {
                state.transition_to(PipelineState::Speaking);
            }
        }));

        let state = Arc::clone(&self.state);
        segmenter.set_on_voice_ended(Box::new(move || {
            // Stale or duplicate end events are ignored.
            if state.current() == PipelineState::Speaking {
                state.transition_to(PipelineState::SilenceCountdown);
            }
        }));

        let queue = self.queue.clone();
        segmenter.set_on_segment(Box::new(move |segment| {
            tracing::debug!(
                duration_seconds = segment.duration_seconds,
                "segment accepted"
            );
            queue.push(segment);
        }));

        segmenter
    }
}

/// Single consumer of the FIFO queue: at most one segment's stages run at a
/// time, in arrival order.
async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<AudioSegment>,
    deps: StageDeps,
    depth: Arc<AtomicUsize>,
    capture_active: Arc<AtomicBool>,
    settle: Arc<Mutex<()>>,
) {
    while let Some(segment) = rx.recv().await {
        process_segment(&deps, segment).await;

        // Decrement and transition under the settle gate shared with
        // `SegmentOrchestrator::stop`; see the comment there.
        let _gate = lock(&settle);
        let remaining = depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        if remaining == 0 {
            let next = if capture_active.load(Ordering::SeqCst) {
                PipelineState::Listening
            } else {
                PipelineState::Idle
            };
            deps.state.transition_to(next);
        }
    }
}

/// One segment's stages. Failures abandon the segment, never the pipeline.
async fn process_segment(deps: &StageDeps, segment: AudioSegment) {
    if !deps.transcriber.is_loaded() {
        if let Err(error) = deps.transcriber.load_model().await {
            StateCell::handle_error(&deps.state, error.to_string());
            return;
        }
    }

    deps.state.transition_to(PipelineState::FinalizingStt);
    let transcript = match deps.transcriber.transcribe(&segment).await {
        Ok(text) => text,
        Err(error) => {
            StateCell::handle_error(&deps.state, error.to_string());
            return;
        }
    };

    deps.state.transition_to(PipelineState::Rewriting);
    // Degradable: the chain falls back to the verbatim transcript.
    let rewrite = deps.rewriters.rewrite_with_fallback(&transcript).await;

    deps.state.transition_to(PipelineState::Saving);
    let list_id = read(&deps.selected_list).clone();
    let Some(list_id) = list_id else {
        StateCell::handle_error(&deps.state, VoxtaskError::NoListSelected.to_string());
        return;
    };

    let notes = rewrite.format_task_body(&transcript);
    match deps
        .sink
        .create_task(&list_id, &rewrite.revised, Some(&notes))
        .await
    {
        Ok(task_id) => {
            deps.state.record_saved(SavedTask {
                task_id,
                title: rewrite.revised,
                notes: Some(notes),
                saved_at: SystemTime::now(),
            });
        }
        Err(error) => {
            StateCell::handle_error(&deps.state, format!("Save failed: {}", error));
        }
    }
}

fn lock<T>(mutex: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
