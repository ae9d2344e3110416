//! Frame source contract: fixed-cadence delivery of mono float samples.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Callback invoked for each delivered block of mono f32 samples.
///
/// The slice is only valid for the duration of the call; implementations must
/// copy anything they want to keep. The callback may run on a
/// realtime-priority thread and must never block on I/O.
pub type FrameCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Source of raw audio frames.
///
/// Push-style: the source owns its delivery thread (or OS callback) and calls
/// the provided callback at a fixed cadence. There is no backpressure signal.
pub trait FrameSource: Send {
    /// Begin delivering frames to `on_frame`.
    fn start(&mut self, on_frame: FrameCallback) -> Result<()>;

    /// Stop delivery. Drops the callback; no frames arrive after this returns.
    fn stop(&mut self);

    /// Whether the source is currently delivering frames.
    fn is_running(&self) -> bool;
}

/// Frame source driven manually from tests.
///
/// `start` stores the callback; a [`ScriptedFrameHandle`] pushes sample blocks
/// through it on the caller's thread.
#[derive(Default)]
pub struct ScriptedFrameSource {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    running: Arc<AtomicBool>,
}

impl ScriptedFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for pushing frames into the stored callback.
    pub fn handle(&self) -> ScriptedFrameHandle {
        ScriptedFrameHandle {
            callback: Arc::clone(&self.callback),
            running: Arc::clone(&self.running),
        }
    }
}

impl FrameSource for ScriptedFrameSource {
    fn start(&mut self, on_frame: FrameCallback) -> Result<()> {
        let mut slot = match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(on_frame);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let mut slot = match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Dropping the callback closes the downstream frame channel.
        *slot = None;
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Pushes frames into a [`ScriptedFrameSource`]'s callback.
#[derive(Clone)]
pub struct ScriptedFrameHandle {
    callback: Arc<Mutex<Option<FrameCallback>>>,
    running: Arc<AtomicBool>,
}

impl ScriptedFrameHandle {
    /// Deliver one block of samples. Silently ignored when the source is
    /// stopped, mirroring how a real device stops calling back.
    pub fn emit(&self, samples: &[f32]) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut slot = match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(callback) = slot.as_mut() {
            callback(samples);
        }
    }
}
