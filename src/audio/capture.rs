//! Real audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::frame::{FrameCallback, FrameSource};
use crate::defaults;
use crate::error::{Result, VoxtaskError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched from the thread that owns the
/// CpalFrameSource; it is stored and dropped, never shared.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone frame source backed by CPAL.
///
/// Opens the device's default input config, downmixes to mono and resamples
/// to 16 kHz in software, then pushes blocks of f32 samples to the callback.
pub struct CpalFrameSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    running: Arc<AtomicBool>,
}

impl CpalFrameSource {
    /// Create a frame source for the named device, or the system default.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| VoxtaskError::AudioCapture {
                    message: format!("Failed to enumerate input devices: {}", e),
                })?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| VoxtaskError::AudioDeviceNotFound {
                    device: name.to_string(),
                })?,
            None => {
                host.default_input_device()
                    .ok_or_else(|| VoxtaskError::AudioDeviceNotFound {
                        device: "default".to_string(),
                    })?
            }
        };

        Ok(Self {
            device,
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    fn build_stream(&self, mut on_frame: FrameCallback) -> Result<cpal::Stream> {
        let supported =
            self.device
                .default_input_config()
                .map_err(|e| VoxtaskError::AudioCapture {
                    message: format!("No supported input config: {}", e),
                })?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;
        let mut resampler =
            LinearResampler::new(config.sample_rate.0, defaults::INTERNAL_SAMPLE_RATE);
        let mut mono = Vec::new();
        let mut out = Vec::new();

        let err_fn = |e| tracing::error!(error = %e, "audio stream error");

        macro_rules! input_stream {
            ($ty:ty, $to_f32:expr) => {{
                self.device
                    .build_input_stream(
                        &config,
                        move |data: &[$ty], _: &cpal::InputCallbackInfo| {
                            downmix(data, channels, $to_f32, &mut mono);
                            resampler.process(&mono, &mut out);
                            if !out.is_empty() {
                                on_frame(&out);
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| VoxtaskError::AudioCapture {
                        message: format!("Failed to build input stream: {}", e),
                    })
            }};
        }

        match sample_format {
            cpal::SampleFormat::F32 => input_stream!(f32, |s: f32| s),
            cpal::SampleFormat::I16 => input_stream!(i16, |s: i16| s as f32 / 32_768.0),
            cpal::SampleFormat::U16 => {
                input_stream!(u16, |s: u16| (s as f32 - 32_768.0) / 32_768.0)
            }
            other => Err(VoxtaskError::AudioCapture {
                message: format!("Unsupported sample format: {:?}", other),
            }),
        }
    }
}

impl FrameSource for CpalFrameSource {
    fn start(&mut self, on_frame: FrameCallback) -> Result<()> {
        let stream = self.build_stream(on_frame)?;
        stream.play().map_err(|e| VoxtaskError::AudioCapture {
            message: format!("Failed to start stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the stream stops capture and releases the callback.
        self.stream = None;
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Average interleaved channels down to mono f32.
fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32, mono: &mut Vec<f32>) {
    mono.clear();
    if channels <= 1 {
        mono.extend(data.iter().copied().map(to_f32));
        return;
    }
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().copied().map(&to_f32).sum();
        mono.push(sum / channels as f32);
    }
}

/// Streaming linear-interpolation resampler.
///
/// Keeps fractional read position and the previous sample across calls so
/// block boundaries do not click.
struct LinearResampler {
    ratio: f64,
    position: f64,
    previous: f32,
    primed: bool,
}

impl LinearResampler {
    fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            ratio: source_rate as f64 / target_rate as f64,
            position: 0.0,
            previous: 0.0,
            primed: false,
        }
    }

    fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        output.clear();
        if input.is_empty() {
            return;
        }
        if (self.ratio - 1.0).abs() < f64::EPSILON {
            output.extend_from_slice(input);
            return;
        }
        if !self.primed {
            self.previous = input[0];
            self.primed = true;
        }
        // position is relative to `previous` at index 0, input[0] at index 1
        while self.position < input.len() as f64 {
            let idx = self.position as usize;
            let frac = (self.position - idx as f64) as f32;
            let a = if idx == 0 { self.previous } else { input[idx - 1] };
            let b = input[idx];
            output.push(a + (b - a) * frac);
            self.position += self.ratio;
        }
        self.position -= input.len() as f64;
        self.previous = input[input.len() - 1];
    }
}
