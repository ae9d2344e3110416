//! Audio input: the frame source contract and capture backends.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;

pub use frame::{FrameCallback, FrameSource, ScriptedFrameSource};

#[cfg(feature = "cpal-audio")]
pub use capture::CpalFrameSource;
