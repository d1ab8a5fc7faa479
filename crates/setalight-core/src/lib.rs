//! Audio graph, envelopes and click timing for live pad and metronome playback.
//!
//! # Primary API
//!
//! - [`AudioGraph`]: lazily opened output graph with per-channel gain and stereo routing
//! - [`EnvelopeScheduler`]: stepped fade and crossfade ramps with cancellable handles
//! - [`compute_click_timing`]: tempo metadata to click interval and accent pattern
//! - [`AudioClock`] / [`GraphClock`]: time source for deadline scheduling
//!
//! # Feature flags
//!
//! - `"device"`: CPAL device output (enabled by default). Without it the
//!   graph offers only the offline and null backends.
//!
//! # Example
//!
//! ```
//! use setalight_core::{AudioGraph, Curve, EnvelopeScheduler, StereoMode};
//!
//! let mut graph = AudioGraph::offline(48000.0);
//! graph.ensure_started()?;
//!
//! let pad = graph.add_channel(StereoMode::Both);
//! let mut envelopes = EnvelopeScheduler::new();
//! envelopes.ramp_to(&pad, 0.5, 3000.0, Curve::EaseIn, 0.0);
//!
//! envelopes.advance(3000.0);
//! assert_eq!(pad.get(), 0.5);
//! # Ok::<(), setalight_core::Error>(())
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod clock;
pub use clock::{AudioClock, GraphClock, ManualClock};

pub mod envelope;
pub use envelope::{
    Curve, EnvelopeScheduler, RampCompletion, RampHandle, RampId, RampStatus, DEFAULT_RAMP_STEPS,
};

pub mod graph;
#[cfg(feature = "device")]
pub use graph::list_output_devices;
pub use graph::{
    AudioGraph, BackendKind, ChannelId, GainNode, GraphConfig, GraphState, SampleBuffer,
    StereoMode, Topology,
};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFloat};

mod smooth;
pub use smooth::SmoothedGain;

pub mod tempo;
pub use tempo::{accent_pattern, compute_click_timing, Accent, ClickTiming, Fraction, TimeSignature};

pub mod prelude {
    pub use crate::{
        compute_click_timing, Accent, AudioClock, AudioGraph, ChannelId, ClickTiming, Curve,
        EnvelopeScheduler, Fraction, GainNode, StereoMode, TimeSignature,
    };
}
