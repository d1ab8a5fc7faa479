//! Test helpers and fixtures for setalight integration tests
//!
//! Sessions run against a manual clock and the null backend, so fades,
//! crossfades and beats advance only when a test moves time. Signal tests use
//! the offline backend and drive time by rendering.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact gain values
//! - `GAIN_STEP_EPSILON` (0.02): Continuity across one envelope step
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use crossbeam_channel::Receiver;
use setalight_audio::core::{AudioClock, ManualClock};
use setalight_audio::prelude::*;

/// Sample rate for pad fixtures and offline rendering.
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Step used when sweeping a manual clock forward.
pub const TICK_MS: f64 = 10.0;

/// Keys every fixture provider can serve.
pub const FIXTURE_KEYS: [&str; 5] = ["C", "D", "E", "G", "A"];

/// Provider holding a short drone for each of [`FIXTURE_KEYS`].
pub fn fixture_provider() -> StaticProvider {
    let provider = StaticProvider::new();
    for key in FIXTURE_KEYS {
        provider
            .insert_tone("default", key, 0.25, TEST_SAMPLE_RATE)
            .expect("fixture tone");
    }
    provider
}

pub fn song(key: &str, bpm: f64) -> SongDescriptor {
    SongDescriptor::new(key)
        .bpm(bpm)
        .time_signature(TimeSignature::default())
}

/// Session on the null backend with a manual clock at 0ms.
pub struct TestSession {
    pub clock: ManualClock,
    pub session: PlaybackSession,
    pub events: Receiver<EngineEvent>,
}

impl TestSession {
    pub fn new() -> Self {
        Self::with_settings(GlobalSettings::default())
    }

    pub fn with_settings(settings: GlobalSettings) -> Self {
        Self::build(EngineConfig::default(), settings)
    }

    pub fn build(config: EngineConfig, settings: GlobalSettings) -> Self {
        let clock = ManualClock::new(0.0);
        let session = PlaybackSession::builder()
            .config(config)
            .backend(BackendKind::Null)
            .provider(fixture_provider())
            .settings(settings)
            .clock(clock.clone())
            .build()
            .expect("Failed to create test session");
        let events = session.subscribe();
        Self {
            clock,
            session,
            events,
        }
    }

    pub fn now(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Make `song` current and start it, then apply the load.
    pub fn start(&mut self, song: SongDescriptor) {
        self.session.on_song_changed(song);
        self.session
            .on_start_requested()
            .expect("start on the null backend");
        self.session.tick();
    }

    /// Move the clock to `ms` in [`TICK_MS`] steps, ticking at each one.
    pub fn run_to(&mut self, ms: f64) {
        while self.now() < ms {
            let next = (self.now() + TICK_MS).min(ms);
            self.clock.set(next);
            self.session.tick();
        }
        self.session.tick();
    }

    pub fn run_for(&mut self, ms: f64) {
        let to = self.now() + ms;
        self.run_to(to);
    }

    pub fn pad_gain(&self) -> f32 {
        self.session.pads().current_gain().unwrap_or(0.0)
    }

    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.events.try_iter().collect()
    }
}

/// Every playback state reported for `channel`, in order.
pub fn playback_states(events: &[EngineEvent], channel: ChannelKind) -> Vec<PlaybackState> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Playback { channel: c, state } if *c == channel => Some(*state),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Signal helpers
// =============================================================================

/// Left and right channels of an interleaved stereo block.
pub fn split_stereo(interleaved: &[f32]) -> (Vec<f32>, Vec<f32>) {
    interleaved
        .chunks_exact(2)
        .map(|frame| (frame[0], frame[1]))
        .unzip()
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Check if a signal is silent (all samples below threshold).
pub fn is_silent(samples: &[f32], threshold: f32) -> bool {
    samples.iter().all(|&s| s.abs() <= threshold)
}

/// Indices where the signal rises above `threshold` after at least
/// `min_gap` silent samples.
pub fn onsets(samples: &[f32], threshold: f32, min_gap: usize) -> Vec<usize> {
    let mut found = Vec::new();
    let mut quiet = min_gap;
    for (i, s) in samples.iter().enumerate() {
        if s.abs() > threshold {
            if quiet >= min_gap {
                found.push(i);
            }
            quiet = 0;
        } else {
            quiet += 1;
        }
    }
    found
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32, context: &str) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "{}: expected audio content with RMS >= {}, but RMS was {}",
        context,
        min_rms,
        r
    );
}

/// Assert that a signal is silent.
pub fn assert_is_silent(samples: &[f32], threshold: f32, context: &str) {
    let max = peak(samples);
    assert!(
        max <= threshold,
        "{}: expected silence (threshold {}), but peak was {}",
        context,
        threshold,
        max
    );
}

/// Offline session at [`TEST_SAMPLE_RATE`], timed by its own rendering.
pub struct OfflineSession {
    pub session: PlaybackSession,
    /// Interleaved stereo rendered so far.
    pub rendered: Vec<f32>,
}

impl OfflineSession {
    pub fn new(config: EngineConfig, settings: GlobalSettings, toggles: ToggleState) -> Self {
        let config = EngineConfig {
            backend: BackendKind::Offline,
            sample_rate: TEST_SAMPLE_RATE as f64,
            ..config
        };
        let session = PlaybackSession::builder()
            .config(config)
            .provider(fixture_provider())
            .settings(settings)
            .toggles(toggles)
            .build()
            .expect("Failed to create offline session");
        Self {
            session,
            rendered: Vec::new(),
        }
    }

    /// Render `ms` of audio in [`TICK_MS`] blocks, ticking between blocks.
    pub fn render_ms(&mut self, ms: f64) -> Vec<f32> {
        let block = (TEST_SAMPLE_RATE as f64 * TICK_MS / 1000.0) as usize;
        let blocks = (ms / TICK_MS).round() as usize;
        let mut out = Vec::with_capacity(blocks * block * 2);
        for _ in 0..blocks {
            self.session.tick();
            out.extend(self.session.render_offline(block));
        }
        self.rendered.extend_from_slice(&out);
        out
    }
}
