//! Click tone synthesis.

use crate::tempo::Accent;

/// Length of one click. Short enough that clicks never overlap at any
/// playable tempo.
pub const CLICK_DURATION_SECS: f64 = 0.03;

/// Pitch and level of a click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    pub frequency: f64,
    pub gain: f32,
}

/// Heavier accents are higher and louder.
pub fn tone_params(accent: Accent) -> ToneParams {
    match accent {
        Accent::Heavy => ToneParams {
            frequency: 1500.0,
            gain: 1.0,
        },
        Accent::Medium => ToneParams {
            frequency: 1200.0,
            gain: 0.75,
        },
        Accent::Light => ToneParams {
            frequency: 1000.0,
            gain: 0.5,
        },
    }
}

/// Render one click: a sine with an exponential decay reaching -60dB at the end.
pub fn click_tone(accent: Accent, sample_rate: f64) -> Vec<f32> {
    let ToneParams { frequency, gain } = tone_params(accent);
    let num_samples = (sample_rate * CLICK_DURATION_SECS) as usize;

    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let env = 0.001f64.powf(t / CLICK_DURATION_SECS);
            let phase = 2.0 * std::f64::consts::PI * frequency * t;
            (phase.sin() * env) as f32 * gain
        })
        .collect()
}
