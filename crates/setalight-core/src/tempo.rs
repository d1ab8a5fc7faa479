//! Tempo to click-timing conversion.
//!
//! Pure functions that turn a song's tempo metadata into the interval between
//! metronome clicks and the accent played on each click of the bar.
//!
//! The tempo a chart carries is relative to its *tempo note*. Charts in a
//! compound meter (6/8, 9/8, 12/8) that leave the tempo note at the default
//! quarter actually count the dotted quarter, so the BPM is scaled by 1.5
//! before conversion. Compound meters always click eighth notes; everything
//! else clicks the time signature's denominator.
//!
//! # Example
//!
//! ```
//! use setalight_core::{compute_click_timing, Fraction, TimeSignature};
//!
//! let timing = compute_click_timing(
//!     Some(80.0),
//!     Some(Fraction::QUARTER),
//!     Some(TimeSignature::new(6, 8).unwrap()),
//! )
//! .unwrap();
//!
//! assert_eq!(timing.quarter_bpm, 120.0);
//! assert_eq!(timing.clicked_note_value, 8);
//! assert_eq!(timing.interval_ms, 250.0);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Note length as a fraction of a whole note (`1/4` is a quarter note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl Fraction {
    pub const QUARTER: Fraction = Fraction {
        numerator: 1,
        denominator: 4,
    };

    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Length in quarter notes (`n * 4 / d`).
    pub fn quarter_multiplier(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    /// Same length as a quarter note, whatever the spelling (`2/8`, `1/4`).
    pub fn is_quarter(&self) -> bool {
        self.numerator as u64 * 4 == self.denominator as u64
    }

    fn is_valid(&self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }
}

impl Default for Fraction {
    fn default() -> Self {
        Self::QUARTER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u32,
    pub note_value: u32,
}

impl TimeSignature {
    pub fn new(beats_per_bar: u32, note_value: u32) -> Result<Self> {
        if beats_per_bar == 0 || note_value == 0 {
            return Err(Error::InvalidTimeSignature {
                beats_per_bar,
                note_value,
            });
        }
        Ok(Self {
            beats_per_bar,
            note_value,
        })
    }

    /// 6/8, 9/8, 12/8 and friends.
    pub fn is_compound(&self) -> bool {
        self.note_value == 8 && self.beats_per_bar % 3 == 0
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            note_value: 4,
        }
    }
}

/// Weight of a single click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accent {
    Heavy,
    Medium,
    Light,
}

/// Output of [`compute_click_timing`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClickTiming {
    /// Milliseconds between consecutive clicks.
    pub interval_ms: f64,
    /// One entry per click in the bar; index 0 is the downbeat.
    pub accent_pattern: Vec<Accent>,
    /// Input tempo normalised to quarter notes per minute.
    pub quarter_bpm: f64,
    /// Note value that gets a click (4 = quarter, 8 = eighth).
    pub clicked_note_value: u32,
}

impl ClickTiming {
    pub fn beats_per_bar(&self) -> usize {
        self.accent_pattern.len()
    }

    pub fn accent_at(&self, beat: usize) -> Accent {
        self.accent_pattern[beat % self.accent_pattern.len()]
    }
}

/// Convert tempo metadata into click timing.
///
/// `tempo_note` of `None` means the default quarter note. Returns `None` when
/// the tempo or the time signature is missing or unusable; callers must not
/// start the metronome in that case.
pub fn compute_click_timing(
    bpm: Option<f64>,
    tempo_note: Option<Fraction>,
    time_signature: Option<TimeSignature>,
) -> Option<ClickTiming> {
    let bpm = bpm.filter(|b| b.is_finite() && *b > 0.0)?;
    let ts = time_signature.filter(|ts| ts.beats_per_bar > 0 && ts.note_value > 0)?;
    let tempo_note = tempo_note.unwrap_or_default();
    if !tempo_note.is_valid() {
        return None;
    }

    let compound = ts.is_compound();
    let quarter_bpm = if tempo_note.is_quarter() {
        if compound {
            // The chart's BPM counts dotted quarters.
            bpm * 1.5
        } else {
            bpm
        }
    } else {
        bpm * tempo_note.quarter_multiplier()
    };

    let clicked_note_value = if compound { 8 } else { ts.note_value };
    let interval_ms = (60_000.0 / quarter_bpm) * (4.0 / clicked_note_value as f64);
    if !interval_ms.is_finite() || interval_ms <= 0.0 {
        return None;
    }

    Some(ClickTiming {
        interval_ms,
        accent_pattern: accent_pattern(ts),
        quarter_bpm,
        clicked_note_value,
    })
}

/// Accent for every click of one bar.
///
/// Downbeat heavy. 6/8 adds a medium accent on the second dotted-quarter
/// pulse (index 3); 12/8 on indices 3, 6 and 9. Everything else is light.
pub fn accent_pattern(ts: TimeSignature) -> Vec<Accent> {
    let medium: &[usize] = match (ts.beats_per_bar, ts.note_value) {
        (6, 8) => &[3],
        (12, 8) => &[3, 6, 9],
        _ => &[],
    };

    (0..ts.beats_per_bar as usize)
        .map(|beat| {
            if beat == 0 {
                Accent::Heavy
            } else if medium.contains(&beat) {
                Accent::Medium
            } else {
                Accent::Light
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn ts(beats: u32, note: u32) -> Option<TimeSignature> {
        Some(TimeSignature::new(beats, note).unwrap())
    }

    #[test]
    fn test_six_eight_with_quarter_tempo_note() {
        let timing = compute_click_timing(Some(80.0), Some(Fraction::QUARTER), ts(6, 8)).unwrap();
        assert_relative_eq!(timing.quarter_bpm, 120.0);
        assert_eq!(timing.clicked_note_value, 8);
        assert_relative_eq!(timing.interval_ms, 250.0);
    }

    #[test]
    fn test_simple_meter_quarter_clicks() {
        let timing = compute_click_timing(Some(120.0), None, ts(4, 4)).unwrap();
        assert_relative_eq!(timing.quarter_bpm, 120.0);
        assert_eq!(timing.clicked_note_value, 4);
        assert_relative_eq!(timing.interval_ms, 500.0);
    }

    #[test]
    fn test_cut_time_clicks_halves() {
        let timing = compute_click_timing(Some(60.0), None, ts(2, 2)).unwrap();
        assert_eq!(timing.clicked_note_value, 2);
        assert_relative_eq!(timing.interval_ms, 2000.0);
    }

    #[test]
    fn test_explicit_tempo_note_scales_bpm() {
        // Dotted quarter = 3/8 of a whole note.
        let timing = compute_click_timing(Some(60.0), Some(Fraction::new(3, 8)), ts(6, 8)).unwrap();
        assert_relative_eq!(timing.quarter_bpm, 90.0);

        // Eighth-note tempo in a simple meter.
        let timing = compute_click_timing(Some(120.0), Some(Fraction::new(1, 8)), ts(3, 4)).unwrap();
        assert_relative_eq!(timing.quarter_bpm, 60.0);
        assert_relative_eq!(timing.interval_ms, 1000.0);
    }

    #[test]
    fn test_compound_always_clicks_eighths() {
        let timing = compute_click_timing(Some(60.0), Some(Fraction::new(1, 8)), ts(9, 8)).unwrap();
        assert_eq!(timing.clicked_note_value, 8);
        assert_relative_eq!(timing.quarter_bpm, 30.0);
        assert_relative_eq!(timing.interval_ms, 1000.0);
    }

    #[test]
    fn test_missing_inputs_refuse() {
        assert!(compute_click_timing(None, None, ts(4, 4)).is_none());
        assert!(compute_click_timing(Some(120.0), None, None).is_none());
        assert!(compute_click_timing(Some(0.0), None, ts(4, 4)).is_none());
        assert!(compute_click_timing(Some(f64::NAN), None, ts(4, 4)).is_none());
        assert!(compute_click_timing(Some(120.0), Some(Fraction::new(0, 4)), ts(4, 4)).is_none());
    }

    #[test]
    fn test_invalid_time_signature_rejected() {
        assert!(TimeSignature::new(0, 4).is_err());
        assert!(TimeSignature::new(4, 0).is_err());
    }

    #[test]
    fn test_twelve_eight_accents() {
        use Accent::*;
        let pattern = accent_pattern(TimeSignature::new(12, 8).unwrap());
        assert_eq!(
            pattern,
            vec![Heavy, Light, Light, Medium, Light, Light, Medium, Light, Light, Medium, Light, Light]
        );
    }

    #[test]
    fn test_six_eight_and_simple_accents() {
        use Accent::*;
        assert_eq!(
            accent_pattern(TimeSignature::new(6, 8).unwrap()),
            vec![Heavy, Light, Light, Medium, Light, Light]
        );
        assert_eq!(
            accent_pattern(TimeSignature::new(4, 4).unwrap()),
            vec![Heavy, Light, Light, Light]
        );
        // 9/8 is compound but has no medium accents in the table.
        assert_eq!(
            accent_pattern(TimeSignature::new(9, 8).unwrap())
                .iter()
                .filter(|a| **a == Medium)
                .count(),
            0
        );
    }

    proptest! {
        #[test]
        fn prop_interval_positive_and_finite(
            bpm in 1.0f64..400.0,
            beats in 1u32..16,
            note in prop::sample::select(vec![1u32, 2, 4, 8, 16]),
            num in 1u32..8,
            den in prop::sample::select(vec![1u32, 2, 4, 8, 16]),
        ) {
            let timing = compute_click_timing(
                Some(bpm),
                Some(Fraction::new(num, den)),
                Some(TimeSignature::new(beats, note).unwrap()),
            ).unwrap();
            prop_assert!(timing.interval_ms.is_finite());
            prop_assert!(timing.interval_ms > 0.0);
            prop_assert_eq!(timing.beats_per_bar(), beats as usize);
            prop_assert_eq!(timing.accent_pattern[0], Accent::Heavy);
        }
    }
}
