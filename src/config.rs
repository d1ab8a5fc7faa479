//! Engine configuration.
//!
//! Every duration the engine uses lives here so none of them is baked into
//! the controllers. Missing fields fall back to their defaults when loading
//! from JSON.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use setalight_core::{BackendKind, GraphConfig};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fade_in_ms: f64,
    pub fade_out_ms: f64,
    pub crossfade_out_ms: f64,
    pub crossfade_in_ms: f64,
    /// Time both streams are audible during a crossfade.
    pub crossfade_overlap_ms: f64,
    /// Pause between stopping the click and restarting it at a new tempo.
    pub click_settle_ms: f64,
    /// How far ahead of the clock clicks are handed to the mixer.
    pub click_lookahead_ms: f64,
    pub default_pad_volume: f32,
    pub default_click_volume: f32,
    pub pad_set: String,
    /// Longest the session driver sleeps when nothing is due.
    pub driver_idle_ms: u64,

    pub backend: BackendKind,
    pub output_device: Option<usize>,
    /// Offline backend sample rate.
    pub sample_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fade_in_ms: 3000.0,
            fade_out_ms: 3000.0,
            crossfade_out_ms: 5000.0,
            crossfade_in_ms: 5000.0,
            crossfade_overlap_ms: 1000.0,
            click_settle_ms: 1000.0,
            click_lookahead_ms: 100.0,
            default_pad_volume: 0.5,
            default_click_volume: 0.5,
            pad_set: "default".into(),
            driver_idle_ms: 20,
            backend: BackendKind::Device,
            output_device: None,
            sample_rate: 48000.0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("fade_in_ms", self.fade_in_ms),
            ("fade_out_ms", self.fade_out_ms),
            ("crossfade_out_ms", self.crossfade_out_ms),
            ("crossfade_in_ms", self.crossfade_in_ms),
            ("crossfade_overlap_ms", self.crossfade_overlap_ms),
            ("click_settle_ms", self.click_settle_ms),
            ("click_lookahead_ms", self.click_lookahead_ms),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a non-negative duration, got {value}")));
            }
        }

        if self.crossfade_overlap_ms > self.crossfade_out_ms
            || self.crossfade_overlap_ms > self.crossfade_in_ms
        {
            return Err(invalid(format!(
                "crossfade overlap {}ms is longer than a crossfade leg",
                self.crossfade_overlap_ms
            )));
        }

        for (name, value) in [
            ("default_pad_volume", self.default_pad_volume),
            ("default_click_volume", self.default_click_volume),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be within 0..=1, got {value}")));
            }
        }

        if self.pad_set.trim().is_empty() {
            return Err(invalid("pad_set must not be empty".into()));
        }

        self.graph_config().validate()?;
        Ok(())
    }

    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            backend: self.backend,
            output_device_index: self.output_device,
            sample_rate: self.sample_rate,
            ..GraphConfig::default()
        }
    }

    /// Full length of a crossfade from the first step of the old stream to the
    /// last step of the new one.
    pub fn crossfade_total_ms(&self) -> f64 {
        self.crossfade_out_ms + self.crossfade_in_ms - self.crossfade_overlap_ms
    }
}

fn invalid(message: String) -> Error {
    Error::Core(setalight_core::Error::InvalidConfig(message))
}
