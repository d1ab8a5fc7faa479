//! Inputs pushed into the session: the song being shown and the global settings.

use crate::events::ChannelKind;
use serde::{Deserialize, Serialize};
use setalight_core::{compute_click_timing, ClickTiming, Fraction, TimeSignature};

/// Snapshot of a song's playback metadata.
///
/// Never mutated after it is handed to the session; a new song means a new
/// descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongDescriptor {
    pub title: Option<String>,
    /// Musical key as written on the chart, e.g. `"F#m"`.
    pub key: String,
    pub bpm: Option<f64>,
    #[serde(default)]
    pub tempo_note: Fraction,
    pub time_signature: Option<TimeSignature>,
}

impl SongDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            title: None,
            key: key.into(),
            bpm: None,
            tempo_note: Fraction::QUARTER,
            time_signature: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn tempo_note(mut self, note: Fraction) -> Self {
        self.tempo_note = note;
        self
    }

    pub fn time_signature(mut self, ts: TimeSignature) -> Self {
        self.time_signature = Some(ts);
        self
    }

    pub fn click_timing(&self) -> Option<ClickTiming> {
        compute_click_timing(self.bpm, Some(self.tempo_note), self.time_signature)
    }

    /// Same tempo, tempo note and meter.
    pub fn same_tempo(&self, other: &SongDescriptor) -> bool {
        self.bpm == other.bpm
            && self.tempo_note == other.tempo_note
            && self.time_signature == other.time_signature
    }
}

/// Per-session pad and click switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleState {
    pub pads_on: bool,
    pub click_on: bool,
}

impl ToggleState {
    pub fn is_on(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Pads => self.pads_on,
            ChannelKind::Click => self.click_on,
        }
    }

    pub(crate) fn set(&mut self, channel: ChannelKind, on: bool) {
        match channel {
            ChannelKind::Pads => self.pads_on = on,
            ChannelKind::Click => self.click_on = on,
        }
    }
}

impl Default for ToggleState {
    fn default() -> Self {
        Self {
            pads_on: true,
            click_on: true,
        }
    }
}

/// Which channels the user permits at all, and how they are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    pub pads_enabled: bool,
    pub metronome_enabled: bool,
    /// Pads on the left output, click on the right.
    pub stereo_split_enabled: bool,
}

impl GlobalSettings {
    pub fn is_enabled(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Pads => self.pads_enabled,
            ChannelKind::Click => self.metronome_enabled,
        }
    }

    /// The only enabled channel, if exactly one is. Its toggle is forced on.
    pub fn forced_channel(&self) -> Option<ChannelKind> {
        match (self.pads_enabled, self.metronome_enabled) {
            (true, false) => Some(ChannelKind::Pads),
            (false, true) => Some(ChannelKind::Click),
            _ => None,
        }
    }
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            pads_enabled: true,
            metronome_enabled: true,
            stereo_split_enabled: false,
        }
    }
}
