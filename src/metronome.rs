//! Self-scheduling click track.
//!
//! Beats are planned against absolute deadlines on the audio clock. Each beat
//! is handed to the mixer up to `lookahead_ms` early together with its exact
//! time, and the mixer places it on the right sample. The deadline then moves
//! by exactly one interval, so lateness in whoever calls [`tick`] never
//! accumulates.
//!
//! [`tick`]: MetronomeScheduler::tick

use crate::events::{ChannelKind, PlaybackState};
use crate::stage::Stage;
use setalight_core::{Accent, ChannelId, ClickTiming, GainNode, StereoMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetronomeState {
    Stopped,
    Running,
}

#[derive(Debug)]
pub struct MetronomeScheduler {
    state: MetronomeState,
    timing: Option<ClickTiming>,
    beat_cursor: usize,
    next_beat_ms: f64,
    lookahead_ms: f64,
    channel: Option<GainNode>,
    volume: f32,
    route: StereoMode,
    clicks_scheduled: u64,
    last_accent: Option<Accent>,
}

impl MetronomeScheduler {
    pub fn new(volume: f32, lookahead_ms: f64) -> Self {
        Self {
            state: MetronomeState::Stopped,
            timing: None,
            beat_cursor: 0,
            next_beat_ms: 0.0,
            lookahead_ms,
            channel: None,
            volume,
            route: StereoMode::Both,
            clicks_scheduled: 0,
            last_accent: None,
        }
    }

    pub fn state(&self) -> MetronomeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == MetronomeState::Running
    }

    pub fn timing(&self) -> Option<&ClickTiming> {
        self.timing.as_ref()
    }

    /// Position within the bar of the next beat to be scheduled.
    pub fn beat_cursor(&self) -> usize {
        self.beat_cursor
    }

    pub fn next_beat_ms(&self) -> Option<f64> {
        self.is_running().then_some(self.next_beat_ms)
    }

    pub fn clicks_scheduled(&self) -> u64 {
        self.clicks_scheduled
    }

    pub fn last_accent(&self) -> Option<Accent> {
        self.last_accent
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn channel_id(&self) -> Option<ChannelId> {
        self.channel.as_ref().map(GainNode::id)
    }

    pub fn route(&self) -> StereoMode {
        self.route
    }

    /// Click channel, created on first use.
    fn channel(&mut self, stage: &mut Stage) -> GainNode {
        if let Some(gain) = &self.channel {
            return gain.clone();
        }
        let gain = stage.graph.add_channel(self.route);
        gain.set(self.volume);
        stage.graph.play(gain.id());
        self.channel = Some(gain.clone());
        gain
    }

    /// Start clicking with `timing`. Beat 0 sounds immediately.
    ///
    /// A running metronome is stopped first, so this also restarts.
    pub fn start(&mut self, stage: &mut Stage, timing: ClickTiming) {
        self.stop(stage);
        self.channel(stage);

        self.beat_cursor = 0;
        self.next_beat_ms = stage.now_ms();
        tracing::debug!(
            interval_ms = timing.interval_ms,
            beats_per_bar = timing.beats_per_bar(),
            "metronome started"
        );
        self.timing = Some(timing);
        self.state = MetronomeState::Running;
        stage
            .notifier
            .playback(ChannelKind::Click, PlaybackState::Playing);

        self.tick(stage);
    }

    /// Cancel upcoming beats and cut any click still sounding.
    ///
    /// Stopping a stopped metronome does nothing.
    pub fn stop(&mut self, stage: &mut Stage) -> bool {
        if self.state == MetronomeState::Stopped {
            return false;
        }
        self.state = MetronomeState::Stopped;
        if let Some(gain) = &self.channel {
            stage.graph.silence_clicks(gain.id());
        }
        tracing::debug!(clicks = self.clicks_scheduled, "metronome stopped");
        stage
            .notifier
            .playback(ChannelKind::Click, PlaybackState::Stopped);
        true
    }

    /// Schedule every beat due within the lookahead window.
    pub fn tick(&mut self, stage: &mut Stage) -> usize {
        if self.state != MetronomeState::Running {
            return 0;
        }
        let Some(timing) = &self.timing else {
            return 0;
        };
        let Some(channel) = &self.channel else {
            return 0;
        };

        let horizon = stage.now_ms() + self.lookahead_ms;
        let mut scheduled = 0;
        while self.next_beat_ms <= horizon {
            let accent = timing.accent_at(self.beat_cursor);
            stage
                .graph
                .schedule_click(channel.id(), self.next_beat_ms, accent);
            self.last_accent = Some(accent);
            self.beat_cursor = (self.beat_cursor + 1) % timing.beats_per_bar();
            self.next_beat_ms += timing.interval_ms;
            scheduled += 1;
        }
        self.clicks_scheduled += scheduled as u64;
        scheduled
    }

    /// When [`tick`](Self::tick) next has a beat to hand over.
    pub fn next_deadline(&self) -> Option<f64> {
        self.next_beat_ms()
            .map(|beat| beat - self.lookahead_ms)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(gain) = &self.channel {
            gain.set(volume);
        }
    }

    pub fn set_route(&mut self, stage: &mut Stage, mode: StereoMode) {
        self.route = mode;
        if let Some(gain) = &self.channel {
            stage.graph.route_channel(gain.id(), mode);
        }
    }

    /// Stop and drop the click channel.
    pub fn release(&mut self, stage: &mut Stage) {
        self.stop(stage);
        if let Some(gain) = self.channel.take() {
            stage.graph.remove_channel(gain.id());
        }
    }
}
