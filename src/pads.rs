//! Pad bed playback: load, fade in, fade out and crossfade between keys.
//!
//! The controller owns at most one *current* stream plus any *retiring*
//! streams still fading out after a crossfade. Every stream is its own graph
//! channel with its own gain node, so two streams can ramp independently.
//!
//! Fades are interruptible. A fade-in requested during a fade-out (or the
//! reverse) re-ramps the same gain node from wherever it is, so direction
//! changes never jump.

use crate::config::EngineConfig;
use crate::events::{ChannelKind, EngineEvent, PlaybackState};
use crate::loader::{LoadTicket, Loader};
use crate::provider::{PadKey, PadSource};
use crate::stage::Stage;
use setalight_core::{ChannelId, Curve, GainNode, RampCompletion, StereoMode};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadState {
    NoStream,
    /// A stream is attached and paused, ready to fade in without reloading.
    Loaded,
    FadingIn,
    Playing,
    FadingOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadTimings {
    pub fade_in_ms: f64,
    pub fade_out_ms: f64,
    pub crossfade_out_ms: f64,
    pub crossfade_in_ms: f64,
    pub crossfade_overlap_ms: f64,
}

impl From<&EngineConfig> for PadTimings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fade_in_ms: config.fade_in_ms,
            fade_out_ms: config.fade_out_ms,
            crossfade_out_ms: config.crossfade_out_ms,
            crossfade_in_ms: config.crossfade_in_ms,
            crossfade_overlap_ms: config.crossfade_overlap_ms,
        }
    }
}

impl Default for PadTimings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Things the session has to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum PadNotice {
    LoadFailed { key: String, reason: String },
    /// Fade-out finished; the stream is paused.
    Stopped,
    /// Both legs of a crossfade finished and the old stream is gone.
    CrossfadeFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadIntent {
    Load,
    FadeIn,
    Crossfade,
}

#[derive(Debug)]
struct PendingLoad {
    ticket: LoadTicket,
    key: String,
    intent: LoadIntent,
}

#[derive(Debug)]
struct PadStream {
    gain: GainNode,
    source: PadSource,
}

impl PadStream {
    fn id(&self) -> ChannelId {
        self.gain.id()
    }
}

#[derive(Debug)]
struct Crossfade {
    outgoing: ChannelId,
    incoming: ChannelId,
    outgoing_done: bool,
    incoming_done: bool,
    ends_at_ms: f64,
}

pub struct PadPlaybackController {
    state: PadState,
    current: Option<PadStream>,
    retiring: Vec<PadStream>,
    pending: Option<PendingLoad>,
    crossfade: Option<Crossfade>,
    /// Crossfade requested while another one was running.
    queued: Option<(String, String)>,
    volume: f32,
    route: StereoMode,
    timings: PadTimings,
    loader: Loader,
}

impl PadPlaybackController {
    pub fn new(loader: Loader, timings: PadTimings, volume: f32) -> Self {
        Self {
            state: PadState::NoStream,
            current: None,
            retiring: Vec::new(),
            pending: None,
            crossfade: None,
            queued: None,
            volume,
            route: StereoMode::Both,
            timings,
            loader,
        }
    }

    pub fn state(&self) -> PadState {
        self.state
    }

    pub fn is_audible(&self) -> bool {
        matches!(
            self.state,
            PadState::FadingIn | PadState::Playing | PadState::FadingOut
        )
    }

    pub fn is_crossfading(&self) -> bool {
        self.crossfade.is_some()
            || self
                .pending
                .as_ref()
                .is_some_and(|p| p.intent == LoadIntent::Crossfade)
    }

    /// When the running crossfade's last step lands.
    pub fn crossfade_ends_at(&self) -> Option<f64> {
        self.crossfade.as_ref().map(|xf| xf.ends_at_ms)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn current_key(&self) -> Option<PadKey> {
        self.current.as_ref().map(|s| s.source.key)
    }

    pub fn current_gain(&self) -> Option<f32> {
        self.current.as_ref().map(|s| s.gain.get())
    }

    pub fn current_channel(&self) -> Option<ChannelId> {
        self.current.as_ref().map(PadStream::id)
    }

    pub fn route(&self) -> StereoMode {
        self.route
    }

    /// Gain of the oldest stream still fading out.
    pub fn outgoing_gain(&self) -> Option<f32> {
        self.retiring.first().map(|s| s.gain.get())
    }

    pub fn stream_count(&self) -> usize {
        self.current.iter().count() + self.retiring.len()
    }

    pub fn has_pending_load(&self) -> bool {
        self.pending.is_some()
    }

    pub fn loads_in_flight(&self) -> usize {
        self.loader.in_flight()
    }

    fn holds(&self, key: &str, pad_set: &str) -> bool {
        let Some(stream) = &self.current else {
            return false;
        };
        PadKey::parse(key).is_ok_and(|k| k == stream.source.key) && stream.source.pad_set == pad_set
    }

    fn set_state(&mut self, stage: &Stage, state: PadState) {
        if self.state == state {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?state, "pad state");
        self.state = state;

        let playback = match state {
            PadState::FadingIn => PlaybackState::FadingIn,
            PadState::Playing => PlaybackState::Playing,
            PadState::FadingOut => PlaybackState::FadingOut,
            PadState::Loaded | PadState::NoStream => PlaybackState::Stopped,
        };
        stage.notifier.playback(ChannelKind::Pads, playback);
    }

    fn submit(&mut self, key: &str, pad_set: &str, intent: LoadIntent) -> LoadTicket {
        let ticket = self.loader.submit(key, pad_set);
        if let Some(previous) = self.pending.replace(PendingLoad {
            ticket,
            key: key.to_string(),
            intent,
        }) {
            tracing::debug!(key = %previous.key, "superseded pending pad load");
        }
        ticket
    }

    /// Resolve a pad for `key`. Audio does not start.
    pub fn load(&mut self, key: &str, pad_set: &str) -> LoadTicket {
        self.submit(key, pad_set, LoadIntent::Load)
    }

    /// Fade in `key`, loading it first unless it is already the current stream.
    pub fn play_key(&mut self, stage: &mut Stage, key: &str, pad_set: &str) {
        if self.holds(key, pad_set) {
            self.pending = None;
            self.fade_in(stage, None);
        } else {
            self.submit(key, pad_set, LoadIntent::FadeIn);
        }
    }

    /// Ramp the current stream up to the pad volume.
    ///
    /// No-op while already playing or fading in. A fade-out in flight is
    /// reversed from the current gain. With no stream yet, a pending load is
    /// marked to fade in as soon as it lands.
    pub fn fade_in(&mut self, stage: &mut Stage, duration_ms: Option<f64>) -> bool {
        if self.crossfade.is_some() {
            return false;
        }
        let duration = duration_ms.unwrap_or(self.timings.fade_in_ms);

        match self.state {
            PadState::Playing | PadState::FadingIn => false,
            PadState::NoStream => match self.pending.as_mut() {
                Some(pending) if pending.intent == LoadIntent::Load => {
                    pending.intent = LoadIntent::FadeIn;
                    true
                }
                _ => false,
            },
            PadState::Loaded | PadState::FadingOut => {
                let Some(stream) = &self.current else {
                    return false;
                };
                let gain = stream.gain.clone();
                let now = stage.now_ms();
                stage.graph.play(gain.id());
                stage
                    .envelopes
                    .ramp_to(&gain, self.volume, duration, Curve::EaseIn, now);
                self.set_state(stage, PadState::FadingIn);
                true
            }
        }
    }

    /// Ramp every audible stream to silence.
    ///
    /// The current stream pauses when its ramp completes and stays loaded. A
    /// crossfade in flight is abandoned: both streams fade from where they
    /// are, the incoming one is kept and the outgoing one is discarded.
    pub fn fade_out(&mut self, stage: &mut Stage, duration_ms: Option<f64>) -> bool {
        match self.pending.as_ref().map(|p| p.intent) {
            Some(LoadIntent::FadeIn) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.intent = LoadIntent::Load;
                }
            }
            Some(LoadIntent::Crossfade) => {
                self.pending = None;
                self.queued = None;
            }
            _ => {}
        }

        let duration = duration_ms.unwrap_or(self.timings.fade_out_ms);
        let now = stage.now_ms();

        if self.crossfade.take().is_some() {
            self.queued = None;
            tracing::debug!("crossfade aborted by fade-out");
            for stream in &self.retiring {
                stage
                    .envelopes
                    .ramp_to(&stream.gain, 0.0, duration, Curve::EaseOut, now);
            }
        }

        if !matches!(self.state, PadState::FadingIn | PadState::Playing) {
            return false;
        }
        let Some(stream) = &self.current else {
            return false;
        };
        let gain = stream.gain.clone();
        stage
            .envelopes
            .ramp_to(&gain, 0.0, duration, Curve::EaseOut, now);
        self.set_state(stage, PadState::FadingOut);
        true
    }

    /// Move to `key` with two overlapping ramps on a shared timeline.
    ///
    /// The old stream fades out over `crossfade_out_ms`; the new one starts
    /// fading in `crossfade_overlap_ms` before that ends. With nothing audible
    /// this is a plain load and fade-in. A request arriving mid-crossfade is
    /// queued and replayed once the running crossfade resolves.
    pub fn crossfade_to(&mut self, stage: &mut Stage, key: &str, pad_set: &str) -> bool {
        if self.is_crossfading() {
            tracing::debug!(key, "crossfade busy, queueing request");
            self.queued = Some((key.to_string(), pad_set.to_string()));
            return false;
        }
        if !self.is_audible() {
            self.play_key(stage, key, pad_set);
            return true;
        }
        if self.holds(key, pad_set) {
            self.pending = None;
            return self.fade_in(stage, None);
        }
        self.submit(key, pad_set, LoadIntent::Crossfade);
        true
    }

    /// Retarget live. A fade-in in flight keeps its timing and lands on the new level.
    pub fn set_volume(&mut self, stage: &mut Stage, volume: f32) {
        self.volume = volume;
        let Some(stream) = &self.current else {
            return;
        };
        match self.state {
            PadState::Playing => stream.gain.set(volume),
            PadState::FadingIn => {
                if !stage.envelopes.retarget(stream.id(), volume) {
                    stream.gain.set(volume);
                }
            }
            _ => {}
        }
    }

    pub fn set_route(&mut self, stage: &mut Stage, mode: StereoMode) {
        self.route = mode;
        for stream in self.current.iter().chain(self.retiring.iter()) {
            stage.graph.route_channel(stream.id(), mode);
        }
    }

    /// Apply finished loads. Call from the session pump.
    pub fn pump(&mut self, stage: &mut Stage) -> Vec<PadNotice> {
        let mut notices = Vec::new();

        for outcome in self.loader.poll() {
            let relevant = self
                .pending
                .as_ref()
                .is_some_and(|p| p.ticket == outcome.ticket);
            if !relevant {
                tracing::debug!(key = %outcome.key, "discarding stale pad load");
                continue;
            }
            let Some(pending) = self.pending.take() else {
                continue;
            };

            match outcome.result {
                Ok(source) => self.install(stage, source, pending.intent),
                Err(err) => {
                    let reason = err.to_string();
                    tracing::warn!(key = %pending.key, %reason, "pad load failed");
                    stage.notifier.emit(EngineEvent::PadLoadFailed {
                        key: pending.key.clone(),
                        reason: reason.clone(),
                    });
                    if pending.intent == LoadIntent::Crossfade {
                        self.queued = None;
                        self.fade_out(stage, None);
                    }
                    notices.push(PadNotice::LoadFailed {
                        key: pending.key,
                        reason,
                    });
                }
            }
        }

        notices
    }

    fn open_stream(&self, stage: &mut Stage, source: PadSource) -> PadStream {
        let gain = stage.graph.add_channel(self.route);
        stage.graph.attach(gain.id(), Arc::clone(&source.buffer));
        PadStream { gain, source }
    }

    fn install(&mut self, stage: &mut Stage, source: PadSource, intent: LoadIntent) {
        tracing::debug!(key = %source.key, pad_set = %source.pad_set, ?intent, "pad loaded");

        if intent == LoadIntent::Crossfade && self.is_audible() && self.current.is_some() {
            self.start_crossfade(stage, source);
            return;
        }

        if let Some(old) = self.current.take() {
            if self.is_audible() {
                let now = stage.now_ms();
                stage.envelopes.ramp_to(
                    &old.gain,
                    0.0,
                    self.timings.fade_out_ms,
                    Curve::EaseOut,
                    now,
                );
                self.retiring.push(old);
            } else {
                stage.envelopes.cancel(old.id());
                stage.graph.remove_channel(old.id());
            }
        }

        let stream = self.open_stream(stage, source);
        self.current = Some(stream);
        self.set_state(stage, PadState::Loaded);

        if intent == LoadIntent::FadeIn {
            self.fade_in(stage, None);
        }
    }

    fn start_crossfade(&mut self, stage: &mut Stage, source: PadSource) {
        let Some(old) = self.current.take() else {
            return;
        };
        let now = stage.now_ms();
        let t = self.timings;

        let incoming = self.open_stream(stage, source);
        stage.graph.play(incoming.id());

        stage
            .envelopes
            .ramp_to(&old.gain, 0.0, t.crossfade_out_ms, Curve::EaseOut, now);
        let start_in = now + t.crossfade_out_ms - t.crossfade_overlap_ms;
        stage.envelopes.ramp_at(
            &incoming.gain,
            self.volume,
            t.crossfade_in_ms,
            Curve::EaseIn,
            start_in,
            now,
        );

        tracing::debug!(
            from = %old.source.key,
            to = %incoming.source.key,
            total_ms = t.crossfade_out_ms + t.crossfade_in_ms - t.crossfade_overlap_ms,
            "crossfade started"
        );

        self.crossfade = Some(Crossfade {
            outgoing: old.id(),
            incoming: incoming.id(),
            outgoing_done: false,
            incoming_done: false,
            ends_at_ms: start_in + t.crossfade_in_ms,
        });
        self.retiring.push(old);
        self.current = Some(incoming);
        self.state = PadState::FadingIn;
        stage
            .notifier
            .playback(ChannelKind::Pads, PlaybackState::FadingIn);
    }

    /// React to a finished envelope on one of the pad channels.
    pub fn on_ramp_completed(
        &mut self,
        stage: &mut Stage,
        completion: &RampCompletion,
    ) -> Vec<PadNotice> {
        let mut notices = Vec::new();
        let node = completion.node;

        if let Some(pos) = self.retiring.iter().position(|s| s.id() == node) {
            let old = self.retiring.remove(pos);
            stage.graph.remove_channel(old.id());
            tracing::debug!(key = %old.source.key, "retired pad stream disconnected");
            if let Some(xf) = self.crossfade.as_mut().filter(|xf| xf.outgoing == node) {
                xf.outgoing_done = true;
            }
        } else if self.current.as_ref().is_some_and(|s| s.id() == node) {
            match self.state {
                PadState::FadingIn => {
                    self.set_state(stage, PadState::Playing);
                    if let Some(xf) = self.crossfade.as_mut().filter(|xf| xf.incoming == node) {
                        xf.incoming_done = true;
                    }
                }
                PadState::FadingOut => {
                    stage.graph.pause(node);
                    self.set_state(stage, PadState::Loaded);
                    notices.push(PadNotice::Stopped);
                }
                _ => {}
            }
        }

        if self
            .crossfade
            .as_ref()
            .is_some_and(|xf| xf.outgoing_done && xf.incoming_done)
        {
            self.crossfade = None;
            tracing::debug!("crossfade finished");
            notices.push(PadNotice::CrossfadeFinished);
            if let Some((key, pad_set)) = self.queued.take() {
                self.crossfade_to(stage, &key, &pad_set);
            }
        }

        notices
    }

    /// Disconnect everything immediately.
    pub fn release(&mut self, stage: &mut Stage) {
        for stream in self.current.take().into_iter().chain(self.retiring.drain(..)) {
            stage.envelopes.cancel(stream.id());
            stage.graph.remove_channel(stream.id());
        }
        self.pending = None;
        self.crossfade = None;
        self.queued = None;
        self.set_state(stage, PadState::NoStream);
    }
}

impl std::fmt::Debug for PadPlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PadPlaybackController")
            .field("state", &self.state)
            .field("current", &self.current_key())
            .field("retiring", &self.retiring.len())
            .field("crossfading", &self.crossfade.is_some())
            .finish()
    }
}
