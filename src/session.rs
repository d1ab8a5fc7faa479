//! The playback session: which song is active, which channels are on, and
//! how each user action turns into pad and click transitions.
//!
//! The session is single-threaded. Every public operation returns promptly;
//! anything that takes time (fades, loads, the click settle pause) advances
//! on [`PlaybackSession::tick`].

use crate::builder::SessionBuilder;
use crate::config::EngineConfig;
use crate::events::{ChannelKind, EngineEvent, Notifier};
use crate::metronome::MetronomeScheduler;
use crate::pads::{PadNotice, PadPlaybackController};
use crate::prefs::{clamp_volume, VolumePrefs, VolumeStore};
use crate::song::{GlobalSettings, SongDescriptor, ToggleState};
use crate::stage::Stage;
use crate::Result;
use crossbeam_channel::Receiver;
use setalight_core::{ClickTiming, StereoMode};
use std::sync::Arc;

pub struct PlaybackSession {
    config: EngineConfig,
    settings: GlobalSettings,
    toggles: ToggleState,
    current: Option<SongDescriptor>,
    active: Option<SongDescriptor>,
    playing: bool,
    /// Start requested while a crossfade was still resolving.
    deferred_start: bool,
    /// Click waiting out the settle pause before restarting at a new tempo.
    click_restart: Option<(f64, ClickTiming)>,
    stage: Stage,
    pads: PadPlaybackController,
    metronome: MetronomeScheduler,
    prefs: VolumePrefs,
    store: Box<dyn VolumeStore>,
    disposed: bool,
}

impl PlaybackSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        config: EngineConfig,
        settings: GlobalSettings,
        toggles: ToggleState,
        stage: Stage,
        pads: PadPlaybackController,
        metronome: MetronomeScheduler,
        prefs: VolumePrefs,
        store: Box<dyn VolumeStore>,
    ) -> Self {
        let mut session = Self {
            config,
            settings,
            toggles,
            current: None,
            active: None,
            playing: false,
            deferred_start: false,
            click_restart: None,
            stage,
            pads,
            metronome,
            prefs,
            store,
            disposed: false,
        };
        session.apply_forced_toggle();
        session.apply_routes();
        session
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> GlobalSettings {
        self.settings
    }

    pub fn toggles(&self) -> ToggleState {
        self.toggles
    }

    pub fn current_song(&self) -> Option<&SongDescriptor> {
        self.current.as_ref()
    }

    pub fn active_song(&self) -> Option<&SongDescriptor> {
        self.active.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_start_deferred(&self) -> bool {
        self.deferred_start
    }

    /// Time at which a pending click restart fires.
    pub fn click_restart_at(&self) -> Option<f64> {
        self.click_restart.as_ref().map(|(at, _)| *at)
    }

    pub fn volume_prefs(&self) -> VolumePrefs {
        self.prefs
    }

    pub fn pads(&self) -> &PadPlaybackController {
        &self.pads
    }

    pub fn metronome(&self) -> &MetronomeScheduler {
        &self.metronome
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn now_ms(&self) -> f64 {
        self.stage.now_ms()
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        Arc::clone(&self.stage.notifier)
    }

    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.stage.notifier.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn wants(&self, channel: ChannelKind) -> bool {
        self.settings.is_enabled(channel) && self.toggles.is_on(channel)
    }

    fn emit(&self, event: EngineEvent) {
        self.stage.notifier.emit(event);
    }

    // =========================================================================
    // Song and transport
    // =========================================================================

    /// Remember `song` as the one on screen. Nothing audible changes.
    pub fn on_song_changed(&mut self, song: SongDescriptor) {
        tracing::debug!(key = %song.key, title = ?song.title, "current song changed");
        self.current = Some(song);
    }

    /// Bring the current song's pads and click up.
    ///
    /// Already playing the current song: no-op. Mid crossfade: deferred until
    /// the crossfade resolves. An output stream that will not start is
    /// returned as an error (and reported as [`EngineEvent::OutputBlocked`]);
    /// call again after the next user gesture.
    pub fn on_start_requested(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        let Some(song) = self.current.clone() else {
            tracing::debug!("start requested without a current song");
            return Ok(());
        };
        if self.playing && self.active.as_ref() == Some(&song) {
            tracing::debug!(key = %song.key, "song already active");
            return Ok(());
        }
        if self.pads.is_crossfading() {
            tracing::debug!(key = %song.key, "crossfade in flight, deferring start");
            self.deferred_start = true;
            return Ok(());
        }

        if let Err(err) = self.stage.graph.ensure_started() {
            tracing::warn!(error = %err, "output blocked, start needs a retry");
            self.emit(EngineEvent::OutputBlocked(err.to_string()));
            return Err(err.into());
        }
        self.deferred_start = false;

        self.start_pads(&song);
        self.start_click(&song);

        tracing::info!(key = %song.key, bpm = ?song.bpm, "song active");
        self.active = Some(song);
        self.playing = true;
        Ok(())
    }

    /// Fade out whatever is sounding. The active song is kept for a resume.
    pub fn on_stop_requested(&mut self) {
        self.deferred_start = false;
        self.click_restart = None;
        self.pads.fade_out(&mut self.stage, None);
        self.metronome.stop(&mut self.stage);
        if self.playing {
            tracing::debug!("session stopped");
            self.playing = false;
        }
    }

    fn start_pads(&mut self, song: &SongDescriptor) {
        if !self.wants(ChannelKind::Pads) {
            self.pads.fade_out(&mut self.stage, None);
            return;
        }
        let pad_set = self.config.pad_set.clone();
        if self.pads.is_audible() {
            self.pads.crossfade_to(&mut self.stage, &song.key, &pad_set);
        } else {
            self.pads.play_key(&mut self.stage, &song.key, &pad_set);
        }
    }

    fn start_click(&mut self, song: &SongDescriptor) {
        if !self.wants(ChannelKind::Click) {
            self.stop_click();
            return;
        }
        let Some(timing) = song.click_timing() else {
            tracing::warn!(key = %song.key, "click refused, song has no usable tempo or meter");
            self.stop_click();
            self.emit(EngineEvent::ClickRefused);
            return;
        };

        if let Some((at, pending)) = self.click_restart.as_mut() {
            tracing::debug!(at, "click restart already settling, retiming");
            *pending = timing;
        } else if self.metronome.is_running() {
            if self.active.as_ref().is_some_and(|active| active.same_tempo(song)) {
                return;
            }
            self.metronome.stop(&mut self.stage);
            let at = self.stage.now_ms() + self.config.click_settle_ms;
            tracing::debug!(at, "tempo change, click settling before restart");
            self.click_restart = Some((at, timing));
        } else {
            self.metronome.start(&mut self.stage, timing);
        }
    }

    fn stop_click(&mut self) {
        self.click_restart = None;
        self.metronome.stop(&mut self.stage);
    }

    // =========================================================================
    // Toggles and settings
    // =========================================================================

    pub fn on_pads_toggle(&mut self) {
        self.toggle(ChannelKind::Pads);
    }

    pub fn on_click_toggle(&mut self) {
        self.toggle(ChannelKind::Click);
    }

    fn toggle(&mut self, channel: ChannelKind) {
        if self.settings.forced_channel() == Some(channel) {
            tracing::debug!(?channel, "toggle is forced on by settings");
            return;
        }
        let on = !self.toggles.is_on(channel);
        self.toggles.set(channel, on);
        tracing::debug!(?channel, on, "toggle changed");
        self.emit(EngineEvent::ToggleChanged(self.toggles));

        if self.playing {
            self.apply_channel(channel);
        }
    }

    /// Start or stop `channel` so it matches the toggles and settings.
    fn apply_channel(&mut self, channel: ChannelKind) {
        let Some(song) = self.active.clone() else {
            return;
        };
        let wanted = self.wants(channel);
        match channel {
            ChannelKind::Pads if wanted => {
                let pad_set = self.config.pad_set.clone();
                self.pads.play_key(&mut self.stage, &song.key, &pad_set);
            }
            ChannelKind::Pads => {
                self.pads.fade_out(&mut self.stage, None);
            }
            ChannelKind::Click if wanted => self.start_click(&song),
            ChannelKind::Click => self.stop_click(),
        }
    }

    /// Adopt new global settings.
    ///
    /// A channel disabled here stops at once. When only one channel stays
    /// enabled its toggle is forced on. Routing follows the stereo split.
    pub fn on_settings_changed(&mut self, settings: GlobalSettings) {
        let previous = std::mem::replace(&mut self.settings, settings);
        tracing::debug!(?settings, "settings changed");

        for channel in [ChannelKind::Pads, ChannelKind::Click] {
            if previous.is_enabled(channel) && !settings.is_enabled(channel) {
                self.force_stop(channel);
            }
        }

        let forced = self.apply_forced_toggle();
        self.apply_routes();

        if self.playing {
            for channel in [ChannelKind::Pads, ChannelKind::Click] {
                let enabled_now = !previous.is_enabled(channel) && settings.is_enabled(channel);
                if enabled_now || forced == Some(channel) {
                    self.apply_channel(channel);
                }
            }
        }
    }

    fn force_stop(&mut self, channel: ChannelKind) {
        tracing::debug!(?channel, "channel disabled, stopping");
        match channel {
            ChannelKind::Pads => {
                self.pads.fade_out(&mut self.stage, Some(0.0));
            }
            ChannelKind::Click => self.stop_click(),
        }
    }

    /// Turn on the toggle of the only enabled channel. Returns it if it flipped.
    fn apply_forced_toggle(&mut self) -> Option<ChannelKind> {
        let channel = self.settings.forced_channel()?;
        if self.toggles.is_on(channel) {
            return None;
        }
        self.toggles.set(channel, true);
        self.emit(EngineEvent::ToggleChanged(self.toggles));
        Some(channel)
    }

    fn apply_routes(&mut self) {
        let (pads, click) = if self.settings.stereo_split_enabled {
            (StereoMode::Left, StereoMode::Right)
        } else {
            (StereoMode::Both, StereoMode::Both)
        };
        self.pads.set_route(&mut self.stage, pads);
        self.metronome.set_route(&mut self.stage, click);
    }

    // =========================================================================
    // Volume
    // =========================================================================

    pub fn set_pad_volume(&mut self, volume: f32) {
        let volume = clamp_volume(volume);
        self.prefs.pad_volume = volume;
        self.pads.set_volume(&mut self.stage, volume);
        self.persist_prefs();
    }

    pub fn set_click_volume(&mut self, volume: f32) {
        let volume = clamp_volume(volume);
        self.prefs.click_volume = volume;
        self.metronome.set_volume(volume);
        self.persist_prefs();
    }

    fn persist_prefs(&self) {
        if let Err(err) = self.store.save(&self.prefs) {
            tracing::warn!(error = %err, "could not save volume preferences");
        }
    }

    // =========================================================================
    // Pump
    // =========================================================================

    /// Advance everything that runs on time: loads, envelopes, a settling
    /// click restart, a deferred start and due metronome beats.
    pub fn tick(&mut self) {
        if self.disposed {
            return;
        }

        let mut notices = self.pads.pump(&mut self.stage);
        let now = self.stage.now_ms();
        for completion in self.stage.envelopes.advance(now) {
            notices.extend(self.pads.on_ramp_completed(&mut self.stage, &completion));
        }
        for notice in notices {
            self.handle_pad_notice(notice);
        }

        if self.click_restart.as_ref().is_some_and(|(at, _)| now >= *at) {
            if let Some((_, timing)) = self.click_restart.take() {
                if self.playing && self.wants(ChannelKind::Click) {
                    self.metronome.start(&mut self.stage, timing);
                }
            }
        }

        if self.deferred_start && !self.pads.is_crossfading() {
            self.deferred_start = false;
            tracing::debug!("crossfade resolved, running deferred start");
            if let Err(err) = self.on_start_requested() {
                tracing::warn!(error = %err, "deferred start failed");
            }
        }

        self.metronome.tick(&mut self.stage);
    }

    fn handle_pad_notice(&mut self, notice: PadNotice) {
        match notice {
            PadNotice::LoadFailed { key, .. } => {
                if self.settings.forced_channel() == Some(ChannelKind::Pads) {
                    tracing::debug!(key, "pad load failed, toggle is forced and stays on");
                } else if self.toggles.pads_on {
                    self.toggles.pads_on = false;
                    self.emit(EngineEvent::ToggleChanged(self.toggles));
                }
            }
            PadNotice::Stopped => tracing::debug!("pads faded out"),
            PadNotice::CrossfadeFinished => tracing::debug!("pads crossfade resolved"),
        }
    }

    /// Earliest time [`tick`](Self::tick) has scheduled work.
    ///
    /// `None` when only loads (if any) are outstanding.
    pub fn next_deadline(&self) -> Option<f64> {
        if self.disposed {
            return None;
        }
        let restart = self.click_restart.as_ref().map(|(at, _)| *at);
        [
            self.stage.envelopes.next_deadline(),
            self.metronome.next_deadline(),
            restart,
        ]
        .into_iter()
        .flatten()
        .min_by(|a, b| a.total_cmp(b))
    }

    /// Render `frames` of interleaved stereo when running on the offline backend.
    pub fn render_offline(&mut self, frames: usize) -> Vec<f32> {
        self.stage.graph.render_offline(frames)
    }

    /// Stop everything and close the audio graph.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.deferred_start = false;
        self.click_restart = None;
        self.pads.release(&mut self.stage);
        self.metronome.release(&mut self.stage);
        self.stage.envelopes.clear();
        self.stage.graph.close();
        self.playing = false;
        self.disposed = true;
        tracing::debug!("session disposed");
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("active", &self.active.as_ref().map(|s| &s.key))
            .field("playing", &self.playing)
            .field("toggles", &self.toggles)
            .field("pads", &self.pads)
            .field("metronome", &self.metronome.state())
            .finish()
    }
}
