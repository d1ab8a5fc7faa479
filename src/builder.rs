//! Builder for configuring and constructing a [`PlaybackSession`].

use crate::config::EngineConfig;
use crate::events::Notifier;
use crate::loader::{LoadExecutor, Loader};
use crate::metronome::MetronomeScheduler;
use crate::pads::{PadPlaybackController, PadTimings};
use crate::prefs::{MemoryVolumeStore, VolumePrefs, VolumeStore};
use crate::provider::SampleProvider;
use crate::session::PlaybackSession;
use crate::song::{GlobalSettings, ToggleState};
use crate::stage::Stage;
use crate::Result;
use setalight_core::{AudioClock, AudioGraph, BackendKind};
use std::sync::Arc;

/// The audio graph is not opened here. It opens on the first start request,
/// which should follow a user gesture.
///
/// Volumes come from the store when it holds any, otherwise from the config
/// defaults. Without a provider no pad can load, so every pad request is
/// reported as a load failure.
///
/// # Example
///
/// ```
/// use setalight_audio::prelude::*;
///
/// let provider = StaticProvider::new();
/// provider.insert_tone("default", "E", 0.1, 8000)?;
///
/// let mut session = PlaybackSession::builder()
///     .backend(BackendKind::Null)
///     .provider(provider)
///     .build()?;
///
/// session.on_song_changed(SongDescriptor::new("E").bpm(72.0).time_signature(TimeSignature::default()));
/// session.on_start_requested()?;
/// session.tick();
/// assert!(session.is_playing());
/// # Ok::<(), setalight_audio::Error>(())
/// ```
pub struct SessionBuilder {
    config: EngineConfig,
    provider: Option<Arc<dyn SampleProvider>>,
    store: Option<Box<dyn VolumeStore>>,
    clock: Option<Arc<dyn AudioClock>>,
    graph: Option<AudioGraph>,
    settings: GlobalSettings,
    toggles: ToggleState,
    executor: LoadExecutor,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            provider: None,
            store: None,
            clock: None,
            graph: None,
            settings: GlobalSettings::default(),
            toggles: ToggleState::default(),
            executor: LoadExecutor::default(),
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for setting `config.backend`.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    /// Use a graph built elsewhere instead of one made from the config.
    pub fn graph(mut self, graph: AudioGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn provider(mut self, provider: impl SampleProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn shared_provider(mut self, provider: Arc<dyn SampleProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Default: in-memory, nothing persisted.
    pub fn store(mut self, store: impl VolumeStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Default: the graph's own clock.
    pub fn clock(mut self, clock: impl AudioClock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn settings(mut self, settings: GlobalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn toggles(mut self, toggles: ToggleState) -> Self {
        self.toggles = toggles;
        self
    }

    /// Default: [`LoadExecutor::Inline`]
    pub fn executor(mut self, executor: LoadExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn build(self) -> Result<PlaybackSession> {
        self.config.validate()?;

        let graph = match self.graph {
            Some(graph) => graph,
            None => {
                let graph_config = self.config.graph_config();
                graph_config.validate()?;
                AudioGraph::new(graph_config)
            }
        };
        let clock: Arc<dyn AudioClock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(graph.clock()),
        };

        let store = self
            .store
            .unwrap_or_else(|| Box::new(MemoryVolumeStore::new()));
        let defaults = VolumePrefs::new(
            self.config.default_pad_volume,
            self.config.default_click_volume,
        );
        let prefs = match store.load() {
            Ok(Some(prefs)) => prefs.clamped(),
            Ok(None) => defaults,
            Err(err) => {
                tracing::warn!(error = %err, "could not read volume preferences, using defaults");
                defaults
            }
        };

        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(crate::provider::StaticProvider::new()));
        let loader = Loader::new(provider, self.executor);

        let notifier = Arc::new(Notifier::new());
        let stage = Stage::new(graph, clock, notifier);
        let pads = PadPlaybackController::new(
            loader,
            PadTimings::from(&self.config),
            prefs.pad_volume,
        );
        let metronome = MetronomeScheduler::new(prefs.click_volume, self.config.click_lookahead_ms);

        tracing::debug!(
            backend = ?self.config.backend,
            pad_volume = prefs.pad_volume,
            click_volume = prefs.click_volume,
            "playback session built"
        );

        Ok(PlaybackSession::from_parts(
            self.config,
            self.settings,
            self.toggles,
            stage,
            pads,
            metronome,
            prefs,
            store,
        ))
    }
}
