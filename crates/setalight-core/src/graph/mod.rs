//! Audio output graph.
//!
//! The graph is a flat set of channels. Each channel has a gain node, an
//! optional looping sample source and a stereo routing mode. Clicks are
//! one-shot tones placed on a channel at an absolute time.
//!
//! The control side ([`AudioGraph`]) owns the registry and publishes routing
//! as an immutable [`Topology`] snapshot. The render side ([`Mixer`]) receives
//! structural changes through a bounded command queue and reads gains and
//! routing lock-free, so nothing on the audio thread ever waits on a lock.
//!
//! Nothing is opened until [`AudioGraph::ensure_started`]. Channels created
//! before that are replayed into the mixer when it is built.

mod click;
mod mixer;
#[cfg(feature = "device")]
mod output;

pub use click::{click_tone, tone_params, ToneParams, CLICK_DURATION_SECS};
pub use mixer::Mixer;
#[cfg(feature = "device")]
pub use output::list_output_devices;

use crate::clock::{ClockShared, GraphClock};
use crate::lockfree::AtomicFloat;
use crate::tempo::Accent;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// Shared gain value for one channel.
///
/// Cloning yields another handle to the same value. Envelopes write it from
/// the control thread; the mixer smooths and applies it per sample.
#[derive(Debug, Clone)]
pub struct GainNode {
    id: ChannelId,
    value: Arc<AtomicFloat>,
}

impl GainNode {
    /// A gain node not registered with any graph.
    pub fn detached(id: ChannelId, value: f32) -> Self {
        Self {
            id,
            value: Arc::new(AtomicFloat::new(value)),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.get()
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.set(value);
    }

    pub(crate) fn shared(&self) -> Arc<AtomicFloat> {
        Arc::clone(&self.value)
    }
}

/// Which output channels a graph channel reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StereoMode {
    #[default]
    Both,
    /// Folded to mono and sent to the left output only.
    Left,
    /// Folded to mono and sent to the right output only.
    Right,
}

/// Immutable routing snapshot read by the mixer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    routes: BTreeMap<ChannelId, StereoMode>,
}

impl Topology {
    pub fn mode(&self, id: ChannelId) -> StereoMode {
        self.routes.get(&id).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Decoded audio in interleaved `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Result<Self> {
        if channels == 0 || sample_rate == 0 {
            return Err(Error::InvalidConfig(format!(
                "sample buffer needs channels and sample rate (got {channels} ch @ {sample_rate} Hz)"
            )));
        }
        if samples.len() < channels as usize {
            return Err(Error::InvalidConfig("sample buffer is empty".into()));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_ms(&self) -> f64 {
        self.frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Stereo frame at `index`. Mono is duplicated; channels past two are ignored.
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let base = index * self.channels as usize;
        let left = self.samples[base];
        let right = if self.channels > 1 {
            self.samples[base + 1]
        } else {
            left
        };
        (left, right)
    }
}

/// Structural changes sent to the mixer.
#[derive(Debug, Clone)]
pub(crate) enum GraphCommand {
    AddChannel { id: ChannelId, gain: Arc<AtomicFloat> },
    RemoveChannel(ChannelId),
    Attach { id: ChannelId, buffer: Arc<SampleBuffer> },
    Play(ChannelId),
    Pause(ChannelId),
    Click { channel: ChannelId, at_ms: f64, accent: Accent },
    SilenceClicks(ChannelId),
}

/// Where rendered audio goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Default output device through CPAL.
    #[default]
    Device,
    /// Rendered on demand with [`AudioGraph::render_offline`].
    Offline,
    /// No audio subsystem. Everything is accepted and nothing sounds.
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Not opened yet, or opening failed in a way a later call may fix.
    Idle,
    Running,
    /// No audio subsystem. The graph stays silent for good.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub backend: BackendKind,
    /// Output device index, `None` for the host default.
    pub output_device_index: Option<usize>,
    /// Sample rate for the offline backend. Device output uses the device rate.
    pub sample_rate: f64,
    pub command_capacity: usize,
    /// Per-sample smoothing applied on top of envelope steps.
    pub smoothing_secs: f32,
    /// Start attempts the offline backend refuses before it plays, the way a
    /// platform output stays suspended until a user gesture.
    pub suspended_starts: u32,
}

impl GraphConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "Sample rate {} out of range (8000-384000)",
                self.sample_rate
            )));
        }
        if self.command_capacity == 0 {
            return Err(Error::InvalidConfig("command capacity must be non-zero".into()));
        }
        if !(self.smoothing_secs.is_finite() && self.smoothing_secs >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "smoothing time {} must be a non-negative number of seconds",
                self.smoothing_secs
            )));
        }
        Ok(())
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Device,
            output_device_index: None,
            sample_rate: 48000.0,
            command_capacity: 1024,
            smoothing_secs: 0.005,
            suspended_starts: 0,
        }
    }
}

#[derive(Debug)]
struct ChannelEntry {
    gain: GainNode,
    source: Option<Arc<SampleBuffer>>,
    playing: bool,
}

/// Control-side handle of the output graph.
pub struct AudioGraph {
    config: GraphConfig,
    state: GraphState,
    channels: BTreeMap<ChannelId, ChannelEntry>,
    topology: Arc<ArcSwap<Topology>>,
    routes: BTreeMap<ChannelId, StereoMode>,
    clock: Arc<ClockShared>,
    command_tx: Sender<GraphCommand>,
    command_rx: Receiver<GraphCommand>,
    offline: Option<Mixer>,
    #[cfg(feature = "device")]
    device: Option<output::DeviceOutput>,
    refusals_left: u32,
    next_id: u32,
}

impl AudioGraph {
    pub fn new(config: GraphConfig) -> Self {
        let (command_tx, command_rx) = bounded(config.command_capacity.max(16));
        let clock = Arc::new(ClockShared::new(config.sample_rate));
        let refusals_left = config.suspended_starts;

        Self {
            config,
            state: GraphState::Idle,
            channels: BTreeMap::new(),
            topology: Arc::new(ArcSwap::from_pointee(Topology::default())),
            routes: BTreeMap::new(),
            clock,
            command_tx,
            command_rx,
            offline: None,
            #[cfg(feature = "device")]
            device: None,
            refusals_left,
            next_id: 0,
        }
    }

    pub fn offline(sample_rate: f64) -> Self {
        Self::new(GraphConfig {
            backend: BackendKind::Offline,
            sample_rate,
            ..GraphConfig::default()
        })
    }

    pub fn null() -> Self {
        Self::new(GraphConfig {
            backend: BackendKind::Null,
            ..GraphConfig::default()
        })
    }

    /// Open the backend if it is not open yet.
    ///
    /// Idempotent. A missing audio subsystem is not an error: the graph turns
    /// [`GraphState::Unavailable`] and every later call is a silent no-op. A
    /// stream that refuses to play leaves the graph idle and returns the
    /// error, so the caller can retry after the next user gesture.
    pub fn ensure_started(&mut self) -> Result<()> {
        if self.state != GraphState::Idle {
            return Ok(());
        }

        match self.config.backend {
            BackendKind::Null => {
                tracing::debug!("audio graph running without an audio subsystem");
                self.state = GraphState::Unavailable;
            }
            BackendKind::Offline => {
                if self.refusals_left > 0 {
                    self.refusals_left -= 1;
                    let err = Error::OutputSuspended("offline output not resumed yet".into());
                    tracing::warn!(error = %err, "audio output refused to start");
                    return Err(err);
                }
                let mixer = self.build_mixer(self.config.sample_rate);
                self.clock.begin_rendering(self.config.sample_rate);
                self.offline = Some(mixer);
                self.state = GraphState::Running;
            }
            BackendKind::Device => self.start_device()?,
        }
        Ok(())
    }

    #[cfg(feature = "device")]
    fn start_device(&mut self) -> Result<()> {
        let mut device = match output::DeviceOutput::open(self.config.output_device_index) {
            Ok(device) => device,
            Err(err) => {
                tracing::warn!(error = %err, "no audio output available, continuing silently");
                self.state = GraphState::Unavailable;
                return Ok(());
            }
        };

        let sample_rate = device.sample_rate();
        let mixer = self.build_mixer(sample_rate);
        self.clock.begin_rendering(sample_rate);

        match device.start(mixer) {
            Ok(()) => {
                tracing::info!(
                    sample_rate,
                    channels = device.channels(),
                    "audio output started"
                );
                self.device = Some(device);
                self.state = GraphState::Running;
                Ok(())
            }
            Err(err) if err.is_retryable() => {
                self.clock.end_rendering();
                tracing::warn!(error = %err, "audio output refused to start");
                Err(err)
            }
            Err(err) => {
                self.clock.end_rendering();
                tracing::warn!(error = %err, "audio output failed, continuing silently");
                self.state = GraphState::Unavailable;
                Ok(())
            }
        }
    }

    #[cfg(not(feature = "device"))]
    fn start_device(&mut self) -> Result<()> {
        tracing::warn!("built without device output, continuing silently");
        self.state = GraphState::Unavailable;
        Ok(())
    }

    /// Build a mixer holding everything registered so far.
    fn build_mixer(&mut self, sample_rate: f64) -> Mixer {
        // Anything queued before start is already reflected in the registry.
        while self.command_rx.try_recv().is_ok() {}

        let mut mixer = Mixer::new(
            sample_rate,
            self.config.smoothing_secs,
            Arc::clone(&self.clock),
            Arc::clone(&self.topology),
            self.command_rx.clone(),
        );
        for (id, entry) in &self.channels {
            mixer.apply(GraphCommand::AddChannel {
                id: *id,
                gain: entry.gain.shared(),
            });
            if let Some(buffer) = &entry.source {
                mixer.apply(GraphCommand::Attach {
                    id: *id,
                    buffer: Arc::clone(buffer),
                });
            }
            if entry.playing {
                mixer.apply(GraphCommand::Play(*id));
            }
        }
        mixer
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == GraphState::Running
    }

    pub fn backend(&self) -> BackendKind {
        self.config.backend
    }

    pub fn clock(&self) -> GraphClock {
        GraphClock::new(Arc::clone(&self.clock))
    }

    fn send(&self, command: GraphCommand) {
        if self.state != GraphState::Running {
            return;
        }
        match self.command_tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                tracing::warn!(?command, "graph command queue full, dropping command");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Create a silent channel routed with `mode`.
    pub fn add_channel(&mut self, mode: StereoMode) -> GainNode {
        let id = ChannelId(self.next_id);
        self.next_id += 1;

        let gain = GainNode::detached(id, 0.0);
        self.channels.insert(
            id,
            ChannelEntry {
                gain: gain.clone(),
                source: None,
                playing: false,
            },
        );
        self.routes.insert(id, mode);
        self.commit_topology();
        self.send(GraphCommand::AddChannel {
            id,
            gain: gain.shared(),
        });
        tracing::trace!(channel = %id, ?mode, "channel added");
        gain
    }

    /// Disconnect and discard a channel. Unknown ids are ignored.
    pub fn remove_channel(&mut self, id: ChannelId) {
        if self.channels.remove(&id).is_none() {
            return;
        }
        self.routes.remove(&id);
        self.commit_topology();
        self.send(GraphCommand::RemoveChannel(id));
        tracing::trace!(channel = %id, "channel removed");
    }

    /// Change the stereo routing of a channel.
    ///
    /// Only the topology snapshot changes; the channel's gain is untouched.
    pub fn route_channel(&mut self, id: ChannelId, mode: StereoMode) {
        if !self.channels.contains_key(&id) {
            return;
        }
        if self.routes.insert(id, mode) != Some(mode) {
            self.commit_topology();
        }
    }

    pub fn channel_mode(&self, id: ChannelId) -> Option<StereoMode> {
        self.routes.get(&id).copied()
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load_full()
    }

    fn commit_topology(&self) {
        self.topology.store(Arc::new(Topology {
            routes: self.routes.clone(),
        }));
    }

    /// Set the looping source of a channel. Playback restarts from its start.
    pub fn attach(&mut self, id: ChannelId, buffer: Arc<SampleBuffer>) {
        let Some(entry) = self.channels.get_mut(&id) else {
            return;
        };
        entry.source = Some(Arc::clone(&buffer));
        self.send(GraphCommand::Attach { id, buffer });
    }

    pub fn play(&mut self, id: ChannelId) {
        let Some(entry) = self.channels.get_mut(&id) else {
            return;
        };
        if !entry.playing {
            entry.playing = true;
            self.send(GraphCommand::Play(id));
        }
    }

    /// Stop consuming the source. Resumes where it left off on [`play`](Self::play).
    pub fn pause(&mut self, id: ChannelId) {
        let Some(entry) = self.channels.get_mut(&id) else {
            return;
        };
        if entry.playing {
            entry.playing = false;
            self.send(GraphCommand::Pause(id));
        }
    }

    pub fn is_playing(&self, id: ChannelId) -> bool {
        self.channels.get(&id).is_some_and(|entry| entry.playing)
    }

    pub fn has_channel(&self, id: ChannelId) -> bool {
        self.channels.contains_key(&id)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Place a click tone on `channel` at `at_ms` on the graph clock.
    pub fn schedule_click(&self, channel: ChannelId, at_ms: f64, accent: Accent) {
        if self.channels.contains_key(&channel) {
            self.send(GraphCommand::Click {
                channel,
                at_ms,
                accent,
            });
        }
    }

    /// Drop every sounding or pending click on `channel`.
    pub fn silence_clicks(&self, channel: ChannelId) {
        self.send(GraphCommand::SilenceClicks(channel));
    }

    /// Render `frames` of interleaved stereo from the offline backend.
    ///
    /// Other backends, or an offline graph that was never started, yield silence.
    pub fn render_offline(&mut self, frames: usize) -> Vec<f32> {
        let mut output = vec![0.0; frames * 2];
        if let Some(mixer) = self.offline.as_mut() {
            mixer.process(&mut output);
        }
        output
    }

    /// Tear down the backend and forget every channel.
    pub fn close(&mut self) {
        #[cfg(feature = "device")]
        if let Some(device) = self.device.take() {
            drop(device);
            tracing::info!("audio output closed");
        }
        self.offline = None;
        if self.clock.is_rendering() {
            self.clock.end_rendering();
        }
        self.channels.clear();
        self.routes.clear();
        self.commit_topology();
        if self.state == GraphState::Running {
            self.state = GraphState::Idle;
        }
    }
}

impl std::fmt::Debug for AudioGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraph")
            .field("backend", &self.config.backend)
            .field("state", &self.state)
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        self.close();
    }
}
