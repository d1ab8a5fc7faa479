//! Render side of the graph.
//!
//! Runs inside the audio callback (or [`AudioGraph::render_offline`]). Each
//! block drains pending commands, reads the routing snapshot once and then
//! mixes every playing channel and every due click into interleaved stereo.
//!
//! [`AudioGraph::render_offline`]: super::AudioGraph::render_offline

use super::click::click_tone;
use super::{ChannelId, GraphCommand, SampleBuffer, StereoMode, Topology};
use crate::clock::ClockShared;
use crate::lockfree::AtomicFloat;
use crate::smooth::SmoothedGain;
use crate::tempo::Accent;
use arc_swap::ArcSwap;
use crossbeam_channel::Receiver;
use std::sync::Arc;

struct Voice {
    id: ChannelId,
    gain: Arc<AtomicFloat>,
    smoothed: SmoothedGain,
    source: Option<Arc<SampleBuffer>>,
    /// Read position in source frames.
    position: f64,
    playing: bool,
}

struct ClickVoice {
    channel: ChannelId,
    /// Absolute sample index of the first tone sample.
    start: u64,
    tone: usize,
    offset: usize,
}

pub struct Mixer {
    sample_rate: f64,
    smoothing_secs: f32,
    clock: Arc<ClockShared>,
    topology: Arc<ArcSwap<Topology>>,
    commands: Receiver<GraphCommand>,
    voices: Vec<Voice>,
    clicks: Vec<ClickVoice>,
    /// Heavy, medium, light.
    tones: [Vec<f32>; 3],
}

impl Mixer {
    pub(crate) fn new(
        sample_rate: f64,
        smoothing_secs: f32,
        clock: Arc<ClockShared>,
        topology: Arc<ArcSwap<Topology>>,
        commands: Receiver<GraphCommand>,
    ) -> Self {
        Self {
            sample_rate,
            smoothing_secs,
            clock,
            topology,
            commands,
            voices: Vec::with_capacity(8),
            clicks: Vec::with_capacity(32),
            tones: [
                click_tone(Accent::Heavy, sample_rate),
                click_tone(Accent::Medium, sample_rate),
                click_tone(Accent::Light, sample_rate),
            ],
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn pending_clicks(&self) -> usize {
        self.clicks.len()
    }

    pub(crate) fn apply(&mut self, command: GraphCommand) {
        match command {
            GraphCommand::AddChannel { id, gain } => {
                let smoothed = SmoothedGain::new(gain.get(), self.smoothing_secs, self.sample_rate as f32);
                match self.voices.iter_mut().find(|v| v.id == id) {
                    Some(voice) => {
                        voice.gain = gain;
                        voice.smoothed = smoothed;
                    }
                    None => self.voices.push(Voice {
                        id,
                        gain,
                        smoothed,
                        source: None,
                        position: 0.0,
                        playing: false,
                    }),
                }
            }
            GraphCommand::RemoveChannel(id) => {
                self.voices.retain(|v| v.id != id);
                self.clicks.retain(|c| c.channel != id);
            }
            GraphCommand::Attach { id, buffer } => {
                if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
                    voice.source = Some(buffer);
                    voice.position = 0.0;
                }
            }
            GraphCommand::Play(id) => self.set_playing(id, true),
            GraphCommand::Pause(id) => self.set_playing(id, false),
            GraphCommand::Click {
                channel,
                at_ms,
                accent,
            } => {
                if self.voices.iter().any(|v| v.id == channel) {
                    let start = self.clock.ms_to_sample(at_ms).max(self.clock.position());
                    self.clicks.push(ClickVoice {
                        channel,
                        start,
                        tone: accent as usize,
                        offset: 0,
                    });
                }
            }
            GraphCommand::SilenceClicks(channel) => {
                self.clicks.retain(|c| c.channel != channel);
            }
        }
    }

    fn set_playing(&mut self, id: ChannelId, playing: bool) {
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            voice.playing = playing;
        }
    }

    /// Render one block of interleaved stereo into `output`.
    pub fn process(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let frames = output.len() / 2;

        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        let topology = self.topology.load();
        let output_rate = self.sample_rate;

        for voice in &mut self.voices {
            let Voice {
                id,
                gain,
                smoothed,
                source,
                position,
                playing,
            } = voice;

            smoothed.set_target(gain.get());
            let Some(source) = source.as_ref().filter(|_| *playing) else {
                continue;
            };

            let mode = topology.mode(*id);
            let step = source.sample_rate() as f64 / output_rate;
            let length = source.frames();

            for frame in output.chunks_exact_mut(2) {
                let g = smoothed.next_sample();
                let (l, r) = read_interpolated(source, *position, length);
                *position += step;
                if *position >= length as f64 {
                    *position -= length as f64;
                }
                mix(frame, mode, l * g, r * g);
            }
        }

        let base = self.clock.position();
        let end = base + frames as u64;
        let Self {
            voices,
            clicks,
            tones,
            ..
        } = self;

        clicks.retain_mut(|click| {
            if click.start >= end {
                return true;
            }
            let Some(voice) = voices.iter().find(|v| v.id == click.channel) else {
                return false;
            };
            let gain = voice.gain.get();
            let mode = topology.mode(click.channel);
            let tone = &tones[click.tone];

            let first = click.start.saturating_sub(base) as usize;
            for frame in output.chunks_exact_mut(2).skip(first) {
                let Some(sample) = tone.get(click.offset) else {
                    break;
                };
                let s = sample * gain;
                mix(frame, mode, s, s);
                click.offset += 1;
            }
            click.offset < tone.len()
        });

        self.clock.advance(frames as u64);
    }
}

#[inline]
fn read_interpolated(source: &SampleBuffer, position: f64, length: usize) -> (f32, f32) {
    let index = position as usize;
    let frac = (position - index as f64) as f32;
    let (l0, r0) = source.frame(index % length);
    let (l1, r1) = source.frame((index + 1) % length);
    (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
}

#[inline]
fn mix(frame: &mut [f32], mode: StereoMode, left: f32, right: f32) {
    match mode {
        StereoMode::Both => {
            frame[0] += left;
            frame[1] += right;
        }
        StereoMode::Left => frame[0] += (left + right) * 0.5,
        StereoMode::Right => frame[1] += (left + right) * 0.5,
    }
}
