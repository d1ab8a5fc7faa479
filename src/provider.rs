//! Pad sample sources.
//!
//! A [`SampleProvider`] turns a musical key and a pad set name into decoded
//! audio. Where the audio comes from (bundled files, a download cache, a
//! synthesizer) is the provider's business; the engine only sees
//! [`PadSource`]s and treats every failure as "no pad for this key".

use crate::{Error, Result};
use dashmap::DashMap;
use setalight_core::SampleBuffer;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PITCH_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Tonic pitch class of a song's key.
///
/// Pads are pitched to the tonic, so `"F#m"`, `"Gb"` and `"Gbmaj"` all
/// resolve to the same pad. Names are spelled with flats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadKey(u8);

impl PadKey {
    pub fn parse(key: &str) -> Result<Self> {
        let trimmed = key.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .ok_or_else(|| Error::InvalidKey(key.to_string()))?;

        let natural: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(Error::InvalidKey(key.to_string())),
        };

        let rest = chars.as_str();
        let (shift, suffix) = if let Some(s) = rest.strip_prefix('#').or_else(|| rest.strip_prefix('♯')) {
            (1, s)
        } else if let Some(s) = rest.strip_prefix('b').or_else(|| rest.strip_prefix('♭')) {
            (-1, s)
        } else {
            (0, rest)
        };

        match suffix.trim().to_ascii_lowercase().as_str() {
            "" | "m" | "min" | "minor" | "maj" | "major" => {}
            _ => return Err(Error::InvalidKey(key.to_string())),
        }

        Ok(Self((natural + shift).rem_euclid(12) as u8))
    }

    /// Semitones above C.
    pub fn pitch_class(&self) -> u8 {
        self.0
    }

    pub fn name(&self) -> &'static str {
        PITCH_NAMES[self.0 as usize]
    }
}

impl fmt::Display for PadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PadKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Decoded pad audio for one key of one set.
#[derive(Debug, Clone)]
pub struct PadSource {
    pub key: PadKey,
    pub pad_set: String,
    pub buffer: Arc<SampleBuffer>,
}

pub trait SampleProvider: Send + Sync {
    fn resolve_pad_source(&self, key: &PadKey, pad_set: &str) -> Result<PadSource>;
}

impl<P: SampleProvider + ?Sized> SampleProvider for Arc<P> {
    fn resolve_pad_source(&self, key: &PadKey, pad_set: &str) -> Result<PadSource> {
        (**self).resolve_pad_source(key, pad_set)
    }
}

/// Reads `<root>/<pad_set>/<Key>.wav`.
#[derive(Debug, Clone)]
pub struct AssetPadProvider {
    root: PathBuf,
}

impl AssetPadProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &PadKey, pad_set: &str) -> PathBuf {
        self.root.join(pad_set).join(format!("{}.wav", key.name()))
    }
}

impl SampleProvider for AssetPadProvider {
    fn resolve_pad_source(&self, key: &PadKey, pad_set: &str) -> Result<PadSource> {
        let path = self.path_for(key, pad_set);
        let buffer = decode_wav_file(&path).map_err(|err| Error::PadUnavailable {
            key: key.to_string(),
            reason: format!("{}: {err}", path.display()),
        })?;
        tracing::debug!(
            key = %key,
            pad_set,
            frames = buffer.frames(),
            "decoded pad"
        );
        Ok(PadSource {
            key: *key,
            pad_set: pad_set.to_string(),
            buffer: Arc::new(buffer),
        })
    }
}

pub fn decode_wav_file(path: &Path) -> Result<SampleBuffer> {
    let reader = hound::WavReader::open(path)?;
    decode_wav(reader)
}

/// Decode any PCM or float WAV into interleaved `f32`.
pub fn decode_wav<R: Read>(reader: hound::WavReader<R>) -> Result<SampleBuffer> {
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };
    Ok(SampleBuffer::new(samples, spec.channels, spec.sample_rate)?)
}

/// In-memory pads keyed by set and key.
#[derive(Debug, Default)]
pub struct StaticProvider {
    pads: DashMap<(String, PadKey), Arc<SampleBuffer>>,
    resolves: AtomicUsize,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pad_set: &str, key: &str, buffer: SampleBuffer) -> Result<()> {
        let key = PadKey::parse(key)?;
        self.pads.insert((pad_set.to_string(), key), Arc::new(buffer));
        Ok(())
    }

    /// Insert a sine drone at the key's pitch.
    pub fn insert_tone(&self, pad_set: &str, key: &str, seconds: f64, sample_rate: u32) -> Result<()> {
        let pad = PadKey::parse(key)?;
        let buffer = drone(pad, seconds, sample_rate)?;
        self.pads.insert((pad_set.to_string(), pad), Arc::new(buffer));
        Ok(())
    }

    /// Number of lookups served, hits and misses alike.
    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::Relaxed)
    }
}

impl SampleProvider for StaticProvider {
    fn resolve_pad_source(&self, key: &PadKey, pad_set: &str) -> Result<PadSource> {
        self.resolves.fetch_add(1, Ordering::Relaxed);
        let buffer = self
            .pads
            .get(&(pad_set.to_string(), *key))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::PadUnavailable {
                key: key.to_string(),
                reason: format!("no pad in set {pad_set:?}"),
            })?;
        Ok(PadSource {
            key: *key,
            pad_set: pad_set.to_string(),
            buffer,
        })
    }
}

/// Stereo sine at the key's pitch in the octave below middle C.
fn drone(key: PadKey, seconds: f64, sample_rate: u32) -> Result<SampleBuffer> {
    let frequency = 130.81 * 2f64.powf(key.pitch_class() as f64 / 12.0);
    let frames = ((seconds * sample_rate as f64) as usize).max(1);
    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let s = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.25) as f32;
        samples.push(s);
        samples.push(s);
    }
    Ok(SampleBuffer::new(samples, 2, sample_rate)?)
}
