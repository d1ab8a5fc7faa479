//! CPAL device output.

use super::Mixer;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Holds a `cpal::Stream` in a `Send` context.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: the stream is owned by `DeviceOutput`, which lives inside the
// `AudioGraph` and is only touched through `&mut AudioGraph`. It is never
// accessed concurrently and is dropped by its owner.
unsafe impl Send for StreamHandle {}

pub(crate) struct DeviceOutput {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    _stream: Option<StreamHandle>,
}

impl DeviceOutput {
    pub(crate) fn open(index: Option<usize>) -> Result<Self> {
        let device = get_device(index)?;
        let config = device.default_output_config()?;
        if let Ok(name) = device.name() {
            tracing::debug!(device = %name, "opened output device");
        }
        Ok(Self {
            device,
            config,
            _stream: None,
        })
    }

    pub(crate) fn sample_rate(&self) -> f64 {
        self.config.sample_rate().0 as f64
    }

    pub(crate) fn channels(&self) -> usize {
        self.config.channels() as usize
    }

    pub(crate) fn start(&mut self, mixer: Mixer) -> Result<()> {
        if self._stream.is_some() {
            return Ok(());
        }

        let stream_config: cpal::StreamConfig = self.config.clone().into();
        let stream = match self.config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&self.device, &stream_config, mixer)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&self.device, &stream_config, mixer)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&self.device, &stream_config, mixer)?,
            format => return Err(Error::UnsupportedSampleFormat(format!("{format:?}"))),
        };

        stream.play()?;
        self._stream = Some(StreamHandle(stream));
        Ok(())
    }
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices()?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::InvalidDevice(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::InvalidDevice("No output device available".into())),
    }
}

/// Names of the host's output devices, prefixed with their index.
pub fn list_output_devices() -> Result<Vec<String>> {
    cpal::default_host()
        .output_devices()?
        .enumerate()
        .map(|(i, d)| Ok(format!("{i}: {}", d.name()?)))
        .collect()
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;

    // Grows on the first callback, then stays put.
    let mut stereo = Vec::<f32>::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let frames = data.len() / channels;
                let needed = frames * 2;
                if stereo.len() < needed {
                    stereo.resize(needed, 0.0);
                }
                mixer.process(&mut stereo[..needed]);
                write_output(data, channels, &stereo[..needed]);
            }));

            if result.is_err() {
                output_silence(data);
            }
        },
        |err| tracing::error!(error = %err, "audio stream error"),
        None,
    )?;

    Ok(stream)
}

#[inline]
fn write_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    stereo: &[f32],
) {
    for (i, sample) in data.iter_mut().enumerate() {
        let frame = i / channels;
        let ch = i % channels;
        let value = if ch < 2 { stereo[frame * 2 + ch] } else { 0.0 };
        *sample = T::from_sample(value);
    }
}

#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}
