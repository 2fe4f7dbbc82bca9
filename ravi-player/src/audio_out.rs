//! Live audio output: a lock-free ring of raw PCM samples between the decode
//! thread and the `cpal` output callback.
//!
//! The container engine never touches wall-clock time or the audio device -
//! this module is exactly the kind of external collaborator ravi-core's spec
//! describes and deliberately stays out of. It consumes the raw PCM chunks
//! `AviContainer::read_audio_frame` returns and nothing more.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer as _, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

/// Format of the PCM samples the decode thread hands to [`AudioOutput::push`].
#[derive(Debug, Clone, Copy)]
pub struct PcmFormat {
    pub channels: u16,
    pub samples_per_sec: u32,
    pub bits_per_sample: u16,
}

/// Owns the cpal output stream and the producer half of the ring buffer.
/// Dropping it tears down the stream.
pub struct AudioOutput {
    _stream: Stream,
    producer: HeapProd<f32>,
    format: PcmFormat,
}

impl AudioOutput {
    /// Opens the default output device at as close to `format` as the device
    /// will give us; cpal handles resampling mismatches by simply playing at
    /// whatever rate/channel count the device reports, which is good enough
    /// for a demo player.
    pub fn open(format: PcmFormat) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default audio output device"))?;

        let supported = device
            .default_output_config()
            .context("no default output config")?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();

        // ~200ms of headroom at the device's own rate.
        let capacity = (config.sample_rate.0 as usize * config.channels as usize) / 5;
        let rb = HeapRb::<f32>::new(capacity.max(1024));
        let (producer, mut consumer) = rb.split();

        let err_fn = |e| tracing::warn!(error = %e, "audio stream error");
        let stream = match sample_format {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| fill(&mut consumer, data),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    let mut tmp = vec![0.0f32; data.len()];
                    fill(&mut consumer, &mut tmp);
                    for (d, s) in data.iter_mut().zip(tmp.iter()) {
                        *d = (*s * i16::MAX as f32) as i16;
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _| {
                    let mut tmp = vec![0.0f32; data.len()];
                    fill(&mut consumer, &mut tmp);
                    for (d, s) in data.iter_mut().zip(tmp.iter()) {
                        *d = ((*s + 1.0) * 0.5 * u16::MAX as f32) as u16;
                    }
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported device sample format: {other:?}")),
        };
        stream.play().context("starting audio output stream")?;

        Ok(Self { _stream: stream, producer, format })
    }

    /// Pushes one raw PCM chunk (as read from the container) onto the ring,
    /// converting to `f32` per the configured bit depth. Samples that don't
    /// fit are dropped - the ring is a bounded look-ahead buffer, not a queue
    /// the writer side can block on.
    pub fn push(&mut self, pcm: &[u8]) {
        for sample in decode_samples(pcm, self.format.bits_per_sample) {
            let _ = self.producer.try_push(sample);
        }
    }
}

fn fill(consumer: &mut HeapCons<f32>, out: &mut [f32]) {
    for slot in out.iter_mut() {
        *slot = consumer.try_pop().unwrap_or(0.0);
    }
}

/// Converts a raw little-endian PCM chunk into normalized `f32` samples.
fn decode_samples(pcm: &[u8], bits_per_sample: u16) -> Vec<f32> {
    match bits_per_sample {
        8 => pcm.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        16 => pcm
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
            .collect(),
        24 => pcm
            .chunks_exact(3)
            .map(|c| {
                let v = i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8;
                v as f32 / 8_388_607.0
            })
            .collect(),
        32 => pcm
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / i32::MAX as f32)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_16_bit_silence_to_zero() {
        let pcm = vec![0u8; 8];
        let samples = decode_samples(&pcm, 16);
        assert_eq!(samples, vec![0.0; 4]);
    }

    #[test]
    fn decodes_16_bit_full_scale() {
        let pcm = i16::MAX.to_le_bytes().to_vec();
        let samples = decode_samples(&pcm, 16);
        assert!((samples[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unsupported_bit_depth_yields_empty() {
        assert!(decode_samples(&[0, 1, 2], 12).is_empty());
    }
}
