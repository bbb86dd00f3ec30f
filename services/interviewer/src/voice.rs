//! Microphone capture and interviewer playback over cpal.
//!
//! Capture is downmixed to mono, resampled to the realtime rate and appended
//! to the input audio buffer while the [`MicGate`] is open and the
//! interviewer is silent. Playback decodes audio deltas into a ring buffer
//! that the output callback drains.

use crate::config::{INPUT_CHUNK_SIZE, OUTPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS};
use crate::runtime::MicGate;
use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use lune_native_utils::audio::{self, REALTIME_API_PCM16_SAMPLE_RATE};
use lune_native_utils::device;
use openai_realtime::ClientTx;
use openai_realtime::types::ClientEvent;
use openai_realtime::types::audio::Base64EncodedAudioBytes;
use openai_realtime::types::events::client::InputAudioBufferAppendEvent;
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Keeps the audio streams and their worker tasks alive.
pub struct VoiceIo {
    _input: cpal::Stream,
    _output: cpal::Stream,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for VoiceIo {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Devices {
    pub input: Option<String>,
    pub output: Option<String>,
}

/// Resamples every full chunk in `buffer`, leaving any remainder queued.
fn drain_chunks(buffer: &mut VecDeque<f32>, resampler: &mut impl Resampler<f32>) -> Vec<f32> {
    let mut resampled = Vec::new();
    while buffer.len() >= INPUT_CHUNK_SIZE {
        let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
        match resampler.process(&[chunk.as_slice()], None) {
            Ok(frames) => {
                if let Some(frames) = frames.first() {
                    resampled.extend_from_slice(frames);
                }
            }
            Err(e) => tracing::warn!("Failed to resample input audio: {}", e),
        }
    }
    resampled
}

/// Writes one mono sample per frame into the first two channels of `data`.
/// Returns whether anything audible was written.
fn fill_output(data: &mut [f32], channels: usize, mut next: impl FnMut() -> Option<f32>) -> bool {
    let mut audible = false;
    for frame in data.chunks_mut(channels.max(1)) {
        let sample = next().unwrap_or(0.0);
        if sample != 0.0 {
            audible = true;
        }
        for (index, slot) in frame.iter_mut().enumerate() {
            *slot = if index < 2 { sample } else { 0.0 };
        }
    }
    audible
}

fn append_event(samples: &[f32]) -> ClientEvent {
    ClientEvent::InputAudioBufferAppend(InputAudioBufferAppendEvent::new(audio::encode(samples)))
}

/// Opens the input and output devices and starts streaming.
///
/// Returns the sender the runtime uses for interviewer audio deltas.
pub fn start(
    devices: Devices,
    mic: MicGate,
    outbound: watch::Receiver<Option<ClientTx>>,
) -> Result<(VoiceIo, mpsc::Sender<Base64EncodedAudioBytes>)> {
    let speaking = Arc::new(AtomicBool::new(false));

    let input = device::get_or_default_input(devices.input)
        .context("Failed to get default audio input device")?;
    tracing::info!("Using input device: {:?}", input.name()?);
    let input_config = input
        .default_input_config()
        .context("Failed to get default input config")?;
    let input_config = StreamConfig {
        channels: input_config.channels(),
        sample_rate: input_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
    };
    let input_channels = input_config.channels as usize;
    let input_sample_rate = input_config.sample_rate.0 as f64;
    tracing::debug!("Input stream config: {:?}", &input_config);

    let (capture_tx, mut capture_rx) = mpsc::channel::<Vec<f32>>(1024);
    let input_stream = input.build_input_stream(
        &input_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if let Err(e) = capture_tx.try_send(audio::downmix(data, input_channels)) {
                tracing::warn!("Failed to queue captured audio: {:?}", e);
            }
        },
        move |err| tracing::error!("An error occurred on input stream: {}", err),
        None,
    )?;

    let output = device::get_or_default_output(devices.output)
        .context("Failed to get default audio output device")?;
    tracing::info!("Using output device: {:?}", output.name()?);
    let output_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channels = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0 as f64;
    tracing::debug!("Output stream config: {:?}", &output_config);

    let playback_buffer =
        audio::shared_buffer(output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (mut playback_producer, mut playback_consumer) = playback_buffer.split();

    let output_speaking = speaking.clone();
    let output_stream = output.build_output_stream(
        &output_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let audible = fill_output(data, output_channels, || playback_consumer.try_pop());
            output_speaking.store(audible, Ordering::Relaxed);
        },
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;

    let mut in_resampler = audio::create_resampler(
        input_sample_rate,
        REALTIME_API_PCM16_SAMPLE_RATE,
        INPUT_CHUNK_SIZE,
    )?;
    let mut out_resampler =
        audio::create_resampler(REALTIME_API_PCM16_SAMPLE_RATE, output_sample_rate, 100)?;

    let capture_speaking = speaking.clone();
    let capture = tokio::spawn(async move {
        let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);
        while let Some(samples) = capture_rx.recv().await {
            // Drop capture while muted or while the interviewer is talking.
            if !mic.is_open() || capture_speaking.load(Ordering::Relaxed) {
                buffer.clear();
                continue;
            }
            buffer.extend(samples);
            let resampled = drain_chunks(&mut buffer, &mut in_resampler);
            if resampled.is_empty() {
                continue;
            }
            let sender = outbound.borrow().clone();
            let Some(sender) = sender else {
                continue;
            };
            if let Err(e) = sender.send(append_event(&resampled)).await {
                tracing::warn!("Failed to send audio buffer: {}", e);
            }
        }
    });

    let (playback_tx, mut playback_rx) = mpsc::channel::<Base64EncodedAudioBytes>(100);
    let playback = tokio::spawn(async move {
        while let Some(delta) = playback_rx.recv().await {
            let samples = audio::decode(&delta);
            let chunk_size = out_resampler.input_frames_next();
            for chunk in audio::split_for_chunks(&samples, chunk_size) {
                let Ok(resampled) = out_resampler.process(&[chunk.as_slice()], None) else {
                    continue;
                };
                let Some(resampled) = resampled.first() else {
                    continue;
                };
                for sample in resampled {
                    if let Err(e) = playback_producer.try_push(*sample) {
                        tracing::warn!("Failed to push samples to buffer: {:?}", e);
                        break;
                    }
                }
            }
        }
    });

    input_stream.play()?;
    output_stream.play()?;

    Ok((
        VoiceIo {
            _input: input_stream,
            _output: output_stream,
            tasks: vec![capture, playback],
        },
        playback_tx,
    ))
}

/// Human-readable device listing for `--list-devices`.
pub fn describe_devices() -> Result<String> {
    Ok(format!(
        "Input devices:\n{}\nOutput devices:\n{}",
        device::get_available_inputs()?,
        device::get_available_outputs()?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_chunks_keeps_remainder() {
        let mut resampler = audio::create_resampler(48000.0, 24000.0, INPUT_CHUNK_SIZE).unwrap();
        let mut buffer: VecDeque<f32> = vec![0.1; INPUT_CHUNK_SIZE * 2 + 10].into();

        let resampled = drain_chunks(&mut buffer, &mut resampler);

        assert!(!resampled.is_empty());
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_drain_chunks_waits_for_full_chunk() {
        let mut resampler = audio::create_resampler(48000.0, 24000.0, INPUT_CHUNK_SIZE).unwrap();
        let mut buffer: VecDeque<f32> = vec![0.1; INPUT_CHUNK_SIZE - 1].into();

        assert!(drain_chunks(&mut buffer, &mut resampler).is_empty());
        assert_eq!(buffer.len(), INPUT_CHUNK_SIZE - 1);
    }

    #[test]
    fn test_fill_output_duplicates_into_stereo() {
        let mut samples = vec![0.5, 0.25].into_iter();
        let mut data = [9.0; 6];

        let audible = fill_output(&mut data, 2, || samples.next());

        assert!(audible);
        assert_eq!(data, [0.5, 0.5, 0.25, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_fill_output_silence_beyond_two_channels() {
        let mut data = [9.0; 8];

        let audible = fill_output(&mut data, 4, || None);

        assert!(!audible);
        assert_eq!(data, [0.0; 8]);
    }

    #[test]
    fn test_append_event_kind() {
        assert_eq!(append_event(&[0.0, 0.5]).kind(), "input_audio_buffer.append");
    }
}
