// src/audio_io.rs

use crate::audio_device;
use crate::audio_engine::processor::BlockProcessor;
use anyhow::Result;
use atomic_float::AtomicF32;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize, Device, FromSample, HostId, Sample, SampleFormat, SizedSample, Stream,
    StreamConfig,
};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Largest callback handled without splitting; scratch buffers are this long.
const MAX_CALLBACK_FRAMES: usize = 8192;
/// Assumed when the device picks its own buffer size.
const FALLBACK_BUFFER_SIZE: u32 = 512;
/// Seconds of input the hand-off ring can hold.
const INPUT_RING_SECONDS: u32 = 4;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no default {0} device")]
    NoDevice(&'static str),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("audio host not found: {0}")]
    HostNotFound(String),
    #[error("unsupported sample format {0}")]
    UnsupportedFormat(SampleFormat),
    #[error("failed to build stream: {0}")]
    Stream(#[from] cpal::BuildStreamError),
    #[error("failed to start stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// A resolved input/output device pair with the configurations to open them with.
pub struct DevicePair {
    input_device: Device,
    output_device: Device,
    input_config: StreamConfig,
    output_config: StreamConfig,
    input_format: SampleFormat,
    output_format: SampleFormat,
}

impl DevicePair {
    pub fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }

    pub fn buffer_size(&self) -> u32 {
        match self.output_config.buffer_size {
            BufferSize::Fixed(size) => size,
            BufferSize::Default => FALLBACK_BUFFER_SIZE,
        }
    }
}

pub fn open_devices(
    host_id: HostId,
    input_device_name: Option<&str>,
    output_device_name: Option<&str>,
    requested_sample_rate: Option<u32>,
    requested_buffer_size: Option<u32>,
) -> Result<DevicePair> {
    let input_device = audio_device::find_input_device(host_id, input_device_name)?;
    let output_device = audio_device::find_output_device(host_id, output_device_name)?;
    info!("Using input device: {}", input_device.name()?);
    info!("Using output device: {}", output_device.name()?);

    let default_input_config = input_device.default_input_config()?;
    let default_output_config = output_device.default_output_config()?;
    let input_format = default_input_config.sample_format();
    let output_format = default_output_config.sample_format();

    let mut input_config: StreamConfig = default_input_config.into();
    let mut output_config: StreamConfig = default_output_config.into();
    // Both streams run at the output rate; the hand-off ring does not resample.
    let sample_rate = requested_sample_rate
        .map(cpal::SampleRate)
        .unwrap_or(output_config.sample_rate);
    input_config.sample_rate = sample_rate;
    output_config.sample_rate = sample_rate;
    if let Some(bs) = requested_buffer_size {
        input_config.buffer_size = BufferSize::Fixed(bs);
        output_config.buffer_size = BufferSize::Fixed(bs);
    }

    Ok(DevicePair {
        input_device,
        output_device,
        input_config,
        output_config,
        input_format,
        output_format,
    })
}

/// Builds and starts both streams. The input callback feeds a ring that the output
/// callback drains into `processor`.
pub fn run_streams(
    devices: DevicePair,
    processor: BlockProcessor,
    input_latency_compensation_ms: Arc<AtomicF32>,
    xrun_count: Arc<AtomicUsize>,
) -> Result<(Stream, Stream)> {
    let sample_rate = devices.sample_rate();
    let ring = HeapRb::<f32>::new((sample_rate * INPUT_RING_SECONDS) as usize);
    let (producer, consumer) = ring.split();

    let input_stream = match devices.input_format {
        SampleFormat::F32 => build_input_stream::<f32>(&devices, producer, xrun_count.clone())?,
        SampleFormat::I16 => build_input_stream::<i16>(&devices, producer, xrun_count.clone())?,
        SampleFormat::U16 => build_input_stream::<u16>(&devices, producer, xrun_count.clone())?,
        format => return Err(EngineError::UnsupportedFormat(format).into()),
    };
    let output_stream = match devices.output_format {
        SampleFormat::F32 => build_output_stream::<f32>(
            &devices,
            consumer,
            processor,
            input_latency_compensation_ms,
            xrun_count,
        )?,
        SampleFormat::I16 => build_output_stream::<i16>(
            &devices,
            consumer,
            processor,
            input_latency_compensation_ms,
            xrun_count,
        )?,
        SampleFormat::U16 => build_output_stream::<u16>(
            &devices,
            consumer,
            processor,
            input_latency_compensation_ms,
            xrun_count,
        )?,
        format => return Err(EngineError::UnsupportedFormat(format).into()),
    };

    input_stream.play().map_err(EngineError::from)?;
    output_stream.play().map_err(EngineError::from)?;

    info!(
        "Started streams with Sample Rate: {} Hz, Buffer Size: {} Samples",
        sample_rate,
        devices.buffer_size()
    );
    Ok((input_stream, output_stream))
}

fn build_input_stream<T>(
    devices: &DevicePair,
    mut producer: HeapProducer<f32>,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream, EngineError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_fn = move |err: cpal::StreamError| {
        error!("an error occurred on input stream: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let channels = devices.input_config.channels.max(1) as usize;

    let stream = devices.input_device.build_input_stream(
        &devices.input_config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for frame in data.chunks(channels) {
                let mono_sample =
                    frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / (channels as f32);
                // A full ring means the output side stalled; the sample is dropped.
                let _ = producer.push(mono_sample);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

fn build_output_stream<T>(
    devices: &DevicePair,
    mut consumer: HeapConsumer<f32>,
    mut processor: BlockProcessor,
    input_latency_compensation_ms: Arc<AtomicF32>,
    xrun_count: Arc<AtomicUsize>,
) -> Result<Stream, EngineError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = devices.output_config.channels.max(1) as usize;
    let sample_rate = devices.sample_rate() as f32;
    let err_fn = move |err: cpal::StreamError| {
        error!("an error occurred on output stream: {}", err);
        xrun_count.fetch_add(1, Ordering::Relaxed);
    };
    let mut input_buffer = vec![0.0f32; MAX_CALLBACK_FRAMES];
    let mut stereo_buffer = vec![0.0f32; MAX_CALLBACK_FRAMES * 2];

    let stream = devices.output_device.build_output_stream(
        &devices.output_config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for chunk in data.chunks_mut(MAX_CALLBACK_FRAMES * channels) {
                let frames = chunk.len() / channels;

                // Keep at most the configured latency queued behind this block.
                let latency_ms = input_latency_compensation_ms.load(Ordering::Relaxed);
                let target_len = (latency_ms / 1000.0 * sample_rate).round() as usize + frames;
                if consumer.len() > target_len {
                    consumer.skip(consumer.len() - target_len);
                }

                let input = &mut input_buffer[..frames];
                let samples_read = consumer.pop_slice(input);
                input[samples_read..].fill(0.0);

                let stereo = &mut stereo_buffer[..frames * 2];
                processor.process_block(input, stereo);
                write_frames(chunk, channels, stereo);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Maps interleaved stereo onto the device layout: mono devices get the average,
/// extra channels are silent.
fn write_frames<T>(data: &mut [T], channels: usize, stereo: &[f32])
where
    T: Sample + FromSample<f32>,
{
    for (frame, lr) in data.chunks_mut(channels).zip(stereo.chunks_exact(2)) {
        if channels == 1 {
            frame[0] = T::from_sample(0.5 * (lr[0] + lr[1]));
            continue;
        }
        frame[0] = T::from_sample(lr[0]);
        frame[1] = T::from_sample(lr[1]);
        for sample in frame[2..].iter_mut() {
            *sample = T::from_sample(0.0f32);
        }
    }
}
