// src/audio_engine.rs

pub mod command;
pub mod fx_rack;
pub mod looper_track;
pub mod meter;
pub mod processor;

use crate::audio_device;
use crate::audio_io;
use crate::fx::DspParams;
use crate::looper::Looper;
use crate::recorder::Recorder;
use anyhow::Result;
use atomic_float::AtomicF32;
use cpal::Stream;
use fx_rack::DspChain;
use meter::LevelMeter;
use processor::BlockProcessor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_BUFFER_SIZE: u32 = 128;
pub const MAX_GAIN: f32 = 2.0;
pub const DEFAULT_LATENCY_COMPENSATION_MS: f32 = 5.0;

/// State shared between the control plane and the running `BlockProcessor`.
#[derive(Debug)]
pub struct EngineShared {
    input_gain: AtomicF32,
    output_gain: AtomicF32,
    pub input_meter: LevelMeter,
    pub output_meter: LevelMeter,
}

impl Default for EngineShared {
    fn default() -> Self {
        Self {
            input_gain: AtomicF32::new(1.0),
            output_gain: AtomicF32::new(1.0),
            input_meter: LevelMeter::new(),
            output_meter: LevelMeter::new(),
        }
    }
}

impl EngineShared {
    pub fn input_gain(&self) -> f32 {
        self.input_gain.load(Ordering::Relaxed)
    }

    pub fn output_gain(&self) -> f32 {
        self.output_gain.load(Ordering::Relaxed)
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_nan() {
        return 0.0;
    }
    gain.clamp(0.0, MAX_GAIN)
}

/// What the control plane asks for when starting the engine. `None` means the
/// host's default device or the device's default configuration.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub host_name: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: Option<u32>,
    pub buffer_size: Option<u32>,
    pub exclusive_mode: bool,
}

/// Control-plane owner of the effect parameters, the looper, the recorder and the
/// device streams.
pub struct AudioEngine {
    shared: Arc<EngineShared>,
    params: DspParams,
    looper: Looper,
    recorder: Recorder,
    streams: Option<(Stream, Stream)>,
    sample_rate: u32,
    buffer_size: u32,
    input_latency_compensation_ms: Arc<AtomicF32>,
    xrun_count: Arc<AtomicUsize>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        Self::with_params(DspParams::new())
    }

    pub fn with_params(params: DspParams) -> Self {
        Self {
            shared: Arc::new(EngineShared::default()),
            params,
            looper: Looper::new(DEFAULT_SAMPLE_RATE),
            recorder: Recorder::new(DEFAULT_SAMPLE_RATE),
            streams: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            input_latency_compensation_ms: Arc::new(AtomicF32::new(
                DEFAULT_LATENCY_COMPENSATION_MS,
            )),
            xrun_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sizes every rate-dependent buffer and returns the audio-thread processor.
    /// Loops and the recorder take are discarded if the rate changes.
    pub fn prepare(&mut self, sample_rate: u32, block_size: usize) -> BlockProcessor {
        self.sample_rate = sample_rate;
        self.buffer_size = block_size as u32;
        self.looper.set_sample_rate(sample_rate);
        self.recorder.set_sample_rate(sample_rate);
        BlockProcessor::new(
            self.shared.clone(),
            DspChain::new(self.params.clone(), sample_rate as f32),
            self.looper.track(),
            self.recorder.input(),
            block_size,
        )
    }

    /// Opens the devices and starts streaming. Any running streams are stopped
    /// first; on error nothing is left running.
    pub fn start(&mut self, request: &StreamRequest) -> Result<()> {
        self.stop();

        let host_id = audio_device::host_id_from_name(request.host_name.as_deref())?;
        let devices = audio_io::open_devices(
            host_id,
            request.input_device.as_deref(),
            request.output_device.as_deref(),
            request.sample_rate,
            request.buffer_size,
        )?;
        let sample_rate = devices.sample_rate();
        let buffer_size = devices.buffer_size();

        self.params.set_low_latency(request.exclusive_mode);
        let processor = self.prepare(sample_rate, buffer_size as usize);
        let streams = audio_io::run_streams(
            devices,
            processor,
            self.input_latency_compensation_ms.clone(),
            self.xrun_count.clone(),
        )?;
        self.streams = Some(streams);

        info!(
            sample_rate,
            buffer_size,
            low_latency = request.exclusive_mode,
            "Audio engine started"
        );
        Ok(())
    }

    /// Stops the streams and the recorder's take. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some((input, output)) = self.streams.take() {
            drop(output);
            drop(input);
            info!("Audio engine stopped");
        }
        self.recorder.stop_recording();
    }

    pub fn is_running(&self) -> bool {
        self.streams.is_some()
    }

    pub fn set_input_gain(&self, gain: f32) {
        self.shared
            .input_gain
            .store(clamp_gain(gain), Ordering::Relaxed);
    }

    pub fn set_output_gain(&self, gain: f32) {
        self.shared
            .output_gain
            .store(clamp_gain(gain), Ordering::Relaxed);
    }

    pub fn input_gain(&self) -> f32 {
        self.shared.input_gain()
    }

    pub fn output_gain(&self) -> f32 {
        self.shared.output_gain()
    }

    pub fn input_level(&self) -> f32 {
        self.shared.input_meter.level()
    }

    pub fn output_level(&self) -> f32 {
        self.shared.output_meter.level()
    }

    pub fn input_peak(&self) -> f32 {
        self.shared.input_meter.peak()
    }

    pub fn output_peak(&self) -> f32 {
        self.shared.output_meter.peak()
    }

    pub fn reset_peaks(&self) {
        self.shared.input_meter.reset_peak();
        self.shared.output_meter.reset_peak();
    }

    /// How much queued input the output callback tolerates before skipping ahead.
    pub fn set_input_latency_compensation_ms(&self, ms: f32) {
        self.input_latency_compensation_ms
            .store(ms.max(0.0), Ordering::Relaxed);
    }

    pub fn input_latency_compensation_ms(&self) -> f32 {
        self.input_latency_compensation_ms.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Stream errors reported by the device since the engine was created.
    pub fn xrun_count(&self) -> usize {
        self.xrun_count.load(Ordering::Relaxed)
    }

    pub fn params(&self) -> &DspParams {
        &self.params
    }

    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gains_are_clamped() {
        let engine = AudioEngine::new();
        engine.set_input_gain(3.0);
        assert_eq!(engine.input_gain(), 2.0);
        engine.set_input_gain(-1.0);
        assert_eq!(engine.input_gain(), 0.0);
        engine.set_output_gain(f32::NAN);
        assert_eq!(engine.output_gain(), 0.0);
        engine.set_output_gain(1.5);
        assert_eq!(engine.output_gain(), 1.5);
    }

    #[test]
    fn stop_is_idempotent_without_streams() {
        let mut engine = AudioEngine::new();
        engine.recorder().start_recording();
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        assert!(!engine.recorder().is_recording());
    }

    #[test]
    fn prepare_propagates_sample_rate() {
        let mut engine = AudioEngine::new();
        let processor = engine.prepare(44_100, 256);
        assert_eq!(engine.sample_rate(), 44_100);
        assert_eq!(engine.buffer_size(), 256);
        assert_eq!(engine.looper().sample_rate(), 44_100);
        assert_eq!(engine.recorder().sample_rate(), 44_100);
        assert_eq!(processor.chain().sample_rate(), 44_100.0);
        assert_eq!(processor.max_block(), 256);
    }

    #[test]
    fn reset_peaks_clears_both_meters() {
        let mut engine = AudioEngine::new();
        let mut processor = engine.prepare(48_000, 8);
        processor.process_block(&[0.5; 8], &mut [0.0; 16]);
        assert!(engine.input_peak() > 0.0 && engine.output_peak() > 0.0);
        engine.reset_peaks();
        assert_eq!(engine.input_peak(), 0.0);
        assert_eq!(engine.output_peak(), 0.0);
    }
}
