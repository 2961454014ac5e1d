// src/fx_components/delay.rs

//! Stereo feedback delay: one circular buffer per channel.
use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{coerce, ChannelLayout, DspComponent, StereoBlock};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Longest delay the buffers are sized for.
pub const MAX_DELAY_SECONDS: f32 = 2.0;

const DEFAULT_TIME_S: f32 = 0.25;
const DEFAULT_FEEDBACK: f32 = 0.3;
const DEFAULT_MIX: f32 = 0.3;

/// Shared, automatable parameters for the delay.
#[derive(Debug, Clone)]
pub struct Params {
    /// Delay time in seconds.
    pub time_s: Arc<AtomicF32>,
    /// Feedback amount (0.0 to 0.99).
    pub feedback: Arc<AtomicF32>,
    /// Wet/dry mix (0.0 to 1.0).
    pub mix: Arc<AtomicF32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            time_s: Arc::new(AtomicF32::new(DEFAULT_TIME_S)),
            feedback: Arc::new(AtomicF32::new(DEFAULT_FEEDBACK)),
            mix: Arc::new(AtomicF32::new(DEFAULT_MIX)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    /// Helper to get a specific parameter by name.
    pub fn get_param(&self, name: &str) -> Option<Arc<AtomicF32>> {
        match name {
            "time" | "time_s" => Some(self.time_s.clone()),
            "feedback" => Some(self.feedback.clone()),
            "mix" => Some(self.mix.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            time_s: coerce(
                self.time_s.load(Ordering::Relaxed),
                0.0,
                MAX_DELAY_SECONDS,
                DEFAULT_TIME_S,
            ),
            feedback: coerce(self.feedback.load(Ordering::Relaxed), 0.0, 0.99, DEFAULT_FEEDBACK),
            mix: coerce(self.mix.load(Ordering::Relaxed), 0.0, 1.0, DEFAULT_MIX),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub time_s: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

/// A single-tap circular delay line.
#[derive(Debug)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(2)],
            write_pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Runs the block through the line: `write = x + fb * delayed` and
    /// `out = x * (1 - mix) + delayed * mix`.
    fn process(&mut self, samples: &mut [f32], delay_samples: usize, feedback: f32, mix: f32) {
        let len = self.buffer.len();
        for sample in samples.iter_mut() {
            let read_pos = (self.write_pos + len - delay_samples) % len;
            let delayed = self.buffer[read_pos];
            self.buffer[self.write_pos] = *sample + feedback * delayed;
            self.write_pos = (self.write_pos + 1) % len;
            *sample = *sample * (1.0 - mix) + delayed * mix;
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

/// The audio-thread state for the delay.
#[derive(Debug)]
pub struct Delay {
    sample_rate: f32,
    left: DelayLine,
    right: DelayLine,
}

impl Delay {
    pub fn new(sample_rate: f32) -> Self {
        let length = (MAX_DELAY_SECONDS * sample_rate).ceil() as usize;
        Self {
            sample_rate,
            left: DelayLine::new(length),
            right: DelayLine::new(length),
        }
    }

    /// Converts a delay time into a whole number of samples inside `[1, len - 1]`.
    pub fn delay_samples(&self, time_s: f32) -> usize {
        let len = self.left.len();
        ((time_s * self.sample_rate) as usize).clamp(1, len - 1)
    }
}

impl DspComponent for Delay {
    fn kind(&self) -> StageKind {
        StageKind::Delay
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Stereo
    }

    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        let s = &settings.delay;
        let delay_samples = self.delay_samples(s.time_s);
        self.left.process(block.left, delay_samples, s.feedback, s.mix);
        self.right.process(block.right, delay_samples, s.feedback, s.mix);
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(time_s: f32, feedback: f32, mix: f32) -> ChainSettings {
        let mut s = ChainSettings::default();
        s.delay = Settings {
            bypassed: false,
            time_s,
            feedback,
            mix,
        };
        s
    }

    #[test]
    fn impulse_reappears_after_delay_time() {
        let fs = 1_000.0;
        let mut delay = Delay::new(fs);
        let s = settings(0.01, 0.5, 1.0);
        let mut left = vec![0.0; 40];
        let mut right = vec![0.0; 40];
        left[0] = 1.0;
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        delay.process_block(&mut block, &s);
        assert_eq!(left[0], 0.0);
        assert_eq!(left[10], 1.0);
        assert_eq!(left[20], 0.5);
        assert_eq!(left[30], 0.25);
        assert_eq!(left, right);
    }

    #[test]
    fn dry_mix_passes_input() {
        let mut delay = Delay::new(1_000.0);
        let s = settings(0.1, 0.9, 0.0);
        let mut left = vec![0.3; 16];
        let mut right = vec![0.3; 16];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        delay.process_block(&mut block, &s);
        assert!(left.iter().all(|&x| x == 0.3));
    }

    #[test]
    fn delay_time_is_clamped_to_buffer() {
        let delay = Delay::new(1_000.0);
        assert_eq!(delay.delay_samples(0.0), 1);
        assert_eq!(delay.delay_samples(10.0), 1_999);
        assert_eq!(delay.delay_samples(0.5), 500);
    }

    #[test]
    fn snapshot_caps_feedback_below_one() {
        let params = Params::default();
        params.feedback.store(1.5, Ordering::Relaxed);
        assert_eq!(params.snapshot().feedback, 0.99);
    }

    #[test]
    fn nan_parameters_never_reach_the_delay_lines() {
        let params = Params::default();
        params.bypassed.store(false, Ordering::Relaxed);
        params.feedback.store(f32::NAN, Ordering::Relaxed);
        params.time_s.store(f32::INFINITY, Ordering::Relaxed);
        params.mix.store(f32::NAN, Ordering::Relaxed);
        let mut s = ChainSettings::default();
        s.delay = params.snapshot();
        assert_eq!(s.delay.feedback, DEFAULT_FEEDBACK);
        assert_eq!(s.delay.time_s, DEFAULT_TIME_S);
        assert_eq!(s.delay.mix, DEFAULT_MIX);

        let mut delay = Delay::new(1_000.0);
        let mut left = vec![0.5; 1_000];
        let mut right = vec![0.5; 1_000];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        delay.process_block(&mut block, &s);
        assert!(left.iter().chain(&right).all(|x| x.is_finite()));
    }
}
