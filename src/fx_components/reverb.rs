// src/fx_components/reverb.rs

//! A comb-filter reverb.
//!
//! Eight parallel feedback combs per channel, at fixed mutually non-harmonic lengths,
//! are averaged to form the wet signal. `size` scales the comb feedback and `damping`
//! pulls it back down, so both shape the length of the tail.

use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{coerce, ChannelLayout, DspComponent, StereoBlock};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const NUM_COMBS: usize = 8;
pub const COMB_LENGTHS: [usize; NUM_COMBS] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];
const MAX_FEEDBACK: f32 = 0.98;

const DEFAULT_SIZE: f32 = 0.5;
const DEFAULT_DAMPING: f32 = 0.5;
const DEFAULT_MIX: f32 = 0.25;

// --- Shared, Automatable Parameters ---

#[derive(Debug, Clone)]
pub struct Params {
    /// Room size (0.0 to 1.0).
    pub size: Arc<AtomicF32>,
    /// Feedback damping (0.0 to 1.0).
    pub damping: Arc<AtomicF32>,
    /// Wet/dry mix (0.0 to 1.0).
    pub mix: Arc<AtomicF32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            size: Arc::new(AtomicF32::new(DEFAULT_SIZE)),
            damping: Arc::new(AtomicF32::new(DEFAULT_DAMPING)),
            mix: Arc::new(AtomicF32::new(DEFAULT_MIX)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    /// Helper to get a specific parameter by name.
    pub fn get_param(&self, name: &str) -> Option<Arc<AtomicF32>> {
        match name {
            "size" => Some(self.size.clone()),
            "damping" => Some(self.damping.clone()),
            "mix" => Some(self.mix.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Settings {
        let unit = |p: &AtomicF32, fallback| coerce(p.load(Ordering::Relaxed), 0.0, 1.0, fallback);
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            size: unit(&self.size, DEFAULT_SIZE),
            damping: unit(&self.damping, DEFAULT_DAMPING),
            mix: unit(&self.mix, DEFAULT_MIX),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub size: f32,
    pub damping: f32,
    pub mix: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

/// Feedback of comb `index` for the given size and damping.
pub fn comb_feedback(index: usize, size: f32, damping: f32) -> f32 {
    let base = 0.84 + 0.01 * index as f32;
    (base * (0.7 + 0.6 * size) * (1.0 - damping)).min(MAX_FEEDBACK)
}

// --- Internal Building Blocks for the Reverb ---

/// A delay line with feedback, a core part of a reverb's sound.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: f32, feedback: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.buffer[self.pos] = input + output * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug)]
struct CombBank {
    combs: [CombFilter; NUM_COMBS],
}

impl CombBank {
    fn new() -> Self {
        Self {
            combs: COMB_LENGTHS.map(CombFilter::new),
        }
    }

    fn run(&mut self, samples: &mut [f32], feedback: &[f32; NUM_COMBS], mix: f32) {
        for sample in samples.iter_mut() {
            let dry = *sample;
            let wet = self
                .combs
                .iter_mut()
                .zip(feedback)
                .map(|(comb, &fb)| comb.process(dry, fb))
                .sum::<f32>()
                / NUM_COMBS as f32;
            *sample = dry * (1.0 - mix) + wet * mix;
        }
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
    }
}

// --- Main Public Reverb Struct ---

#[derive(Debug)]
pub struct Reverb {
    left: CombBank,
    right: CombBank,
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            left: CombBank::new(),
            right: CombBank::new(),
        }
    }
}

impl DspComponent for Reverb {
    fn kind(&self) -> StageKind {
        StageKind::Reverb
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Stereo
    }

    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        let s = &settings.reverb;
        let feedback: [f32; NUM_COMBS] =
            std::array::from_fn(|i| comb_feedback(i, s.size, s.damping));
        self.left.run(block.left, &feedback, s.mix);
        self.right.run(block.right, &feedback, s.mix);
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn feedback_is_capped() {
        for i in 0..NUM_COMBS {
            assert!(comb_feedback(i, 1.0, 0.0) <= MAX_FEEDBACK);
        }
        assert_eq!(comb_feedback(3, 1.0, 1.0), 0.0);
        assert_abs_diff_eq!(comb_feedback(0, 0.5, 0.5), 0.84 * 1.0 * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn first_echo_arrives_after_shortest_comb() {
        let mut reverb = Reverb::new();
        let mut s = ChainSettings::default();
        s.reverb = Settings {
            bypassed: false,
            size: 0.5,
            damping: 0.5,
            mix: 1.0,
        };
        let shortest = *COMB_LENGTHS.iter().min().unwrap_or(&0);
        let mut left = vec![0.0; 2_048];
        let mut right = vec![0.0; 2_048];
        left[0] = 1.0;
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        reverb.process_block(&mut block, &s);
        assert!(left[..shortest].iter().all(|&x| x == 0.0));
        assert_abs_diff_eq!(left[shortest], 1.0 / NUM_COMBS as f32);
        assert_eq!(left, right);
    }

    #[test]
    fn zero_mix_is_dry() {
        let mut reverb = Reverb::new();
        let mut s = ChainSettings::default();
        s.reverb.bypassed = false;
        s.reverb.mix = 0.0;
        let mut left = vec![0.4; 64];
        let mut right = vec![0.4; 64];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        reverb.process_block(&mut block, &s);
        assert!(left.iter().all(|&x| x == 0.4));
    }

    #[test]
    fn nan_parameters_never_reach_the_combs() {
        let params = Params::default();
        params.bypassed.store(false, Ordering::Relaxed);
        params.size.store(f32::NAN, Ordering::Relaxed);
        params.damping.store(f32::NAN, Ordering::Relaxed);
        let mut s = ChainSettings::default();
        s.reverb = params.snapshot();
        assert_eq!(s.reverb.size, DEFAULT_SIZE);
        assert_eq!(s.reverb.damping, DEFAULT_DAMPING);

        let mut reverb = Reverb::new();
        let mut left = vec![0.5; 4_096];
        let mut right = vec![0.5; 4_096];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        reverb.process_block(&mut block, &s);
        assert!(left.iter().chain(&right).all(|x| x.is_finite()));
    }
}
