// src/fx_components/compressor.rs

//! Feed-forward compressor with a peak envelope per channel.
use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{
    coerce, db_to_gain, one_pole_coeff, ChannelLayout, DspComponent, StereoBlock,
};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_THRESHOLD_DB: f32 = -20.0;
const DEFAULT_RATIO: f32 = 4.0;
const DEFAULT_ATTACK_S: f32 = 0.005;
const DEFAULT_RELEASE_S: f32 = 0.1;

/// Shared, automatable parameters for the compressor.
#[derive(Debug, Clone)]
pub struct Params {
    /// Threshold in dBFS.
    pub threshold_db: Arc<AtomicF32>,
    /// Ratio (1.0 to 20.0).
    pub ratio: Arc<AtomicF32>,
    /// Attack time in seconds.
    pub attack_s: Arc<AtomicF32>,
    /// Release time in seconds.
    pub release_s: Arc<AtomicF32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            threshold_db: Arc::new(AtomicF32::new(DEFAULT_THRESHOLD_DB)),
            ratio: Arc::new(AtomicF32::new(DEFAULT_RATIO)),
            attack_s: Arc::new(AtomicF32::new(DEFAULT_ATTACK_S)),
            release_s: Arc::new(AtomicF32::new(DEFAULT_RELEASE_S)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    /// Helper to get a specific parameter by name.
    pub fn get_param(&self, name: &str) -> Option<Arc<AtomicF32>> {
        match name {
            "threshold" | "threshold_db" => Some(self.threshold_db.clone()),
            "ratio" => Some(self.ratio.clone()),
            "attack" | "attack_s" => Some(self.attack_s.clone()),
            "release" | "release_s" => Some(self.release_s.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            threshold_db: coerce(
                self.threshold_db.load(Ordering::Relaxed),
                -60.0,
                0.0,
                DEFAULT_THRESHOLD_DB,
            ),
            ratio: coerce(self.ratio.load(Ordering::Relaxed), 1.0, 20.0, DEFAULT_RATIO),
            attack_s: coerce(self.attack_s.load(Ordering::Relaxed), 1e-4, 5.0, DEFAULT_ATTACK_S),
            release_s: coerce(self.release_s.load(Ordering::Relaxed), 1e-4, 5.0, DEFAULT_RELEASE_S),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_s: f32,
    pub release_s: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

/// Gain applied for an envelope level: `(env / threshold)^(1/ratio - 1)` above threshold.
#[inline]
pub fn gain_for_envelope(envelope: f32, threshold: f32, ratio: f32) -> f32 {
    if envelope > threshold {
        (envelope / threshold).powf(1.0 / ratio - 1.0)
    } else {
        1.0
    }
}

/// The audio-thread state for the compressor.
#[derive(Debug)]
pub struct Compressor {
    sample_rate: f32,
    envelopes: [f32; 2],
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            envelopes: [0.0; 2],
        }
    }

    fn run(
        envelope: &mut f32,
        samples: &mut [f32],
        threshold: f32,
        ratio: f32,
        attack: f32,
        release: f32,
    ) {
        for sample in samples.iter_mut() {
            let level = sample.abs();
            let coeff = if level > *envelope { attack } else { release };
            *envelope += (level - *envelope) * coeff;
            *sample *= gain_for_envelope(*envelope, threshold, ratio);
        }
    }
}

impl DspComponent for Compressor {
    fn kind(&self) -> StageKind {
        StageKind::Compressor
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Stereo
    }

    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        let s = &settings.compressor;
        let threshold = db_to_gain(s.threshold_db);
        let attack = one_pole_coeff(s.attack_s, self.sample_rate);
        let release = one_pole_coeff(s.release_s, self.sample_rate);

        let [env_l, env_r] = &mut self.envelopes;
        Self::run(env_l, block.left, threshold, s.ratio, attack, release);
        Self::run(env_r, block.right, threshold, s.ratio, attack, release);
    }

    fn reset(&mut self) {
        self.envelopes = [0.0; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn below_threshold_is_untouched() {
        assert_eq!(gain_for_envelope(0.05, 0.1, 4.0), 1.0);
    }

    #[test]
    fn steady_tone_is_reduced_by_ratio() {
        // 0 dBFS into a -20 dB threshold at 4:1 settles 15 dB down.
        let mut comp = Compressor::new(48_000.0);
        let mut s = ChainSettings::default();
        s.compressor.bypassed = false;
        let mut left = vec![1.0; 48_000];
        let mut right = vec![1.0; 48_000];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        comp.process_block(&mut block, &s);
        let out_db = 20.0 * left[47_999].log10();
        assert_abs_diff_eq!(out_db, -15.0, epsilon = 0.1);
        assert_abs_diff_eq!(right[47_999], left[47_999]);
    }

    #[test]
    fn unity_ratio_passes_signal() {
        let mut comp = Compressor::new(48_000.0);
        let mut s = ChainSettings::default();
        s.compressor.bypassed = false;
        s.compressor.ratio = 1.0;
        let mut left = vec![0.8; 256];
        let mut right = vec![0.8; 256];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        comp.process_block(&mut block, &s);
        assert!(left.iter().all(|&x| (x - 0.8).abs() < 1e-6));
    }

    #[test]
    fn channel_envelopes_are_independent() {
        let mut comp = Compressor::new(48_000.0);
        let mut s = ChainSettings::default();
        s.compressor.bypassed = false;
        let mut left = vec![1.0; 4_800];
        let mut right = vec![0.01; 4_800];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.right.fill(0.01);
        comp.process_block(&mut block, &s);
        assert!(comp.envelopes[0] > 0.9);
        assert!(comp.envelopes[1] < 0.02);
        assert_abs_diff_eq!(right[4_799], 0.01, epsilon = 1e-6);
    }

    #[test]
    fn snapshot_replaces_nan_with_defaults() {
        let params = Params::default();
        params.ratio.store(f32::NAN, Ordering::Relaxed);
        params.threshold_db.store(f32::INFINITY, Ordering::Relaxed);
        params.attack_s.store(f32::NAN, Ordering::Relaxed);
        let s = params.snapshot();
        assert_eq!(s.ratio, DEFAULT_RATIO);
        assert_eq!(s.threshold_db, DEFAULT_THRESHOLD_DB);
        assert_eq!(s.attack_s, DEFAULT_ATTACK_S);
    }
}
