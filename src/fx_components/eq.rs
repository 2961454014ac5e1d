// src/fx_components/eq.rs

//! Three-band equalizer: low shelf, mid peak and high shelf biquads.
//! Coefficients follow the RBJ audio-EQ cookbook.

use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{coerce, ChannelLayout, DspComponent, StereoBlock};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Q used by both shelving bands.
pub const SHELF_Q: f32 = 0.707;

const DEFAULT_LOW_FREQ_HZ: f32 = 100.0;
const DEFAULT_MID_FREQ_HZ: f32 = 1000.0;
const DEFAULT_MID_Q: f32 = 1.0;
const DEFAULT_HIGH_FREQ_HZ: f32 = 8000.0;

/// Shared, automatable parameters for the equalizer.
#[derive(Debug, Clone)]
pub struct Params {
    pub low_gain_db: Arc<AtomicF32>,
    pub low_freq_hz: Arc<AtomicF32>,
    pub mid_gain_db: Arc<AtomicF32>,
    pub mid_freq_hz: Arc<AtomicF32>,
    pub mid_q: Arc<AtomicF32>,
    pub high_gain_db: Arc<AtomicF32>,
    pub high_freq_hz: Arc<AtomicF32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            low_gain_db: Arc::new(AtomicF32::new(0.0)),
            low_freq_hz: Arc::new(AtomicF32::new(DEFAULT_LOW_FREQ_HZ)),
            mid_gain_db: Arc::new(AtomicF32::new(0.0)),
            mid_freq_hz: Arc::new(AtomicF32::new(DEFAULT_MID_FREQ_HZ)),
            mid_q: Arc::new(AtomicF32::new(DEFAULT_MID_Q)),
            high_gain_db: Arc::new(AtomicF32::new(0.0)),
            high_freq_hz: Arc::new(AtomicF32::new(DEFAULT_HIGH_FREQ_HZ)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    /// Helper to get a specific parameter by name.
    pub fn get_param(&self, name: &str) -> Option<Arc<AtomicF32>> {
        match name {
            "low_gain" | "low_gain_db" => Some(self.low_gain_db.clone()),
            "low_freq" | "low_freq_hz" => Some(self.low_freq_hz.clone()),
            "mid_gain" | "mid_gain_db" => Some(self.mid_gain_db.clone()),
            "mid_freq" | "mid_freq_hz" => Some(self.mid_freq_hz.clone()),
            "mid_q" => Some(self.mid_q.clone()),
            "high_gain" | "high_gain_db" => Some(self.high_gain_db.clone()),
            "high_freq" | "high_freq_hz" => Some(self.high_freq_hz.clone()),
            _ => None,
        }
    }

    /// The upper frequency limit is applied later, against the sample rate, when
    /// coefficients are built.
    pub fn snapshot(&self) -> Settings {
        let gain = |p: &AtomicF32| coerce(p.load(Ordering::Relaxed), -24.0, 24.0, 0.0);
        let freq = |p: &AtomicF32, fallback| {
            coerce(p.load(Ordering::Relaxed), 20.0, f32::MAX, fallback)
        };
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            low_gain_db: gain(&self.low_gain_db),
            low_freq_hz: freq(&self.low_freq_hz, DEFAULT_LOW_FREQ_HZ),
            mid_gain_db: gain(&self.mid_gain_db),
            mid_freq_hz: freq(&self.mid_freq_hz, DEFAULT_MID_FREQ_HZ),
            mid_q: coerce(self.mid_q.load(Ordering::Relaxed), 0.1, 10.0, DEFAULT_MID_Q),
            high_gain_db: gain(&self.high_gain_db),
            high_freq_hz: freq(&self.high_freq_hz, DEFAULT_HIGH_FREQ_HZ),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub low_gain_db: f32,
    pub low_freq_hz: f32,
    pub mid_gain_db: f32,
    pub mid_freq_hz: f32,
    pub mid_q: f32,
    pub high_gain_db: f32,
    pub high_freq_hz: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

/// Normalised biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoeffs {
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Returns `(A, cos w0, alpha)` for the cookbook formulas.
    fn intermediates(freq_hz: f32, q: f32, gain_db: f32, sample_rate: f32) -> (f32, f32, f32) {
        let freq = freq_hz.clamp(20.0, 0.45 * sample_rate);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q.max(0.01));
        (a, w0.cos(), alpha)
    }

    pub fn low_shelf(freq_hz: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (a, cos_w0, alpha) = Self::intermediates(freq_hz, q, gain_db, sample_rate);
        let beta = 2.0 * a.sqrt() * alpha;
        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos_w0 + beta),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
            a * ((a + 1.0) - (a - 1.0) * cos_w0 - beta),
            (a + 1.0) + (a - 1.0) * cos_w0 + beta,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
            (a + 1.0) + (a - 1.0) * cos_w0 - beta,
        )
    }

    pub fn high_shelf(freq_hz: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (a, cos_w0, alpha) = Self::intermediates(freq_hz, q, gain_db, sample_rate);
        let beta = 2.0 * a.sqrt() * alpha;
        Self::normalized(
            a * ((a + 1.0) + (a - 1.0) * cos_w0 + beta),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
            a * ((a + 1.0) + (a - 1.0) * cos_w0 - beta),
            (a + 1.0) - (a - 1.0) * cos_w0 + beta,
            2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
            (a + 1.0) - (a - 1.0) * cos_w0 - beta,
        )
    }

    pub fn peaking(freq_hz: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let (a, cos_w0, alpha) = Self::intermediates(freq_hz, q, gain_db, sample_rate);
        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos_w0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w0,
            1.0 - alpha / a,
        )
    }

    /// Magnitude response at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * freq_hz / sample_rate;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = self.b1 * s1 + self.b2 * s2;
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = self.a1 * s1 + self.a2 * s2;
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// One filter section in transposed direct form II with its own coefficients and memory.
#[derive(Debug, Clone, Copy)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    z1: f32,
    z2: f32,
}

impl Default for Biquad {
    fn default() -> Self {
        Self {
            coeffs: BiquadCoeffs::IDENTITY,
            z1: 0.0,
            z2: 0.0,
        }
    }
}

impl Biquad {
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline(always)]
    pub fn process(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

#[derive(Debug, Default)]
struct EqChannel {
    low: Biquad,
    mid: Biquad,
    high: Biquad,
}

impl EqChannel {
    fn configure(&mut self, s: &Settings, sample_rate: f32) {
        self.low.set_coeffs(BiquadCoeffs::low_shelf(
            s.low_freq_hz,
            SHELF_Q,
            s.low_gain_db,
            sample_rate,
        ));
        self.mid.set_coeffs(BiquadCoeffs::peaking(
            s.mid_freq_hz,
            s.mid_q,
            s.mid_gain_db,
            sample_rate,
        ));
        self.high.set_coeffs(BiquadCoeffs::high_shelf(
            s.high_freq_hz,
            SHELF_Q,
            s.high_gain_db,
            sample_rate,
        ));
    }

    fn run(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.high.process(self.mid.process(self.low.process(*sample)));
        }
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }
}

/// The audio-thread state for the equalizer. Each channel owns its three biquads.
#[derive(Debug)]
pub struct Equalizer {
    sample_rate: f32,
    left: EqChannel,
    right: EqChannel,
}

impl Equalizer {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            left: EqChannel::default(),
            right: EqChannel::default(),
        }
    }
}

impl DspComponent for Equalizer {
    fn kind(&self) -> StageKind {
        StageKind::Eq
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Stereo
    }

    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        self.left.configure(&settings.eq, self.sample_rate);
        self.right.configure(&settings.eq, self.sample_rate);
        self.left.run(block.left);
        self.right.run(block.right);
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const FS: f32 = 48_000.0;

    fn eq_settings() -> ChainSettings {
        let mut s = ChainSettings::default();
        s.eq.bypassed = false;
        s
    }

    #[test]
    fn flat_eq_is_identity() {
        let mut eq = Equalizer::new(FS);
        let input: Vec<f32> = (0..512).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        let mut left = input.clone();
        let mut right = input.clone();
        let mut block = StereoBlock::mono(&mut left, &mut right);
        block.widen();
        eq.process_block(&mut block, &eq_settings());
        for (a, b) in left.iter().zip(&input) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn peaking_band_boosts_at_centre_frequency() {
        let c = BiquadCoeffs::peaking(1000.0, 1.0, 12.0, FS);
        let gain_db = 20.0 * c.magnitude_at(1000.0, FS).log10();
        assert_abs_diff_eq!(gain_db, 12.0, epsilon = 0.05);
        assert!(c.magnitude_at(10_000.0, FS) < 1.1);
    }

    #[test]
    fn shelves_act_on_their_own_side_of_the_spectrum() {
        let low = BiquadCoeffs::low_shelf(100.0, SHELF_Q, 12.0, FS);
        assert_abs_diff_eq!(20.0 * low.magnitude_at(1.0, FS).log10(), 12.0, epsilon = 0.5);
        assert_abs_diff_eq!(low.magnitude_at(10_000.0, FS), 1.0, epsilon = 0.01);

        let high = BiquadCoeffs::high_shelf(8000.0, SHELF_Q, -12.0, FS);
        assert_abs_diff_eq!(20.0 * high.magnitude_at(23_990.0, FS).log10(), -12.0, epsilon = 0.5);
        assert_abs_diff_eq!(high.magnitude_at(100.0, FS), 1.0, epsilon = 0.01);
    }

    #[test]
    fn channels_keep_independent_state() {
        let mut eq = Equalizer::new(FS);
        let mut s = eq_settings();
        s.eq.low_gain_db = 12.0;
        let mut left = vec![1.0; 64];
        let mut right = vec![0.0; 64];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        // Right stays silent: signal on the left must not leak through shared filter memory.
        block.right.fill(0.0);
        eq.process_block(&mut block, &s);
        assert!(right.iter().all(|&x| x == 0.0));
        assert!(left.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn snapshot_clamps_gain_and_q() {
        let params = Params::default();
        params.mid_gain_db.store(40.0, Ordering::Relaxed);
        params.mid_q.store(0.0, Ordering::Relaxed);
        let s = params.snapshot();
        assert_eq!(s.mid_gain_db, 24.0);
        assert_eq!(s.mid_q, 0.1);
    }

    #[test]
    fn nan_parameters_keep_filters_stable() {
        let params = Params::default();
        params.bypassed.store(false, Ordering::Relaxed);
        params.low_gain_db.store(f32::NAN, Ordering::Relaxed);
        params.mid_freq_hz.store(f32::NAN, Ordering::Relaxed);
        params.mid_q.store(f32::INFINITY, Ordering::Relaxed);
        let mut s = ChainSettings::default();
        s.eq = params.snapshot();
        assert_eq!(s.eq.low_gain_db, 0.0);
        assert_eq!(s.eq.mid_freq_hz, DEFAULT_MID_FREQ_HZ);
        assert_eq!(s.eq.mid_q, DEFAULT_MID_Q);

        let mut eq = Equalizer::new(FS);
        let mut left = vec![0.25; 256];
        let mut right = vec![0.0; 256];
        let mut block = StereoBlock::mono(&mut left, &mut right);
        eq.process_block(&mut block, &s);
        assert!(left.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn frequency_is_clamped_below_nyquist() {
        let clamped = BiquadCoeffs::peaking(30_000.0, 1.0, 6.0, FS);
        let limit = BiquadCoeffs::peaking(0.45 * FS, 1.0, 6.0, FS);
        assert_eq!(clamped, limit);
    }
}
