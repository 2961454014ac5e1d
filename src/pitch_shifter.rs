// src/pitch_shifter.rs

//! STFT phase-vocoder pitch shifter.
//!
//! Input is collected in a FIFO; every `HOP_SIZE` samples a Hann-windowed frame of
//! `FRAME_SIZE` samples is analysed, each bin's true frequency is estimated from its
//! phase advance, the partials are moved to the bin nearest `frequency * ratio`, and
//! the resynthesised frame is overlap-added into the output FIFO. The output trails
//! the input by `LATENCY` samples.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

pub const FRAME_SIZE: usize = 2048;
pub const HOP_SIZE: usize = 512;
pub const OVERSAMPLING: usize = FRAME_SIZE / HOP_SIZE;
/// Samples between a sample entering and its shifted version leaving.
pub const LATENCY: usize = FRAME_SIZE - HOP_SIZE;

const BINS: usize = FRAME_SIZE / 2 + 1;
const DRY_MIX: f32 = 0.15;
const RMS_FLOOR: f32 = 1e-5;
const MAX_SEMITONES: f32 = 24.0;
// Sum of squared periodic Hann windows at 4x overlap.
const WINDOW_GAIN: f32 = 1.5;

/// Wraps a phase into [-pi, pi].
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2.0_f32.powf(semitones / 12.0)
}

pub struct PitchShifter {
    sample_rate: f32,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    output_accum: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    last_phase: Vec<f32>,
    sum_phase: Vec<f32>,
    ana_magn: Vec<f32>,
    ana_freq: Vec<f32>,
    syn_magn: Vec<f32>,
    syn_freq: Vec<f32>,
    rover: usize,
}

impl std::fmt::Debug for PitchShifter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PitchShifter")
            .field("sample_rate", &self.sample_rate)
            .field("rover", &self.rover)
            .finish_non_exhaustive()
    }
}

impl PitchShifter {
    pub fn new(sample_rate: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(FRAME_SIZE);
        let inverse = planner.plan_fft_inverse(FRAME_SIZE);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let window = (0..FRAME_SIZE)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / FRAME_SIZE as f32).cos())
            .collect();

        Self {
            sample_rate,
            forward,
            inverse,
            window,
            in_fifo: vec![0.0; FRAME_SIZE],
            out_fifo: vec![0.0; FRAME_SIZE],
            output_accum: vec![0.0; 2 * FRAME_SIZE],
            spectrum: vec![Complex::new(0.0, 0.0); FRAME_SIZE],
            fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            last_phase: vec![0.0; BINS],
            sum_phase: vec![0.0; BINS],
            ana_magn: vec![0.0; BINS],
            ana_freq: vec![0.0; BINS],
            syn_magn: vec![0.0; BINS],
            syn_freq: vec![0.0; BINS],
            rover: LATENCY,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn reset(&mut self) {
        self.in_fifo.fill(0.0);
        self.out_fifo.fill(0.0);
        self.output_accum.fill(0.0);
        self.last_phase.fill(0.0);
        self.sum_phase.fill(0.0);
        self.rover = LATENCY;
    }

    /// Shifts `input` by `semitones` and writes the result to both output channels.
    pub fn process(&mut self, input: &[f32], left: &mut [f32], right: &mut [f32], semitones: f32) {
        let n = input.len().min(left.len()).min(right.len());
        let ratio = semitones_to_ratio(semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES));
        let mut in_energy = 0.0;
        for i in 0..n {
            let dry = input[i];
            in_energy += dry * dry;
            let out = self.tick(dry, ratio);
            left[i] = out;
            right[i] = out;
        }
        Self::match_level(&mut left[..n], &mut right[..n], in_energy);
    }

    /// Same as `process`, reading the mono average of `left` and `right` as input.
    pub fn process_in_place(&mut self, left: &mut [f32], right: &mut [f32], semitones: f32) {
        let n = left.len().min(right.len());
        let ratio = semitones_to_ratio(semitones.clamp(-MAX_SEMITONES, MAX_SEMITONES));
        let mut in_energy = 0.0;
        for i in 0..n {
            let dry = 0.5 * (left[i] + right[i]);
            in_energy += dry * dry;
            let out = self.tick(dry, ratio);
            left[i] = out;
            right[i] = out;
        }
        Self::match_level(&mut left[..n], &mut right[..n], in_energy);
    }

    /// Rescales a block so its RMS equals the input's.
    fn match_level(left: &mut [f32], right: &mut [f32], in_energy: f32) {
        if left.is_empty() {
            return;
        }
        let len = left.len() as f32;
        let rms_in = (in_energy / len).sqrt();
        let rms_out = (left.iter().map(|x| x * x).sum::<f32>() / len).sqrt();
        if rms_in > RMS_FLOOR && rms_out > RMS_FLOOR {
            let scale = rms_in / rms_out;
            left.iter_mut().for_each(|x| *x *= scale);
            right.iter_mut().for_each(|x| *x *= scale);
        }
    }

    /// Pushes one sample and returns one blended output sample.
    #[inline]
    fn tick(&mut self, dry: f32, ratio: f32) -> f32 {
        self.in_fifo[self.rover] = dry;
        let wet = self.out_fifo[self.rover - LATENCY];
        self.rover += 1;
        if self.rover >= FRAME_SIZE {
            self.rover = LATENCY;
            self.process_frame(ratio);
        }
        wet * (1.0 - DRY_MIX) + dry * DRY_MIX
    }

    fn process_frame(&mut self, ratio: f32) {
        let freq_per_bin = self.sample_rate / FRAME_SIZE as f32;
        let expected_advance = 2.0 * PI * HOP_SIZE as f32 / FRAME_SIZE as f32;

        // --- 1. Analysis ---
        for (k, bin) in self.spectrum.iter_mut().enumerate() {
            *bin = Complex::new(self.in_fifo[k] * self.window[k], 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

        for k in 0..BINS {
            let bin = self.spectrum[k];
            let phase = bin.im.atan2(bin.re);
            let delta = wrap_phase(phase - self.last_phase[k] - k as f32 * expected_advance);
            self.last_phase[k] = phase;

            let deviation = OVERSAMPLING as f32 * delta / (2.0 * PI);
            self.ana_magn[k] = bin.norm();
            self.ana_freq[k] = (k as f32 + deviation) * freq_per_bin;
        }

        // --- 2. Move partials to the bin nearest their shifted frequency ---
        self.syn_magn.fill(0.0);
        self.syn_freq.fill(0.0);
        for k in 0..BINS {
            let shifted = self.ana_freq[k] * ratio;
            let target = (shifted / freq_per_bin).round();
            if target < 0.0 || target >= BINS as f32 {
                continue;
            }
            let target = target as usize;
            self.syn_magn[target] += self.ana_magn[k];
            self.syn_freq[target] = shifted;
        }

        // --- 3. Synthesis ---
        for k in 0..BINS {
            let deviation = self.syn_freq[k] / freq_per_bin - k as f32;
            let advance = 2.0 * PI * deviation / OVERSAMPLING as f32 + k as f32 * expected_advance;
            self.sum_phase[k] = wrap_phase(self.sum_phase[k] + advance);
            let magn = self.syn_magn[k];
            let phase = self.sum_phase[k];
            self.spectrum[k] = Complex::new(magn * phase.cos(), magn * phase.sin());
        }
        // DC and Nyquist stay real; the upper half mirrors the lower.
        self.spectrum[0].im = 0.0;
        self.spectrum[FRAME_SIZE / 2].im = 0.0;
        for k in 1..FRAME_SIZE / 2 {
            self.spectrum[FRAME_SIZE - k] = self.spectrum[k].conj();
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

        // --- 4. Overlap-add ---
        let norm = 1.0 / (FRAME_SIZE as f32 * WINDOW_GAIN);
        for k in 0..FRAME_SIZE {
            self.output_accum[k] += self.window[k] * self.spectrum[k].re * norm;
        }
        self.out_fifo[..HOP_SIZE].copy_from_slice(&self.output_accum[..HOP_SIZE]);
        self.output_accum.copy_within(HOP_SIZE.., 0);
        let tail = self.output_accum.len() - HOP_SIZE;
        self.output_accum[tail..].fill(0.0);
        self.in_fifo.copy_within(HOP_SIZE.., 0);
    }
}
