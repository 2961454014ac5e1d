// FILE: src\audio_engine\meter.rs
// ================================

use atomic_float::AtomicF32;
use std::sync::atomic::Ordering;

/// Block RMS plus a peak that holds its maximum until `reset_peak`.
#[derive(Debug, Default)]
pub struct LevelMeter {
    level: AtomicF32,
    peak: AtomicF32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, block: &[f32]) {
        if block.is_empty() {
            return;
        }
        let (sum_sq, peak) = block.iter().fold((0.0f32, 0.0f32), |(sum, max), &x| {
            (sum + x * x, max.max(x.abs()))
        });
        self.publish(sum_sq, block.len(), peak);
    }

    /// Meters the mono average of a stereo block without a scratch buffer.
    pub fn update_stereo_mean(&self, left: &[f32], right: &[f32]) {
        let n = left.len().min(right.len());
        if n == 0 {
            return;
        }
        let (sum_sq, peak) = left[..n]
            .iter()
            .zip(&right[..n])
            .fold((0.0f32, 0.0f32), |(sum, max), (&l, &r)| {
                let x = 0.5 * (l + r);
                (sum + x * x, max.max(x.abs()))
            });
        self.publish(sum_sq, n, peak);
    }

    fn publish(&self, sum_sq: f32, len: usize, block_peak: f32) {
        self.level
            .store((sum_sq / len as f32).sqrt(), Ordering::Relaxed);
        // Only the audio thread raises the peak; a reset racing this store may be lost
        // for one block.
        if block_peak > self.peak.load(Ordering::Relaxed) {
            self.peak.store(block_peak, Ordering::Relaxed);
        }
    }

    pub fn level(&self) -> f32 {
        self.level.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> f32 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn reset_peak(&self) {
        self.peak.store(0.0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn rms_of_constant_block_is_its_magnitude() {
        let meter = LevelMeter::new();
        meter.update(&[-0.5; 64]);
        assert_abs_diff_eq!(meter.level(), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(meter.peak(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn peak_holds_until_reset() {
        let meter = LevelMeter::new();
        meter.update(&[0.0, 0.9, 0.0]);
        meter.update(&[0.1; 8]);
        assert_abs_diff_eq!(meter.peak(), 0.9, epsilon = 1e-6);
        assert_abs_diff_eq!(meter.level(), 0.1, epsilon = 1e-6);
        meter.reset_peak();
        assert_eq!(meter.peak(), 0.0);
        meter.update(&[0.2; 8]);
        assert_abs_diff_eq!(meter.peak(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn stereo_mean_cancels_opposite_channels() {
        let meter = LevelMeter::new();
        meter.update_stereo_mean(&[0.4; 16], &[-0.4; 16]);
        assert_eq!(meter.level(), 0.0);
        meter.update_stereo_mean(&[0.4; 16], &[0.2; 16]);
        assert_abs_diff_eq!(meter.level(), 0.3, epsilon = 1e-6);
    }

    #[test]
    fn empty_block_leaves_meter_untouched() {
        let meter = LevelMeter::new();
        meter.update(&[0.7]);
        meter.update(&[]);
        assert_abs_diff_eq!(meter.level(), 0.7, epsilon = 1e-6);
    }
}
