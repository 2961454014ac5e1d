// FILE: src\audio_engine\fx_rack.rs
// ==================================

use crate::fx::{ChainSettings, DspParams, StageKind};
use crate::fx_components::{self, ChannelLayout, DspComponent, StereoBlock};

/// The fixed effect pipeline: gate, drive, EQ, compressor, pitch, delay, reverb.
///
/// Gate and drive run on the mono input. The block is widened to stereo right
/// before the first stereo stage and is always stereo on return.
pub struct DspChain {
    params: DspParams,
    components: Vec<Box<dyn DspComponent>>,
    sample_rate: f32,
}

impl DspChain {
    pub fn new(params: DspParams, sample_rate: f32) -> Self {
        let components = StageKind::ALL
            .into_iter()
            .map(|kind| build_component(kind, sample_rate))
            .collect();
        Self {
            params,
            components,
            sample_rate,
        }
    }

    pub fn params(&self) -> &DspParams {
        &self.params
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Snapshots the parameters and runs one block.
    pub fn process(&mut self, input: &[f32], left: &mut [f32], right: &mut [f32]) {
        let settings = self.params.snapshot();
        self.process_with(&settings, input, left, right);
    }

    /// Runs one block with explicit settings. `left` and `right` receive the stereo result.
    pub fn process_with(
        &mut self,
        settings: &ChainSettings,
        input: &[f32],
        left: &mut [f32],
        right: &mut [f32],
    ) {
        let n = input.len().min(left.len()).min(right.len());
        left[..n].copy_from_slice(&input[..n]);
        let mut block = StereoBlock::mono(&mut left[..n], &mut right[..n]);

        for component in self.components.iter_mut() {
            if component.layout() == ChannelLayout::Stereo {
                block.widen();
            }
            if settings.is_active(component.kind()) {
                component.process_block(&mut block, settings);
            }
        }
        block.widen();
    }

    /// Clears all filter, envelope and delay memory.
    pub fn reset(&mut self) {
        for component in self.components.iter_mut() {
            component.reset();
        }
    }
}

fn build_component(kind: StageKind, sample_rate: f32) -> Box<dyn DspComponent> {
    match kind {
        StageKind::Gate => Box::new(fx_components::Gate::new(sample_rate)),
        StageKind::Drive => Box::new(fx_components::Drive::new()),
        StageKind::Eq => Box::new(fx_components::Equalizer::new(sample_rate)),
        StageKind::Compressor => Box::new(fx_components::Compressor::new(sample_rate)),
        StageKind::Pitch => Box::new(fx_components::PitchStage::new(sample_rate)),
        StageKind::Delay => Box::new(fx_components::Delay::new(sample_rate)),
        StageKind::Reverb => Box::new(fx_components::Reverb::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx_components::{DriveType, PitchMode};
    use approx::assert_abs_diff_eq;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| (i as f32 / n as f32) - 0.5).collect()
    }

    #[test]
    fn stages_follow_pipeline_order() {
        let chain = DspChain::new(DspParams::new(), 48_000.0);
        let kinds: Vec<StageKind> = chain.components.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, StageKind::ALL);
    }

    #[test]
    fn all_bypassed_copies_input_to_both_channels() {
        let mut chain = DspChain::new(DspParams::new(), 48_000.0);
        let input = ramp(128);
        let mut left = vec![0.0; 128];
        let mut right = vec![0.0; 128];
        chain.process(&input, &mut left, &mut right);
        assert_eq!(left, input);
        assert_eq!(right, input);
    }

    #[test]
    fn mono_stages_are_widened_after_processing() {
        let params = DspParams::new();
        params.set_bypass(StageKind::Drive, false);
        params.set_drive_type(DriveType::Hard);
        let mut chain = DspChain::new(params, 48_000.0);
        let input = vec![0.9; 64];
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        chain.process(&input, &mut left, &mut right);
        assert_abs_diff_eq!(left[0], 1.0 / 1.25, epsilon = 1e-6);
        assert_eq!(left, right);
    }

    #[test]
    fn pitch_stage_is_skipped_in_low_latency_mode() {
        let params = DspParams::new();
        params.set_bypass(StageKind::Pitch, false);
        params.set_pitch_mode(PitchMode::Up);
        params.set_low_latency(true);
        let mut chain = DspChain::new(params, 48_000.0);
        let input = ramp(256);
        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        chain.process(&input, &mut left, &mut right);
        assert_eq!(left, input);
    }

    #[test]
    fn active_pitch_stage_delays_signal() {
        let params = DspParams::new();
        params.set_bypass(StageKind::Pitch, false);
        params.set_pitch_mode(PitchMode::Down);
        let mut chain = DspChain::new(params, 48_000.0);
        let input = ramp(256);
        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        chain.process(&input, &mut left, &mut right);
        assert_ne!(left, input);
    }

    #[test]
    fn short_output_buffers_limit_the_block() {
        let mut chain = DspChain::new(DspParams::new(), 48_000.0);
        let input = ramp(32);
        let mut left = vec![0.0; 16];
        let mut right = vec![0.0; 16];
        chain.process(&input, &mut left, &mut right);
        assert_eq!(left, &input[..16]);
    }
}
