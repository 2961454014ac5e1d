// FILE: src\audio_engine\processor.rs
// ====================================

use super::fx_rack::DspChain;
use super::looper_track::LooperTrack;
use super::EngineShared;
use crate::recorder::RecorderInput;
use std::sync::Arc;

/// Everything the audio thread owns for one running stream.
///
/// All scratch buffers are sized up front; `process_block` never allocates.
pub struct BlockProcessor {
    shared: Arc<EngineShared>,
    chain: DspChain,
    looper: LooperTrack,
    recorder: RecorderInput,
    gained: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl BlockProcessor {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        chain: DspChain,
        looper: LooperTrack,
        recorder: RecorderInput,
        max_block: usize,
    ) -> Self {
        let max_block = max_block.max(1);
        Self {
            shared,
            chain,
            looper,
            recorder,
            gained: vec![0.0; max_block],
            left: vec![0.0; max_block],
            right: vec![0.0; max_block],
        }
    }

    /// Largest block handled in one pass; longer blocks are split.
    pub fn max_block(&self) -> usize {
        self.gained.len()
    }

    pub fn chain(&self) -> &DspChain {
        &self.chain
    }

    pub fn reset(&mut self) {
        self.chain.reset();
    }

    /// Processes mono `input` into interleaved stereo `output`. Output frames with
    /// no matching input frame are silent.
    pub fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = input.len().min(output.len() / 2);
        let max = self.max_block();
        for (input, output) in input[..frames]
            .chunks(max)
            .zip(output[..frames * 2].chunks_mut(max * 2))
        {
            self.process_chunk(input, output);
        }
        output[frames * 2..].fill(0.0);
    }

    fn process_chunk(&mut self, input: &[f32], output: &mut [f32]) {
        let n = input.len();
        let gained = &mut self.gained[..n];
        let left = &mut self.left[..n];
        let right = &mut self.right[..n];

        let input_gain = self.shared.input_gain();
        for (g, &x) in gained.iter_mut().zip(input) {
            *g = x * input_gain;
        }
        self.shared.input_meter.update(gained);

        self.chain.process(gained, left, right);
        self.looper.process(left, right);

        let output_gain = self.shared.output_gain();
        for x in left.iter_mut().chain(right.iter_mut()) {
            *x *= output_gain;
        }

        self.recorder.process_audio(left, right);

        for (frame, (&l, &r)) in output.chunks_exact_mut(2).zip(left.iter().zip(right.iter())) {
            frame[0] = l;
            frame[1] = r;
        }
        self.shared.output_meter.update_stereo_mean(left, right);
    }
}

#[cfg(test)]
mod tests {
    use crate::audio_engine::AudioEngine;
    use crate::fx::StageKind;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gains_scale_input_and_output() {
        let mut engine = AudioEngine::new();
        let mut processor = engine.prepare(48_000, 64);
        engine.set_input_gain(0.5);
        engine.set_output_gain(2.0);

        let input = vec![0.2; 64];
        let mut output = vec![0.0; 128];
        processor.process_block(&input, &mut output);

        assert!(output.iter().all(|&x| (x - 0.2).abs() < 1e-6));
        assert_abs_diff_eq!(engine.input_level(), 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(engine.output_level(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn long_blocks_are_split_and_trailing_frames_silenced() {
        let mut engine = AudioEngine::new();
        let mut processor = engine.prepare(48_000, 16);
        let input: Vec<f32> = (0..40).map(|i| i as f32 / 100.0).collect();
        let mut output = vec![1.0; 100];
        processor.process_block(&input, &mut output);

        for (i, frame) in output[..80].chunks(2).enumerate() {
            assert_eq!(frame, [input[i], input[i]]);
        }
        assert!(output[80..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn recorder_receives_post_gain_output() {
        let mut engine = AudioEngine::new();
        let mut processor = engine.prepare(48_000, 32);
        engine.set_output_gain(0.5);
        engine.recorder().start_recording();
        processor.process_block(&[0.8; 32], &mut [0.0; 64]);
        engine.recorder().flush();
        assert_eq!(engine.recorder().recorded_frames(), 32);
        engine.recorder().with_take(|left, right| {
            assert!(left.iter().all(|&x| (x - 0.4).abs() < 1e-6));
            assert!(right.iter().all(|&x| (x - 0.4).abs() < 1e-6));
        });
    }

    #[test]
    fn active_stage_changes_output() {
        let mut engine = AudioEngine::new();
        let mut processor = engine.prepare(48_000, 32);
        engine.params().set_bypass(StageKind::Drive, false);
        let mut output = vec![0.0; 64];
        processor.process_block(&[0.5; 32], &mut output);
        assert!(output[0] > 0.5);
    }
}
