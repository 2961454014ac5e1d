// FILE: src\audio_engine\looper_track.rs
// ======================================

use crate::looper::{
    CaptureBuffer, LooperShared, LooperState, SlotBank, OVERDUB_DECAY, OVERDUB_INPUT,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// The audio-thread side of the looper. Mixes loops into the block in place and
/// captures while recording. Never locks and never allocates.
pub struct LooperTrack {
    shared: Arc<LooperShared>,
}

impl LooperTrack {
    pub(crate) fn new(shared: Arc<LooperShared>) -> Self {
        Self { shared }
    }

    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let n = left.len().min(right.len());
        let (left, right) = (&mut left[..n], &mut right[..n]);
        let shared = &*self.shared;

        let state = shared.state();
        let level = shared.level.load(Ordering::Relaxed);
        let bank = shared.slots.load();
        let capture = shared.capture.load();

        match state {
            LooperState::Recording => {
                mix_slots(&bank, left, right, level);
                capture_block(shared, &capture, left, right);
            }
            LooperState::Playing => {
                play_legacy(shared, &capture, left, right, level, false);
                mix_slots(&bank, left, right, level);
            }
            LooperState::Overdubbing => {
                play_legacy(shared, &capture, left, right, level, true);
                mix_slots(&bank, left, right, level);
            }
            LooperState::Off => mix_slots(&bank, left, right, level),
        }
    }
}

/// Writes the post-mix block into the capture buffer until it is full.
fn capture_block(shared: &LooperShared, capture: &CaptureBuffer, left: &[f32], right: &[f32]) {
    let start = shared.write_pos.load(Ordering::Acquire);
    let end = (start + left.len()).min(capture.capacity());
    if end <= start {
        return;
    }
    for (pos, (&l, &r)) in (start..end).zip(left.iter().zip(right)) {
        capture.write(pos, l, r);
    }
    // A control-plane reset since `start` was read wins.
    let _ = shared
        .write_pos
        .compare_exchange(start, end, Ordering::AcqRel, Ordering::Relaxed);
}

/// Adds the legacy loop to the block. When overdubbing, the dry input is folded
/// back into the loop at the same time.
fn play_legacy(
    shared: &LooperShared,
    capture: &CaptureBuffer,
    left: &mut [f32],
    right: &mut [f32],
    level: f32,
    overdub: bool,
) {
    let len = shared.loop_length.load(Ordering::Acquire);
    if len == 0 || len > capture.capacity() {
        return;
    }
    let start = shared.play_pos.load(Ordering::Acquire);
    let mut pos = if start < len { start } else { 0 };

    for (l, r) in left.iter_mut().zip(right.iter_mut()) {
        let (loop_l, loop_r) = capture.read(pos);
        if overdub {
            capture.write(
                pos,
                loop_l * OVERDUB_DECAY + *l * OVERDUB_INPUT,
                loop_r * OVERDUB_DECAY + *r * OVERDUB_INPUT,
            );
        }
        *l += loop_l * level;
        *r += loop_r * level;
        pos += 1;
        if pos >= len {
            pos = 0;
        }
    }
    let _ = shared
        .play_pos
        .compare_exchange(start, pos, Ordering::AcqRel, Ordering::Relaxed);
}

fn mix_slots(bank: &SlotBank, left: &mut [f32], right: &mut [f32], level: f32) {
    for slot in bank.slots.iter().filter(|slot| slot.is_active()) {
        let len = slot.len();
        if len == 0 {
            continue;
        }
        let (slot_l, slot_r) = (slot.left(), slot.right());
        let start = slot.cursor.load(Ordering::Acquire);
        let mut pos = if start < len { start } else { 0 };

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l += slot_l[pos] * level;
            *r += slot_r[pos] * level;
            pos += 1;
            if pos >= len {
                pos = 0;
            }
        }
        let _ = slot
            .cursor
            .compare_exchange(start, pos, Ordering::AcqRel, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use crate::looper::{Looper, LooperState};
    use approx::assert_abs_diff_eq;

    #[test]
    fn off_with_no_slots_is_passthrough() {
        let looper = Looper::new(1_000);
        let mut track = looper.track();
        let mut left = vec![0.3; 32];
        let mut right = vec![-0.3; 32];
        track.process(&mut left, &mut right);
        assert!(left.iter().all(|&x| x == 0.3));
        assert!(right.iter().all(|&x| x == -0.3));
    }

    #[test]
    fn legacy_loop_plays_back_at_level() {
        let looper = Looper::new(1_000);
        let mut track = looper.track();
        looper.start_recording();
        let mut left: Vec<f32> = (0..8).map(|i| i as f32 * 0.1).collect();
        let mut right = left.clone();
        track.process(&mut left, &mut right);
        looper.stop_recording();

        looper.set_loop_level(0.5);
        looper.start_playing();
        let mut left = vec![0.0; 12];
        let mut right = vec![0.0; 12];
        track.process(&mut left, &mut right);
        for (i, x) in left.iter().enumerate() {
            assert_abs_diff_eq!(*x, (i % 8) as f32 * 0.05, epsilon = 1e-6);
        }
        assert_eq!(looper.position(), 4);
    }

    #[test]
    fn overdub_blends_input_into_legacy_loop() {
        let looper = Looper::new(1_000);
        let mut track = looper.track();
        looper.start_recording();
        track.process(&mut [1.0; 4], &mut [1.0; 4]);
        looper.stop_recording();
        looper.start_playing();
        looper.start_overdub();
        assert_eq!(looper.state(), LooperState::Overdubbing);

        let mut left = [0.5; 4];
        let mut right = [0.5; 4];
        track.process(&mut left, &mut right);
        assert_abs_diff_eq!(left[0], 1.5, epsilon = 1e-6);

        looper.stop_overdub();
        let mut left = [0.0; 4];
        let mut right = [0.0; 4];
        track.process(&mut left, &mut right);
        assert_abs_diff_eq!(left[0], 0.7 + 0.15, epsilon = 1e-6);
    }

    #[test]
    fn recording_captures_post_mix_signal() {
        let looper = Looper::new(1_000);
        let mut track = looper.track();
        looper.start_recording();
        track.process(&mut [0.25; 4], &mut [0.25; 4]);
        looper.stop_recording();
        looper.add_recorded_loop();

        // Second take is recorded over the first slot, which plays along.
        looper.start_recording();
        track.process(&mut [0.5; 4], &mut [0.5; 4]);
        looper.stop_recording();
        looper.add_recorded_loop();

        let second = looper.slot(1).expect("second slot");
        assert!(second.left().iter().all(|&x| (x - 0.75).abs() < 1e-6));
    }

    #[test]
    fn overdub_leaves_committed_slots_untouched() {
        let looper = Looper::new(1_000);
        let mut track = looper.track();
        looper.start_recording();
        track.process(&mut [0.25; 4], &mut [0.25; 4]);
        looper.stop_recording();
        looper.add_recorded_loop();

        looper.start_recording();
        track.process(&mut [0.5; 4], &mut [0.5; 4]);
        looper.stop_recording();
        looper.start_playing();
        looper.start_overdub();
        assert_eq!(looper.state(), LooperState::Overdubbing);
        for _ in 0..3 {
            track.process(&mut [0.9; 4], &mut [-0.9; 4]);
        }
        looper.stop_overdub();

        let first = looper.slot(0).expect("first slot");
        assert!(first.left().iter().all(|&x| x == 0.25));
        assert!(first.right().iter().all(|&x| x == 0.25));
    }
}
