// src/looper.rs

//! Multi-slot looper: the control-plane handle and the state it shares with the
//! audio thread.
//!
//! The audio side (`audio_engine::looper_track::LooperTrack`) never locks. Slots are
//! immutable once recorded and live in a `SlotBank` that control operations replace
//! wholesale through `ArcSwap`; per-slot flags, cursors, the mode and the legacy
//! capture buffer are atomics. Control operations serialise among themselves on a
//! mutex the audio thread never touches.

use crate::audio_engine::looper_track::LooperTrack;
use arc_swap::ArcSwap;
use atomic_float::AtomicF32;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const MAX_LOOP_SECONDS: u32 = 60;
pub const MAX_LOOP_LEVEL: f32 = 2.0;
/// Overdub keeps this much of the existing loop...
pub const OVERDUB_DECAY: f32 = 0.7;
/// ...and adds this much of the new input.
pub const OVERDUB_INPUT: f32 = 0.3;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LooperState {
    Off,
    Recording,
    Playing,
    Overdubbing,
}

impl From<u8> for LooperState {
    fn from(val: u8) -> Self {
        match val {
            1 => LooperState::Recording,
            2 => LooperState::Playing,
            3 => LooperState::Overdubbing,
            _ => LooperState::Off,
        }
    }
}

impl fmt::Display for LooperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LooperState::Off => "off",
            LooperState::Recording => "recording",
            LooperState::Playing => "playing",
            LooperState::Overdubbing => "overdubbing",
        };
        f.write_str(name)
    }
}

/// One committed loop layer. The audio never changes after creation.
#[derive(Debug)]
pub struct LoopSlot {
    left: Box<[f32]>,
    right: Box<[f32]>,
    selected: AtomicBool,
    active: AtomicBool,
    pub(crate) cursor: AtomicUsize,
}

impl LoopSlot {
    fn from_capture(capture: &CaptureBuffer, len: usize) -> Self {
        let (left, right) = capture.copy_prefix(len);
        Self {
            left,
            right,
            selected: AtomicBool::new(true),
            active: AtomicBool::new(false),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    fn arm(&self, position: usize) {
        let position = if position < self.len() { position } else { 0 };
        self.cursor.store(position, Ordering::Release);
        self.active.store(true, Ordering::Release);
    }

    fn disarm(&self) {
        self.active.store(false, Ordering::Release);
        self.cursor.store(0, Ordering::Release);
    }
}

/// Read-only view of a slot for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub index: usize,
    pub length: usize,
    pub selected: bool,
    pub active: bool,
    pub position: usize,
}

/// An immutable, published list of slots.
#[derive(Debug, Default)]
pub(crate) struct SlotBank {
    pub(crate) slots: Vec<Arc<LoopSlot>>,
}

impl SlotBank {
    fn with_slot(&self, slot: Arc<LoopSlot>) -> Self {
        let mut slots = self.slots.clone();
        slots.push(slot);
        Self { slots }
    }
}

/// The legacy single-loop buffer, also the target of every recording.
pub(crate) struct CaptureBuffer {
    left: Box<[AtomicF32]>,
    right: Box<[AtomicF32]>,
}

impl CaptureBuffer {
    fn new(frames: usize) -> Self {
        let alloc = || -> Box<[AtomicF32]> { (0..frames).map(|_| AtomicF32::new(0.0)).collect() };
        Self {
            left: alloc(),
            right: alloc(),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.left.len()
    }

    #[inline]
    pub(crate) fn read(&self, index: usize) -> (f32, f32) {
        (
            self.left[index].load(Ordering::Relaxed),
            self.right[index].load(Ordering::Relaxed),
        )
    }

    #[inline]
    pub(crate) fn write(&self, index: usize, left: f32, right: f32) {
        self.left[index].store(left, Ordering::Relaxed);
        self.right[index].store(right, Ordering::Relaxed);
    }

    fn copy_prefix(&self, len: usize) -> (Box<[f32]>, Box<[f32]>) {
        let len = len.min(self.capacity());
        let copy = |cells: &[AtomicF32]| -> Box<[f32]> {
            cells[..len]
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect()
        };
        (copy(&self.left[..]), copy(&self.right[..]))
    }
}

pub(crate) struct LooperShared {
    state: AtomicU8,
    pub(crate) level: AtomicF32,
    pub(crate) capture: ArcSwap<CaptureBuffer>,
    pub(crate) write_pos: AtomicUsize,
    pub(crate) loop_length: AtomicUsize,
    pub(crate) play_pos: AtomicUsize,
    pub(crate) slots: ArcSwap<SlotBank>,
    sample_rate: AtomicU32,
    control: Mutex<()>,
}

impl LooperShared {
    pub(crate) fn state(&self) -> LooperState {
        self.state.load(Ordering::Acquire).into()
    }

    fn set_state(&self, state: LooperState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

fn capture_frames(sample_rate: u32) -> usize {
    sample_rate as usize * MAX_LOOP_SECONDS as usize
}

/// Control-plane handle to the looper. Cheap to clone; all clones drive the same looper.
#[derive(Clone)]
pub struct Looper {
    shared: Arc<LooperShared>,
}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("state", &self.state())
            .field("loop_length", &self.loop_length())
            .field("slots", &self.slot_count())
            .finish()
    }
}

impl Looper {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(LooperShared {
                state: AtomicU8::new(LooperState::Off as u8),
                level: AtomicF32::new(1.0),
                capture: ArcSwap::from_pointee(CaptureBuffer::new(capture_frames(sample_rate))),
                write_pos: AtomicUsize::new(0),
                loop_length: AtomicUsize::new(0),
                play_pos: AtomicUsize::new(0),
                slots: ArcSwap::from_pointee(SlotBank::default()),
                sample_rate: AtomicU32::new(sample_rate),
                control: Mutex::new(()),
            }),
        }
    }

    /// The audio-thread half of this looper.
    pub fn track(&self) -> LooperTrack {
        LooperTrack::new(self.shared.clone())
    }

    /// Resizes the capture buffer for a new rate. Existing loops are discarded.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        if self.sample_rate() == sample_rate {
            return;
        }
        let _guard = self.shared.control.lock();
        self.shared.set_state(LooperState::Off);
        self.shared
            .capture
            .store(Arc::new(CaptureBuffer::new(capture_frames(sample_rate))));
        self.shared.sample_rate.store(sample_rate, Ordering::Release);
        self.reset_locked();
        debug!(sample_rate, "Looper buffers resized");
    }

    pub fn start_recording(&self) {
        let _guard = self.shared.control.lock();
        if self.state() == LooperState::Recording {
            return;
        }

        let legacy = self.loop_length();
        if legacy > 0 && self.shared.slots.load().slots.is_empty() {
            let index = self.push_slot(self.snapshot_legacy(legacy));
            debug!(index, frames = legacy, "Promoted legacy loop to slot");
        }

        self.shared.write_pos.store(0, Ordering::Release);
        self.shared.loop_length.store(0, Ordering::Release);
        self.shared.play_pos.store(0, Ordering::Release);
        for slot in self.shared.slots.load().slots.iter() {
            if slot.is_selected() {
                slot.arm(0);
            }
        }
        self.shared.set_state(LooperState::Recording);
        info!("Looper recording");
    }

    pub fn stop_recording(&self) {
        let _guard = self.shared.control.lock();
        self.finish_recording();
    }

    fn finish_recording(&self) -> bool {
        if self.state() != LooperState::Recording {
            return false;
        }
        let capacity = self.shared.capture.load().capacity();
        let len = self.shared.write_pos.load(Ordering::Acquire).min(capacity);
        self.shared.loop_length.store(len, Ordering::Release);
        self.shared.play_pos.store(0, Ordering::Release);
        self.shared.set_state(LooperState::Off);
        info!(frames = len, "Looper recording finished");
        true
    }

    /// Commits the finished recording as a new selected slot and returns its index.
    ///
    /// The legacy loop is consumed. If it was playing, the new slot carries on from
    /// the same position.
    pub fn add_recorded_loop(&self) -> Option<usize> {
        let _guard = self.shared.control.lock();
        let state = self.state();
        let len = self.loop_length();
        if state == LooperState::Recording || len == 0 {
            return None;
        }

        let slot = self.snapshot_legacy(len);
        if matches!(state, LooperState::Playing | LooperState::Overdubbing) {
            slot.arm(self.shared.play_pos.load(Ordering::Acquire));
        }
        self.shared.loop_length.store(0, Ordering::Release);
        self.shared.play_pos.store(0, Ordering::Release);
        let index = self.push_slot(slot);
        if state == LooperState::Overdubbing {
            self.shared.set_state(LooperState::Playing);
        }
        info!(index, frames = len, "Committed loop to slot");
        Some(index)
    }

    pub fn start_playing(&self) {
        let _guard = self.shared.control.lock();
        if !matches!(self.state(), LooperState::Off | LooperState::Playing) {
            return;
        }
        let bank = self.shared.slots.load();
        let has_selection = bank.slots.iter().any(|slot| slot.is_selected());
        if self.loop_length() == 0 && !has_selection {
            return;
        }
        for slot in bank.slots.iter().filter(|slot| slot.is_selected()) {
            slot.arm(0);
        }
        self.shared.play_pos.store(0, Ordering::Release);
        self.shared.set_state(LooperState::Playing);
        info!("Looper playing");
    }

    /// Stops everything. A recording in progress is finalised first.
    pub fn stop_playing(&self) {
        let _guard = self.shared.control.lock();
        self.finish_recording();
        for slot in self.shared.slots.load().slots.iter() {
            slot.disarm();
        }
        self.shared.play_pos.store(0, Ordering::Release);
        self.shared.set_state(LooperState::Off);
        info!("Looper stopped");
    }

    pub fn start_overdub(&self) {
        let _guard = self.shared.control.lock();
        if self.state() == LooperState::Playing && self.loop_length() > 0 {
            self.shared.set_state(LooperState::Overdubbing);
            info!("Looper overdubbing");
        }
    }

    pub fn stop_overdub(&self) {
        let _guard = self.shared.control.lock();
        if self.state() == LooperState::Overdubbing {
            self.shared.set_state(LooperState::Playing);
            info!("Looper overdub finished");
        }
    }

    /// Drops the legacy loop and every slot.
    pub fn clear(&self) {
        let _guard = self.shared.control.lock();
        self.reset_locked();
        info!("Looper cleared");
    }

    fn reset_locked(&self) {
        self.shared.set_state(LooperState::Off);
        self.shared.write_pos.store(0, Ordering::Release);
        self.shared.loop_length.store(0, Ordering::Release);
        self.shared.play_pos.store(0, Ordering::Release);
        self.shared.slots.store(Arc::new(SlotBank::default()));
    }

    /// Flips a slot's selection and returns the new value, or `None` for a bad index.
    pub fn toggle_slot_selection(&self, index: usize) -> Option<bool> {
        let bank = self.shared.slots.load();
        let slot = bank.slots.get(index)?;
        let selected = !slot.selected.fetch_xor(true, Ordering::AcqRel);
        debug!(index, selected, "Toggled slot selection");
        Some(selected)
    }

    /// NaN mutes the loops.
    pub fn set_loop_level(&self, level: f32) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, MAX_LOOP_LEVEL) };
        self.shared.level.store(level, Ordering::Relaxed);
    }

    pub fn loop_level(&self) -> f32 {
        self.shared.level.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> LooperState {
        self.shared.state()
    }

    /// Length of the finished, uncommitted loop in frames.
    pub fn loop_length(&self) -> usize {
        self.shared.loop_length.load(Ordering::Acquire)
    }

    /// Record cursor while recording, otherwise the legacy playback cursor.
    pub fn position(&self) -> usize {
        match self.state() {
            LooperState::Recording => self.shared.write_pos.load(Ordering::Acquire),
            _ => self.shared.play_pos.load(Ordering::Acquire),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.shared.slots.load().slots.len()
    }

    pub fn slots(&self) -> Vec<SlotInfo> {
        self.shared
            .slots
            .load()
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| SlotInfo {
                index,
                length: slot.len(),
                selected: slot.is_selected(),
                active: slot.is_active(),
                position: slot.position(),
            })
            .collect()
    }

    /// Borrow a committed slot's audio.
    pub fn slot(&self, index: usize) -> Option<Arc<LoopSlot>> {
        self.shared.slots.load().slots.get(index).cloned()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    pub fn max_length_frames(&self) -> usize {
        self.shared.capture.load().capacity()
    }

    pub fn max_length_seconds(&self) -> u32 {
        MAX_LOOP_SECONDS
    }

    fn snapshot_legacy(&self, len: usize) -> LoopSlot {
        LoopSlot::from_capture(&self.shared.capture.load(), len)
    }

    /// Publishes a new bank with `slot` appended. Callers hold the control lock.
    fn push_slot(&self, slot: LoopSlot) -> usize {
        let slot = Arc::new(slot);
        let previous = self.shared.slots.rcu(|bank| bank.with_slot(slot.clone()));
        previous.slots.len()
    }
}
