// src/recorder.rs

//! Captures the engine's stereo output into memory and saves it as a WAV file.
//!
//! The audio thread pushes frames into a fixed-size lock-free ring (oldest frames
//! are overwritten when it is full) and rings a doorbell. A writer thread moves
//! frames from the ring into the take, which is capped at ten minutes. Saving and
//! clearing happen on the caller's thread.

use crate::wav;
use crossbeam_channel::{bounded, Receiver, Sender};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Ring capacity in stereo frames (ten seconds at 48 kHz).
pub const RING_BUFFER_FRAMES: usize = 48_000 * 10;
pub const MAX_RECORDING_SECONDS: u32 = 600;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("no audio has been recorded")]
    NoAudio,
    #[error("failed to write recording: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
enum WriterSignal {
    Wake,
    Shutdown { drain: bool },
}

#[derive(Debug, Default)]
struct Take {
    left: Vec<f32>,
    right: Vec<f32>,
    max_frames: usize,
}

impl Take {
    fn frames(&self) -> usize {
        self.left.len()
    }

    fn clear(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

struct RecorderShared {
    recording: AtomicBool,
    ring: ArrayQueue<[f32; 2]>,
    take: Mutex<Take>,
    sample_rate: AtomicU32,
    dropped_frames: AtomicUsize,
}

impl RecorderShared {
    /// Moves everything in the ring into the take. Frames past the cap are discarded.
    fn drain(&self) -> usize {
        let mut take = self.take.lock();
        let mut moved = 0;
        while let Some([l, r]) = self.ring.pop() {
            if take.frames() < take.max_frames {
                take.left.push(l);
                take.right.push(r);
                moved += 1;
            }
        }
        moved
    }

    fn discard_ring(&self) {
        while self.ring.pop().is_some() {}
    }
}

fn max_frames(sample_rate: u32) -> usize {
    sample_rate as usize * MAX_RECORDING_SECONDS as usize
}

/// The real-time producer half of a `Recorder`.
#[derive(Clone)]
pub struct RecorderInput {
    shared: Arc<RecorderShared>,
    doorbell: Sender<WriterSignal>,
}

impl RecorderInput {
    /// Queues one block while recording. Never blocks.
    pub fn process_audio(&self, left: &[f32], right: &[f32]) {
        if !self.shared.recording.load(Ordering::Acquire) {
            return;
        }
        let mut dropped = 0;
        for (&l, &r) in left.iter().zip(right) {
            if self.shared.ring.force_push([l, r]).is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            self.shared
                .dropped_frames
                .fetch_add(dropped, Ordering::Relaxed);
        }
        // A full doorbell means the writer is already due to run.
        let _ = self.doorbell.try_send(WriterSignal::Wake);
    }
}

pub struct Recorder {
    shared: Arc<RecorderShared>,
    doorbell: Sender<WriterSignal>,
    writer: Option<JoinHandle<()>>,
}

impl Recorder {
    /// Creates a recorder with its background writer thread.
    pub fn new(sample_rate: u32) -> Self {
        let (doorbell, signals) = bounded(1);
        let shared = Self::shared(sample_rate);
        let writer_shared = shared.clone();
        let writer = thread::Builder::new()
            .name("recorder-writer".into())
            .spawn(move || writer_loop(writer_shared, signals));
        let writer = match writer {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to spawn recorder writer, saving will drain inline: {}", e);
                None
            }
        };
        Self {
            shared,
            doorbell,
            writer,
        }
    }

    /// Creates a recorder without a writer thread. The ring is only drained by
    /// `flush`, `save_to_file` and `shutdown(true)`.
    pub fn detached(sample_rate: u32) -> Self {
        let (doorbell, _) = bounded(1);
        Self {
            shared: Self::shared(sample_rate),
            doorbell,
            writer: None,
        }
    }

    fn shared(sample_rate: u32) -> Arc<RecorderShared> {
        Arc::new(RecorderShared {
            recording: AtomicBool::new(false),
            ring: ArrayQueue::new(RING_BUFFER_FRAMES),
            take: Mutex::new(Take {
                max_frames: max_frames(sample_rate),
                ..Take::default()
            }),
            sample_rate: AtomicU32::new(sample_rate),
            dropped_frames: AtomicUsize::new(0),
        })
    }

    /// The handle the audio thread writes through.
    pub fn input(&self) -> RecorderInput {
        RecorderInput {
            shared: self.shared.clone(),
            doorbell: self.doorbell.clone(),
        }
    }

    /// Changes the rate used for the cap and the WAV header. A take recorded at
    /// another rate is discarded.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        if self.sample_rate() == sample_rate {
            return;
        }
        self.shared.recording.store(false, Ordering::Release);
        self.shared.sample_rate.store(sample_rate, Ordering::Release);
        let mut take = self.shared.take.lock();
        take.clear();
        take.max_frames = max_frames(sample_rate);
        self.shared.discard_ring();
    }

    /// Starts a new take. Any previous take is discarded.
    pub fn start_recording(&self) {
        if self.is_recording() {
            return;
        }
        self.clear_recording();
        self.shared.recording.store(true, Ordering::Release);
        info!("Recorder started");
    }

    pub fn stop_recording(&self) {
        if !self.shared.recording.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.doorbell.try_send(WriterSignal::Wake);
        info!(seconds = self.recording_duration(), "Recorder stopped");
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::Acquire)
    }

    /// Drains the ring into the take on the calling thread.
    pub fn flush(&self) -> usize {
        self.shared.drain()
    }

    /// Writes the take as 24-bit stereo WAV. A file this call created but could not
    /// finish is removed; a path that could not be opened is left as it was.
    pub fn save_to_file(&self, path: &Path) -> Result<(), RecorderError> {
        self.flush();
        let take = self.shared.take.lock();
        if take.frames() == 0 {
            return Err(RecorderError::NoAudio);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        if let Err(e) = wav::write_wav_file(path, self.sample_rate(), &take.left, &take.right) {
            warn!("Failed to save recording to {}: {}", path.display(), e);
            return Err(e.into());
        }
        info!(frames = take.frames(), "Saved recording to {}", path.display());
        Ok(())
    }

    /// Empties the take and the ring.
    pub fn clear_recording(&self) {
        let mut take = self.shared.take.lock();
        take.clear();
        self.shared.discard_ring();
        self.shared.dropped_frames.store(0, Ordering::Relaxed);
        debug!("Recorder cleared");
    }

    /// Runs `f` over the drained take while holding the take lock.
    pub fn with_take<R>(&self, f: impl FnOnce(&[f32], &[f32]) -> R) -> R {
        let take = self.shared.take.lock();
        f(&take.left, &take.right)
    }

    /// Frames in the take plus frames still waiting in the ring.
    pub fn recorded_frames(&self) -> usize {
        let take = self.shared.take.lock().frames();
        take + self.shared.ring.len()
    }

    pub fn recording_duration(&self) -> f32 {
        self.recorded_frames() as f32 / self.sample_rate().max(1) as f32
    }

    pub fn has_recorded_audio(&self) -> bool {
        self.recorded_frames() > 0
    }

    /// Frames overwritten because the writer fell behind.
    pub fn dropped_frames(&self) -> usize {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }

    /// Stops the take and joins the writer. With `drain`, queued frames are kept.
    pub fn shutdown(&mut self, drain: bool) {
        self.shared.recording.store(false, Ordering::Release);
        match self.writer.take() {
            Some(handle) => {
                let _ = self.doorbell.send(WriterSignal::Shutdown { drain });
                if handle.join().is_err() {
                    error!("Recorder writer thread panicked");
                }
            }
            None if drain => {
                self.shared.drain();
            }
            None => {}
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

fn writer_loop(shared: Arc<RecorderShared>, signals: Receiver<WriterSignal>) {
    debug!("Recorder writer started");
    loop {
        match signals.recv() {
            Ok(WriterSignal::Wake) => {
                shared.drain();
            }
            Ok(WriterSignal::Shutdown { drain }) => {
                if drain {
                    shared.drain();
                }
                break;
            }
            Err(_) => break,
        }
    }
    debug!("Recorder writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_recorder_ignores_audio() {
        let recorder = Recorder::detached(48_000);
        recorder.input().process_audio(&[0.1; 64], &[0.1; 64]);
        assert_eq!(recorder.recorded_frames(), 0);
        assert!(!recorder.has_recorded_audio());
    }

    #[test]
    fn flush_moves_ring_into_take() {
        let recorder = Recorder::detached(48_000);
        recorder.start_recording();
        recorder.input().process_audio(&[0.1; 480], &[0.2; 480]);
        assert_eq!(recorder.flush(), 480);
        assert_eq!(recorder.recorded_frames(), 480);
        assert!((recorder.recording_duration() - 0.01).abs() < 1e-6);
    }

    #[test]
    fn take_is_capped_at_maximum_duration() {
        let recorder = Recorder::detached(10);
        recorder.start_recording();
        let cap = 10 * MAX_RECORDING_SECONDS as usize;
        let block = vec![0.0; cap + 100];
        recorder.input().process_audio(&block, &block);
        assert_eq!(recorder.flush(), cap);
        assert_eq!(recorder.recorded_frames(), cap);
    }

    #[test]
    fn start_recording_discards_previous_take() {
        let recorder = Recorder::detached(48_000);
        recorder.start_recording();
        recorder.input().process_audio(&[0.5; 32], &[0.5; 32]);
        recorder.stop_recording();
        recorder.flush();
        recorder.start_recording();
        assert_eq!(recorder.recorded_frames(), 0);
    }

    #[test]
    fn save_without_audio_fails() {
        let recorder = Recorder::detached(48_000);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.wav");
        assert!(matches!(recorder.save_to_file(&path), Err(RecorderError::NoAudio)));
        assert!(!path.exists());
    }

    #[test]
    fn writer_thread_drains_on_shutdown() {
        let mut recorder = Recorder::new(48_000);
        recorder.start_recording();
        recorder.input().process_audio(&[0.3; 256], &[0.3; 256]);
        recorder.shutdown(true);
        assert!(!recorder.is_recording());
        assert_eq!(recorder.shared.take.lock().frames(), 256);
        assert_eq!(recorder.shared.ring.len(), 0);
    }
}
