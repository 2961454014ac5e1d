use tonestack::recorder::{Recorder, RecorderError, RING_BUFFER_FRAMES};

const FULL_SCALE: f32 = 8_388_607.0;

fn expected_code(x: f32) -> i32 {
    (x.clamp(-1.0, 1.0) * FULL_SCALE).round() as i32
}

#[test]
fn saved_take_decodes_within_one_lsb() {
    let recorder = Recorder::detached(44_100);
    recorder.start_recording();

    let mut left: Vec<f32> = (0..2_000)
        .map(|i| (i as f32 * 0.013).sin() * 0.8)
        .collect();
    left.extend_from_slice(&[1.0, -1.0, 1.5, -3.0, 0.0, 1e-7]);
    let right: Vec<f32> = left.iter().map(|x| -0.5 * x).collect();
    for (l, r) in left.chunks(128).zip(right.chunks(128)) {
        recorder.input().process_audio(l, r);
    }
    recorder.stop_recording();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("take.wav");
    recorder.save_to_file(&path).expect("save");

    let mut reader = hound::WavReader::open(&path).expect("open wav");
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 44_100);
    assert_eq!(spec.bits_per_sample, 24);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.expect("sample")).collect();
    assert_eq!(samples.len(), left.len() * 2);
    for (i, frame) in samples.chunks(2).enumerate() {
        assert!((frame[0] - expected_code(left[i])).abs() <= 1, "left {i}");
        assert!((frame[1] - expected_code(right[i])).abs() <= 1, "right {i}");
    }
}

#[test]
fn take_survives_save_until_cleared() {
    let recorder = Recorder::new(48_000);
    recorder.start_recording();
    recorder.input().process_audio(&[0.5; 480], &[0.5; 480]);
    recorder.stop_recording();

    let dir = tempfile::tempdir().expect("tempdir");
    recorder.save_to_file(&dir.path().join("a.wav")).expect("first save");
    recorder.save_to_file(&dir.path().join("b.wav")).expect("second save");
    assert_eq!(recorder.recorded_frames(), 480);

    recorder.clear_recording();
    assert!(!recorder.has_recorded_audio());
    assert!(matches!(
        recorder.save_to_file(&dir.path().join("c.wav")),
        Err(RecorderError::NoAudio)
    ));
}

#[test]
fn overflow_drops_the_oldest_frames() {
    let recorder = Recorder::detached(48_000);
    recorder.start_recording();
    let k = 1_000;
    let total = RING_BUFFER_FRAMES + k;
    let frames: Vec<f32> = (0..total).map(|i| i as f32).collect();
    for block in frames.chunks(4_096) {
        recorder.input().process_audio(block, block);
    }

    assert_eq!(recorder.dropped_frames(), k);
    recorder.flush();
    recorder.with_take(|left, right| {
        assert_eq!(left.len(), RING_BUFFER_FRAMES);
        assert_eq!(left[0], k as f32);
        assert_eq!(right[RING_BUFFER_FRAMES - 1], (total - 1) as f32);
    });
}

#[test]
fn nothing_is_lost_below_ring_capacity() {
    let recorder = Recorder::detached(48_000);
    recorder.start_recording();
    let frames: Vec<f32> = (0..RING_BUFFER_FRAMES).map(|i| i as f32).collect();
    recorder.input().process_audio(&frames, &frames);

    assert_eq!(recorder.dropped_frames(), 0);
    recorder.flush();
    recorder.with_take(|left, _| assert_eq!(left, &frames[..]));
}

#[test]
fn unwritable_path_reports_io_error() {
    let recorder = Recorder::detached(48_000);
    recorder.start_recording();
    recorder.input().process_audio(&[0.1; 16], &[0.1; 16]);

    let dir = tempfile::tempdir().expect("tempdir");
    // A directory cannot be opened as a file.
    let result = recorder.save_to_file(dir.path());
    assert!(matches!(result, Err(RecorderError::Io(_))));
    assert!(dir.path().is_dir());
}

#[cfg(unix)]
#[test]
fn failed_open_keeps_existing_symlink() {
    let recorder = Recorder::detached(48_000);
    recorder.start_recording();
    recorder.input().process_audio(&[0.1; 16], &[0.1; 16]);

    let dir = tempfile::tempdir().expect("tempdir");
    let link = dir.path().join("take.wav");
    let target = dir.path().join("missing").join("target.wav");
    std::os::unix::fs::symlink(&target, &link).expect("symlink");

    let result = recorder.save_to_file(&link);
    assert!(matches!(result, Err(RecorderError::Io(_))));
    assert!(link.symlink_metadata().is_ok());
    assert!(recorder.has_recorded_audio());
}
