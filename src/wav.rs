// src/wav.rs

//! Minimal RIFF/WAVE writer for 24-bit stereo PCM.
//!
//! The header is a plain 16-byte `fmt ` chunk with format tag 1 (PCM), followed by a
//! single `data` chunk of interleaved little-endian 3-byte samples.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const CHANNELS: u16 = 2;
pub const BITS_PER_SAMPLE: u16 = 24;
pub const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;
pub const HEADER_LEN: usize = 44;
const FORMAT_PCM: u16 = 1;
const FULL_SCALE: f32 = 8_388_607.0;

/// Converts a float sample to a signed 24-bit value, little-endian.
#[inline]
pub fn encode_sample(sample: f32) -> [u8; 3] {
    let value = (sample.clamp(-1.0, 1.0) * FULL_SCALE).round() as i32;
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

/// Size of the `data` chunk for `frames` stereo frames.
pub fn data_len(frames: usize) -> io::Result<u32> {
    frames
        .checked_mul(BLOCK_ALIGN as usize)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n <= u32::MAX - 36)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "recording too long for WAV"))
}

fn write_header<W: Write>(out: &mut W, sample_rate: u32, data_len: u32) -> io::Result<()> {
    let byte_rate = sample_rate * BLOCK_ALIGN as u32;

    out.write_all(b"RIFF")?;
    out.write_all(&(36 + data_len).to_le_bytes())?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&FORMAT_PCM.to_le_bytes())?;
    out.write_all(&CHANNELS.to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&BLOCK_ALIGN.to_le_bytes())?;
    out.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    out.write_all(b"data")?;
    out.write_all(&data_len.to_le_bytes())
}

/// Writes a complete WAV stream. `left` and `right` are truncated to the shorter length.
pub fn write_wav<W: Write>(
    out: &mut W,
    sample_rate: u32,
    left: &[f32],
    right: &[f32],
) -> io::Result<()> {
    let frames = left.len().min(right.len());
    write_header(out, sample_rate, data_len(frames)?)?;
    for (&l, &r) in left[..frames].iter().zip(&right[..frames]) {
        out.write_all(&encode_sample(l))?;
        out.write_all(&encode_sample(r))?;
    }
    Ok(())
}

/// Creates `path` and writes the WAV into it. If writing fails after the file was
/// created, the partial file is removed. A failed open leaves `path` untouched.
pub fn write_wav_file(
    path: &Path,
    sample_rate: u32,
    left: &[f32],
    right: &[f32],
) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let written = write_wav(&mut out, sample_rate, left, right).and_then(|()| out.flush());
    drop(out);
    if written.is_err() {
        let _ = fs::remove_file(path);
    }
    written
}
