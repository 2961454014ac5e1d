// src/fx_components/pitch.rs

//! Pitch stage: a semitone up or down through the phase vocoder.
use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{ChannelLayout, DspComponent, StereoBlock};
use crate::pitch_shifter::PitchShifter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PitchMode {
    Off = 0,
    Down = 1,
    Up = 2,
}

impl From<u32> for PitchMode {
    fn from(val: u32) -> Self {
        match val {
            1 => PitchMode::Down,
            2 => PitchMode::Up,
            _ => PitchMode::Off,
        }
    }
}

impl PitchMode {
    pub fn semitones(self) -> f32 {
        match self {
            PitchMode::Off => 0.0,
            PitchMode::Down => -1.0,
            PitchMode::Up => 1.0,
        }
    }
}

impl FromStr for PitchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(PitchMode::Off),
            "down" => Ok(PitchMode::Down),
            "up" => Ok(PitchMode::Up),
            other => Err(format!("unknown pitch mode '{other}'")),
        }
    }
}

impl fmt::Display for PitchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PitchMode::Off => "off",
            PitchMode::Down => "down",
            PitchMode::Up => "up",
        };
        f.write_str(name)
    }
}

/// Shared parameters for the pitch stage.
#[derive(Debug, Clone)]
pub struct Params {
    /// Shift mode. Stored as a u32 (0-2).
    pub mode: Arc<AtomicU32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            mode: Arc::new(AtomicU32::new(PitchMode::Off as u32)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    pub fn set_mode(&self, mode: PitchMode) {
        self.mode.store(mode as u32, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            mode: PitchMode::from(self.mode.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub mode: PitchMode,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

#[derive(Debug)]
pub struct PitchStage {
    shifter: PitchShifter,
}

impl PitchStage {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            shifter: PitchShifter::new(sample_rate),
        }
    }
}

impl DspComponent for PitchStage {
    fn kind(&self) -> StageKind {
        StageKind::Pitch
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Stereo
    }

    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        let semitones = settings.pitch.mode.semitones();
        self.shifter
            .process_in_place(block.left, block.right, semitones);
    }

    fn reset(&mut self) {
        self.shifter.reset();
    }
}
