// src/fx_components/drive.rs

//! Waveshaping overdrive with soft, hard and asymmetric curves.
use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{coerce, ChannelLayout, DspComponent, StereoBlock};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DriveType {
    Soft = 0,
    Hard = 1,
    Asymmetric = 2,
}

impl From<u32> for DriveType {
    fn from(val: u32) -> Self {
        match val {
            1 => DriveType::Hard,
            2 => DriveType::Asymmetric,
            _ => DriveType::Soft,
        }
    }
}

impl FromStr for DriveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soft" => Ok(DriveType::Soft),
            "hard" => Ok(DriveType::Hard),
            "asym" | "asymmetric" => Ok(DriveType::Asymmetric),
            other => Err(format!("unknown drive type '{other}'")),
        }
    }
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriveType::Soft => "soft",
            DriveType::Hard => "hard",
            DriveType::Asymmetric => "asym",
        };
        f.write_str(name)
    }
}

const DEFAULT_AMOUNT: f32 = 0.5;

/// Shared, automatable parameters for the drive stage.
#[derive(Debug, Clone)]
pub struct Params {
    /// Drive amount (0.0 to 1.0), mapped to a pre-gain of `1 + 20 * amount`.
    pub amount: Arc<AtomicF32>,
    /// Drive curve. Stored as a u32 (0-2).
    pub drive_type: Arc<AtomicU32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            amount: Arc::new(AtomicF32::new(DEFAULT_AMOUNT)),
            drive_type: Arc::new(AtomicU32::new(DriveType::Soft as u32)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    /// Helper to get a specific parameter by name.
    pub fn get_param(&self, name: &str) -> Option<Arc<AtomicF32>> {
        match name {
            "amount" => Some(self.amount.clone()),
            _ => None,
        }
    }

    pub fn set_drive_type(&self, drive_type: DriveType) {
        self.drive_type.store(drive_type as u32, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            amount: coerce(self.amount.load(Ordering::Relaxed), 0.0, 1.0, DEFAULT_AMOUNT),
            drive_type: DriveType::from(self.drive_type.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub amount: f32,
    pub drive_type: DriveType,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

/// Applies the selected transfer curve to an already boosted sample.
#[inline]
pub fn shape(x: f32, drive_type: DriveType) -> f32 {
    match drive_type {
        DriveType::Soft => x.tanh(),
        DriveType::Hard => x.clamp(-1.0, 1.0),
        DriveType::Asymmetric => {
            if x > 0.0 {
                (1.5 * x).tanh() * 0.7
            } else {
                (0.7 * x).tanh() * 1.3
            }
        }
    }
}

/// Stateless audio-thread side of the drive stage.
#[derive(Debug, Default)]
pub struct Drive;

impl Drive {
    pub fn new() -> Self {
        Self
    }
}

impl DspComponent for Drive {
    fn kind(&self) -> StageKind {
        StageKind::Drive
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Mono
    }

    #[inline]
    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        let s = &settings.drive;
        let pre_gain = 1.0 + s.amount * 20.0;
        let compensation = 1.0 / (1.0 + s.amount * 0.5);

        for sample in block.left.iter_mut() {
            *sample = shape(*sample * pre_gain, s.drive_type) * compensation;
        }
    }

    fn reset(&mut self) {}
}
