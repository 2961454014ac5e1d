// src/fx_components/gate.rs

//! Noise gate driven by a one-pole envelope that opens above a threshold.
use crate::fx::{ChainSettings, StageKind};
use crate::fx_components::{
    coerce, db_to_gain, one_pole_coeff, ChannelLayout, DspComponent, StereoBlock,
};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_THRESHOLD_DB: f32 = -60.0;
const DEFAULT_ATTACK_S: f32 = 0.001;
const DEFAULT_RELEASE_S: f32 = 0.05;

/// Shared, automatable parameters for the noise gate.
#[derive(Debug, Clone)]
pub struct Params {
    /// Open threshold in dBFS.
    pub threshold_db: Arc<AtomicF32>,
    /// Attack time in seconds.
    pub attack_s: Arc<AtomicF32>,
    /// Release time in seconds.
    pub release_s: Arc<AtomicF32>,
    pub bypassed: Arc<AtomicBool>,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            threshold_db: Arc::new(AtomicF32::new(DEFAULT_THRESHOLD_DB)),
            attack_s: Arc::new(AtomicF32::new(DEFAULT_ATTACK_S)),
            release_s: Arc::new(AtomicF32::new(DEFAULT_RELEASE_S)),
            bypassed: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl Params {
    /// Helper to get a specific parameter by name.
    pub fn get_param(&self, name: &str) -> Option<Arc<AtomicF32>> {
        match name {
            "threshold" | "threshold_db" => Some(self.threshold_db.clone()),
            "attack" | "attack_s" => Some(self.attack_s.clone()),
            "release" | "release_s" => Some(self.release_s.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            bypassed: self.bypassed.load(Ordering::Relaxed),
            threshold_db: coerce(
                self.threshold_db.load(Ordering::Relaxed),
                -100.0,
                0.0,
                DEFAULT_THRESHOLD_DB,
            ),
            attack_s: coerce(self.attack_s.load(Ordering::Relaxed), 1e-4, 5.0, DEFAULT_ATTACK_S),
            release_s: coerce(self.release_s.load(Ordering::Relaxed), 1e-4, 5.0, DEFAULT_RELEASE_S),
        }
    }
}

/// Gate values as seen by one block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub bypassed: bool,
    pub threshold_db: f32,
    pub attack_s: f32,
    pub release_s: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Params::default().snapshot()
    }
}

/// The audio-thread state for the gate.
#[derive(Debug)]
pub struct Gate {
    envelope: f32,
    sample_rate: f32,
}

impl Gate {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            envelope: 0.0,
            sample_rate,
        }
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }
}

impl DspComponent for Gate {
    fn kind(&self) -> StageKind {
        StageKind::Gate
    }

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Mono
    }

    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings) {
        let s = &settings.gate;
        let threshold = db_to_gain(s.threshold_db);
        let attack = one_pole_coeff(s.attack_s, self.sample_rate);
        let release = one_pole_coeff(s.release_s, self.sample_rate);

        for sample in block.left.iter_mut() {
            let target = if sample.abs() > threshold { 1.0 } else { 0.0 };
            let coeff = if target > self.envelope { attack } else { release };
            self.envelope += (target - self.envelope) * coeff;
            *sample *= self.envelope;
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}
