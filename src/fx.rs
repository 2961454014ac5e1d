// src/fx.rs

//! Identities and parameters of the fixed effect pipeline.
//!
//! `DspParams` is the control-plane surface: every field is an independent atomic
//! that any thread may write. The audio thread calls `snapshot` once per block and
//! works only from the returned `ChainSettings`, so all stages of a block (and all
//! EQ coefficients) see one consistent set of values.

use crate::fx_components::{
    CompressorParams, CompressorSettings, DelayParams, DelaySettings, DriveParams, DriveSettings,
    DriveType, EqParams, EqSettings, GateParams, GateSettings, PitchMode, PitchParams,
    PitchSettings, ReverbParams, ReverbSettings,
};
use atomic_float::AtomicF32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One stage of the pipeline, listed in processing order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Gate,
    Drive,
    Eq,
    Compressor,
    Pitch,
    Delay,
    Reverb,
}

impl StageKind {
    pub const ALL: [StageKind; 7] = [
        StageKind::Gate,
        StageKind::Drive,
        StageKind::Eq,
        StageKind::Compressor,
        StageKind::Pitch,
        StageKind::Delay,
        StageKind::Reverb,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Gate => "gate",
            StageKind::Drive => "drive",
            StageKind::Eq => "eq",
            StageKind::Compressor => "compressor",
            StageKind::Pitch => "pitch",
            StageKind::Delay => "delay",
            StageKind::Reverb => "reverb",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "comp" => Ok(StageKind::Compressor),
            _ => StageKind::ALL
                .into_iter()
                .find(|kind| kind.name() == lower)
                .ok_or_else(|| format!("unknown stage '{s}'")),
        }
    }
}

/// All effect parameters, shared between the control plane and the audio thread.
#[derive(Debug, Clone, Default)]
pub struct DspParams {
    pub gate: GateParams,
    pub drive: DriveParams,
    pub eq: EqParams,
    pub compressor: CompressorParams,
    pub pitch: PitchParams,
    pub delay: DelayParams,
    pub reverb: ReverbParams,
    /// Set when the stream runs in low-latency mode; the pitch stage is skipped.
    pub low_latency: Arc<AtomicBool>,
}

impl DspParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every field once and coerces it into its safe range.
    pub fn snapshot(&self) -> ChainSettings {
        ChainSettings {
            gate: self.gate.snapshot(),
            drive: self.drive.snapshot(),
            eq: self.eq.snapshot(),
            compressor: self.compressor.snapshot(),
            pitch: self.pitch.snapshot(),
            delay: self.delay.snapshot(),
            reverb: self.reverb.snapshot(),
            low_latency: self.low_latency.load(Ordering::Relaxed),
        }
    }

    fn bypass_flag(&self, kind: StageKind) -> &AtomicBool {
        match kind {
            StageKind::Gate => &self.gate.bypassed,
            StageKind::Drive => &self.drive.bypassed,
            StageKind::Eq => &self.eq.bypassed,
            StageKind::Compressor => &self.compressor.bypassed,
            StageKind::Pitch => &self.pitch.bypassed,
            StageKind::Delay => &self.delay.bypassed,
            StageKind::Reverb => &self.reverb.bypassed,
        }
    }

    pub fn set_bypass(&self, kind: StageKind, bypassed: bool) {
        self.bypass_flag(kind).store(bypassed, Ordering::Relaxed);
    }

    pub fn is_bypassed(&self, kind: StageKind) -> bool {
        self.bypass_flag(kind).load(Ordering::Relaxed)
    }

    pub fn set_low_latency(&self, enabled: bool) {
        self.low_latency.store(enabled, Ordering::Relaxed);
    }

    pub fn set_drive_type(&self, drive_type: DriveType) {
        self.drive.set_drive_type(drive_type);
    }

    pub fn set_pitch_mode(&self, mode: PitchMode) {
        self.pitch.set_mode(mode);
    }

    /// Looks up a numeric parameter by `stage.field`, e.g. `"eq.low_gain"`.
    pub fn get_param(&self, path: &str) -> Option<Arc<AtomicF32>> {
        let (stage, field) = path.split_once('.')?;
        match stage.parse::<StageKind>().ok()? {
            StageKind::Gate => self.gate.get_param(field),
            StageKind::Drive => self.drive.get_param(field),
            StageKind::Eq => self.eq.get_param(field),
            StageKind::Compressor => self.compressor.get_param(field),
            StageKind::Pitch => None,
            StageKind::Delay => self.delay.get_param(field),
            StageKind::Reverb => self.reverb.get_param(field),
        }
    }

    /// Writes a stored preset back into the live parameters.
    pub fn apply(&self, s: &ChainSettings) {
        let r = Ordering::Relaxed;
        self.gate.bypassed.store(s.gate.bypassed, r);
        self.gate.threshold_db.store(s.gate.threshold_db, r);
        self.gate.attack_s.store(s.gate.attack_s, r);
        self.gate.release_s.store(s.gate.release_s, r);

        self.drive.bypassed.store(s.drive.bypassed, r);
        self.drive.amount.store(s.drive.amount, r);
        self.drive.set_drive_type(s.drive.drive_type);

        self.eq.bypassed.store(s.eq.bypassed, r);
        self.eq.low_gain_db.store(s.eq.low_gain_db, r);
        self.eq.low_freq_hz.store(s.eq.low_freq_hz, r);
        self.eq.mid_gain_db.store(s.eq.mid_gain_db, r);
        self.eq.mid_freq_hz.store(s.eq.mid_freq_hz, r);
        self.eq.mid_q.store(s.eq.mid_q, r);
        self.eq.high_gain_db.store(s.eq.high_gain_db, r);
        self.eq.high_freq_hz.store(s.eq.high_freq_hz, r);

        self.compressor.bypassed.store(s.compressor.bypassed, r);
        self.compressor.threshold_db.store(s.compressor.threshold_db, r);
        self.compressor.ratio.store(s.compressor.ratio, r);
        self.compressor.attack_s.store(s.compressor.attack_s, r);
        self.compressor.release_s.store(s.compressor.release_s, r);

        self.pitch.bypassed.store(s.pitch.bypassed, r);
        self.pitch.set_mode(s.pitch.mode);

        self.delay.bypassed.store(s.delay.bypassed, r);
        self.delay.time_s.store(s.delay.time_s, r);
        self.delay.feedback.store(s.delay.feedback, r);
        self.delay.mix.store(s.delay.mix, r);

        self.reverb.bypassed.store(s.reverb.bypassed, r);
        self.reverb.size.store(s.reverb.size, r);
        self.reverb.damping.store(s.reverb.damping, r);
        self.reverb.mix.store(s.reverb.mix, r);
    }
}

/// A consistent copy of every effect parameter, taken once per block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ChainSettings {
    pub gate: GateSettings,
    pub drive: DriveSettings,
    pub eq: EqSettings,
    pub compressor: CompressorSettings,
    pub pitch: PitchSettings,
    pub delay: DelaySettings,
    pub reverb: ReverbSettings,
    #[serde(skip)]
    pub low_latency: bool,
}

impl Default for ChainSettings {
    fn default() -> Self {
        DspParams::default().snapshot()
    }
}

impl ChainSettings {
    pub fn is_bypassed(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::Gate => self.gate.bypassed,
            StageKind::Drive => self.drive.bypassed,
            StageKind::Eq => self.eq.bypassed,
            StageKind::Compressor => self.compressor.bypassed,
            StageKind::Pitch => self.pitch.bypassed,
            StageKind::Delay => self.delay.bypassed,
            StageKind::Reverb => self.reverb.bypassed,
        }
    }

    /// Whether the stage should run this block.
    pub fn is_active(&self, kind: StageKind) -> bool {
        if self.is_bypassed(kind) {
            return false;
        }
        match kind {
            StageKind::Pitch => self.pitch.mode != PitchMode::Off && !self.low_latency,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_stage_starts_bypassed() {
        let settings = ChainSettings::default();
        assert!(StageKind::ALL.iter().all(|&k| settings.is_bypassed(k)));
    }

    #[test]
    fn stage_names_round_trip() {
        for kind in StageKind::ALL {
            assert_eq!(kind.name().parse::<StageKind>(), Ok(kind));
        }
        assert_eq!("COMP".parse::<StageKind>(), Ok(StageKind::Compressor));
        assert!("chorus".parse::<StageKind>().is_err());
    }

    #[test]
    fn get_param_addresses_stage_fields() {
        let params = DspParams::new();
        let gain = params.get_param("eq.low_gain").expect("eq.low_gain exists");
        gain.store(6.0, Ordering::Relaxed);
        assert_eq!(params.snapshot().eq.low_gain_db, 6.0);

        assert!(params.get_param("delay.feedback").is_some());
        assert!(params.get_param("pitch.mode").is_none());
        assert!(params.get_param("eq").is_none());
        assert!(params.get_param("flanger.rate").is_none());
    }

    #[test]
    fn pitch_is_inactive_when_off_or_low_latency() {
        let params = DspParams::new();
        params.set_bypass(StageKind::Pitch, false);
        assert!(!params.snapshot().is_active(StageKind::Pitch));

        params.set_pitch_mode(PitchMode::Up);
        assert!(params.snapshot().is_active(StageKind::Pitch));

        params.set_low_latency(true);
        assert!(!params.snapshot().is_active(StageKind::Pitch));
    }

    #[test]
    fn clones_share_the_same_atomics() {
        let params = DspParams::new();
        let control = params.clone();
        control.set_bypass(StageKind::Reverb, false);
        assert!(!params.is_bypassed(StageKind::Reverb));
    }

    #[test]
    fn apply_restores_a_snapshot() {
        let source = DspParams::new();
        source.set_bypass(StageKind::Delay, false);
        source.delay.time_s.store(0.5, Ordering::Relaxed);
        source.set_drive_type(DriveType::Hard);
        let preset = source.snapshot();

        let target = DspParams::new();
        target.apply(&preset);
        assert_eq!(target.snapshot(), preset);
    }

    #[test]
    fn settings_serialize_to_json() {
        let settings = ChainSettings::default();
        let json = serde_json::to_string(&settings).expect("serialize");
        let back: ChainSettings = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, settings);

        let json = r#"{"delay":{"bypassed":false,"time_s":0.5,"feedback":0.2,"mix":0.4}}"#;
        let partial: ChainSettings = serde_json::from_str(json).expect("partial preset");
        assert!(!partial.delay.bypassed);
        assert!(partial.gate.bypassed);
    }
}
