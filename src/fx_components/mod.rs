// src/fx_components/mod.rs

// Declare all component modules
pub mod compressor;
pub mod delay;
pub mod drive;
pub mod eq;
pub mod gate;
pub mod pitch;
pub mod reverb;

// Publicly export each stage's audio-thread struct, shared Params and Settings snapshot
pub use compressor::{Compressor, Params as CompressorParams, Settings as CompressorSettings};
pub use delay::{Delay, Params as DelayParams, Settings as DelaySettings};
pub use drive::{Drive, DriveType, Params as DriveParams, Settings as DriveSettings};
pub use eq::{Equalizer, Params as EqParams, Settings as EqSettings};
pub use gate::{Gate, Params as GateParams, Settings as GateSettings};
pub use pitch::{Params as PitchParams, PitchMode, PitchStage, Settings as PitchSettings};
pub use reverb::{Params as ReverbParams, Reverb, Settings as ReverbSettings};

use crate::fx::{ChainSettings, StageKind};

/// Whether a stage works on the mono signal or on both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

/// The working buffers of one block as they travel through the chain.
///
/// The block starts out mono: only `left` carries signal until the first stereo
/// stage is reached, at which point `widen` copies it into `right`.
pub struct StereoBlock<'a> {
    pub left: &'a mut [f32],
    pub right: &'a mut [f32],
    is_stereo: bool,
}

impl<'a> StereoBlock<'a> {
    /// Wraps two equally long buffers; `left` holds the mono signal.
    pub fn mono(left: &'a mut [f32], right: &'a mut [f32]) -> Self {
        let len = left.len().min(right.len());
        let (left, _) = left.split_at_mut(len);
        let (right, _) = right.split_at_mut(len);
        Self {
            left,
            right,
            is_stereo: false,
        }
    }

    /// Copies the mono signal into the right channel. Idempotent.
    pub fn widen(&mut self) {
        if !self.is_stereo {
            self.right.copy_from_slice(self.left);
            self.is_stereo = true;
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.is_stereo
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// A common interface for every stage of the effect chain.
///
/// Implementations own all of their state, are sized for a sample rate at
/// construction and never allocate inside `process_block`.
pub trait DspComponent: Send {
    /// Which slot of the fixed pipeline this component fills.
    fn kind(&self) -> StageKind;

    fn layout(&self) -> ChannelLayout {
        ChannelLayout::Stereo
    }

    /// Processes one block in place using the parameter snapshot taken at block start.
    fn process_block(&mut self, block: &mut StereoBlock<'_>, settings: &ChainSettings);

    /// Clears filter memory, envelopes and delay lines.
    fn reset(&mut self);
}

/// One-pole smoothing coefficient `1 - e^(-1/(tau * fs))` for a time constant in seconds.
#[inline]
pub(crate) fn one_pole_coeff(time_s: f32, sample_rate: f32) -> f32 {
    const EPSILON: f32 = 1e-9;
    1.0 - (-1.0 / (time_s * sample_rate + EPSILON)).exp()
}

#[inline]
pub(crate) fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Clamps a parameter into `[lo, hi]`. NaN and infinities become `fallback`.
#[inline]
pub(crate) fn coerce(value: f32, lo: f32, hi: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        fallback
    }
}
