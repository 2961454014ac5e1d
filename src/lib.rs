//! Real-time guitar signal chain: a fixed effect pipeline, a multi-slot looper and
//! a recorder, driven per block by `audio_engine::AudioEngine`.

pub mod audio_device;
pub mod audio_engine;
pub mod audio_io;
pub mod fx;
pub mod fx_components;
pub mod looper;
pub mod pitch_shifter;
pub mod recorder;
pub mod settings;
pub mod wav;

pub use audio_engine::processor::BlockProcessor;
pub use audio_engine::{AudioEngine, StreamRequest};
pub use fx::{ChainSettings, DspParams, StageKind};
pub use looper::{Looper, LooperState};
pub use recorder::{Recorder, RecorderError};
