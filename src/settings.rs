use crate::audio_engine::{
    StreamRequest, DEFAULT_BUFFER_SIZE, DEFAULT_LATENCY_COMPENSATION_MS, DEFAULT_SAMPLE_RATE,
};
use crate::fx::ChainSettings;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SETTINGS_FILE: &str = "settings.json";
const CLIPS_DIR: &str = "Clips";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub host_name: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub exclusive_mode: bool,
    pub input_latency_compensation_ms: f32,
    pub clips_dir: Option<PathBuf>,
    /// The effect parameters as they were when the program last exited.
    pub effects: Option<ChainSettings>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            host_name: None,
            input_device: None,
            output_device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            exclusive_mode: false,
            input_latency_compensation_ms: DEFAULT_LATENCY_COMPENSATION_MS,
            clips_dir: None,
            effects: None,
        }
    }
}

impl EngineSettings {
    pub fn stream_request(&self) -> StreamRequest {
        StreamRequest {
            host_name: self.host_name.clone(),
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
            sample_rate: Some(self.sample_rate),
            buffer_size: Some(self.buffer_size),
            exclusive_mode: self.exclusive_mode,
        }
    }

    /// The configured clips directory, or the default one under the data dir.
    pub fn clips_dir(&self) -> Result<PathBuf> {
        match &self.clips_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_clips_dir(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "tonestack")
}

pub fn settings_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

pub fn default_clips_dir() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(CLIPS_DIR))
        .ok_or_else(|| anyhow!("Could not determine a data directory for clips"))
}

/// `Clip_YYYYMMDD_HHMMSS.wav` in `dir`, with `_1`, `_2`, ... appended while the
/// name is taken.
pub fn generate_clip_path<Tz>(dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stem = format!("Clip_{}", now.format("%Y%m%d_%H%M%S"));
    let mut path = dir.join(format!("{stem}.wav"));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{suffix}.wav"));
        suffix += 1;
    }
    path
}

pub fn load_settings_from(path: &Path) -> EngineSettings {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return EngineSettings::default();
    }
    match fs::read_to_string(path) {
        Ok(json_string) => match serde_json::from_str(&json_string) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to parse settings file, using defaults. Error: {}", e);
                EngineSettings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read settings file, using defaults. Error: {}", e);
            EngineSettings::default()
        }
    }
}

pub fn save_settings_to(path: &Path, settings: &EngineSettings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory at {}", dir.display()))?;
    }
    let json_string =
        serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, json_string)
        .with_context(|| format!("Failed to write settings to {}", path.display()))
}

pub fn load_settings() -> EngineSettings {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => {
            warn!("Could not determine a config directory, using default settings");
            EngineSettings::default()
        }
    }
}

pub fn save_settings(settings: &EngineSettings) {
    let Some(path) = settings_path() else {
        warn!("Could not determine a config directory, settings not saved");
        return;
    };
    if let Err(e) = save_settings_to(&path, settings) {
        warn!("{:#}", e);
    }
}
