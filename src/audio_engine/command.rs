// FILE: src\audio_engine\command.rs
// ==================================

use super::AudioEngine;
use crate::fx::StageKind;
use crate::fx_components::{DriveType, PitchMode};
use crate::settings;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{command}' expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("invalid value '{value}' for '{command}'")]
    InvalidValue { command: &'static str, value: String },
}

/// One control-plane action, as typed at the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    // --- Looper ---
    LooperRecord,
    LooperStopRecord,
    LooperPlay,
    LooperStop,
    LooperOverdub,
    LooperStopOverdub,
    LooperClear,
    LooperCommit,
    ToggleSlot(usize),
    SetLoopLevel(f32),

    // --- Recorder ---
    StartTake,
    StopTake,
    SaveTake(Option<PathBuf>),
    DiscardTake,

    // --- Engine ---
    SetInputGain(f32),
    SetOutputGain(f32),
    ResetPeaks,

    // --- Effects ---
    SetBypass(StageKind, bool),
    SetParam(String, f32),
    SetDriveType(DriveType),
    SetPitchMode(PitchMode),

    // --- Status ---
    Meters,
    Status,
    Quit,
}

fn arg<'a>(
    args: &mut impl Iterator<Item = &'a str>,
    command: &'static str,
    expected: &'static str,
) -> Result<&'a str, CommandParseError> {
    args.next()
        .ok_or(CommandParseError::MissingArgument { command, expected })
}

fn parsed<T: FromStr>(value: &str, command: &'static str) -> Result<T, CommandParseError> {
    value.parse().map_err(|_| CommandParseError::InvalidValue {
        command,
        value: value.to_string(),
    })
}

fn on_off(value: &str, command: &'static str) -> Result<bool, CommandParseError> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(CommandParseError::InvalidValue {
            command,
            value: value.to_string(),
        }),
    }
}

impl FromStr for AudioCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(CommandParseError::Empty)?;
        let args = &mut words;

        let command = match name {
            "rec" => AudioCommand::LooperRecord,
            "stop-rec" => AudioCommand::LooperStopRecord,
            "play" => AudioCommand::LooperPlay,
            "stop" => AudioCommand::LooperStop,
            "dub" => AudioCommand::LooperOverdub,
            "undub" => AudioCommand::LooperStopOverdub,
            "clear" => AudioCommand::LooperClear,
            "commit" => AudioCommand::LooperCommit,
            "select" => {
                AudioCommand::ToggleSlot(parsed(arg(args, "select", "a slot number")?, "select")?)
            }
            "level" => AudioCommand::SetLoopLevel(parsed(arg(args, "level", "a level")?, "level")?),
            "take" => AudioCommand::StartTake,
            "stop-take" => AudioCommand::StopTake,
            "save" => AudioCommand::SaveTake(args.next().map(PathBuf::from)),
            "discard" => AudioCommand::DiscardTake,
            "in-gain" => {
                AudioCommand::SetInputGain(parsed(arg(args, "in-gain", "a gain")?, "in-gain")?)
            }
            "out-gain" => {
                AudioCommand::SetOutputGain(parsed(arg(args, "out-gain", "a gain")?, "out-gain")?)
            }
            "reset-peaks" => AudioCommand::ResetPeaks,
            "bypass" => {
                let stage = parsed(arg(args, "bypass", "a stage name")?, "bypass")?;
                let state = on_off(arg(args, "bypass", "on or off")?, "bypass")?;
                AudioCommand::SetBypass(stage, state)
            }
            "set" => {
                let path = arg(args, "set", "stage.field and a value")?.to_string();
                let value = parsed(arg(args, "set", "a value")?, "set")?;
                AudioCommand::SetParam(path, value)
            }
            "drive-type" => {
                let value = arg(args, "drive-type", "soft, hard or asym")?;
                AudioCommand::SetDriveType(parsed(value, "drive-type")?)
            }
            "pitch" => {
                let value = arg(args, "pitch", "off, down or up")?;
                AudioCommand::SetPitchMode(parsed(value, "pitch")?)
            }
            "meters" => AudioCommand::Meters,
            "status" => AudioCommand::Status,
            "quit" | "exit" => AudioCommand::Quit,
            other => return Err(CommandParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

impl AudioCommand {
    /// Applies the command. Returns a line of feedback for commands that report
    /// something. Takes saved without a path are named inside `clips_dir`.
    pub fn execute(&self, engine: &AudioEngine, clips_dir: &Path) -> Result<Option<String>> {
        let looper = engine.looper();
        let recorder = engine.recorder();
        match self {
            AudioCommand::LooperRecord => looper.start_recording(),
            AudioCommand::LooperStopRecord => looper.stop_recording(),
            AudioCommand::LooperPlay => looper.start_playing(),
            AudioCommand::LooperStop => looper.stop_playing(),
            AudioCommand::LooperOverdub => looper.start_overdub(),
            AudioCommand::LooperStopOverdub => looper.stop_overdub(),
            AudioCommand::LooperClear => looper.clear(),
            AudioCommand::LooperCommit => {
                return Ok(Some(match looper.add_recorded_loop() {
                    Some(index) => format!("committed slot {}", index + 1),
                    None => "nothing to commit".to_string(),
                }));
            }
            AudioCommand::ToggleSlot(number) => {
                let selected = number
                    .checked_sub(1)
                    .and_then(|index| looper.toggle_slot_selection(index))
                    .ok_or_else(|| anyhow!("no slot {}", number))?;
                return Ok(Some(format!(
                    "slot {} {}",
                    number,
                    if selected { "selected" } else { "deselected" }
                )));
            }
            AudioCommand::SetLoopLevel(level) => looper.set_loop_level(*level),

            AudioCommand::StartTake => recorder.start_recording(),
            AudioCommand::StopTake => recorder.stop_recording(),
            AudioCommand::SaveTake(path) => {
                let path = match path {
                    Some(path) => path.clone(),
                    None => settings::generate_clip_path(clips_dir, &chrono::Local::now()),
                };
                recorder.save_to_file(&path)?;
                return Ok(Some(format!("saved {}", path.display())));
            }
            AudioCommand::DiscardTake => recorder.clear_recording(),

            AudioCommand::SetInputGain(gain) => engine.set_input_gain(*gain),
            AudioCommand::SetOutputGain(gain) => engine.set_output_gain(*gain),
            AudioCommand::ResetPeaks => engine.reset_peaks(),

            AudioCommand::SetBypass(stage, bypassed) => {
                engine.params().set_bypass(*stage, *bypassed)
            }
            AudioCommand::SetParam(path, value) => {
                let param = engine
                    .params()
                    .get_param(path)
                    .ok_or_else(|| anyhow!("unknown parameter '{}'", path))?;
                param.store(*value, Ordering::Relaxed);
            }
            AudioCommand::SetDriveType(drive_type) => engine.params().set_drive_type(*drive_type),
            AudioCommand::SetPitchMode(mode) => engine.params().set_pitch_mode(*mode),

            AudioCommand::Meters => {
                return Ok(Some(format!(
                    "in {:.3} (peak {:.3})  out {:.3} (peak {:.3})",
                    engine.input_level(),
                    engine.input_peak(),
                    engine.output_level(),
                    engine.output_peak()
                )));
            }
            AudioCommand::Status => return Ok(Some(status_line(engine))),
            AudioCommand::Quit => {}
        }
        Ok(None)
    }
}

fn status_line(engine: &AudioEngine) -> String {
    let looper = engine.looper();
    let recorder = engine.recorder();
    let slots: Vec<String> = looper
        .slots()
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            format!(
                "{}:{:.2}s{}{}",
                i + 1,
                slot.length as f32 / looper.sample_rate() as f32,
                if slot.selected { "*" } else { "" },
                if slot.active { ">" } else { "" }
            )
        })
        .collect();
    format!(
        "{} | {} Hz / {} frames | looper {} {:.2}s [{}] | take {:.1}s{} | xruns {}",
        if engine.is_running() { "running" } else { "stopped" },
        engine.sample_rate(),
        engine.buffer_size(),
        looper.state(),
        looper.loop_length() as f32 / looper.sample_rate() as f32,
        slots.join(" "),
        recorder.recording_duration(),
        if recorder.is_recording() { " rec" } else { "" },
        engine.xrun_count()
    )
}
