use crate::audio_io::EngineError;
use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, HostId};

fn get_host_from_id(host_id: HostId) -> Result<Host> {
    cpal::host_from_id(host_id).map_err(|e| anyhow::anyhow!("Failed to get audio host: {}", e))
}

/// Resolves a host by name (case-insensitive), or the platform default.
pub fn host_id_from_name(name: Option<&str>) -> Result<HostId> {
    let Some(name) = name else {
        return Ok(cpal::default_host().id());
    };
    cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| EngineError::HostNotFound(name.to_string()).into())
}

pub fn host_names() -> Vec<&'static str> {
    cpal::available_hosts().into_iter().map(|id| id.name()).collect()
}

pub fn get_input_devices(host_id: HostId) -> Result<Vec<(String, Device)>> {
    let host = get_host_from_id(host_id)?;
    let devices = host.input_devices()?;
    let mut result = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            result.push((name, device));
        }
    }
    Ok(result)
}

pub fn get_output_devices(host_id: HostId) -> Result<Vec<(String, Device)>> {
    let host = get_host_from_id(host_id)?;
    let devices = host.output_devices()?;
    let mut result = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            result.push((name, device));
        }
    }
    Ok(result)
}

/// Picks the named input device, or the host default when `name` is `None`.
pub fn find_input_device(host_id: HostId, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => get_input_devices(host_id)?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, device)| device)
            .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()).into()),
        None => get_host_from_id(host_id)?
            .default_input_device()
            .ok_or_else(|| EngineError::NoDevice("input").into()),
    }
}

/// Picks the named output device, or the host default when `name` is `None`.
pub fn find_output_device(host_id: HostId, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => get_output_devices(host_id)?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, device)| device)
            .ok_or_else(|| EngineError::DeviceNotFound(name.to_string()).into()),
        None => get_host_from_id(host_id)?
            .default_output_device()
            .ok_or_else(|| EngineError::NoDevice("output").into()),
    }
}
