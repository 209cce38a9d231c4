//! Output device enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Description of an output device, as shown to users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioDeviceInfo {
    /// Stable identifier, `output:<name>`
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Wrapper around a cpal output device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, DeviceError> {
        self.inner
            .default_output_config()
            .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))
    }
}

/// Build the identifier used for a device name
pub fn device_id(name: &str) -> String {
    format!("output:{}", name)
}

/// List all available output devices
pub fn list_output_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            let Ok(name) = device.name() else { continue };
            let (sample_rates, channels) = output_capabilities(&device);
            devices.push(AudioDeviceInfo {
                id: device_id(&name),
                is_default: default_name.as_ref() == Some(&name),
                name,
                sample_rates,
                channels,
            });
        }
    }
    devices
}

/// Common sample rates and channel counts the device accepts
fn output_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate_val in [22050u32, 44100, 48000, 88200, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !rates.contains(&rate_val)
                {
                    rates.push(rate_val);
                }
            }
            if !channels.contains(&config.channels()) {
                channels.push(config.channels());
            }
        }
    }

    rates.sort();
    channels.sort();
    (rates, channels)
}

/// Get an output device by its id (a bare name is accepted too)
pub fn get_device_by_id(id: &str) -> Result<AudioDevice, DeviceError> {
    let name = id.strip_prefix("output:").unwrap_or(id);
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::DeviceNotFound(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| DeviceError::DeviceNotFound(id.to_string()))
}

/// Get default output device
pub fn default_output_device() -> Result<AudioDevice, DeviceError> {
    cpal::default_host()
        .default_output_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| DeviceError::DeviceNotFound("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_prefix() {
        assert_eq!(device_id("Speakers"), "output:Speakers");
    }

    #[test]
    fn test_listed_devices_are_resolvable() {
        // Depends on the machine's audio hardware; CI usually has none
        for device in list_output_devices() {
            assert!(device.id.starts_with("output:"));
            if let Ok(resolved) = get_device_by_id(&device.id) {
                assert_eq!(resolved.name, device.name);
            }
        }
    }
}
