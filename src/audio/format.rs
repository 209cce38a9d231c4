//! PCM sample format descriptions

use crate::error::DeviceError;

/// Channel/bit-depth layout accepted by audio buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmLayout {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

/// Format of interleaved PCM data handed to a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Create a validated format. Only mono/stereo at 8 or 16 bits is supported.
    pub fn new(channels: u16, sample_rate: u32, bits_per_sample: u16) -> Result<Self, DeviceError> {
        let format = Self {
            channels,
            sample_rate,
            bits_per_sample,
        };
        format.layout()?;
        if sample_rate == 0 {
            return Err(DeviceError::UnsupportedFormat("sample rate of 0 Hz".to_string()));
        }
        Ok(format)
    }

    /// 16-bit format, the layout every decoder in this crate produces
    pub fn pcm16(channels: u16, sample_rate: u32) -> Result<Self, DeviceError> {
        Self::new(channels, sample_rate, 16)
    }

    pub fn layout(&self) -> Result<PcmLayout, DeviceError> {
        match (self.channels, self.bits_per_sample) {
            (1, 8) => Ok(PcmLayout::Mono8),
            (1, 16) => Ok(PcmLayout::Mono16),
            (2, 8) => Ok(PcmLayout::Stereo8),
            (2, 16) => Ok(PcmLayout::Stereo16),
            (channels, bits) => Err(DeviceError::UnsupportedFormat(format!(
                "{} channel(s) at {} bits per sample",
                channels, bits
            ))),
        }
    }

    /// Largest whole number of frames that fits in `samples`, in samples
    pub fn frame_aligned(&self, samples: usize) -> usize {
        let channels = usize::from(self.channels.max(1));
        samples - samples % channels
    }

    /// Samples (all channels) per second
    pub fn samples_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64
    }

    /// Playback duration of `samples` interleaved samples, in seconds
    pub fn duration_secs(&self, samples: usize) -> f64 {
        samples as f64 / self.samples_per_second() as f64
    }
}
