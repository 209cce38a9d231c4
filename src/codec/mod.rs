//! Audio file decoding
//!
//! Provides streaming decoders for WAV and OGG Vorbis files, selected by
//! file extension, plus full-file loading for one-shot sounds.

pub mod decoder;
pub mod memory;
pub mod ogg;
pub mod wav;

pub use decoder::{decode_all, StreamDecoder, StreamInfo};
pub use memory::MemoryDecoder;
pub use ogg::OggDecoder;
pub use wav::WavDecoder;

use std::path::Path;

use crate::audio::format::PcmFormat;
use crate::constants::SOUND_STREAMING_HINT_SECS;
use crate::error::DecodeError;

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFileKind {
    Wav,
    Ogg,
}

impl AudioFileKind {
    /// Pick the format from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, DecodeError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("wav") => Ok(AudioFileKind::Wav),
            Some("ogg") => Ok(AudioFileKind::Ogg),
            _ => Err(DecodeError::UnsupportedFormat(format!(
                "[{}] extension not recognized",
                path.display()
            ))),
        }
    }
}

/// Open a streaming decoder for `path`
pub fn open(path: &Path) -> Result<Box<dyn StreamDecoder>, DecodeError> {
    match AudioFileKind::from_path(path)? {
        AudioFileKind::Wav => Ok(Box::new(WavDecoder::open(path)?)),
        AudioFileKind::Ogg => Ok(Box::new(OggDecoder::open(path)?)),
    }
}

/// A fully decoded clip
#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    /// Interleaved 16-bit samples
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl Wave {
    pub fn format(&self) -> Result<PcmFormat, DecodeError> {
        StreamInfo {
            channels: self.channels,
            sample_rate: self.sample_rate,
        }
        .pcm_format()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

/// Decode an entire file into memory
pub fn load_wave(path: &Path) -> Result<Wave, DecodeError> {
    let kind = AudioFileKind::from_path(path)?;
    let mut decoder = open(path)?;
    let info = decoder.info();
    let samples = decode_all(decoder.as_mut())?;

    let wave = Wave {
        samples,
        channels: info.channels,
        sample_rate: info.sample_rate,
    };

    if kind == AudioFileKind::Ogg && wave.duration_secs() > SOUND_STREAMING_HINT_SECS {
        tracing::warn!(
            "[{}] Ogg audio length is larger than {} seconds ({:.1}), \
             that's a big file in memory, consider music streaming",
            path.display(),
            SOUND_STREAMING_HINT_SECS,
            wave.duration_secs()
        );
    }

    tracing::info!(
        "[{}] Wave loaded: {} Hz, {} channel(s), {} samples",
        path.display(),
        wave.sample_rate,
        wave.channels,
        wave.samples.len()
    );
    Ok(wave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(AudioFileKind::from_path(Path::new("a/b.OGG")).unwrap(), AudioFileKind::Ogg);
        assert_eq!(AudioFileKind::from_path(Path::new("x.wav")).unwrap(), AudioFileKind::Wav);
        assert!(matches!(
            AudioFileKind::from_path(Path::new("song.mp3")),
            Err(DecodeError::UnsupportedFormat(_))
        ));
        assert!(AudioFileKind::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_load_wave_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("click.wav");
        let samples: Vec<i16> = (0..400).map(|i| (i * 10) as i16).collect();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &sample in &samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let wave = load_wave(&path).unwrap();
        assert_eq!(wave.samples, samples);
        assert_eq!(wave.channels, 2);
        assert!((wave.duration_secs() - 0.025).abs() < 1e-6);
    }

    #[test]
    fn test_load_wave_from_ogg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.OGG");
        std::fs::write(&path, include_bytes!("testdata/tone.ogg")).unwrap();

        let wave = load_wave(&path).unwrap();
        assert_eq!(wave.channels, 2);
        assert_eq!(wave.sample_rate, 8000);
        assert_eq!(wave.samples.len() % 2, 0);
        assert!((wave.duration_secs() - 0.62).abs() < 0.05);
    }

    #[test]
    fn test_open_reports_missing_file() {
        let err = open(Path::new("/nonexistent/theme.ogg")).err().unwrap();
        assert!(matches!(err, DecodeError::UnreadableFile(_)));
    }
}
