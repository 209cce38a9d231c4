//! Streaming decoder interface
//!
//! A decoder produces a lazy, finite and restartable sequence of interleaved
//! 16-bit sample chunks: after [`StreamDecoder::seek_to_start`] the same
//! sequence is produced again from the beginning.

use crate::audio::format::PcmFormat;
use crate::error::DecodeError;

/// Basic stream properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
}

impl StreamInfo {
    /// Buffer format for this stream's decoded output
    pub fn pcm_format(&self) -> Result<PcmFormat, DecodeError> {
        PcmFormat::pcm16(self.channels, self.sample_rate)
            .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))
    }
}

/// Streaming decode session. Dropping it releases the underlying file.
pub trait StreamDecoder: Send {
    fn info(&self) -> StreamInfo;

    /// Decode up to `out.len()` interleaved samples into `out`.
    /// Returns `Ok(0)` once the end of the stream is reached.
    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize, DecodeError>;

    /// Rewind so the next read starts at the first sample again
    fn seek_to_start(&mut self) -> Result<(), DecodeError>;

    /// Full stream length in samples, counting every channel
    fn total_sample_count(&self) -> u64;
}

/// Decode everything left in `decoder`
pub fn decode_all(decoder: &mut dyn StreamDecoder) -> Result<Vec<i16>, DecodeError> {
    let mut samples = Vec::with_capacity(decoder.total_sample_count() as usize);
    let mut chunk = vec![0i16; 4096];
    loop {
        let n = decoder.read_samples(&mut chunk)?;
        if n == 0 {
            break;
        }
        samples.extend_from_slice(&chunk[..n]);
    }
    Ok(samples)
}
