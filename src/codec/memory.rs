//! Decoder over in-memory PCM

use crate::codec::decoder::{StreamDecoder, StreamInfo};
use crate::error::DecodeError;

/// Streams interleaved samples that are already in memory
pub struct MemoryDecoder {
    samples: Vec<i16>,
    position: usize,
    info: StreamInfo,
    /// Upper bound on samples returned per read, mimicking packet-sized decoders
    max_read: usize,
}

impl MemoryDecoder {
    pub fn new(samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            info: StreamInfo {
                channels,
                sample_rate,
            },
            max_read: usize::MAX,
        }
    }

    /// Return at most `max_read` samples per call
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = max_read.max(1);
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl StreamDecoder for MemoryDecoder {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        let left = self.samples.len() - self.position;
        let n = left.min(out.len()).min(self.max_read);
        out[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn seek_to_start(&mut self) -> Result<(), DecodeError> {
        self.position = 0;
        Ok(())
    }

    fn total_sample_count(&self) -> u64 {
        self.samples.len() as u64
    }
}
