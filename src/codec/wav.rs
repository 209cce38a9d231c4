//! WAV file parsing and streaming
//!
//! RIFF/WAVE chunk parsing is done here directly. Chunks other than `fmt `
//! and `data` are skipped. Only uncompressed PCM (format tag 1), mono or
//! stereo, 8 or 16 bits per sample is accepted; 8-bit unsigned samples are
//! widened to signed 16-bit on read.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::decoder::{StreamDecoder, StreamInfo};
use crate::error::DecodeError;

const WAVE_FORMAT_PCM: u16 = 1;

/// Values from the `fmt ` chunk plus the location of the sample data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Byte offset of the first sample
    pub data_offset: u64,
    /// Length of the sample data in bytes
    pub data_len: u64,
}

impl WavHeader {
    pub fn bytes_per_sample(&self) -> u64 {
        (self.bits_per_sample / 8) as u64
    }

    /// Number of samples (all channels) in the data chunk
    pub fn sample_count(&self) -> u64 {
        self.data_len / self.bytes_per_sample()
    }
}

fn header_error(e: io::Error) -> DecodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DecodeError::UnsupportedFormat("truncated WAV header".to_string())
    } else {
        DecodeError::DecodingFailed(e.to_string())
    }
}

fn read_u16_le<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_chunk_id<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Parse the RIFF header and chunk list, leaving the reader at the data chunk
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> Result<WavHeader, DecodeError> {
    let riff = read_chunk_id(reader).map_err(header_error)?;
    let _riff_size = read_u32_le(reader).map_err(header_error)?;
    let wave = read_chunk_id(reader).map_err(header_error)?;
    if &riff != b"RIFF" || &wave != b"WAVE" {
        return Err(DecodeError::UnsupportedFormat(
            "invalid RIFF or WAVE header".to_string(),
        ));
    }

    // (format_tag, channels, sample_rate, block_align, bits_per_sample)
    let mut fmt: Option<(u16, u16, u32, u16, u16)> = None;

    loop {
        let id = match read_chunk_id(reader) {
            Ok(id) => id,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(DecodeError::UnsupportedFormat(
                    "missing data chunk".to_string(),
                ))
            }
            Err(e) => return Err(header_error(e)),
        };
        let size = read_u32_le(reader).map_err(header_error)? as u64;
        // Chunks are word aligned
        let padded = size + (size & 1);

        match &id {
            b"fmt " => {
                if size < 16 {
                    return Err(DecodeError::UnsupportedFormat(format!(
                        "fmt chunk too small ({} bytes)",
                        size
                    )));
                }
                let format_tag = read_u16_le(reader).map_err(header_error)?;
                let channels = read_u16_le(reader).map_err(header_error)?;
                let sample_rate = read_u32_le(reader).map_err(header_error)?;
                let _byte_rate = read_u32_le(reader).map_err(header_error)?;
                let block_align = read_u16_le(reader).map_err(header_error)?;
                let bits_per_sample = read_u16_le(reader).map_err(header_error)?;
                fmt = Some((format_tag, channels, sample_rate, block_align, bits_per_sample));
                reader
                    .seek(SeekFrom::Current((padded - 16) as i64))
                    .map_err(header_error)?;
            }
            b"data" => {
                let Some((format_tag, channels, sample_rate, block_align, bits_per_sample)) = fmt
                else {
                    return Err(DecodeError::UnsupportedFormat(
                        "data chunk before fmt chunk".to_string(),
                    ));
                };
                let data_offset = reader.stream_position().map_err(header_error)?;
                let file_len = reader.seek(SeekFrom::End(0)).map_err(header_error)?;
                reader
                    .seek(SeekFrom::Start(data_offset))
                    .map_err(header_error)?;

                let header = WavHeader {
                    format_tag,
                    channels,
                    sample_rate,
                    block_align,
                    bits_per_sample,
                    data_offset,
                    // Streaming writers leave the size as 0xFFFFFFFF
                    data_len: size.min(file_len.saturating_sub(data_offset)),
                };
                validate(&header)?;
                return Ok(header);
            }
            _ => {
                reader
                    .seek(SeekFrom::Current(padded as i64))
                    .map_err(header_error)?;
            }
        }
    }
}

fn validate(header: &WavHeader) -> Result<(), DecodeError> {
    if header.format_tag != WAVE_FORMAT_PCM {
        return Err(DecodeError::UnsupportedFormat(format!(
            "WAV format tag {:#06x} (only PCM is supported)",
            header.format_tag
        )));
    }
    if !(1..=2).contains(&header.channels) {
        return Err(DecodeError::UnsupportedFormat(format!(
            "{} channels",
            header.channels
        )));
    }
    if header.bits_per_sample != 8 && header.bits_per_sample != 16 {
        return Err(DecodeError::UnsupportedFormat(format!(
            "{} bits per sample",
            header.bits_per_sample
        )));
    }
    if header.sample_rate == 0 {
        return Err(DecodeError::UnsupportedFormat("sample rate of 0 Hz".to_string()));
    }
    Ok(())
}

/// Streaming WAV decoder
pub struct WavDecoder<R = BufReader<File>> {
    reader: R,
    header: WavHeader,
    /// Bytes of the data chunk consumed so far
    bytes_read: u64,
    /// Raw byte buffer (reused to avoid allocations)
    scratch: Vec<u8>,
}

impl WavDecoder<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)
            .map_err(|e| DecodeError::UnreadableFile(format!("{}: {}", path.display(), e)))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> WavDecoder<R> {
    pub fn new(mut reader: R) -> Result<Self, DecodeError> {
        let header = parse_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            bytes_read: 0,
            scratch: Vec::new(),
        })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }
}

impl<R: Read + Seek + Send> StreamDecoder for WavDecoder<R> {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            channels: self.header.channels,
            sample_rate: self.header.sample_rate,
        }
    }

    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        let width = self.header.bytes_per_sample();
        let left = self.header.data_len - self.bytes_read;
        let wanted = (out.len() as u64 * width).min(left);
        let wanted = (wanted - wanted % width) as usize;
        if wanted == 0 {
            return Ok(0);
        }

        self.scratch.resize(wanted, 0);
        let mut filled = 0;
        while filled < wanted {
            match self.reader.read(&mut self.scratch[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::DecodingFailed(e.to_string())),
            }
        }
        if filled < wanted {
            // File is shorter than its data chunk claims
            self.bytes_read = self.header.data_len;
        } else {
            self.bytes_read += filled as u64;
        }

        let bytes = &self.scratch[..filled - filled % width as usize];
        let count = if width == 2 {
            for (sample, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *sample = i16::from_le_bytes([pair[0], pair[1]]);
            }
            bytes.len() / 2
        } else {
            for (sample, &byte) in out.iter_mut().zip(bytes) {
                *sample = (byte as i16 - 128) << 8;
            }
            bytes.len()
        };
        Ok(count)
    }

    fn seek_to_start(&mut self) -> Result<(), DecodeError> {
        self.reader
            .seek(SeekFrom::Start(self.header.data_offset))
            .map_err(|e| DecodeError::SeekFailed(e.to_string()))?;
        self.bytes_read = 0;
        Ok(())
    }

    fn total_sample_count(&self) -> u64 {
        self.header.sample_count()
    }
}

/// Write `samples` as a WAV file in memory with `spec`
#[cfg(test)]
pub(crate) fn encode_wav<S: hound::Sample + Copy>(spec: hound::WavSpec, samples: &[S]) -> Vec<u8> {
    let mut cursor = io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// 16-bit PCM WAV file in memory
#[cfg(test)]
pub(crate) fn wav_bytes(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    encode_wav(spec, samples)
}
