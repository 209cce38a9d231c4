//! OGG Vorbis streaming via `lewton`

use lewton::inside_ogg::OggStreamReader;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::decoder::{StreamDecoder, StreamInfo};
use crate::error::DecodeError;

/// Bytes scanned from the end of the file when looking for the last page.
/// An Ogg page is at most 65307 bytes long.
const TAIL_SCAN_BYTES: u64 = 64 * 1024 + 1024;

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// Find the granule position of the last page that completes a packet.
///
/// For Vorbis the granule position is the number of PCM frames decoded up to
/// the end of that page, so the last one is the stream length.
pub fn last_granule_position<R: Read + Seek>(reader: &mut R) -> io::Result<Option<u64>> {
    let len = reader.seek(SeekFrom::End(0))?;
    let start = len.saturating_sub(TAIL_SCAN_BYTES);
    reader.seek(SeekFrom::Start(start))?;
    let mut tail = Vec::with_capacity((len - start) as usize);
    reader.read_to_end(&mut tail)?;

    let mut end = tail.len();
    while let Some(pos) = tail[..end]
        .windows(CAPTURE_PATTERN.len())
        .rposition(|w| w == CAPTURE_PATTERN)
    {
        // capture pattern (4), version (1), header type (1), granule (8)
        if pos + 14 <= tail.len() && tail[pos + 4] == 0 {
            let mut granule = [0u8; 8];
            granule.copy_from_slice(&tail[pos + 6..pos + 14]);
            let granule = i64::from_le_bytes(granule);
            // -1 marks a page on which no packet ends
            if granule >= 0 {
                return Ok(Some(granule as u64));
            }
        }
        end = pos;
    }
    Ok(None)
}

/// Streaming OGG Vorbis decoder
pub struct OggDecoder<R: Read + Seek = BufReader<File>> {
    /// `None` only if re-opening after a seek failed
    reader: Option<OggStreamReader<R>>,
    /// Decoded samples not yet handed out
    pending: Vec<i16>,
    pending_pos: usize,
    info: StreamInfo,
    total_samples: u64,
}

impl OggDecoder<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)
            .map_err(|e| DecodeError::UnreadableFile(format!("{}: {}", path.display(), e)))?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> OggDecoder<R> {
    pub fn new(mut source: R) -> Result<Self, DecodeError> {
        let granule = last_granule_position(&mut source)
            .map_err(|e| DecodeError::DecodingFailed(e.to_string()))?;
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| DecodeError::DecodingFailed(e.to_string()))?;

        let reader = OggStreamReader::new(source).map_err(|e| {
            DecodeError::UnsupportedFormat(format!("invalid Ogg Vorbis stream: {}", e))
        })?;

        let info = StreamInfo {
            channels: reader.ident_hdr.audio_channels as u16,
            sample_rate: reader.ident_hdr.audio_sample_rate,
        };
        if !(1..=2).contains(&info.channels) {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{} channels",
                info.channels
            )));
        }

        let total_samples = match granule {
            Some(frames) => frames * info.channels as u64,
            None => {
                tracing::warn!("Ogg stream has no final granule position, length unknown");
                0
            }
        };

        tracing::debug!(
            "Ogg stream: {} Hz, {} channels, {} samples",
            info.sample_rate,
            info.channels,
            total_samples
        );

        Ok(Self {
            reader: Some(reader),
            pending: Vec::new(),
            pending_pos: 0,
            info,
            total_samples,
        })
    }
}

impl<R: Read + Seek + Send> StreamDecoder for OggDecoder<R> {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn read_samples(&mut self, out: &mut [i16]) -> Result<usize, DecodeError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| DecodeError::DecodingFailed("stream could not be reopened".into()))?;

        let mut written = 0;
        while written < out.len() {
            if self.pending_pos < self.pending.len() {
                let n = (self.pending.len() - self.pending_pos).min(out.len() - written);
                out[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }

            // lewton returns interleaved i16 samples; the first packet is empty
            match reader
                .read_dec_packet_itl()
                .map_err(|e| DecodeError::DecodingFailed(e.to_string()))?
            {
                Some(packet) => {
                    self.pending = packet;
                    self.pending_pos = 0;
                }
                None => break,
            }
        }
        Ok(written)
    }

    fn seek_to_start(&mut self) -> Result<(), DecodeError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| DecodeError::SeekFailed("stream could not be reopened".to_string()))?;
        self.pending.clear();
        self.pending_pos = 0;

        // Re-read the headers from byte 0 so decoding restarts exactly at the first packet
        let mut source = reader.into_inner().into_inner();
        source
            .seek(SeekFrom::Start(0))
            .map_err(|e| DecodeError::SeekFailed(e.to_string()))?;
        let reader =
            OggStreamReader::new(source).map_err(|e| DecodeError::SeekFailed(e.to_string()))?;
        self.reader = Some(reader);
        Ok(())
    }

    fn total_sample_count(&self) -> u64 {
        self.total_samples
    }
}
