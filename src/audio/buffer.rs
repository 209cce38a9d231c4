//! Stream buffer ring
//!
//! A stream owns a small fixed set of hardware buffers. While one plays the
//! other is refilled, so decoding never has to keep up sample by sample and
//! memory stays bounded by one chunk per slot regardless of stream length.

use tracing::{debug, warn};

use crate::audio::backend::{AudioBackend, BufferId, SourceId};
use crate::audio::clock::PlaybackClock;
use crate::audio::format::PcmFormat;
use crate::codec::StreamDecoder;
use crate::error::DeviceError;

/// Where a slot's buffer currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Holds fresh data not yet handed to the source
    Unqueued,
    /// In the source's playback queue
    Queued,
    /// Played (or exhausted); eligible for refill
    Processed,
}

/// One hardware buffer of the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSlot {
    pub buffer: BufferId,
    pub state: SlotState,
    /// Samples written by the last fill
    pub samples: usize,
}

/// Ring statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub fills: u64,
    pub samples_written: u64,
    pub upload_errors: u64,
    pub decode_errors: u64,
}

/// Fixed set of buffers cycling between decoder and source
pub struct BufferRing {
    slots: Vec<BufferSlot>,
    /// Decode scratch, sized once to the chunk size
    scratch: Vec<i16>,
    format: PcmFormat,
    stats: RingStats,
}

impl BufferRing {
    /// Allocate `count` hardware buffers of up to `chunk_samples` samples each.
    /// The chunk is rounded down to whole frames.
    pub fn create<B: AudioBackend + ?Sized>(
        backend: &B,
        format: PcmFormat,
        chunk_samples: usize,
        count: usize,
    ) -> Result<Self, DeviceError> {
        let chunk_samples = format.frame_aligned(chunk_samples);
        if chunk_samples == 0 {
            return Err(DeviceError::InvalidOperation(format!(
                "buffer chunk holds no complete {}-channel frame",
                format.channels
            )));
        }

        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match backend.create_buffer() {
                Ok(buffer) => slots.push(BufferSlot {
                    buffer,
                    state: SlotState::Processed,
                    samples: 0,
                }),
                Err(e) => {
                    for slot in &slots {
                        let _ = backend.delete_buffer(slot.buffer);
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            slots,
            scratch: vec![0; chunk_samples],
            format,
            stats: RingStats::default(),
        })
    }

    /// Decode up to one chunk into slot `index` and upload it.
    ///
    /// Returns `false` if the decoder produced nothing. Whatever was written
    /// is taken off `clock`. An upload failure is logged and still counts as
    /// written: the stream carries on with the stale buffer.
    pub fn fill<B: AudioBackend + ?Sized>(
        &mut self,
        index: usize,
        decoder: &mut dyn StreamDecoder,
        backend: &B,
        clock: &mut PlaybackClock,
    ) -> bool {
        let capacity = self.scratch.len();
        let mut size = 0;
        while size < capacity {
            match decoder.read_samples(&mut self.scratch[size..]) {
                Ok(0) => break,
                Ok(n) => size += n,
                Err(e) => {
                    warn!("Decode error while streaming, ending chunk early: {}", e);
                    self.stats.decode_errors += 1;
                    break;
                }
            }
        }

        let slot = &mut self.slots[index];
        if size == 0 {
            debug!("No more data obtained from stream for buffer {}", slot.buffer.raw());
            slot.samples = 0;
            return false;
        }

        debug!("Streaming music data to buffer {}: {} samples", slot.buffer.raw(), size);
        if let Err(e) = backend.upload(slot.buffer, self.format, &self.scratch[..size]) {
            warn!("Error buffering stream data into buffer {}: {}", slot.buffer.raw(), e);
            self.stats.upload_errors += 1;
        }

        slot.state = SlotState::Unqueued;
        slot.samples = size;
        self.stats.fills += 1;
        self.stats.samples_written += size as u64;
        clock.consume(size as u64);
        true
    }

    /// Queue unqueued slots on `source`, in slot order.
    /// Slots that fail to queue stay unqueued for a later retry.
    pub fn queue_pending<B: AudioBackend + ?Sized>(
        &mut self,
        order: &[usize],
        backend: &B,
        source: SourceId,
    ) -> usize {
        let mut queued = 0;
        for &index in order {
            let slot = &mut self.slots[index];
            if slot.state != SlotState::Unqueued {
                continue;
            }
            match backend.queue_buffers(source, &[slot.buffer]) {
                Ok(()) => {
                    slot.state = SlotState::Queued;
                    queued += 1;
                }
                Err(e) => warn!("Could not queue buffer {}: {}", slot.buffer.raw(), e),
            }
        }
        queued
    }

    /// Unqueue every buffer queued on `source`, leaving all slots unqueued.
    /// The source must be stopped first so that every buffer counts as processed.
    pub fn drain<B: AudioBackend + ?Sized>(&mut self, backend: &B, source: SourceId) -> usize {
        let queued = match backend.buffers_queued(source) {
            Ok(n) => n,
            Err(e) => {
                warn!("Could not query queued buffers: {}", e);
                0
            }
        };

        let mut drained = 0;
        for _ in 0..queued {
            match backend.unqueue_buffer(source) {
                Ok(_) => drained += 1,
                Err(e) => {
                    warn!("Could not unqueue buffer while draining: {}", e);
                    break;
                }
            }
        }

        for slot in &mut self.slots {
            slot.state = SlotState::Unqueued;
            slot.samples = 0;
        }
        drained
    }

    /// Delete the hardware buffers
    pub fn release<B: AudioBackend + ?Sized>(self, backend: &B) {
        for slot in &self.slots {
            if let Err(e) = backend.delete_buffer(slot.buffer) {
                warn!("Could not delete buffer {}: {}", slot.buffer.raw(), e);
            }
        }
    }

    pub fn slot_index(&self, buffer: BufferId) -> Option<usize> {
        self.slots.iter().position(|s| s.buffer == buffer)
    }

    pub fn mark_processed(&mut self, index: usize) {
        self.slots[index].state = SlotState::Processed;
    }

    pub fn mark_queued(&mut self, index: usize) {
        self.slots[index].state = SlotState::Queued;
    }

    pub fn slots(&self) -> &[BufferSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    /// Chunk size in samples
    pub fn capacity(&self) -> usize {
        self.scratch.len()
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }
}
