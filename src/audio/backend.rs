//! Audio backend abstraction
//!
//! Playback goes through sources that consume a queue of buffers, in the
//! style of queued-buffer audio APIs:
//!
//! - a buffer is uploaded once with PCM data and can then be queued on a source
//! - a playing source walks its queue; a fully played buffer becomes *processed*
//!   but stays in the queue until it is unqueued
//! - only processed buffers can be unqueued, oldest first
//! - stopping a source marks every queued buffer processed
//! - playing a stopped source rewinds it to the start of its queue
//!
//! Backends are shared between the host loop and the audio thread, so every
//! operation takes `&self` and implementations lock internally.

use crate::audio::format::PcmFormat;
use crate::error::DeviceError;

/// Handle to a playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) u32);

impl SourceId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Handle to a hardware buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

impl BufferId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Playback state of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Created, never played
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Operations consumed from the audio hardware
pub trait AudioBackend: Send + Sync {
    fn create_source(&self) -> Result<SourceId, DeviceError>;

    /// Delete a source. Buffers still queued on it are released from the queue.
    fn delete_source(&self, source: SourceId) -> Result<(), DeviceError>;

    fn create_buffer(&self) -> Result<BufferId, DeviceError>;

    /// Delete a buffer. Fails with [`DeviceError::BufferInUse`] while it is queued.
    fn delete_buffer(&self, buffer: BufferId) -> Result<(), DeviceError>;

    /// Replace a buffer's contents with interleaved 16-bit samples
    fn upload(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        samples: &[i16],
    ) -> Result<(), DeviceError>;

    /// Make `buffer` the only buffer of a non-playing source (static playback)
    fn attach_buffer(&self, source: SourceId, buffer: BufferId) -> Result<(), DeviceError>;

    /// Append buffers to the end of a source's queue
    fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> Result<(), DeviceError>;

    /// Remove the oldest processed buffer from a source's queue
    fn unqueue_buffer(&self, source: SourceId) -> Result<BufferId, DeviceError>;

    fn buffers_queued(&self, source: SourceId) -> Result<usize, DeviceError>;

    fn buffers_processed(&self, source: SourceId) -> Result<usize, DeviceError>;

    fn play(&self, source: SourceId) -> Result<(), DeviceError>;

    fn pause(&self, source: SourceId) -> Result<(), DeviceError>;

    fn stop(&self, source: SourceId) -> Result<(), DeviceError>;

    fn source_state(&self, source: SourceId) -> Result<SourceState, DeviceError>;

    fn set_gain(&self, source: SourceId, gain: f32) -> Result<(), DeviceError>;

    fn set_pitch(&self, source: SourceId, pitch: f32) -> Result<(), DeviceError>;
}
