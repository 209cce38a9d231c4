//! Source and buffer bookkeeping shared by the software backends
//!
//! [`Mixer`] owns every source (voice) and buffer and implements the queue
//! semantics documented on [`AudioBackend`](crate::audio::backend::AudioBackend).
//! Time moves forward either through [`Mixer::advance`] (simulated clock) or
//! through [`Mixer::mix_into`] (real output callback).

use parking_lot::MutexGuard;
use std::collections::{HashMap, VecDeque};

use crate::audio::backend::{AudioBackend, BufferId, SourceId, SourceState};
use crate::audio::format::PcmFormat;
use crate::error::DeviceError;

/// Slack used when comparing fractional frame positions
const FRAME_EPSILON: f64 = 1e-6;

/// Uploaded PCM data
#[derive(Default)]
struct PcmBuffer {
    format: Option<PcmFormat>,
    samples: Vec<i16>,
}

impl PcmBuffer {
    fn frames(&self) -> usize {
        match self.format {
            Some(format) => self.samples.len() / format.channels as usize,
            None => 0,
        }
    }

    fn sample_rate(&self) -> u32 {
        self.format.map(|f| f.sample_rate).unwrap_or(0)
    }

    /// Sample for an output channel, mapping mono/stereo as needed
    fn frame_sample(&self, frame: usize, out_channel: usize, out_channels: usize) -> f32 {
        let channels = match self.format {
            Some(format) => format.channels as usize,
            None => return 0.0,
        };
        let base = frame * channels;
        let raw = if channels == 1 {
            self.samples[base] as f32
        } else if out_channels == 1 {
            (self.samples[base] as f32 + self.samples[base + 1] as f32) * 0.5
        } else {
            self.samples[base + out_channel.min(channels - 1)] as f32
        };
        raw / 32768.0
    }
}

struct Voice {
    queue: VecDeque<BufferId>,
    /// Number of buffers at the front of `queue` that have been fully played
    processed: usize,
    /// Fractional frame position inside `queue[processed]`
    cursor: f64,
    state: SourceState,
    gain: f32,
    pitch: f32,
}

impl Voice {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            processed: 0,
            cursor: 0.0,
            state: SourceState::Initial,
            gain: 1.0,
            pitch: 1.0,
        }
    }

    fn complete_current(&mut self) {
        self.processed += 1;
        self.cursor = 0.0;
        if self.processed >= self.queue.len() {
            self.state = SourceState::Stopped;
        }
    }

    /// Move the play position forward by `seconds` of wall time
    fn advance(&mut self, buffers: &HashMap<BufferId, PcmBuffer>, seconds: f64) {
        let mut remaining = seconds;
        while self.state == SourceState::Playing {
            let Some(id) = self.queue.get(self.processed) else {
                self.state = SourceState::Stopped;
                break;
            };
            let (frames, rate) = buffers
                .get(id)
                .map(|b| (b.frames(), b.sample_rate()))
                .unwrap_or((0, 0));
            if frames == 0 || rate == 0 {
                self.complete_current();
                continue;
            }

            let step_rate = rate as f64 * self.pitch as f64;
            let left = frames as f64 - self.cursor;
            let needed = remaining * step_rate;
            if needed + FRAME_EPSILON < left {
                self.cursor += needed;
                break;
            }
            remaining = (remaining - left / step_rate).max(0.0);
            self.complete_current();
        }
    }
}

/// Software source/buffer table
#[derive(Default)]
pub struct Mixer {
    sources: HashMap<SourceId, Voice>,
    buffers: HashMap<BufferId, PcmBuffer>,
    next_id: u32,
    uploads: u64,
    /// Number of upcoming uploads that should fail
    failing_uploads: usize,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn voice(&self, source: SourceId) -> Result<&Voice, DeviceError> {
        self.sources
            .get(&source)
            .ok_or(DeviceError::InvalidSource(source.0))
    }

    fn voice_mut(&mut self, source: SourceId) -> Result<&mut Voice, DeviceError> {
        self.sources
            .get_mut(&source)
            .ok_or(DeviceError::InvalidSource(source.0))
    }

    fn ensure_buffer(&self, buffer: BufferId) -> Result<(), DeviceError> {
        if self.buffers.contains_key(&buffer) {
            Ok(())
        } else {
            Err(DeviceError::InvalidBuffer(buffer.0))
        }
    }

    fn is_queued(&self, buffer: BufferId) -> bool {
        self.sources.values().any(|v| v.queue.contains(&buffer))
    }

    pub fn create_source(&mut self) -> SourceId {
        let id = SourceId(self.next_id());
        self.sources.insert(id, Voice::new());
        id
    }

    pub fn delete_source(&mut self, source: SourceId) -> Result<(), DeviceError> {
        self.sources
            .remove(&source)
            .map(|_| ())
            .ok_or(DeviceError::InvalidSource(source.0))
    }

    pub fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next_id());
        self.buffers.insert(id, PcmBuffer::default());
        id
    }

    pub fn delete_buffer(&mut self, buffer: BufferId) -> Result<(), DeviceError> {
        self.ensure_buffer(buffer)?;
        if self.is_queued(buffer) {
            return Err(DeviceError::BufferInUse(buffer.0));
        }
        self.buffers.remove(&buffer);
        Ok(())
    }

    pub fn upload(
        &mut self,
        buffer: BufferId,
        format: PcmFormat,
        samples: &[i16],
    ) -> Result<(), DeviceError> {
        self.ensure_buffer(buffer)?;
        format.layout()?;
        if self.is_queued(buffer) {
            return Err(DeviceError::BufferInUse(buffer.0));
        }
        if self.failing_uploads > 0 {
            self.failing_uploads -= 1;
            return Err(DeviceError::InvalidOperation(format!(
                "injected upload failure on buffer {}",
                buffer.0
            )));
        }
        if let Some(data) = self.buffers.get_mut(&buffer) {
            data.format = Some(format);
            data.samples.clear();
            data.samples.extend_from_slice(samples);
        }
        self.uploads += 1;
        Ok(())
    }

    pub fn attach_buffer(&mut self, source: SourceId, buffer: BufferId) -> Result<(), DeviceError> {
        self.ensure_buffer(buffer)?;
        let voice = self.voice_mut(source)?;
        if matches!(voice.state, SourceState::Playing | SourceState::Paused) {
            return Err(DeviceError::InvalidOperation(format!(
                "cannot attach a buffer to active source {}",
                source.0
            )));
        }
        voice.queue.clear();
        voice.queue.push_back(buffer);
        voice.processed = 0;
        voice.cursor = 0.0;
        Ok(())
    }

    pub fn queue_buffers(
        &mut self,
        source: SourceId,
        buffers: &[BufferId],
    ) -> Result<(), DeviceError> {
        for &buffer in buffers {
            self.ensure_buffer(buffer)?;
        }
        let voice = self.voice_mut(source)?;
        voice.queue.extend(buffers.iter().copied());
        Ok(())
    }

    pub fn unqueue_buffer(&mut self, source: SourceId) -> Result<BufferId, DeviceError> {
        let voice = self.voice_mut(source)?;
        if voice.processed == 0 {
            return Err(DeviceError::InvalidOperation(format!(
                "source {} has no processed buffers",
                source.0
            )));
        }
        let buffer = voice
            .queue
            .pop_front()
            .ok_or_else(|| DeviceError::InvalidOperation("queue is empty".to_string()))?;
        voice.processed -= 1;
        Ok(buffer)
    }

    pub fn buffers_queued(&self, source: SourceId) -> Result<usize, DeviceError> {
        Ok(self.voice(source)?.queue.len())
    }

    pub fn buffers_processed(&self, source: SourceId) -> Result<usize, DeviceError> {
        Ok(self.voice(source)?.processed)
    }

    pub fn play(&mut self, source: SourceId) -> Result<(), DeviceError> {
        let voice = self.voice_mut(source)?;
        match voice.state {
            SourceState::Playing => {}
            SourceState::Paused => voice.state = SourceState::Playing,
            SourceState::Initial | SourceState::Stopped => {
                voice.processed = 0;
                voice.cursor = 0.0;
                voice.state = if voice.queue.is_empty() {
                    SourceState::Stopped
                } else {
                    SourceState::Playing
                };
            }
        }
        Ok(())
    }

    pub fn pause(&mut self, source: SourceId) -> Result<(), DeviceError> {
        let voice = self.voice_mut(source)?;
        if voice.state == SourceState::Playing {
            voice.state = SourceState::Paused;
        }
        Ok(())
    }

    pub fn stop(&mut self, source: SourceId) -> Result<(), DeviceError> {
        let voice = self.voice_mut(source)?;
        voice.state = SourceState::Stopped;
        voice.processed = voice.queue.len();
        voice.cursor = 0.0;
        Ok(())
    }

    pub fn source_state(&self, source: SourceId) -> Result<SourceState, DeviceError> {
        Ok(self.voice(source)?.state)
    }

    pub fn set_gain(&mut self, source: SourceId, gain: f32) -> Result<(), DeviceError> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(DeviceError::InvalidOperation(format!("invalid gain {}", gain)));
        }
        self.voice_mut(source)?.gain = gain;
        Ok(())
    }

    pub fn set_pitch(&mut self, source: SourceId, pitch: f32) -> Result<(), DeviceError> {
        if !pitch.is_finite() || pitch <= 0.0 {
            return Err(DeviceError::InvalidOperation(format!("invalid pitch {}", pitch)));
        }
        self.voice_mut(source)?.pitch = pitch;
        Ok(())
    }

    /// Advance every playing source by `seconds`
    pub fn advance(&mut self, seconds: f64) {
        let buffers = &self.buffers;
        for voice in self.sources.values_mut() {
            voice.advance(buffers, seconds);
        }
    }

    /// Mix all playing sources into an interleaved f32 output block
    pub fn mix_into(&mut self, out: &mut [f32], out_channels: u16, out_rate: u32) {
        out.iter_mut().for_each(|s| *s = 0.0);
        let out_channels = out_channels.max(1) as usize;
        if out_rate == 0 {
            return;
        }
        let frame_time = 1.0 / out_rate as f64;
        let frames = out.len() / out_channels;

        let buffers = &self.buffers;
        for voice in self.sources.values_mut() {
            for frame in 0..frames {
                if voice.state != SourceState::Playing {
                    break;
                }
                let current = voice.queue.get(voice.processed).and_then(|id| buffers.get(id));
                if let Some(data) = current {
                    let index = voice.cursor as usize;
                    if index < data.frames() {
                        for ch in 0..out_channels {
                            out[frame * out_channels + ch] +=
                                data.frame_sample(index, ch, out_channels) * voice.gain;
                        }
                    }
                }
                voice.advance(buffers, frame_time);
            }
        }

        out.iter_mut().for_each(|s| *s = s.clamp(-1.0, 1.0));
    }

    /// Make the next `count` uploads fail with a device error
    pub fn fail_next_uploads(&mut self, count: usize) {
        self.failing_uploads = count;
    }

    pub fn live_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

/// A backend whose sources and buffers live in a locked [`Mixer`]
pub trait MixerBackend: Send + Sync {
    fn mixer(&self) -> MutexGuard<'_, Mixer>;
}

impl<T: MixerBackend> AudioBackend for T {
    fn create_source(&self) -> Result<SourceId, DeviceError> {
        Ok(self.mixer().create_source())
    }

    fn delete_source(&self, source: SourceId) -> Result<(), DeviceError> {
        self.mixer().delete_source(source)
    }

    fn create_buffer(&self) -> Result<BufferId, DeviceError> {
        Ok(self.mixer().create_buffer())
    }

    fn delete_buffer(&self, buffer: BufferId) -> Result<(), DeviceError> {
        self.mixer().delete_buffer(buffer)
    }

    fn upload(
        &self,
        buffer: BufferId,
        format: PcmFormat,
        samples: &[i16],
    ) -> Result<(), DeviceError> {
        self.mixer().upload(buffer, format, samples)
    }

    fn attach_buffer(&self, source: SourceId, buffer: BufferId) -> Result<(), DeviceError> {
        self.mixer().attach_buffer(source, buffer)
    }

    fn queue_buffers(&self, source: SourceId, buffers: &[BufferId]) -> Result<(), DeviceError> {
        self.mixer().queue_buffers(source, buffers)
    }

    fn unqueue_buffer(&self, source: SourceId) -> Result<BufferId, DeviceError> {
        self.mixer().unqueue_buffer(source)
    }

    fn buffers_queued(&self, source: SourceId) -> Result<usize, DeviceError> {
        self.mixer().buffers_queued(source)
    }

    fn buffers_processed(&self, source: SourceId) -> Result<usize, DeviceError> {
        self.mixer().buffers_processed(source)
    }

    fn play(&self, source: SourceId) -> Result<(), DeviceError> {
        self.mixer().play(source)
    }

    fn pause(&self, source: SourceId) -> Result<(), DeviceError> {
        self.mixer().pause(source)
    }

    fn stop(&self, source: SourceId) -> Result<(), DeviceError> {
        self.mixer().stop(source)
    }

    fn source_state(&self, source: SourceId) -> Result<SourceState, DeviceError> {
        self.mixer().source_state(source)
    }

    fn set_gain(&self, source: SourceId, gain: f32) -> Result<(), DeviceError> {
        self.mixer().set_gain(source, gain)
    }

    fn set_pitch(&self, source: SourceId, pitch: f32) -> Result<(), DeviceError> {
        self.mixer().set_pitch(source, pitch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(rate: u32) -> PcmFormat {
        PcmFormat::pcm16(1, rate).unwrap()
    }

    #[test]
    fn test_queue_and_process() {
        let mut mixer = Mixer::new();
        let source = mixer.create_source();
        let a = mixer.create_buffer();
        let b = mixer.create_buffer();
        mixer.upload(a, mono(1000), &[0; 1000]).unwrap();
        mixer.upload(b, mono(1000), &[0; 1000]).unwrap();
        mixer.queue_buffers(source, &[a, b]).unwrap();
        mixer.play(source).unwrap();

        mixer.advance(0.5);
        assert_eq!(mixer.buffers_processed(source).unwrap(), 0);

        mixer.advance(0.6);
        assert_eq!(mixer.buffers_processed(source).unwrap(), 1);
        assert_eq!(mixer.unqueue_buffer(source).unwrap(), a);
        assert_eq!(mixer.buffers_queued(source).unwrap(), 1);

        mixer.advance(1.0);
        assert_eq!(mixer.source_state(source).unwrap(), SourceState::Stopped);
        assert_eq!(mixer.buffers_processed(source).unwrap(), 1);
    }

    #[test]
    fn test_unqueue_requires_processed() {
        let mut mixer = Mixer::new();
        let source = mixer.create_source();
        let a = mixer.create_buffer();
        mixer.upload(a, mono(1000), &[0; 10]).unwrap();
        mixer.queue_buffers(source, &[a]).unwrap();
        assert!(mixer.unqueue_buffer(source).is_err());

        mixer.stop(source).unwrap();
        assert_eq!(mixer.unqueue_buffer(source).unwrap(), a);
    }

    #[test]
    fn test_queued_buffer_cannot_be_deleted_or_uploaded() {
        let mut mixer = Mixer::new();
        let source = mixer.create_source();
        let a = mixer.create_buffer();
        mixer.queue_buffers(source, &[a]).unwrap();
        assert_eq!(mixer.delete_buffer(a), Err(DeviceError::BufferInUse(a.0)));
        assert_eq!(mixer.upload(a, mono(1000), &[1]), Err(DeviceError::BufferInUse(a.0)));

        mixer.delete_source(source).unwrap();
        mixer.delete_buffer(a).unwrap();
        assert_eq!(mixer.live_buffers(), 0);
    }

    #[test]
    fn test_pause_freezes_position() {
        let mut mixer = Mixer::new();
        let source = mixer.create_source();
        let a = mixer.create_buffer();
        mixer.upload(a, mono(100), &[0; 100]).unwrap();
        mixer.attach_buffer(source, a).unwrap();
        mixer.play(source).unwrap();
        mixer.pause(source).unwrap();
        mixer.advance(5.0);
        assert_eq!(mixer.source_state(source).unwrap(), SourceState::Paused);
        mixer.play(source).unwrap();
        mixer.advance(1.1);
        assert_eq!(mixer.source_state(source).unwrap(), SourceState::Stopped);
    }

    #[test]
    fn test_mix_applies_gain_and_upmixes_mono() {
        let mut mixer = Mixer::new();
        let source = mixer.create_source();
        let a = mixer.create_buffer();
        mixer.upload(a, mono(4), &[16384; 4]).unwrap();
        mixer.attach_buffer(source, a).unwrap();
        mixer.set_gain(source, 0.5).unwrap();
        mixer.play(source).unwrap();

        let mut out = vec![0.0f32; 16];
        mixer.mix_into(&mut out, 2, 4);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-6);
        assert_eq!(mixer.source_state(source).unwrap(), SourceState::Stopped);
        assert_eq!(out[15], 0.0);
    }
}
