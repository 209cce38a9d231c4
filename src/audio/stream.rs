//! Music stream driver
//!
//! Plays one long file through a small ring of hardware buffers. The host
//! calls [`MusicStream::tick`] regularly (once per frame is plenty); each
//! tick refills the buffers the source has finished with, wraps around to
//! the start of the file when looping, restarts the source after an
//! underrun, and tears everything down once the data runs out.
//!
//! ```text
//!            tick()
//!   decoder ───────► BufferRing ──queue──► source ──► output
//!      ▲               slot 0                │
//!      │ seek          slot 1  ◄──unqueue────┘ (processed)
//!      └── loop
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::backend::{AudioBackend, SourceId, SourceState};
use crate::audio::buffer::{BufferRing, SlotState};
use crate::audio::clock::PlaybackClock;
use crate::audio::format::PcmFormat;
use crate::codec::{self, AudioFileKind, StreamDecoder};
use crate::config::StreamConfig;
use crate::constants::MUSIC_STREAM_BUFFERS;
use crate::error::{DecodeError, Error, Result};

/// Driver state as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Stopped,
    Playing,
    Paused,
}

/// Counters kept across streams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub streams_started: u64,
    /// Streams that ran out of data (not stopped by the host)
    pub streams_finished: u64,
    pub loops_completed: u64,
    pub buffers_refilled: u64,
    pub underruns_recovered: u64,
    pub upload_errors: u64,
}

/// Resources of the stream currently playing
struct ActiveStream {
    decoder: Box<dyn StreamDecoder>,
    format: PcmFormat,
    looping: bool,
    source: SourceId,
    ring: BufferRing,
    clock: PlaybackClock,
    paused: bool,
}

impl ActiveStream {
    /// Fill slot `index`, wrapping to the start of the file once if looping.
    /// Returns `false` when no more data will come for this slot.
    fn refill<B: AudioBackend + ?Sized>(&mut self, index: usize, backend: &B) -> bool {
        if self.ring.fill(index, self.decoder.as_mut(), backend, &mut self.clock) {
            return true;
        }
        if !self.looping {
            return false;
        }

        if let Err(e) = self.decoder.seek_to_start() {
            warn!("Could not rewind music stream: {}", e);
            return false;
        }
        self.clock.restart();
        debug!("Music stream looped ({} completed)", self.clock.loops_completed());

        if self.ring.fill(index, self.decoder.as_mut(), backend, &mut self.clock) {
            true
        } else {
            warn!("Music stream produced no data after rewinding");
            false
        }
    }

    /// Stop the source and release every handle, source before buffers
    fn teardown<B: AudioBackend + ?Sized>(mut self, backend: &B) {
        if let Err(e) = backend.stop(self.source) {
            warn!("Could not stop music source: {}", e);
        }
        let drained = self.ring.drain(backend, self.source);
        debug!("Drained {} buffer(s) from music source", drained);
        if let Err(e) = backend.delete_source(self.source) {
            warn!("Could not delete music source: {}", e);
        }
        self.ring.release(backend);
    }
}

/// Streams one music file at a time through a backend
pub struct MusicStream<B: AudioBackend + ?Sized> {
    backend: Arc<B>,
    config: StreamConfig,
    volume: f32,
    pitch: f32,
    active: Option<ActiveStream>,
    stats: StreamStats,
}

impl<B: AudioBackend + ?Sized> MusicStream<B> {
    pub fn new(backend: Arc<B>, config: StreamConfig) -> Self {
        let volume = config.default_volume;
        Self {
            backend,
            config,
            volume,
            pitch: 1.0,
            active: None,
            stats: StreamStats::default(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Start streaming `path`, replacing whatever is playing.
    /// Failures are logged and leave the driver stopped.
    pub fn start_stream(&mut self, path: impl AsRef<Path>, looping: bool) {
        let path = path.as_ref();
        if let Err(e) = self.try_start_stream(path, looping) {
            warn!("[{}] Could not start music stream: {}", path.display(), e);
        }
    }

    /// Like [`start_stream`](Self::start_stream) but reports the failure.
    ///
    /// An unrecognized extension is rejected before the current stream is
    /// touched. Any later failure happens after the current stream has been
    /// stopped.
    pub fn try_start_stream(&mut self, path: &Path, looping: bool) -> Result<()> {
        AudioFileKind::from_path(path)?;
        self.stop_stream();

        let decoder = codec::open(path)?;
        info!("[{}] Music file opened for streaming", path.display());
        self.start_with_decoder(decoder, looping)
    }

    /// Start streaming from an already opened decoder
    pub fn start_with_decoder(
        &mut self,
        decoder: Box<dyn StreamDecoder>,
        looping: bool,
    ) -> Result<()> {
        self.stop_stream();

        let backend = Arc::clone(&self.backend);
        let backend = backend.as_ref();
        let info = decoder.info();
        let format = info.pcm_format()?;

        // Buffers must end on a frame boundary or the channels swap
        let chunk = format.frame_aligned(self.config.chunk_samples);
        if chunk == 0 {
            return Err(Error::Config(format!(
                "chunk of {} samples cannot hold one {}-channel frame",
                self.config.chunk_samples, format.channels
            )));
        }

        let source = backend.create_source()?;
        let ring = match BufferRing::create(backend, format, chunk, MUSIC_STREAM_BUFFERS) {
            Ok(ring) => ring,
            Err(e) => {
                let _ = backend.delete_source(source);
                return Err(e.into());
            }
        };
        if let Err(e) = backend.set_gain(source, self.volume) {
            warn!("Could not set music volume: {}", e);
        }
        if let Err(e) = backend.set_pitch(source, self.pitch) {
            warn!("Could not set music pitch: {}", e);
        }

        let clock =
            PlaybackClock::new(decoder.total_sample_count(), info.sample_rate, info.channels);
        let mut stream = ActiveStream {
            decoder,
            format,
            looping,
            source,
            ring,
            clock,
            paused: false,
        };

        // Prime every slot before playback starts
        let mut primed = Vec::with_capacity(stream.ring.len());
        for index in 0..stream.ring.len() {
            if stream.refill(index, backend) {
                primed.push(index);
            } else {
                stream.ring.mark_processed(index);
            }
        }
        if primed.is_empty() {
            stream.teardown(backend);
            let msg = "stream contains no audio data".to_string();
            return Err(DecodeError::DecodingFailed(msg).into());
        }
        // A stream shorter than the ring may already have wrapped
        let loops = stream.clock.loops_completed();

        let ids: Vec<_> = primed.iter().map(|&i| stream.ring.slots()[i].buffer).collect();
        let started = backend
            .queue_buffers(source, &ids)
            .and_then(|()| backend.play(source));
        if let Err(e) = started {
            stream.teardown(backend);
            return Err(e.into());
        }
        for &index in &primed {
            stream.ring.mark_queued(index);
        }

        info!(
            "Music stream started: {} Hz, {} channel(s), {:.1} s, {} buffer(s) of {} samples{}",
            stream.format.sample_rate,
            stream.format.channels,
            stream.clock.total_seconds(),
            stream.ring.len(),
            stream.ring.capacity(),
            if looping { ", looping" } else { "" }
        );

        self.stats.streams_started += 1;
        self.stats.loops_completed += loops;
        self.active = Some(stream);
        Ok(())
    }

    /// Stop the current stream and release its source, buffers and decoder.
    /// Does nothing when already stopped.
    pub fn stop_stream(&mut self) {
        if let Some(stream) = self.active.take() {
            self.absorb_ring_stats(&stream);
            stream.teardown(self.backend.as_ref());
            info!("Music stream stopped");
        }
    }

    pub fn pause_stream(&mut self) {
        if let Some(stream) = self.active.as_mut() {
            if stream.paused {
                return;
            }
            if let Err(e) = self.backend.pause(stream.source) {
                warn!("Could not pause music source: {}", e);
                return;
            }
            stream.paused = true;
            debug!("Music stream paused");
        }
    }

    /// Continue after [`pause_stream`](Self::pause_stream).
    ///
    /// If the source ran dry before the pause it is not restarted directly,
    /// since that would replay the processed buffers. The ring is serviced
    /// instead and the underrun path starts it with fresh data.
    pub fn resume_stream(&mut self) {
        let Some(stream) = self.active.as_mut() else {
            return;
        };
        if !stream.paused {
            return;
        }

        match self.backend.source_state(stream.source) {
            Ok(SourceState::Paused) => {
                if let Err(e) = self.backend.play(stream.source) {
                    warn!("Could not resume music source: {}", e);
                    return;
                }
                stream.paused = false;
                debug!("Music stream resumed");
            }
            Ok(state) => {
                stream.paused = false;
                debug!("Music source was {:?} when resumed, refilling", state);
                self.tick();
            }
            Err(e) => warn!("Could not query music source state: {}", e),
        }
    }

    /// Service the buffer ring. Cheap when nothing needs doing.
    pub fn tick(&mut self) {
        let backend = Arc::clone(&self.backend);
        let backend = backend.as_ref();
        let Some(stream) = self.active.as_mut() else {
            return;
        };
        if stream.paused {
            return;
        }
        let source = stream.source;

        let processed = match backend.buffers_processed(source) {
            Ok(n) => n,
            Err(e) => {
                warn!("Could not query processed music buffers: {}", e);
                return;
            }
        };

        // Slots left unqueued by an earlier failed queue go first
        let mut order: Vec<usize> = (0..stream.ring.len())
            .filter(|&i| stream.ring.slots()[i].state == SlotState::Unqueued)
            .collect();

        for _ in 0..processed {
            let buffer = match backend.unqueue_buffer(source) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!("Could not unqueue music buffer: {}", e);
                    break;
                }
            };
            let Some(index) = stream.ring.slot_index(buffer) else {
                warn!("Unqueued buffer {} does not belong to the music stream", buffer.raw());
                continue;
            };
            stream.ring.mark_processed(index);

            let loops_before = stream.clock.loops_completed();
            if stream.refill(index, backend) {
                order.push(index);
                self.stats.buffers_refilled += 1;
            }
            self.stats.loops_completed += stream.clock.loops_completed() - loops_before;
        }

        stream.ring.queue_pending(&order, backend, source);

        let queued = stream.ring.count(SlotState::Queued);
        let pending = stream.ring.count(SlotState::Unqueued);
        if queued == 0 && pending == 0 {
            info!("Music stream finished");
            self.stats.streams_finished += 1;
            self.stop_stream();
            return;
        }

        if queued > 0 {
            match backend.source_state(source) {
                Ok(SourceState::Playing) => {}
                Ok(_) => {
                    warn!("Music stream underrun, restarting playback");
                    match backend.play(source) {
                        Ok(()) => self.stats.underruns_recovered += 1,
                        Err(e) => warn!("Could not restart music source: {}", e),
                    }
                }
                Err(e) => warn!("Could not query music source state: {}", e),
            }
        }
    }

    pub fn state(&self) -> StreamState {
        match &self.active {
            None => StreamState::Stopped,
            Some(stream) if stream.paused => StreamState::Paused,
            Some(_) => StreamState::Playing,
        }
    }

    /// True while a stream is active and not paused, including the brief
    /// gap of an underrun that the next tick will recover from
    pub fn is_playing(&self) -> bool {
        self.state() == StreamState::Playing
    }

    /// Set the gain (1.0 is unity). Kept across streams.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() || volume < 0.0 {
            warn!("Ignoring invalid music volume {}", volume);
            return;
        }
        self.volume = volume;
        if let Some(stream) = &self.active {
            if let Err(e) = self.backend.set_gain(stream.source, volume) {
                warn!("Could not set music volume: {}", e);
            }
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the playback rate multiplier (1.0 is normal). Kept across streams.
    pub fn set_pitch(&mut self, pitch: f32) {
        if !pitch.is_finite() || pitch <= 0.0 {
            warn!("Ignoring invalid music pitch {}", pitch);
            return;
        }
        self.pitch = pitch;
        if let Some(stream) = &self.active {
            if let Err(e) = self.backend.set_pitch(stream.source, pitch) {
                warn!("Could not set music pitch: {}", e);
            }
        }
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Length of the current stream, 0 when stopped
    pub fn total_seconds(&self) -> f32 {
        self.active.as_ref().map_or(0.0, |s| s.clock.total_seconds())
    }

    /// Position within the current loop cycle, 0 when stopped.
    /// Counts decoded data, so it runs ahead of what is audible.
    pub fn elapsed_seconds(&self) -> f32 {
        self.active.as_ref().map_or(0.0, |s| s.clock.elapsed_seconds())
    }

    pub fn clock(&self) -> Option<&PlaybackClock> {
        self.active.as_ref().map(|s| &s.clock)
    }

    /// Slot states of the current stream, empty when stopped
    pub fn slot_states(&self) -> Vec<SlotState> {
        self.active
            .as_ref()
            .map(|s| s.ring.slots().iter().map(|slot| slot.state).collect())
            .unwrap_or_default()
    }

    /// Counters across all streams, including the active one
    pub fn stats(&self) -> StreamStats {
        let mut stats = self.stats;
        if let Some(stream) = &self.active {
            stats.upload_errors += stream.ring.stats().upload_errors;
        }
        stats
    }

    fn absorb_ring_stats(&mut self, stream: &ActiveStream) {
        self.stats.upload_errors += stream.ring.stats().upload_errors;
    }
}

impl<B: AudioBackend + ?Sized> Drop for MusicStream<B> {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::simulated::SimulatedBackend;
    use crate::codec::wav::wav_bytes;
    use crate::codec::MemoryDecoder;
    use proptest::prelude::*;
    use std::time::Duration;

    const RATE: u32 = 44100;
    const CHUNK: usize = 4096 * 8;

    fn tone(seconds: f32, channels: u16) -> Vec<i16> {
        let samples = (seconds * RATE as f32) as usize * channels as usize;
        (0..samples).map(|i| ((i % 200) as i16 - 100) * 100).collect()
    }

    fn driver(chunk: usize) -> (Arc<SimulatedBackend>, MusicStream<SimulatedBackend>) {
        let backend = Arc::new(SimulatedBackend::new());
        let config = StreamConfig {
            chunk_samples: chunk,
            ..StreamConfig::default()
        };
        (backend.clone(), MusicStream::new(backend, config))
    }

    fn start_memory(
        music: &mut MusicStream<SimulatedBackend>,
        samples: Vec<i16>,
        channels: u16,
        looping: bool,
    ) {
        let decoder = MemoryDecoder::new(samples, channels, RATE).with_max_read(4410);
        music.start_with_decoder(Box::new(decoder), looping).unwrap();
    }

    fn chunk_duration(channels: u16) -> Duration {
        Duration::from_secs_f64(CHUNK as f64 / (RATE as f64 * channels as f64))
    }

    /// Slightly more than one chunk, so exactly one buffer finishes
    fn one_buffer(channels: u16) -> Duration {
        chunk_duration(channels) + Duration::from_millis(10)
    }

    #[test]
    fn test_non_looping_stream_stops_once() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(5.0, 1), 1, false);
        assert!(music.is_playing());
        assert!((music.total_seconds() - 5.0).abs() < 0.01);

        let step = chunk_duration(1);
        let mut ticks = 0u32;
        while music.is_playing() && ticks < 100 {
            assert_eq!(music.slot_states().len(), MUSIC_STREAM_BUFFERS);
            backend.advance(step);
            music.tick();
            ticks += 1;
        }

        assert_eq!(music.state(), StreamState::Stopped);
        assert!(ticks as f64 * step.as_secs_f64() >= 5.0);
        assert_eq!(music.stats().streams_finished, 1);
        // 220500 samples in chunks of 32768
        assert_eq!(backend.uploads(), 7);

        for _ in 0..5 {
            backend.advance(step);
            music.tick();
        }
        assert_eq!(backend.uploads(), 7);
        assert_eq!(music.stats().streams_finished, 1);
        assert_eq!(backend.live_sources(), 0);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_looping_stream_wraps() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(5.0, 1), 1, true);

        let mut last = music.elapsed_seconds();
        let mut wraps = 0;
        let mut loops = 0;
        for _ in 0..120 {
            backend.advance(Duration::from_millis(100));
            music.tick();
            assert!(music.is_playing());
            assert_eq!(backend.live_sources(), 1);

            let now = music.elapsed_seconds();
            let completed = music.clock().unwrap().loops_completed();
            if now < last {
                wraps += 1;
                assert!(completed > loops);
                assert!(now < 1.0);
            }
            loops = completed;
            last = now;
        }

        assert!(wraps >= 2);
        assert!(music.stats().loops_completed >= 2);
        assert_eq!(music.stats().underruns_recovered, 0);
    }

    #[test]
    fn test_loop_counter_has_no_drift() {
        let backend = Arc::new(SimulatedBackend::new());
        let config = StreamConfig {
            chunk_samples: 100,
            ..StreamConfig::default()
        };
        let mut music = MusicStream::new(backend.clone(), config);
        let decoder = MemoryDecoder::new(vec![1; 1000], 1, 1000).with_max_read(33);
        music.start_with_decoder(Box::new(decoder), true).unwrap();

        for _ in 0..95 {
            backend.advance(Duration::from_millis(100));
            music.tick();

            // Every fill is one full chunk; the eleventh of a cycle wraps
            let fills = 2 + music.stats().buffers_refilled;
            let clock = music.clock().unwrap();
            assert_eq!(clock.loops_completed(), (fills - 1) / 10);
            assert_eq!(clock.remaining_samples(), 1000 - ((fills - 1) % 10 + 1) * 100);
        }
        assert!(music.stats().loops_completed >= 8);
    }

    #[test]
    fn test_restart_releases_previous_stream() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(2.0, 2), 2, true);
        start_memory(&mut music, tone(3.0, 1), 1, false);

        assert_eq!(backend.live_sources(), 1);
        assert_eq!(backend.live_buffers(), MUSIC_STREAM_BUFFERS);
        assert_eq!(music.stats().streams_started, 2);
        assert!((music.total_seconds() - 3.0).abs() < 0.01);

        music.stop_stream();
        assert_eq!(backend.live_sources(), 0);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(music.elapsed_seconds(), 0.0);
        assert_eq!(music.total_seconds(), 0.0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (backend, mut music) = driver(CHUNK);
        music.stop_stream();
        start_memory(&mut music, tone(1.0, 1), 1, false);
        music.stop_stream();
        music.stop_stream();
        assert_eq!(music.state(), StreamState::Stopped);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_upload_failure_keeps_stream_alive() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(5.0, 1), 1, true);

        backend.fail_next_uploads(1);
        backend.advance(one_buffer(1));
        music.tick();

        assert!(music.is_playing());
        assert_eq!(music.stats().upload_errors, 1);
        assert_eq!(music.slot_states(), vec![SlotState::Queued; 2]);
    }

    #[test]
    fn test_empty_stream_never_starts() {
        let (backend, mut music) = driver(CHUNK);
        let decoder = MemoryDecoder::new(Vec::new(), 2, RATE);
        assert!(music.start_with_decoder(Box::new(decoder), true).is_err());

        assert_eq!(music.state(), StreamState::Stopped);
        music.tick();
        assert_eq!(backend.live_sources(), 0);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.uploads(), 0);
    }

    #[test]
    fn test_short_stream_fills_one_slot() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(0.1, 1), 1, false);
        assert_eq!(music.slot_states(), vec![SlotState::Queued, SlotState::Processed]);

        backend.advance(Duration::from_millis(200));
        music.tick();
        assert_eq!(music.state(), StreamState::Stopped);
        assert_eq!(backend.uploads(), 1);
    }

    #[test]
    fn test_pause_freezes_tick() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(5.0, 1), 1, false);
        music.pause_stream();
        assert_eq!(music.state(), StreamState::Paused);

        let uploads = backend.uploads();
        let elapsed = music.elapsed_seconds();
        for _ in 0..10 {
            backend.advance(Duration::from_secs(1));
            music.tick();
        }
        assert_eq!(backend.uploads(), uploads);
        assert_eq!(music.elapsed_seconds(), elapsed);

        music.resume_stream();
        assert!(music.is_playing());
        backend.advance(one_buffer(1));
        music.tick();
        assert_eq!(backend.uploads(), uploads + 1);
    }

    #[test]
    fn test_underrun_is_recovered() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(10.0, 1), 1, false);

        // Host stalls long enough for both buffers to run dry
        backend.advance(Duration::from_secs(3));
        music.tick();

        assert!(music.is_playing());
        assert_eq!(music.stats().underruns_recovered, 1);
        assert_eq!(music.slot_states(), vec![SlotState::Queued; 2]);
    }

    #[test]
    fn test_resume_after_underrun_refills() {
        let (backend, mut music) = driver(1000);
        start_memory(&mut music, tone(10.0, 1), 1, false);

        // Both buffers run dry before the host pauses
        backend.advance(Duration::from_millis(2500));
        let source = music.active.as_ref().unwrap().source;
        assert_eq!(backend.source_state(source).unwrap(), SourceState::Stopped);

        music.pause_stream();
        let before = music.stats();
        music.resume_stream();
        music.tick();

        assert!(music.is_playing());
        assert_eq!(music.stats().buffers_refilled - before.buffers_refilled, 2);
        assert_eq!(backend.source_state(source).unwrap(), SourceState::Playing);
        assert_eq!(music.slot_states(), vec![SlotState::Queued; 2]);
        // Playback continues from the third chunk rather than the first
        assert_eq!(music.clock().unwrap().remaining_samples(), 441_000 - 4000);
    }

    #[test]
    fn test_odd_chunk_keeps_stereo_frames_whole() {
        let (backend, mut music) = driver(1001);
        let frames: Vec<i16> = [1, -1].repeat(RATE as usize);
        start_memory(&mut music, frames, 2, false);

        for _ in 0..20 {
            let stream = music.active.as_ref().unwrap();
            assert_eq!(stream.ring.capacity(), 1000);
            for slot in stream.ring.slots() {
                assert_eq!(slot.samples % 2, 0);
            }
            backend.advance(Duration::from_millis(20));
            music.tick();
        }
        assert!(music.stats().buffers_refilled > 0);
    }

    #[test]
    fn test_zero_chunk_is_a_config_error() {
        let (backend, mut music) = driver(0);
        let decoder = MemoryDecoder::new(tone(1.0, 1), 1, RATE);
        let err = music.start_with_decoder(Box::new(decoder), false).err().unwrap();

        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert_eq!(music.state(), StreamState::Stopped);
        assert_eq!(backend.live_sources(), 0);
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_wrap_during_priming_is_counted() {
        let (_backend, mut music) = driver(1000);
        let decoder = MemoryDecoder::new(vec![5; 100], 1, RATE).with_max_read(64);
        music.start_with_decoder(Box::new(decoder), true).unwrap();

        let wrapped = music.clock().unwrap().loops_completed();
        assert!(wrapped >= 1);
        assert_eq!(music.stats().loops_completed, wrapped);
    }

    #[test]
    fn test_unsupported_extension_keeps_current_stream() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(2.0, 1), 1, true);

        music.start_stream("theme.mp3", true);
        assert!(music.is_playing());
        assert_eq!(backend.live_sources(), 1);
        assert_eq!(music.stats().streams_started, 1);
    }

    #[test]
    fn test_missing_file_leaves_driver_stopped() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(2.0, 1), 1, true);

        let err = music
            .try_start_stream(Path::new("/nonexistent/theme.ogg"), true)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ResourceUnavailable);
        assert_eq!(music.state(), StreamState::Stopped);
        assert_eq!(backend.live_sources(), 0);
    }

    #[test]
    fn test_streams_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.wav");
        let samples = tone(1.5, 2);
        std::fs::write(&path, wav_bytes(2, RATE, &samples)).unwrap();

        let (backend, mut music) = driver(CHUNK);
        music.start_stream(&path, false);
        assert!(music.is_playing());
        assert!((music.total_seconds() - 1.5).abs() < 0.01);
        assert!(music.elapsed_seconds() > 0.0);

        for _ in 0..20 {
            backend.advance(chunk_duration(2));
            music.tick();
        }
        assert_eq!(music.state(), StreamState::Stopped);
        assert_eq!(music.stats().streams_finished, 1);
    }

    #[test]
    fn test_loops_ogg_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.ogg");
        std::fs::write(&path, include_bytes!("../codec/testdata/tone.ogg")).unwrap();

        // 8 kHz stereo, 1000-sample chunks last 62.5 ms
        let (backend, mut music) = driver(1000);
        music.start_stream(&path, true);
        assert!(music.is_playing());
        assert!((music.total_seconds() - 0.62).abs() < 0.01);

        for _ in 0..40 {
            backend.advance(Duration::from_millis(50));
            music.tick();
            assert!(music.is_playing());
            assert_eq!(backend.live_sources(), 1);
        }

        let stats = music.stats();
        assert!(stats.loops_completed >= 2);
        assert_eq!(stats.loops_completed, music.clock().unwrap().loops_completed());
        assert_eq!(stats.underruns_recovered, 0);
        assert_eq!(stats.upload_errors, 0);
    }

    #[test]
    fn test_volume_and_pitch_validation() {
        let (_backend, mut music) = driver(CHUNK);
        music.set_volume(0.5);
        music.set_volume(-1.0);
        music.set_volume(f32::NAN);
        assert_eq!(music.volume(), 0.5);

        music.set_pitch(0.0);
        assert_eq!(music.pitch(), 1.0);
        start_memory(&mut music, tone(1.0, 1), 1, false);
        music.set_pitch(1.5);
        assert_eq!(music.pitch(), 1.5);
    }

    #[test]
    fn test_drop_releases_handles() {
        let (backend, mut music) = driver(CHUNK);
        start_memory(&mut music, tone(1.0, 2), 2, true);
        drop(music);
        assert_eq!(backend.live_sources(), 0);
        assert_eq!(backend.live_buffers(), 0);
    }

    proptest! {
        #[test]
        fn prop_finite_stream_uploads_every_sample_once(
            total in 1usize..5000,
            half_chunk in 1usize..256,
            max_read in 1usize..300,
        ) {
            let chunk = half_chunk * 2;
            let backend = Arc::new(SimulatedBackend::new());
            let config = StreamConfig { chunk_samples: chunk, ..StreamConfig::default() };
            let mut music = MusicStream::new(backend.clone(), config);
            let decoder = MemoryDecoder::new(vec![7; total], 1, 1000).with_max_read(max_read);
            music.start_with_decoder(Box::new(decoder), false).unwrap();

            let step = Duration::from_secs_f64(chunk as f64 / 1000.0);
            let mut ticks = 0;
            while music.is_playing() && ticks < 10_000 {
                for state in music.slot_states() {
                    prop_assert!(state != SlotState::Unqueued);
                }
                backend.advance(step);
                music.tick();
                ticks += 1;
            }

            prop_assert_eq!(music.state(), StreamState::Stopped);
            prop_assert_eq!(music.stats().streams_finished, 1);
            prop_assert_eq!(backend.uploads(), ((total + chunk - 1) / chunk) as u64);
            prop_assert_eq!(backend.live_buffers(), 0);
        }
    }
}
