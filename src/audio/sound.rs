//! One-shot sounds
//!
//! A sound is decoded completely into a single buffer attached to its own
//! source. Meant for short effects; long files belong in a music stream.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audio::backend::{AudioBackend, BufferId, SourceId, SourceState};
use crate::codec::{self, Wave};
use crate::error::Result;

/// A fully loaded clip ready to play
pub struct Sound<B: AudioBackend + ?Sized> {
    backend: Arc<B>,
    source: SourceId,
    buffer: BufferId,
    duration: f32,
}

impl<B: AudioBackend + ?Sized> Sound<B> {
    /// Decode `path` (WAV or OGG) into a new sound
    pub fn load(backend: Arc<B>, path: &Path) -> Result<Self> {
        let wave = codec::load_wave(path)?;
        let sound = Self::from_wave(backend, &wave)?;
        info!("[{}] Sound loaded ({:.2} s)", path.display(), sound.duration);
        Ok(sound)
    }

    pub fn from_wave(backend: Arc<B>, wave: &Wave) -> Result<Self> {
        let format = wave.format()?;

        let buffer = backend.create_buffer()?;
        if let Err(e) = backend.upload(buffer, format, &wave.samples) {
            let _ = backend.delete_buffer(buffer);
            return Err(e.into());
        }

        let source = match backend.create_source() {
            Ok(source) => source,
            Err(e) => {
                let _ = backend.delete_buffer(buffer);
                return Err(e.into());
            }
        };
        if let Err(e) = backend.attach_buffer(source, buffer) {
            let _ = backend.delete_source(source);
            let _ = backend.delete_buffer(buffer);
            return Err(e.into());
        }

        Ok(Self {
            backend,
            source,
            buffer,
            duration: wave.duration_secs(),
        })
    }

    /// Play from the beginning, restarting if already playing
    pub fn play(&self) {
        let restarted = self
            .backend
            .stop(self.source)
            .and_then(|()| self.backend.play(self.source));
        if let Err(e) = restarted {
            warn!("Could not play sound: {}", e);
        }
    }

    pub fn pause(&self) {
        if let Err(e) = self.backend.pause(self.source) {
            warn!("Could not pause sound: {}", e);
        }
    }

    /// Continue a paused sound
    pub fn resume(&self) {
        if self.state() == SourceState::Paused {
            if let Err(e) = self.backend.play(self.source) {
                warn!("Could not resume sound: {}", e);
            }
        }
    }

    pub fn stop(&self) {
        if let Err(e) = self.backend.stop(self.source) {
            warn!("Could not stop sound: {}", e);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SourceState::Playing
    }

    fn state(&self) -> SourceState {
        self.backend
            .source_state(self.source)
            .unwrap_or(SourceState::Stopped)
    }

    pub fn set_volume(&self, volume: f32) {
        if let Err(e) = self.backend.set_gain(self.source, volume) {
            warn!("Could not set sound volume: {}", e);
        }
    }

    pub fn set_pitch(&self, pitch: f32) {
        if let Err(e) = self.backend.set_pitch(self.source, pitch) {
            warn!("Could not set sound pitch: {}", e);
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.duration
    }
}

impl<B: AudioBackend + ?Sized> Drop for Sound<B> {
    fn drop(&mut self) {
        // The source holds the buffer, so it goes first
        if let Err(e) = self.backend.delete_source(self.source) {
            warn!("Could not delete sound source: {}", e);
        }
        if let Err(e) = self.backend.delete_buffer(self.buffer) {
            warn!("Could not delete sound buffer: {}", e);
        }
    }
}
