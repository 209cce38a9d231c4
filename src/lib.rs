//! # Music Streamer
//!
//! Double-buffered playback of long audio files with loop continuation.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               HOST LOOP                               │
//! │        start_stream / tick / pause / resume / stop / set_volume       │
//! └──────────────────────────────────┬───────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                   Stream Driver (audio::stream)                       │
//! │  ┌─────────────┐   ┌──────────────────────┐   ┌──────────────────┐   │
//! │  │   Decoder   │──►│ Buffer Ring          │──►│ Playback Clock   │   │
//! │  │ (codec::*)  │   │ (audio::buffer)      │   │ (audio::clock)   │   │
//! │  │  WAV / OGG  │   │  slot 0 │ slot 1     │   │ elapsed / total  │   │
//! │  └──────▲──────┘   └──────────┬───────────┘   └──────────────────┘   │
//! │         │ seek on loop        │ queue / unqueue                       │
//! └─────────┼─────────────────────┼──────────────────────────────────────┘
//!           │                     ▼
//! ┌─────────┴────────────────────────────────────────────────────────────┐
//! │                    Audio Backend (audio::backend)                     │
//! │   Mixer ──► CpalBackend (audio::output) ──► output device            │
//! │         └─► SimulatedBackend (audio::simulated), manual clock        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Buffers per music stream
    pub const MUSIC_STREAM_BUFFERS: usize = 2;

    /// Samples (all channels) decoded into each stream buffer
    pub const MUSIC_BUFFER_SAMPLES: usize = 4096 * 8;

    /// Default music gain
    pub const DEFAULT_VOLUME: f32 = 1.0;

    /// Default output device sample rate
    pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 44100;

    /// Default output channel count (stereo)
    pub const DEFAULT_OUTPUT_CHANNELS: u16 = 2;

    /// Suggested interval between driver ticks
    pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

    /// OGG sounds longer than this are better streamed than loaded
    pub const SOUND_STREAMING_HINT_SECS: f32 = 10.0;
}
