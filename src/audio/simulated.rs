//! Deterministic software backend
//!
//! Plays nothing. Time only moves when [`SimulatedBackend::advance`] is
//! called, which makes buffer consumption reproducible in tests and in
//! headless runs.

use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

use crate::audio::mixer::{Mixer, MixerBackend};

/// Backend driven by a manual clock
#[derive(Default)]
pub struct SimulatedBackend {
    mixer: Mutex<Mixer>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the sources play for `elapsed` of simulated time
    pub fn advance(&self, elapsed: Duration) {
        self.mixer.lock().advance(elapsed.as_secs_f64());
    }

    /// Make the next `count` uploads fail with a device error
    pub fn fail_next_uploads(&self, count: usize) {
        self.mixer.lock().fail_next_uploads(count);
    }

    /// Sources currently allocated
    pub fn live_sources(&self) -> usize {
        self.mixer.lock().live_sources()
    }

    /// Buffers currently allocated
    pub fn live_buffers(&self) -> usize {
        self.mixer.lock().live_buffers()
    }

    /// Successful uploads since creation
    pub fn uploads(&self) -> u64 {
        self.mixer.lock().uploads()
    }
}

impl MixerBackend for SimulatedBackend {
    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock()
    }
}
