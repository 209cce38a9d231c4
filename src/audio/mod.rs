//! Audio subsystem module

pub mod backend;
pub mod buffer;
pub mod clock;
pub mod device;
pub mod format;
pub mod mixer;
pub mod output;
pub mod simulated;
pub mod sound;
pub mod stream;

pub use backend::{AudioBackend, BufferId, SourceId, SourceState};
pub use buffer::{BufferRing, SlotState};
pub use clock::PlaybackClock;
pub use device::{
    default_output_device, get_device_by_id, list_output_devices, AudioDevice, AudioDeviceInfo,
};
pub use format::PcmFormat;
pub use output::CpalBackend;
pub use simulated::SimulatedBackend;
pub use sound::Sound;
pub use stream::{MusicStream, StreamState, StreamStats};
