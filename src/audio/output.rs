//! Hardware output through cpal
//!
//! The cpal stream runs on a dedicated thread that keeps it alive; the
//! output callback mixes every playing source out of the shared [`Mixer`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::{default_output_device, get_device_by_id, AudioDevice};
use crate::audio::mixer::{Mixer, MixerBackend};
use crate::config::AudioConfig;
use crate::error::DeviceError;

/// Audio backend playing through an output device
pub struct CpalBackend {
    mixer: Arc<Mutex<Mixer>>,

    /// Whether the output thread should keep the stream alive
    running: Arc<AtomicBool>,

    /// Output thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Receiver<DeviceError>,

    /// Stream configuration
    config: StreamConfig,

    device_name: String,
}

impl CpalBackend {
    /// Open the configured output device (or the default one) and start the
    /// output stream
    pub fn open(settings: &AudioConfig) -> Result<Self, DeviceError> {
        let device = match &settings.device_id {
            Some(id) => get_device_by_id(id)?,
            None => default_output_device()?,
        };
        let device_name = device.name.clone();
        let default_config = device.default_output_config()?;
        let sample_format = default_config.sample_format();

        let config = StreamConfig {
            channels: settings.channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: match settings.buffer_size {
                Some(size) => cpal::BufferSize::Fixed(size),
                None => cpal::BufferSize::Default,
            },
        };

        let mixer = Arc::new(Mutex::new(Mixer::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (error_tx, error_rx) = bounded::<DeviceError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);

        let thread_mixer = mixer.clone();
        let thread_running = running.clone();
        let thread_config = config.clone();

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match sample_format {
                    cpal::SampleFormat::F32 => {
                        build_stream::<f32>(device, &thread_config, thread_mixer, error_tx)
                    }
                    cpal::SampleFormat::I16 => {
                        build_stream::<i16>(device, &thread_config, thread_mixer, error_tx)
                    }
                    cpal::SampleFormat::U16 => {
                        build_stream::<u16>(device, &thread_config, thread_mixer, error_tx)
                    }
                    other => Err(DeviceError::UnsupportedFormat(format!(
                        "output sample format {:?}",
                        other
                    ))),
                };

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(DeviceError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep thread alive while running
                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping output
            })
            .map_err(|e| DeviceError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .map_err(|_| DeviceError::StreamError("output thread exited".to_string()))
            .and_then(|r| r);
        if let Err(e) = ready {
            running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            return Err(e);
        }

        tracing::info!(
            "Audio device opened: {} ({} Hz, {} channels, {:?})",
            device_name,
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            mixer,
            running,
            thread_handle: Some(handle),
            error_rx,
            config,
            device_name,
        })
    }

    /// Stop the output stream. Sources and buffers stay valid but silent.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Audio device closed: {}", self.device_name);
        }
    }

    /// Check if the output stream is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Check for stream errors
    pub fn check_errors(&self) -> Option<DeviceError> {
        self.error_rx.try_recv().ok()
    }
}

impl MixerBackend for CpalBackend {
    fn mixer(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock()
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream<T>(
    device: AudioDevice,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    error_tx: Sender<DeviceError>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels;
    let sample_rate = config.sample_rate.0;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .into_inner()
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.lock().mix_into(&mut scratch, channels, sample_rate);
                for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(sample);
                }
            },
            move |err| {
                let _ = error_tx.try_send(DeviceError::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::StreamError(e.to_string()))
}
