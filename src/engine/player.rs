//! Real-time audio playback using cpal

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use super::driver::AudioCallbackDriver;

/// Real-time audio player
///
/// Owns the output stream; the driver lives inside the stream's callback.
pub struct Player {
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
    sample_rate: u32,
    block_size: u32,
    device_name: Option<String>,
}

impl Player {
    /// Create a player targeting the named device, or the default one
    pub fn new(sample_rate: u32, block_size: u32, device_name: Option<String>) -> Self {
        Self {
            stream: None,
            running: Arc::new(AtomicBool::new(false)),
            sample_rate,
            block_size,
            device_name,
        }
    }

    /// Open the device and start pulling audio from the driver
    pub fn start(&mut self, driver: AudioCallbackDriver) -> Result<()> {
        let host = cpal::default_host();
        let device = self.find_device(&host)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let default = device.default_output_config()?;
        let sample_format = default.sample_format();
        let mut stream_config: StreamConfig = default.into();
        stream_config.sample_rate = cpal::SampleRate(self.sample_rate);
        stream_config.buffer_size = BufferSize::Fixed(self.block_size);

        self.running.store(true, Ordering::SeqCst);

        // The callback takes the driver out of this slot on its first run, so
        // a stream that fails to build leaves it here for the next attempt.
        let slot = Arc::new(Mutex::new(Some(driver)));

        // Some backends reject a fixed buffer size; the driver chunks whatever it gets
        let stream = match self.build_stream(&device, &stream_config, sample_format, &slot) {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Fixed buffer size rejected ({}), using device default", err);
                stream_config.buffer_size = BufferSize::Default;
                self.build_stream(&device, &stream_config, sample_format, &slot)?
            }
        };

        stream.play().context("failed to start output stream")?;
        info!(
            "Playing on {} ({} Hz, {} channels, {:?})",
            name, stream_config.sample_rate.0, stream_config.channels, sample_format
        );
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop playback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.stream = None;
    }

    /// Check if currently playing
    pub fn is_playing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn find_device(&self, host: &cpal::Host) -> Result<Device> {
        if let Some(wanted) = &self.device_name {
            let found = host
                .output_devices()?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false));
            match found {
                Some(device) => return Ok(device),
                None => warn!("Output device '{}' not found, using default", wanted),
            }
        }
        host.default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))
    }

    /// Build a stream for the device's sample format
    fn build_stream(
        &self,
        device: &Device,
        config: &StreamConfig,
        format: SampleFormat,
        slot: &DriverSlot,
    ) -> Result<Stream> {
        match format {
            SampleFormat::F32 => self.build_typed::<f32>(device, config, slot),
            SampleFormat::I16 => self.build_typed::<i16>(device, config, slot),
            SampleFormat::U16 => self.build_typed::<u16>(device, config, slot),
            other => Err(anyhow!("Unsupported sample format {:?}", other)),
        }
    }

    fn build_typed<T: SizedSample + FromSample<f32> + Send + 'static>(
        &self,
        device: &Device,
        config: &StreamConfig,
        slot: &DriverSlot,
    ) -> Result<Stream> {
        let running = self.running.clone();
        let channels = config.channels as usize;
        let frames = self.block_size as usize;
        let mut state = CallbackState::<T>::new(channels, frames, Arc::clone(slot));

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                state.fill(data, running.load(Ordering::Relaxed));
            },
            |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )?;

        Ok(stream)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

type DriverSlot = Arc<Mutex<Option<AudioCallbackDriver>>>;

/// State captured by the output callback
struct CallbackState<T> {
    channels: usize,
    pending: Option<DriverSlot>,
    driver: Option<AudioCallbackDriver>,
    scratch: Vec<f32>,
    _format: PhantomData<T>,
}

impl<T: SizedSample + FromSample<f32>> CallbackState<T> {
    fn new(channels: usize, frames: usize, slot: DriverSlot) -> Self {
        Self {
            channels,
            pending: Some(slot),
            driver: None,
            scratch: vec![0.0; frames * channels.max(1)],
            _format: PhantomData,
        }
    }

    fn fill(&mut self, data: &mut [T], running: bool) {
        // First callback takes the driver out of the slot; no lock after that
        if let Some(slot) = self.pending.take() {
            self.driver = slot.lock().ok().and_then(|mut guard| guard.take());
        }

        let driver = match (&mut self.driver, running) {
            (Some(driver), true) => driver,
            _ => {
                data.fill(T::EQUILIBRIUM);
                return;
            }
        };

        if self.scratch.len() < data.len() {
            // Only happens when the host exceeds the size it negotiated
            self.scratch.resize(data.len(), 0.0);
        }
        let scratch = &mut self.scratch[..data.len()];
        driver.deliver(scratch, self.channels);
        for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
            *out = T::from_sample(sample);
        }
    }
}

/// Get the default output device name
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}

/// List all available output devices
pub fn list_output_devices() -> Vec<(String, StreamConfig)> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            if let (Ok(name), Ok(config)) = (device.name(), device.default_output_config()) {
                devices.push((name, config.into()));
            }
        }
    }

    devices
}
