//! Microphone capture through cpal.
//!
//! cpal streams may not move between threads, so each open microphone lives
//! on its own thread. The stream runs for as long as a [`LiveStream`] handle
//! exists; samples are only kept while a clip writer is armed.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use hound::WavWriter;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::writer::MemoryWriter;
use crate::{AudioCapture, CaptureError, Clip, Result};

type WavWriterHandle = Arc<Mutex<Option<WavWriter<MemoryWriter>>>>;
type Opened = Result<(hound::WavSpec, String)>;

/// Records clips from the default input device.
///
/// With `keep_warm` the input stream stays open between captures, which
/// saves the device start-up latency at the cost of holding the microphone
/// until [`release`](AudioCapture::release) or drop.
#[derive(Default)]
pub struct MicCapture {
    keep_warm: bool,
    warm: Mutex<Option<LiveStream>>,
}

impl MicCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_warm(mut self, keep_warm: bool) -> Self {
        self.keep_warm = keep_warm;
        self
    }
}

#[async_trait]
impl AudioCapture for MicCapture {
    async fn capture(&self, duration: Duration, armed: oneshot::Sender<()>) -> Result<Clip> {
        let warm = self.warm.lock().take();
        let stream = match warm {
            Some(stream) if stream.is_alive() => stream,
            _ => LiveStream::open().await?,
        };

        let buffer = stream.arm()?;
        info!(device = %stream.device_name, duration = ?duration, "recording clip");
        armed.send(()).ok();
        tokio::time::sleep(duration).await;
        let data = stream.disarm(buffer)?;

        if self.keep_warm {
            *self.warm.lock() = Some(stream);
        }

        Ok(Clip::new(data, duration))
    }

    fn release(&self) {
        if self.warm.lock().take().is_some() {
            debug!("released warm microphone");
        }
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

/// Handle to an input stream running on its own thread. Dropping the handle
/// stops the stream and releases the device.
struct LiveStream {
    slot: WavWriterHandle,
    spec: hound::WavSpec,
    device_name: String,
    // Dropping the sender wakes the stream thread and ends it.
    _stop: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl LiveStream {
    async fn open() -> Result<Self> {
        let slot: WavWriterHandle = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = oneshot::channel::<Opened>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let slot_2 = slot.clone();
        let thread = thread::Builder::new()
            .name("sori-mic".into())
            .spawn(move || run_stream(slot_2, ready_tx, stop_rx))
            .map_err(|e| CaptureError::Anyhow(e.into()))?;

        let (spec, device_name) = ready_rx
            .await
            .map_err(|_| anyhow!("microphone thread exited before opening the device"))??;

        Ok(Self {
            slot,
            spec,
            device_name,
            _stop: stop_tx,
            thread,
        })
    }

    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Start keeping samples in a fresh buffer.
    fn arm(&self) -> Result<MemoryWriter> {
        let buffer = MemoryWriter::new();
        let writer =
            WavWriter::new(buffer.clone(), self.spec).map_err(|e| CaptureError::Anyhow(e.into()))?;
        *self.slot.lock() = Some(writer);
        Ok(buffer)
    }

    /// Stop keeping samples and return the finished WAV bytes.
    fn disarm(&self, buffer: MemoryWriter) -> Result<Vec<u8>> {
        let writer = self
            .slot
            .lock()
            .take()
            .ok_or_else(|| anyhow!("clip writer was not armed"))?;
        // Finalize the writer so it writes the proper framing information.
        writer
            .finalize()
            .map_err(|e| CaptureError::Anyhow(anyhow!("Failed to finalize writer: {}", e)))?;
        buffer.try_into_inner()
    }
}

fn run_stream(slot: WavWriterHandle, ready: oneshot::Sender<Opened>, stop: mpsc::Receiver<()>) {
    let stream = match build_stream(slot) {
        Ok((stream, spec, name)) => {
            ready.send(Ok((spec, name))).ok();
            stream
        }
        Err(e) => {
            ready.send(Err(e)).ok();
            return;
        }
    };

    // Only ever woken by the owner dropping its sender.
    stop.recv().ok();
    stream.pause().ok();
    drop(stream);
    debug!("microphone stream closed");
}

fn build_stream(slot: WavWriterHandle) -> Result<(cpal::Stream, hound::WavSpec, String)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::NoInputDevice)?;
    let config = device
        .default_input_config()
        .map_err(|_| CaptureError::NoInputDevice)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    info!(device_name = %device_name, config = ?config, "opening input device");

    let spec = wav_spec_from_config(&config);

    let err_fn = move |err| {
        error!("an error occurred on stream: {}", err);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::I8 => device.build_input_stream(
            &config.into(),
            move |data, _: &_| write_input_data::<i8, i8>(data, &slot),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data, _: &_| write_input_data::<i16, i16>(data, &slot),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I32 => device.build_input_stream(
            &config.into(),
            move |data, _: &_| write_input_data::<i32, i32>(data, &slot),
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data, _: &_| write_input_data::<f32, f32>(data, &slot),
            err_fn,
            None,
        ),
        sample_format => {
            return Err(CaptureError::SampleFormatNotSupported(format!(
                "{:?}",
                sample_format
            )));
        }
    }
    .map_err(classify_build_error)?;

    stream.play()?;

    Ok((stream, spec, device_name))
}

/// cpal has no dedicated permission error; backends report it as text.
fn classify_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::NoInputDevice,
        cpal::BuildStreamError::BackendSpecific { ref err } if is_permission_message(&err.description) => {
            CaptureError::PermissionDenied
        }
        other => CaptureError::BuildStream(other),
    }
}

fn is_permission_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("permission") || message.contains("not authorized") || message.contains("access denied")
}

fn wav_spec_from_config(config: &cpal::SupportedStreamConfig) -> hound::WavSpec {
    hound::WavSpec {
        channels: config.channels(),
        sample_rate: config.sample_rate().0,
        bits_per_sample: (config.sample_format().sample_size() * 8) as _,
        sample_format: sample_format(config.sample_format()),
    }
}

fn sample_format(format: cpal::SampleFormat) -> hound::SampleFormat {
    if format.is_float() {
        hound::SampleFormat::Float
    } else {
        hound::SampleFormat::Int
    }
}

fn write_input_data<T, U>(input: &[T], slot: &WavWriterHandle)
where
    T: Sample,
    U: Sample + hound::Sample + FromSample<T>,
{
    // Never block the audio callback; a missed buffer is better than a glitch.
    if let Some(mut guard) = slot.try_lock() {
        if let Some(writer) = guard.as_mut() {
            for &sample in input.iter() {
                let sample: U = U::from_sample(sample);
                writer.write_sample(sample).ok();
            }
        }
    }
}
