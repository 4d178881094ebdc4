use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::mpsc;
use voice_session_types::audio::OUTPUT_SAMPLE_RATE;
use voice_session_utils::audio::downmix;
use voice_session_utils::device::{self, DeviceError};

use crate::analyser::AnalyserNode;
use crate::output::{Renderer, SharedTimeline, Timeline};
use crate::playback::BufferId;

pub(crate) type OnEnded = Box<dyn Fn(BufferId) + Send + 'static>;

/// Everything the device callbacks write into.
pub(crate) struct DeviceSetup {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub capture_tx: mpsc::Sender<Vec<f32>>,
    pub input_analyser: AnalyserNode,
    pub output_analyser: AnalyserNode,
    pub on_ended: OnEnded,
}

/// What was actually opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeviceFormat {
    pub input_rate: u32,
    pub input_channels: usize,
    pub output_rate: u32,
    pub output_channels: usize,
}

/// Owns the microphone and speaker streams.
///
/// cpal streams cannot move between threads, so both live on a dedicated
/// thread until [`AudioDevices::release`] (or drop).
pub(crate) struct AudioDevices {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioDevices {
    /// Opens both streams and starts them. Blocks until they are playing or
    /// have failed.
    pub(crate) fn open(setup: DeviceSetup) -> Result<(Self, DeviceFormat, SharedTimeline), DeviceError> {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("voice-audio".to_string())
            .spawn(move || {
                let streams = match build_streams(setup) {
                    Ok((streams, format, timeline)) => {
                        if ready_tx.send(Ok((format, timeline))).is_err() {
                            return;
                        }
                        streams
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // returns on release or when the handle is dropped
                let _ = stop_rx.recv();
                drop(streams);
                tracing::debug!("audio streams released");
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        let mut devices = Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        };
        match ready_rx.recv() {
            Ok(Ok((format, timeline))) => Ok((devices, format, timeline)),
            Ok(Err(e)) => {
                devices.release();
                Err(e)
            }
            Err(_) => {
                devices.release();
                Err(DeviceError::Unavailable("audio thread exited".to_string()))
            }
        }
    }

    pub(crate) fn release(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("audio thread panicked");
            }
        }
    }
}

impl Drop for AudioDevices {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_streams(setup: DeviceSetup) -> Result<([cpal::Stream; 2], DeviceFormat, SharedTimeline), DeviceError> {
    let DeviceSetup {
        input_device,
        output_device,
        capture_tx,
        input_analyser,
        output_analyser,
        on_ended,
    } = setup;

    let input = device::get_or_default_input(input_device.as_deref())?;
    let input_config: StreamConfig = input.default_input_config()?.into();
    let input_channels = input_config.channels as usize;
    tracing::info!("input: device={:?}, config={:?}", input.name().ok(), &input_config);

    let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
        let mono = downmix(data, input_channels);
        input_analyser.write(&mono, 1);
        if let Err(mpsc::error::TrySendError::Full(_)) = capture_tx.try_send(mono) {
            tracing::warn!("capture queue full, dropping input audio");
        }
    };
    let input_stream = input.build_input_stream(
        &input_config,
        input_data_fn,
        move |err| tracing::error!("an error occurred on input stream: {}", err),
        None,
    )?;

    let output = device::get_or_default_output(output_device.as_deref())?;
    let output_config: StreamConfig = device::output_config_for_rate(&output, OUTPUT_SAMPLE_RATE)?.into();
    let output_channels = output_config.channels as usize;
    let output_rate = output_config.sample_rate.0;
    tracing::info!("output: device={:?}, config={:?}", output.name().ok(), &output_config);

    let timeline: SharedTimeline = Arc::new(Mutex::new(Timeline::new(output_rate)));
    let mut renderer = Renderer::new(timeline.clone(), output_channels);
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let finished = renderer.render(data);
        output_analyser.write(data, output_channels);
        for id in finished {
            on_ended(*id);
        }
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("an error occurred on output stream: {}", err),
        None,
    )?;

    input_stream.play()?;
    output_stream.play()?;

    let format = DeviceFormat {
        input_rate: input_config.sample_rate.0,
        input_channels,
        output_rate,
        output_channels,
    };
    Ok(([input_stream, output_stream], format, timeline))
}
