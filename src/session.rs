use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use voice_session_types::SetupConfigurator;
use voice_session_utils::device::DeviceError;

use crate::analyser::{AnalyserNode, ANALYSER_SIZE};
use crate::callbacks::SessionCallbacks;
use crate::capture::{self, CapturePipeline, CAPTURE_QUEUE};
use crate::client::consts::DEFAULT_CAPACITY;
use crate::client::Client;
use crate::config::SessionConfig;
use crate::decoder::DecodeWorker;
use crate::devices::{AudioDevices, DeviceSetup};
use crate::error::{Error, ErrorReport};
use crate::output::{self, DeviceOutput};

mod actor;
mod engine;
mod state;

use self::actor::{Input, Resources, SessionActor};
use self::engine::SessionCore;
use self::state::{Shared, Taps};

pub use self::state::{ConnectionStatus, Phase, SessionState};

/// A full-duplex voice conversation with the remote model.
///
/// At most one connection is live per handle. All conversation state is owned
/// by a background task; the handle only starts it, stops it, and observes
/// it. Dropping the handle disconnects.
pub struct VoiceSession {
    shared: Arc<Shared>,
    inputs: Option<mpsc::UnboundedSender<Input>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl VoiceSession {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            inputs: None,
            task: None,
        }
    }

    /// Opens the devices and the channel, then hands the session to its
    /// task.
    ///
    /// Does nothing while a previous connection is still live. On failure
    /// every resource acquired so far is released, the error is published in
    /// [`VoiceSession::state`], and returned.
    pub async fn connect(&mut self, config: SessionConfig, callbacks: Arc<dyn SessionCallbacks>) -> Result<(), Error> {
        if let Some(task) = self.task.as_ref() {
            if !task.is_finished() {
                tracing::warn!("connect called while a session is active, ignoring");
                return Ok(());
            }
        }
        self.task = None;
        self.inputs = None;

        if let Err(e) = config.endpoint().validate() {
            let error = Error::from(e);
            self.shared.fail(error.report());
            return Err(error);
        }

        self.shared.connecting();
        match self.start(config, callbacks).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::error!("failed to connect: {}", error);
                self.shared.fail(error.report());
                Err(error)
            }
        }
    }

    async fn start(&mut self, config: SessionConfig, callbacks: Arc<dyn SessionCallbacks>) -> Result<(), Error> {
        let SessionConfig {
            instruction_text,
            voice,
            visual_context,
            endpoint,
            input_device,
            output_device,
        } = config;

        let (input_tx, input_rx) = mpsc::unbounded_channel::<Input>();
        let mut client = Client::new(DEFAULT_CAPACITY, endpoint);
        let mut resources = Resources::default();

        let taps = Taps {
            input: AnalyserNode::new(ANALYSER_SIZE),
            output: AnalyserNode::new(ANALYSER_SIZE),
        };
        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_QUEUE);
        let ended_tx = input_tx.clone();
        let setup = DeviceSetup {
            input_device,
            output_device,
            capture_tx,
            input_analyser: taps.input.clone(),
            output_analyser: taps.output.clone(),
            on_ended: Box::new(move |id| {
                let _ = ended_tx.send(Input::PlaybackEnded(id));
            }),
        };
        let (devices, format, timeline) = tokio::task::spawn_blocking(move || AudioDevices::open(setup))
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))??;
        tracing::info!(
            input_rate = format.input_rate,
            input_channels = format.input_channels,
            output_rate = output::lock(&timeline).sample_rate(),
            output_channels = format.output_channels,
            "audio devices ready"
        );
        resources.devices = Some(devices);

        let pipeline = match CapturePipeline::new(format.input_rate) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                resources.release().await;
                return Err(e.into());
            }
        };
        resources.capture = Some(capture::spawn(pipeline, capture_rx, client.audio_sender()));
        resources.decoder = Some(DecodeWorker::spawn(
            format.output_rate,
            format.output_channels,
            input_tx.clone(),
        ));

        let mut configurator = SetupConfigurator::new(client.config().model()).with_voice(voice);
        if !instruction_text.trim().is_empty() {
            configurator = configurator.with_instructions(&instruction_text);
        }
        if let Err(e) = client.connect(configurator.build(), input_tx.clone()).await {
            resources.release().await;
            return Err(e.into());
        }
        resources.client = Some(client);

        let core = SessionCore::new(Box::new(DeviceOutput::new(timeline)), callbacks);
        self.shared.set_taps(Some(taps));
        let actor = SessionActor::new(core, resources, self.shared.clone(), input_rx, visual_context);
        self.task = Some(tokio::spawn(actor.run()));
        self.inputs = Some(input_tx);
        Ok(())
    }

    /// Ends the session and waits for cleanup to finish. Safe to call at any
    /// time and any number of times.
    pub async fn disconnect(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        if let Some(inputs) = self.inputs.take() {
            let _ = inputs.send(Input::Disconnect);
        }
        if let Err(e) = task.await {
            tracing::error!("session task failed: {}", e);
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.state().status()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Receives every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.subscribe()
    }

    pub fn last_error(&self) -> Option<ErrorReport> {
        self.shared.state().error().cloned()
    }

    /// Tap on the microphone signal, while connected.
    pub fn input_analyser(&self) -> Option<AnalyserNode> {
        self.shared.taps().map(|taps| taps.input)
    }

    /// Tap on the mixed playback signal, while connected.
    pub fn output_analyser(&self) -> Option<AnalyserNode> {
        self.shared.taps().map(|taps| taps.output)
    }
}

impl Default for VoiceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(inputs) = self.inputs.take() {
            let _ = inputs.send(Input::Disconnect);
        }
    }
}
