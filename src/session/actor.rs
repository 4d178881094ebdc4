use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::mpsc;
use voice_session_utils::audio::{AudioBuffer, CodecError};

use crate::client::{ChannelEvent, Client};
use crate::config::VisualContext;
use crate::decoder::{DecodeWorker, Decoded};
use crate::devices::AudioDevices;
use crate::error::{ChannelError, Error};
use crate::playback::BufferId;
use crate::session::engine::SessionCore;
use crate::session::state::{Phase, Shared};

/// Everything the session task reacts to, in one queue.
#[derive(Debug)]
pub(crate) enum Input {
    Channel(ChannelEvent),
    Decoded {
        epoch: u64,
        result: Result<AudioBuffer, CodecError>,
    },
    PlaybackEnded(BufferId),
    Disconnect,
}

impl From<ChannelEvent> for Input {
    fn from(event: ChannelEvent) -> Self {
        Input::Channel(event)
    }
}

impl From<Decoded> for Input {
    fn from(decoded: Decoded) -> Self {
        Input::Decoded {
            epoch: decoded.epoch,
            result: decoded.result,
        }
    }
}

/// Scoped resources of one connection. Each is released at most once.
#[derive(Default)]
pub(crate) struct Resources {
    pub devices: Option<AudioDevices>,
    pub capture: Option<tokio::task::JoinHandle<()>>,
    pub decoder: Option<DecodeWorker>,
    pub client: Option<Client>,
}

impl Resources {
    /// Stops capture and closes both devices. Joining the audio thread
    /// blocks, so it runs on the blocking pool.
    pub(crate) async fn release_devices(&mut self) {
        if let Some(mut devices) = self.devices.take() {
            if let Err(e) = tokio::task::spawn_blocking(move || devices.release()).await {
                tracing::error!("failed to release audio devices: {}", e);
            }
        }
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
    }

    pub(crate) async fn close_channel(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.stop();
        }
        if let Some(mut client) = self.client.take() {
            client.close().await;
        }
    }

    pub(crate) async fn release(&mut self) {
        self.release_devices().await;
        self.close_channel().await;
    }
}

pub(crate) struct SessionActor {
    core: SessionCore,
    resources: Resources,
    shared: Arc<Shared>,
    inputs: mpsc::UnboundedReceiver<Input>,
    visual_context: Option<VisualContext>,
    cleaned: bool,
}

impl SessionActor {
    pub(crate) fn new(
        core: SessionCore,
        resources: Resources,
        shared: Arc<Shared>,
        inputs: mpsc::UnboundedReceiver<Input>,
        visual_context: Option<VisualContext>,
    ) -> Self {
        Self {
            core,
            resources,
            shared,
            inputs,
            visual_context,
            cleaned: false,
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(input) = self.inputs.recv().await {
            if let ControlFlow::Break(error) = self.handle(input) {
                self.cleanup(error).await;
                return;
            }
            self.sync_phase();
        }
        // every sender is gone
        self.cleanup(None).await;
    }

    fn handle(&mut self, input: Input) -> ControlFlow<Option<Error>> {
        match input {
            Input::Channel(event) => return self.handle_channel(event),
            Input::Decoded { epoch, result } => {
                if epoch != self.core.epoch() {
                    tracing::debug!(epoch, current = self.core.epoch(), "dropping audio from an interrupted turn");
                    return ControlFlow::Continue(());
                }
                match result {
                    Ok(buffer) => self.core.on_decoded(buffer),
                    Err(e) => tracing::warn!("dropping undecodable audio chunk: {}", e),
                }
            }
            Input::PlaybackEnded(id) => self.core.on_playback_ended(id),
            Input::Disconnect => {
                tracing::info!("disconnect requested");
                return ControlFlow::Break(None);
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_channel(&mut self, event: ChannelEvent) -> ControlFlow<Option<Error>> {
        match event {
            ChannelEvent::Opened => {
                tracing::info!("session opened");
                self.shared.set_connected_phase(Phase::Listening);
                if let Some(client) = self.resources.client.as_ref() {
                    client.set_open(true);
                    if let Some(context) = self.visual_context.take() {
                        if let Err(e) = client.send_content(context.to_content()) {
                            tracing::warn!("failed to send visual context: {}", e);
                        }
                    }
                }
            }
            ChannelEvent::AudioChunk(blob) => match self.resources.decoder.as_ref() {
                Some(decoder) => decoder.submit(self.core.epoch(), blob),
                None => tracing::debug!("no decoder, dropping audio chunk"),
            },
            ChannelEvent::Transcript { role, text } => self.core.on_transcript(role, &text),
            ChannelEvent::TurnComplete => {
                if let Some(decoder) = self.resources.decoder.as_ref() {
                    decoder.flush(self.core.epoch());
                }
                self.core.on_turn_complete();
            }
            ChannelEvent::Interrupted => {
                tracing::debug!("ai turn interrupted");
                self.core.on_interrupted();
            }
            ChannelEvent::Closed { reason } => {
                tracing::warn!("channel closed by remote: {:?}", reason);
                return ControlFlow::Break(Some(ChannelError::Closed(reason).into()));
            }
            ChannelEvent::Error(message) => {
                tracing::error!("channel error: {}", message);
                return ControlFlow::Break(Some(ChannelError::Protocol(message).into()));
            }
        }
        ControlFlow::Continue(())
    }

    fn sync_phase(&self) {
        let phase = if self.core.is_speaking() {
            Phase::AiSpeaking
        } else {
            Phase::Listening
        };
        if self.shared.state().phase().is_connected() {
            self.shared.set_connected_phase(phase);
        }
    }

    /// Tears the session down. Runs once; later calls do nothing.
    async fn cleanup(&mut self, error: Option<Error>) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;

        self.core.stop_playback();
        self.resources.release_devices().await;
        self.shared.set_taps(None);
        self.resources.close_channel().await;
        self.core.reset();

        match error {
            Some(error) => {
                tracing::error!("session ended with error: {}", error);
                self.shared.fail(error.report());
            }
            None => {
                tracing::info!("session ended");
                self.shared.idle();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::callbacks::MockSessionCallbacks;
    use crate::error::ErrorCategory;
    use crate::playback::tests::{seconds, FakeOutput};
    use crate::transcript::Role;

    struct Harness {
        tx: mpsc::UnboundedSender<Input>,
        shared: Arc<Shared>,
        output: FakeOutput,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(callbacks: MockSessionCallbacks) -> Harness {
        let output = FakeOutput::default();
        let shared = Arc::new(Shared::new());
        shared.connecting();
        let (tx, rx) = mpsc::unbounded_channel();
        let core = SessionCore::new(Box::new(output.clone()), Arc::new(callbacks));
        let actor = SessionActor::new(core, Resources::default(), shared.clone(), rx, None);
        Harness {
            tx,
            shared,
            output,
            task: tokio::spawn(actor.run()),
        }
    }

    #[tokio::test]
    async fn test_conversation_then_disconnect() {
        let mut callbacks = MockSessionCallbacks::new();
        callbacks.expect_on_user_chunk().return_const(());
        callbacks.expect_on_user_turn_complete().with(eq("hello")).times(1).return_const(());
        callbacks.expect_on_audio_level().return_const(());
        callbacks.expect_on_speaking_state_change().with(eq(true)).times(1).return_const(());
        callbacks.expect_on_speaking_state_change().with(eq(false)).times(1).return_const(());

        let harness = start(callbacks);
        harness.tx.send(ChannelEvent::Opened.into()).unwrap();
        harness
            .tx
            .send(ChannelEvent::Transcript { role: Role::User, text: "hello".to_string() }.into())
            .unwrap();
        harness.tx.send(Input::Decoded { epoch: 0, result: Ok(seconds(1.0, 0.1)) }).unwrap();
        harness.tx.send(Input::Disconnect).unwrap();
        harness.task.await.unwrap();

        let state = harness.shared.state();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.error(), None);
        // cleanup stopped the buffer that was still playing
        assert_eq!(harness.output.stopped(), vec![0]);
    }

    #[tokio::test]
    async fn test_stale_decode_is_dropped_after_interruption() {
        let mut callbacks = MockSessionCallbacks::new();
        callbacks.expect_on_interrupted().times(1).return_const(());
        callbacks.expect_on_audio_level().times(1).return_const(());
        callbacks.expect_on_speaking_state_change().return_const(());

        let harness = start(callbacks);
        harness.tx.send(ChannelEvent::Opened.into()).unwrap();
        harness.tx.send(ChannelEvent::Interrupted.into()).unwrap();
        // decoded before the interruption was seen
        harness.tx.send(Input::Decoded { epoch: 0, result: Ok(seconds(1.0, 0.1)) }).unwrap();
        harness.tx.send(Input::Decoded { epoch: 1, result: Ok(seconds(0.5, 0.1)) }).unwrap();
        harness.tx.send(Input::Disconnect).unwrap();
        harness.task.await.unwrap();

        assert_eq!(harness.output.started().len(), 1);
    }

    #[tokio::test]
    async fn test_decode_error_is_not_fatal() {
        let mut callbacks = MockSessionCallbacks::new();
        callbacks.expect_on_audio_level().times(1).return_const(());
        callbacks.expect_on_speaking_state_change().with(eq(true)).times(1).return_const(());
        callbacks.expect_on_speaking_state_change().with(eq(false)).times(1).return_const(());

        let harness = start(callbacks);
        let mut states = harness.shared.subscribe();
        harness.tx.send(ChannelEvent::Opened.into()).unwrap();
        harness
            .tx
            .send(Input::Decoded { epoch: 0, result: Err(CodecError::TruncatedSample(3)) })
            .unwrap();
        harness.tx.send(Input::Decoded { epoch: 0, result: Ok(seconds(1.0, 0.1)) }).unwrap();

        let speaking = states.wait_for(|s| s.is_speaking()).await.unwrap().is_speaking();
        assert!(speaking);
        assert_eq!(harness.output.started(), vec![(0, 0.0)]);

        // dropping the last sender ends the session like a disconnect
        drop(harness.tx);
        harness.task.await.unwrap();
        assert_eq!(harness.shared.state().phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_channel_error_surfaces_and_ends_session() {
        let callbacks = MockSessionCallbacks::new();
        let harness = start(callbacks);
        harness.tx.send(ChannelEvent::Opened.into()).unwrap();
        harness.tx.send(ChannelEvent::Error("connection reset".to_string()).into()).unwrap();
        // ignored: the session is already gone
        let _ = harness.tx.send(Input::Disconnect);
        harness.task.await.unwrap();

        let state = harness.shared.state();
        assert_eq!(state.phase(), Phase::Error);
        let report = state.error().unwrap();
        assert_eq!(report.category(), ErrorCategory::Channel);
        assert!(report.detail().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_remote_close_surfaces_channel_error() {
        let mut callbacks = MockSessionCallbacks::new();
        callbacks.expect_on_ai_chunk().return_const(());
        callbacks.expect_on_ai_turn_complete().never();
        let harness = start(callbacks);
        harness.tx.send(ChannelEvent::Opened.into()).unwrap();
        harness
            .tx
            .send(ChannelEvent::Transcript { role: Role::Assistant, text: "partial".to_string() }.into())
            .unwrap();
        harness
            .tx
            .send(ChannelEvent::Closed { reason: Some("1011 internal error".to_string()) }.into())
            .unwrap();
        harness.task.await.unwrap();

        let state = harness.shared.state();
        assert_eq!(state.phase(), Phase::Error);
        let report = state.error().unwrap();
        assert_eq!(report.category(), ErrorCategory::Channel);
        assert!(report.detail().contains("1011 internal error"));
    }
}
