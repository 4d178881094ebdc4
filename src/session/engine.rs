use std::sync::Arc;

use voice_session_utils::audio::AudioBuffer;

use crate::callbacks::SessionCallbacks;
use crate::playback::{AudioOutput, BufferId, PlaybackScheduler};
use crate::transcript::{Role, TurnTracker};

/// The synchronous heart of a session: playback scheduling, turn tracking,
/// and the callbacks they fire. Owned and driven by a single task.
pub(crate) struct SessionCore {
    scheduler: PlaybackScheduler,
    turns: TurnTracker,
    callbacks: Arc<dyn SessionCallbacks>,
    /// Advanced on interruption and reset. Audio decoded for an older epoch
    /// belongs to a turn that was cut off.
    epoch: u64,
}

impl SessionCore {
    pub(crate) fn new(output: Box<dyn AudioOutput>, callbacks: Arc<dyn SessionCallbacks>) -> Self {
        Self {
            scheduler: PlaybackScheduler::new(output),
            turns: TurnTracker::new(),
            callbacks,
            epoch: 0,
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn is_speaking(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub(crate) fn cursor(&self) -> f64 {
        self.scheduler.cursor()
    }

    pub(crate) fn on_transcript(&mut self, role: Role, text: &str) {
        match role {
            Role::User => {
                self.turns.push_user(text);
                self.callbacks.on_user_chunk(text);
            }
            Role::Assistant => {
                self.turns.push_ai(text);
                self.callbacks.on_ai_chunk(text);
            }
        }
    }

    pub(crate) fn on_decoded(&mut self, buffer: AudioBuffer) {
        if buffer.is_empty() {
            return;
        }
        if !self.scheduler.is_playing() {
            if let Some(text) = self.turns.ai_audio_onset() {
                tracing::debug!("user turn complete: {:?}", text);
                self.callbacks.on_user_turn_complete(&text);
            }
        }
        let Some(scheduled) = self.scheduler.schedule(buffer) else {
            return;
        };
        self.callbacks.on_audio_level(scheduled.level);
        if scheduled.started_speaking {
            self.callbacks.on_speaking_state_change(true);
        }
    }

    pub(crate) fn on_playback_ended(&mut self, id: BufferId) {
        if self.scheduler.complete(id) {
            self.callbacks.on_speaking_state_change(false);
        }
    }

    pub(crate) fn on_turn_complete(&mut self) {
        let text = self.turns.turn_complete();
        tracing::debug!("ai turn complete: {:?}", text);
        self.callbacks.on_ai_turn_complete(&text);
        self.callbacks.on_turn_complete();
    }

    pub(crate) fn on_interrupted(&mut self) {
        let was_playing = self.scheduler.interrupt();
        if self.turns.interrupted() {
            tracing::debug!("discarded partial ai turn");
        }
        self.epoch += 1;
        self.callbacks.on_interrupted();
        if was_playing {
            self.callbacks.on_speaking_state_change(false);
        }
    }

    /// Silences all playback.
    pub(crate) fn stop_playback(&mut self) {
        if self.scheduler.interrupt() {
            self.callbacks.on_speaking_state_change(false);
        }
    }

    /// Clears the turns and rewinds the cursor. Audio still being decoded is
    /// discarded when it arrives.
    pub(crate) fn reset(&mut self) {
        self.scheduler.reset();
        self.turns.reset();
        self.epoch += 1;
    }
}
