#[cfg(test)]
use mockall::automock;

/// Hooks through which a session reports what happens in the conversation.
///
/// Passed once to [`crate::VoiceSession::connect`] and shared with the
/// session task for the lifetime of that connection. Every hook has an empty
/// default, so implementors only override what they display. Hooks run on the
/// session task and should return quickly.
#[cfg_attr(test, automock)]
pub trait SessionCallbacks: Send + Sync {
    /// A partial transcript of the user's speech.
    fn on_user_chunk(&self, _text: &str) {}

    /// The user's turn ended; `text` is everything said during it.
    fn on_user_turn_complete(&self, _text: &str) {}

    /// A partial transcript of the AI's speech.
    fn on_ai_chunk(&self, _text: &str) {}

    /// The AI finished its turn. `text` may be empty.
    fn on_ai_turn_complete(&self, _text: &str) {}

    fn on_turn_complete(&self) {}

    /// The AI was cut off. Its partial turn is discarded.
    fn on_interrupted(&self) {}

    /// Approximate loudness of the latest AI audio chunk, in `[0.0, 1.0]`.
    fn on_audio_level(&self, _level: f32) {}

    fn on_speaking_state_change(&self, _speaking: bool) {}
}

/// Callbacks that ignore everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl SessionCallbacks for NoopCallbacks {}
