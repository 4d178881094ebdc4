use std::mem;

use chrono::{DateTime, Utc};

/// Which side of the conversation a piece of text belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    /// Neither buffer holds text.
    Idle,
    UserTurnOpen,
    /// The AI buffer holds text. The user buffer may too, if the AI started
    /// answering before the user's turn was closed.
    AiTurnOpen,
}

/// Accumulates the partial transcripts of the current user and AI turns and
/// decides when each is finalized.
///
/// Closing a turn takes the buffer and leaves a fresh empty one, so a turn's
/// text is handed out at most once.
#[derive(Debug, Default)]
pub struct TurnTracker {
    user: String,
    ai: String,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: &str) {
        append_chunk(&mut self.user, text);
    }

    pub fn push_ai(&mut self, text: &str) {
        append_chunk(&mut self.ai, text);
    }

    /// The first audio of a new AI turn closes the user's turn, if it has
    /// any text.
    pub fn ai_audio_onset(&mut self) -> Option<String> {
        if self.user.trim().is_empty() {
            self.user.clear();
            return None;
        }
        Some(take_trimmed(&mut self.user))
    }

    /// Closes the AI turn, returning its text even when empty.
    pub fn turn_complete(&mut self) -> String {
        take_trimmed(&mut self.ai)
    }

    /// Drops the AI turn without emitting it. Returns whether any text was
    /// discarded.
    pub fn interrupted(&mut self) -> bool {
        !mem::take(&mut self.ai).is_empty()
    }

    pub fn reset(&mut self) {
        self.user.clear();
        self.ai.clear();
    }

    pub fn user_text(&self) -> &str {
        &self.user
    }

    pub fn ai_text(&self) -> &str {
        &self.ai
    }

    pub fn phase(&self) -> TurnPhase {
        if !self.ai.is_empty() {
            TurnPhase::AiTurnOpen
        } else if !self.user.is_empty() {
            TurnPhase::UserTurnOpen
        } else {
            TurnPhase::Idle
        }
    }
}

// Chunks usually carry their own leading space; bare words get one.
fn append_chunk(buffer: &mut String, chunk: &str) {
    if chunk.is_empty() {
        return;
    }
    let needs_space = !buffer.is_empty()
        && !buffer.ends_with(char::is_whitespace)
        && !chunk.starts_with(char::is_whitespace);
    if needs_space {
        buffer.push(' ');
    }
    buffer.push_str(chunk);
}

fn take_trimmed(buffer: &mut String) -> String {
    mem::take(buffer).trim().to_string()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEntry {
    role: Role,
    text: String,
    timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Finalized turns in the order they completed. Filled by the caller from
/// the turn-complete callbacks.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TranscriptHistory {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finalized turn. Empty turns are not recorded.
    pub fn record(&mut self, role: Role, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.entries.push(TranscriptEntry {
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        true
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_turn_closes_on_ai_audio() {
        let mut turns = TurnTracker::new();
        for _ in 0..3 {
            turns.push_user("hi");
        }
        assert_eq!(turns.phase(), TurnPhase::UserTurnOpen);
        assert_eq!(turns.ai_audio_onset(), Some("hi hi hi".to_string()));
        // already emitted
        assert_eq!(turns.ai_audio_onset(), None);
        assert_eq!(turns.phase(), TurnPhase::Idle);
    }

    #[test]
    fn test_chunks_with_own_spacing_are_kept() {
        let mut turns = TurnTracker::new();
        turns.push_ai("Hello");
        turns.push_ai(" there,");
        turns.push_ai(" friend.");
        assert_eq!(turns.turn_complete(), "Hello there, friend.");
    }

    #[test]
    fn test_turn_complete_emits_even_when_empty() {
        let mut turns = TurnTracker::new();
        assert_eq!(turns.turn_complete(), "");
        turns.push_ai("ok");
        assert_eq!(turns.turn_complete(), "ok");
        assert_eq!(turns.turn_complete(), "");
    }

    #[test]
    fn test_interruption_discards_ai_text_only() {
        let mut turns = TurnTracker::new();
        turns.push_user("wait");
        turns.push_ai("As I was say");
        assert_eq!(turns.phase(), TurnPhase::AiTurnOpen);
        assert!(turns.interrupted());
        assert!(!turns.interrupted());
        assert_eq!(turns.ai_text(), "");
        assert_eq!(turns.user_text(), "wait");
    }

    #[test]
    fn test_history_skips_empty_turns() {
        let mut history = TranscriptHistory::new();
        assert!(history.record(Role::User, " hi there "));
        assert!(!history.record(Role::Assistant, ""));
        assert!(!history.record(Role::Assistant, "   "));
        assert_eq!(history.len(), 1);
        let entry = history.last().unwrap();
        assert_eq!(entry.role(), Role::User);
        assert_eq!(entry.text(), "hi there");
    }

    #[test]
    fn test_entry_serializes_role_lowercase() {
        let mut history = TranscriptHistory::new();
        history.record(Role::Assistant, "hello");
        let json = serde_json::to_value(&history.entries()[0]).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["text"], "hello");
        assert!(json["timestamp"].is_string());
    }
}
