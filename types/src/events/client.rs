use crate::content::{Blob, Content};

/// `realtimeInput` message
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputEvent {
    /// Media to append to the live input stream
    media_chunks: Vec<Blob>,
}

impl RealtimeInputEvent {
    pub fn new(chunk: Blob) -> Self {
        Self {
            media_chunks: vec![chunk],
        }
    }

    pub fn with_chunk(mut self, chunk: Blob) -> Self {
        self.media_chunks.push(chunk);
        self
    }

    pub fn media_chunks(&self) -> &[Blob] {
        &self.media_chunks
    }
}

/// `clientContent` message
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentEvent {
    /// Content appended to the conversation
    turns: Vec<Content>,
    /// Whether the model should start generating after these turns
    turn_complete: bool,
}

impl ClientContentEvent {
    pub fn new(turns: Vec<Content>) -> Self {
        Self {
            turns,
            turn_complete: false,
        }
    }

    pub fn with_turn_complete(mut self, turn_complete: bool) -> Self {
        self.turn_complete = turn_complete;
        self
    }

    pub fn turns(&self) -> &[Content] {
        &self.turns
    }

    pub fn turn_complete(&self) -> bool {
        self.turn_complete
    }
}
