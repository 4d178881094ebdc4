use crate::content::{Blob, Content};

/// A single message from the endpoint. Every field is optional; unknown
/// fields are ignored.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup_complete: Option<SetupCompleteEvent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_content: Option<ServerContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    go_away: Option<GoAwayEvent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    usage_metadata: Option<UsageMetadata>,
}

impl ServerMessage {
    pub fn setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    pub fn server_content(&self) -> Option<&ServerContent> {
        self.server_content.as_ref()
    }

    pub fn go_away(&self) -> Option<&GoAwayEvent> {
        self.go_away.as_ref()
    }

    pub fn usage_metadata(&self) -> Option<&UsageMetadata> {
        self.usage_metadata.as_ref()
    }
}

/// `setupComplete` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SetupCompleteEvent {}

/// `serverContent` event
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Streamed model output for the current turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_turn: Option<Content>,

    /// Partial transcript of the user's speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_transcription: Option<Transcription>,

    /// Partial transcript of the model's speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_transcription: Option<Transcription>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    turn_complete: Option<bool>,

    /// The model's turn was cut off by user activity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interrupted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    generation_complete: Option<bool>,
}

impl ServerContent {
    pub fn model_turn(&self) -> Option<&Content> {
        self.model_turn.as_ref()
    }

    pub fn audio_blobs(&self) -> impl Iterator<Item = &Blob> {
        self.model_turn.iter().flat_map(|turn| turn.audio_blobs())
    }

    pub fn input_transcription(&self) -> Option<&str> {
        self.input_transcription.as_ref().and_then(Transcription::text)
    }

    pub fn output_transcription(&self) -> Option<&str> {
        self.output_transcription.as_ref().and_then(Transcription::text)
    }

    pub fn is_turn_complete(&self) -> bool {
        self.turn_complete.unwrap_or(false)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.unwrap_or(false)
    }

    pub fn is_generation_complete(&self) -> bool {
        self.generation_complete.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Transcription {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

/// `goAway` event: the endpoint will close the connection soon.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAwayEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time_left: Option<String>,
}

impl GoAwayEvent {
    pub fn time_left(&self) -> Option<&str> {
        self.time_left.as_deref()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    response_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl UsageMetadata {
    pub fn prompt_token_count(&self) -> u32 {
        self.prompt_token_count
    }

    pub fn response_token_count(&self) -> u32 {
        self.response_token_count
    }

    pub fn total_token_count(&self) -> u32 {
        self.total_token_count
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_setup_complete() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(message.setup_complete());
        assert!(message.server_content().is_none());
    }

    #[test]
    fn test_deserialize_model_turn_with_usage() {
        let json = r#"{
            "serverContent": {
                "modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}}]},
                "outputTranscription": {"text": "Hel"}
            },
            "usageMetadata": {"promptTokenCount": 12, "responseTokenCount": 3, "totalTokenCount": 15}
        }"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let content = message.server_content().unwrap();
        assert_eq!(content.audio_blobs().count(), 1);
        assert_eq!(content.output_transcription(), Some("Hel"));
        assert_eq!(content.input_transcription(), None);
        assert!(!content.is_turn_complete());
        assert_eq!(message.usage_metadata().unwrap().total_token_count(), 15);
    }

    #[test]
    fn test_deserialize_flags_and_unknown_fields() {
        let json = r#"{"serverContent": {"interrupted": true, "somethingNew": 1}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(message.server_content().unwrap().is_interrupted());

        let json = r#"{"serverContent": {"turnComplete": true, "inputTranscription": {}}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        let content = message.server_content().unwrap();
        assert!(content.is_turn_complete());
        assert_eq!(content.input_transcription(), None);

        let message: ServerMessage = serde_json::from_str(r#"{"goAway": {"timeLeft": "10s"}}"#).unwrap();
        assert_eq!(message.go_away().unwrap().time_left(), Some("10s"));
    }
}
