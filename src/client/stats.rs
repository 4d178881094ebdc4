use voice_session_types::events::server::UsageMetadata;

/// Running counters for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_sent: u64,
    frames_dropped: u64,
    messages_received: u64,
    prompt_tokens: u64,
    response_tokens: u64,
    total_tokens: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub(crate) fn record_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub(crate) fn record_received(&mut self) {
        self.messages_received += 1;
    }

    pub(crate) fn update_usage(&mut self, usage: &UsageMetadata) {
        self.prompt_tokens += u64::from(usage.prompt_token_count());
        self.response_tokens += u64::from(usage.response_token_count());
        self.total_tokens += u64::from(usage.total_token_count());
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens
    }

    pub fn response_tokens(&self) -> u64 {
        self.response_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }
}
