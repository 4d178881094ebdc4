//! Session and application configuration.
//!
//! [`SessionConfig`] is the snapshot a session is started with; it is moved
//! into the session on connect and never changes afterwards. [`Settings`]
//! holds process-wide options read from the environment.

use std::env;
use std::str::FromStr;

use tracing::Level;
use voice_session_types::audio::Voice;
use voice_session_types::{Blob, Content, Part};

use crate::client::Config;
use crate::error::ConfigError;

/// An image (or other inline media) shown to the model once, at the start of
/// the session.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualContext {
    mime_type: String,
    data: String,
}

impl VisualContext {
    /// `data` is the base64-encoded payload.
    pub fn new(mime_type: &str, data: String) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub(crate) fn to_content(&self) -> Content {
        Content::new(vec![Part::inline(Blob::new(&self.mime_type, self.data.clone()))]).with_role("user")
    }
}

#[derive(Debug)]
pub struct SessionConfig {
    pub(crate) instruction_text: String,
    pub(crate) voice: Voice,
    pub(crate) visual_context: Option<VisualContext>,
    pub(crate) endpoint: Config,
    pub(crate) input_device: Option<String>,
    pub(crate) output_device: Option<String>,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    pub fn instruction_text(&self) -> &str {
        &self.instruction_text
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    pub fn visual_context(&self) -> Option<&VisualContext> {
        self.visual_context.as_ref()
    }

    pub fn endpoint(&self) -> &Config {
        &self.endpoint
    }

    pub fn input_device(&self) -> Option<&str> {
        self.input_device.as_deref()
    }

    pub fn output_device(&self) -> Option<&str> {
        self.output_device.as_deref()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigBuilder::new().build()
    }
}

pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig {
                instruction_text: String::new(),
                voice: Voice::default(),
                visual_context: None,
                endpoint: Config::new(),
                input_device: None,
                output_device: None,
            },
        }
    }

    pub fn with_instructions(mut self, text: &str) -> Self {
        self.config.instruction_text = text.to_string();
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.config.voice = voice;
        self
    }

    pub fn with_visual_context(mut self, context: VisualContext) -> Self {
        self.config.visual_context = Some(context);
        self
    }

    pub fn with_endpoint(mut self, endpoint: Config) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    pub fn with_input_device(mut self, name: Option<String>) -> Self {
        self.config.input_device = name;
        self
    }

    pub fn with_output_device(mut self, name: Option<String>) -> Self {
        self.config.output_device = name;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: Level,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

impl Settings {
    /// Loads settings from environment variables.
    ///
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    // *   `VOICE_INPUT_DEVICE`: (Optional) Name of the microphone to open. Defaults to the system default.
    // *   `VOICE_OUTPUT_DEVICE`: (Optional) Name of the speaker to open. Defaults to the system default.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = Level::from_str(&log_level_str)
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            log_level,
            input_device: non_empty_var("VOICE_INPUT_DEVICE"),
            output_device: non_empty_var("VOICE_OUTPUT_DEVICE"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
