use secrecy::{ExposeSecret, SecretString};

use crate::client::consts::{BASE_URL, DEFAULT_MODEL, GEMINI_API_KEY};
use crate::error::ConfigError;

/// Endpoint settings for one streaming channel.
pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Default endpoint and model. The API key comes from `GEMINI_API_KEY`
    /// and is empty when the variable is unset.
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_key: std::env::var(GEMINI_API_KEY)
                .unwrap_or_default()
                .into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Like [`Config::new`], but a missing or empty `GEMINI_API_KEY` is an
    /// error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::new();
        config.validate()?;
        Ok(config)
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingVar(GEMINI_API_KEY.to_string()));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}
