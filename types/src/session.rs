use crate::audio::{Modality, Voice};
use crate::content::{Content, Part};

/// The `setup` payload, sent once as the first message of a session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Fully qualified model name, e.g. "models/gemini-2.0-flash-live-001".
    model: String,

    generation_config: GenerationConfig,

    /// System instructions prepended to every model turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    /// Present (as an empty object) to receive transcripts of the user's speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<AudioTranscriptionConfig>,

    /// Present (as an empty object) to receive transcripts of the model's speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Setup {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation_config
    }

    pub fn system_instruction(&self) -> Option<&Content> {
        self.system_instruction.as_ref()
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.generation_config
            .speech_config
            .as_ref()
            .map(|s| &s.voice_config.prebuilt_voice_config.voice_name)
    }

    pub fn transcribes_input(&self) -> bool {
        self.input_audio_transcription.is_some()
    }

    pub fn transcribes_output(&self) -> bool {
        self.output_audio_transcription.is_some()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

impl GenerationConfig {
    pub fn response_modalities(&self) -> &[Modality] {
        &self.response_modalities
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    voice_name: Voice,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptionConfig {}

pub struct SetupConfigurator {
    setup: Setup,
}

impl SetupConfigurator {
    pub fn new(model: &str) -> Self {
        Self {
            setup: Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec![Modality::Audio],
                    speech_config: None,
                },
                system_instruction: None,
                input_audio_transcription: Some(AudioTranscriptionConfig::default()),
                output_audio_transcription: Some(AudioTranscriptionConfig::default()),
            },
        }
    }

    pub fn with_response_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.setup.generation_config.response_modalities = modalities;
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.setup.system_instruction = Some(Content::new(vec![Part::text(instructions)]));
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.setup.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
            },
        });
        self
    }

    pub fn with_input_audio_transcription_enable(mut self) -> Self {
        self.setup.input_audio_transcription = Some(AudioTranscriptionConfig::default());
        self
    }

    pub fn with_input_audio_transcription_disable(mut self) -> Self {
        self.setup.input_audio_transcription = None;
        self
    }

    pub fn with_output_audio_transcription_enable(mut self) -> Self {
        self.setup.output_audio_transcription = Some(AudioTranscriptionConfig::default());
        self
    }

    pub fn with_output_audio_transcription_disable(mut self) -> Self {
        self.setup.output_audio_transcription = None;
        self
    }

    pub fn build(self) -> Setup {
        self.setup
    }
}
